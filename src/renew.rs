// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::RetransmitParams,
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6Lease, DhcpV6OptionStatusCode,
    DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const REN_TIMEOUT: Duration = Duration::from_secs(10);
const REN_MAX_RT: Duration = Duration::from_secs(600);
const REB_TIMEOUT: Duration = Duration::from_secs(10);
const REB_MAX_RT: Duration = Duration::from_secs(600);

// MRC/MRD stay zero: the Renew exchange is bounded by T2 and the Rebind
// exchange by the valid lifetime, both enforced by clamping the wait.
const RENEW_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: REN_TIMEOUT,
    mrt: REN_MAX_RT,
    mrc: 0,
    mrd: Duration::new(0, 0),
};

const REBIND_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: REB_TIMEOUT,
    mrt: REB_MAX_RT,
    mrc: 0,
    mrd: Duration::new(0, 0),
};

impl DhcpV6Client {
    /// T1 fired: refresh the lease with its provider. Rebind is entered
    /// from here once T2 passes, not directly.
    pub(crate) fn enter_renew(&mut self) -> Result<(), DhcpError> {
        log::debug!("Entering Renew state on {}", self.config.iface_name);
        self.state = DhcpV6State::Renew;
        self.xid = new_xid();
        self.retransmit.reset(boot_time_sec());
        self.next_renew_sec = None;
        self.arm_transmit(Duration::new(0, 0))
    }

    /// Single procedure for both Renew and Rebind: the state switches
    /// internally when the lease crosses T2, and the wait never overshoots
    /// the boundary it is racing (T2, then valid lifetime expiry).
    pub(crate) fn renew_rebind_timeout(&mut self) -> Result<(), DhcpError> {
        let now = boot_time_sec();
        let lease_times = self.lease.as_ref().map(|lease| {
            (
                lease.still_valid(now),
                lease.elapsed_sec(now),
                i64::from(lease.t2_sec),
                i64::from(lease.valid_time_sec),
            )
        });
        let (still_valid, elapsed, t2_sec, valid_sec) = match lease_times {
            Some(v) => v,
            None => {
                log::warn!(
                    "No lease left in state {}, rollback to Solicit",
                    self.state
                );
                return self.enter_unbound();
            }
        };
        if !still_valid {
            return self.enter_unbound();
        }
        if self.state == DhcpV6State::Renew && elapsed >= t2_sec {
            log::info!(
                "T2 passed without server Reply, switching to Rebind"
            );
            self.state = DhcpV6State::Rebind;
            self.xid = new_xid();
            self.retransmit.reset(now);
        }
        let (params, limit_sec, msg_type) = if self.state == DhcpV6State::Renew
        {
            (
                &RENEW_RETRANSMIT,
                t2_sec - elapsed,
                DhcpV6MessageType::Renew,
            )
        } else {
            (
                &REBIND_RETRANSMIT,
                valid_sec - elapsed,
                DhcpV6MessageType::Rebind,
            )
        };
        let mut wait_time = match self.retransmit.next_delay(now, params) {
            Some(t) => t,
            // MRC/MRD are zero for this exchange.
            None => params.mrt,
        };
        let limit =
            Duration::from_secs(u64::try_from(limit_sec).unwrap_or(0));
        if wait_time > limit {
            wait_time = limit;
        }
        self.retransmit.try_count += 1;
        if let Err(e) = self.transmit(msg_type) {
            log::warn!("Failed to build {msg_type}, will retry: {e}");
        }
        self.arm_transmit(wait_time)
    }

    pub(crate) fn process_renew_rebind_reply(
        &mut self,
        raw: &[u8],
        msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        let status = msg.options.status();
        if status != DhcpV6OptionStatusCode::Success {
            log::info!(
                "Server replied status {status} to our refresh, lease lost"
            );
            return self.enter_unbound();
        }
        let lease = match DhcpV6Lease::new_from_msg(
            raw,
            &msg,
            boot_time_sec(),
            self.config.ssid.as_deref(),
        ) {
            Ok(l) => l,
            Err(e) => {
                log::info!("No usable binding in refresh Reply: {e}");
                return self.enter_unbound();
            }
        };
        self.lease = Some(lease);
        self.enter_bound()
    }
}
