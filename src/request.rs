// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::RetransmitParams,
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6Lease, DhcpV6Option, DhcpV6OptionCode,
    DhcpV6OptionStatusCode, DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const REQ_TIMEOUT: Duration = Duration::from_secs(1);
const REQ_MAX_RT: Duration = Duration::from_secs(30);
const REQ_MAX_RC: u32 = 10;

const REQUEST_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: REQ_TIMEOUT,
    mrt: REQ_MAX_RT,
    mrc: REQ_MAX_RC,
    mrd: Duration::new(0, 0),
};

impl DhcpV6Client {
    /// Request the saved Advertise: fresh transaction, retransmission
    /// cleared, first REQUEST goes out on the immediate timer.
    pub(crate) fn enter_request(&mut self) -> Result<(), DhcpError> {
        log::debug!(
            "Entering Request state on {} for {:?}",
            self.config.iface_name,
            self.lease.as_ref().map(|l| l.addr)
        );
        self.state = DhcpV6State::Request;
        self.xid = new_xid();
        self.retransmit.reset(boot_time_sec());
        self.arm_transmit(Duration::new(0, 0))
    }

    pub(crate) fn request_timeout(&mut self) -> Result<(), DhcpError> {
        let wait_time = match self
            .retransmit
            .next_delay(boot_time_sec(), &REQUEST_RETRANSMIT)
        {
            Some(t) => t,
            None => {
                log::info!(
                    "No usable Reply after {REQ_MAX_RC} REQUEST transmits, \
                     rollback to Solicit"
                );
                return self.enter_solicit();
            }
        };
        self.retransmit.try_count += 1;
        if let Err(e) = self.transmit(DhcpV6MessageType::Request) {
            log::warn!("Failed to build REQUEST, will retry: {e}");
        }
        self.arm_transmit(wait_time)
    }

    pub(crate) fn process_request_reply(
        &mut self,
        raw: &[u8],
        msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        match msg.options.status() {
            DhcpV6OptionStatusCode::NoAddrsAvail => {
                log::info!(
                    "Ignoring Reply with status no-addrs-avail, keep waiting"
                );
                return Ok(());
            }
            DhcpV6OptionStatusCode::Success => (),
            status => {
                log::info!("Ignoring Reply with status {status}");
                return Ok(());
            }
        }
        if let Some(DhcpV6Option::IANA(ia_na)) =
            msg.options.get(DhcpV6OptionCode::IANA)
        {
            if ia_na.status.as_ref().map(|s| s.status)
                == Some(DhcpV6OptionStatusCode::NotOnLink)
            {
                log::info!(
                    "Server replied not-on-link for our binding, rollback \
                     to Solicit"
                );
                return self.enter_solicit();
            }
        }
        let lease = match DhcpV6Lease::new_from_msg(
            raw,
            &msg,
            boot_time_sec(),
            self.config.ssid.as_deref(),
        ) {
            Ok(l) => l,
            Err(e) => {
                log::info!("Ignoring Reply without usable binding: {e}");
                return Ok(());
            }
        };
        self.lease = Some(lease);
        self.enter_bound()
    }
}
