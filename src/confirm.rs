// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::{gen_initial_delay, RetransmitParams},
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6OptionStatusCode, DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const CNF_MAX_DELAY: Duration = Duration::from_secs(1);
const CNF_TIMEOUT: Duration = Duration::from_secs(1);
const CNF_MAX_RT: Duration = Duration::from_secs(4);
const CNF_MAX_RD: Duration = Duration::from_secs(10);

const CONFIRM_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: CNF_TIMEOUT,
    mrt: CNF_MAX_RT,
    mrc: 0,
    mrd: CNF_MAX_RD,
};

impl DhcpV6Client {
    /// Revalidate a still-valid lease after wake, link-up or an access
    /// point roam. The saved message stops counting as verified until the
    /// server confirms it.
    pub(crate) fn enter_confirm(&mut self) -> Result<(), DhcpError> {
        log::debug!(
            "Entering Confirm state on {}",
            self.config.iface_name
        );
        self.state = DhcpV6State::Confirm;
        self.xid = new_xid();
        if let Some(lease) = self.lease.as_mut() {
            lease.verified = false;
        }
        self.retransmit.reset(boot_time_sec());
        self.arm_transmit(gen_initial_delay(CNF_MAX_DELAY))
    }

    pub(crate) fn confirm_timeout(&mut self) -> Result<(), DhcpError> {
        if !self.link_up {
            return self.enter_inactive();
        }
        let now = boot_time_sec();
        let wait_time = match self
            .retransmit
            .next_delay(now, &CONFIRM_RETRANSMIT)
        {
            Some(t) => t,
            // CNF_MAX_RD wall clock exhausted without any server answer.
            // RFC 3315 section 18.1.2: the client SHOULD continue to use
            // the addresses it had.
            None => {
                let lease_valid = self
                    .lease
                    .as_ref()
                    .is_some_and(|l| l.still_valid(now));
                return if lease_valid {
                    log::info!(
                        "No Reply to Confirm within {}s, keeping the lease",
                        CNF_MAX_RD.as_secs()
                    );
                    self.enter_bound()
                } else {
                    self.enter_solicit()
                };
            }
        };
        self.retransmit.try_count += 1;
        if let Err(e) = self.transmit(DhcpV6MessageType::Confirm) {
            log::warn!("Failed to build CONFIRM, will retry: {e}");
        }
        self.arm_transmit(wait_time)
    }

    pub(crate) fn process_confirm_reply(
        &mut self,
        msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        let status = msg.options.status();
        if status == DhcpV6OptionStatusCode::Success {
            log::info!("Server confirmed our binding still fits this link");
            self.enter_bound()
        } else {
            log::info!(
                "Server replied status {status} to Confirm, lease unusable"
            );
            self.enter_unbound()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn confirm_bounded_by_wall_clock() {
        // CNF_MAX_RD measures wall clock from entering Confirm, not tries.
        let mut retransmit = crate::retransmit::DhcpV6Retransmit::new(100);
        assert!(retransmit.next_delay(105, &CONFIRM_RETRANSMIT).is_some());
        assert!(retransmit.next_delay(111, &CONFIRM_RETRANSMIT).is_none());
    }

    #[test]
    fn confirm_state_has_no_server_id() {
        assert!(!DhcpV6MessageType::Confirm.needs_server_id());
        assert_eq!(
            DhcpV6State::Confirm.expected_reply_type(),
            Some(DhcpV6MessageType::Reply)
        );
    }
}
