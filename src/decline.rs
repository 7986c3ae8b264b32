// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::RetransmitParams,
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const DEC_TIMEOUT: Duration = Duration::from_secs(1);
const DEC_MAX_RC: u32 = 5;

const DECLINE_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: DEC_TIMEOUT,
    mrt: Duration::new(0, 0),
    mrc: DEC_MAX_RC,
    mrd: Duration::new(0, 0),
};

impl DhcpV6Client {
    /// DAD found our address in use elsewhere: remove it, tell the server
    /// with DECLINE (up to DEC_MAX_RC transmits or until a Reply), then
    /// solicit a different binding.
    pub(crate) fn enter_decline(&mut self) -> Result<(), DhcpError> {
        log::info!(
            "Declining duplicated address on {}",
            self.config.iface_name
        );
        if let Some(addr) = self.bound_addr.take() {
            if let Err(e) =
                self.plumb.remove(&self.config.iface_name, &addr)
            {
                log::warn!("Failed to remove address {addr}: {e}");
            }
        }
        self.dad_clean = false;
        // The binding is gone but the saved message is kept: the DECLINE
        // itself still needs the server identity and the address.
        if let Some(lease) = self.lease.as_mut() {
            lease.verified = false;
        }
        self.event_pool.del_timer(crate::DhcpV6Event::Renew)?;
        self.event_pool.del_timer(crate::DhcpV6Event::LeaseExpired)?;
        self.state = DhcpV6State::Decline;
        self.xid = new_xid();
        self.retransmit.reset(boot_time_sec());
        self.arm_transmit(Duration::new(0, 0))
    }

    pub(crate) fn decline_timeout(&mut self) -> Result<(), DhcpError> {
        let wait_time = match self
            .retransmit
            .next_delay(boot_time_sec(), &DECLINE_RETRANSMIT)
        {
            Some(t) => t,
            None => {
                log::debug!(
                    "DECLINE transmitted {DEC_MAX_RC} times, moving on"
                );
                return self.enter_solicit();
            }
        };
        self.retransmit.try_count += 1;
        if let Err(e) = self.transmit(DhcpV6MessageType::Decline) {
            log::warn!("Failed to build DECLINE, will retry: {e}");
        }
        self.arm_transmit(wait_time)
    }

    /// Any matching Reply ends the Decline exchange.
    pub(crate) fn process_decline_reply(
        &mut self,
        _msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        log::debug!("Server acknowledged our DECLINE");
        self.enter_solicit()
    }
}
