// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::{gen_initial_delay, RetransmitParams},
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6Event, DhcpV6Notification, DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const INF_MAX_DELAY: Duration = Duration::from_secs(1);
const INF_TIMEOUT: Duration = Duration::from_secs(1);
const INF_MAX_RT: Duration = Duration::from_secs(120);

const INFORM_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: INF_TIMEOUT,
    mrt: INF_MAX_RT,
    mrc: 0,
    mrd: Duration::new(0, 0),
};

impl DhcpV6Client {
    /// Stateless mode: only configuration options are requested, no IA_NA
    /// ever rides along. Cellular interfaces skip the initial delay.
    pub(crate) fn enter_inform(&mut self) -> Result<(), DhcpError> {
        log::debug!("Entering Inform state on {}", self.config.iface_name);
        self.state = DhcpV6State::Inform;
        self.xid = new_xid();
        self.stateless_info = None;
        self.retransmit.reset(boot_time_sec());
        let initial_delay = if self.config.cellular {
            Duration::new(0, 0)
        } else {
            gen_initial_delay(INF_MAX_DELAY)
        };
        self.arm_transmit(initial_delay)
    }

    pub(crate) fn inform_timeout(&mut self) -> Result<(), DhcpError> {
        if !self.link_up {
            return self.enter_inactive();
        }
        let wait_time = match self
            .retransmit
            .next_delay(boot_time_sec(), &INFORM_RETRANSMIT)
        {
            Some(t) => t,
            // No MRC/MRD, Inform retries forever.
            None => INF_MAX_RT,
        };
        self.retransmit.try_count += 1;
        if let Err(e) = self.transmit(DhcpV6MessageType::InformationRequest)
        {
            log::warn!(
                "Failed to build INFORMATION_REQUEST, will retry: {e}"
            );
        }
        self.arm_transmit(wait_time)
    }

    /// First matching Reply completes the exchange; InformComplete is
    /// terminal until the client is restarted.
    pub(crate) fn process_inform_reply(
        &mut self,
        raw: &[u8],
        msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        log::info!(
            "Received stateless configuration on {}",
            self.config.iface_name
        );
        self.stateless_info = Some((raw.to_vec(), msg.options));
        self.event_pool.del_timer(DhcpV6Event::TransmitWait)?;
        self.event_pool.del_timer(DhcpV6Event::Timeout)?;
        self.state = DhcpV6State::InformComplete;
        self.post_notification(DhcpV6Notification::StatusChanged(
            DhcpV6State::InformComplete,
        ));
        Ok(())
    }
}
