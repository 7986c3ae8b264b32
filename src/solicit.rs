// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::{gen_initial_delay, RetransmitParams},
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6Lease, DhcpV6Notification,
    DhcpV6OptionStatusCode, DhcpV6State,
};

// RFC 3315 section 5.5 Transmission and Retransmission Parameters
const SOL_MAX_DELAY: Duration = Duration::from_secs(1);
const SOL_TIMEOUT: Duration = Duration::from_secs(1);
const SOL_MAX_RT: Duration = Duration::from_secs(120);

const SOLICIT_RETRANSMIT: RetransmitParams = RetransmitParams {
    irt: SOL_TIMEOUT,
    mrt: SOL_MAX_RT,
    mrc: 0,
    mrd: Duration::new(0, 0),
};

/// Observability hook: this many fruitless Solicit transmits raise a
/// GenerateSymptom notification.
const GENERATE_SYMPTOM_AT_TRY: u32 = 6;

const MAX_PREFERENCE: u8 = 255;

impl DhcpV6Client {
    /// Fresh transaction, cleared retransmission state and saved message,
    /// then a random delay of up to SOL_MAX_DELAY before the first
    /// transmit per RFC 3315 section 17.1.2.
    pub(crate) fn enter_solicit(&mut self) -> Result<(), DhcpError> {
        log::debug!(
            "Entering Solicit state on {}",
            self.config.iface_name
        );
        self.state = DhcpV6State::Solicit;
        self.xid = new_xid();
        self.lease = None;
        self.event_pool.del_timer(crate::DhcpV6Event::Renew)?;
        self.event_pool.del_timer(crate::DhcpV6Event::LeaseExpired)?;
        self.retransmit.reset(boot_time_sec());
        self.arm_transmit(gen_initial_delay(SOL_MAX_DELAY))
    }

    pub(crate) fn solicit_timeout(&mut self) -> Result<(), DhcpError> {
        if !self.link_up {
            return self.enter_inactive();
        }
        // An Advertise collected during the wait wins now.
        if self.lease.is_some() {
            return self.enter_request();
        }
        let wait_time = match self
            .retransmit
            .next_delay(boot_time_sec(), &SOLICIT_RETRANSMIT)
        {
            Some(t) => t,
            // Solicit has no MRC/MRD, it retries forever.
            None => SOL_MAX_RT,
        };
        self.retransmit.try_count += 1;
        if self.retransmit.try_count == GENERATE_SYMPTOM_AT_TRY {
            self.post_notification(DhcpV6Notification::GenerateSymptom {
                try_count: self.retransmit.try_count,
            });
        }
        if let Err(e) = self.transmit(DhcpV6MessageType::Solicit) {
            log::warn!("Failed to build SOLICIT, will retry: {e}");
        }
        self.arm_transmit(wait_time)
    }

    /// Collect an Advertise offer. The first usable offer is saved; a
    /// later one replaces it only with a strictly higher server
    /// preference. Preference 255, or any offer once past the first
    /// retransmit, short-circuits straight to Request.
    pub(crate) fn process_advertise(
        &mut self,
        raw: &[u8],
        msg: DhcpV6Message,
    ) -> Result<(), DhcpError> {
        if msg.options.status() == DhcpV6OptionStatusCode::NoAddrsAvail {
            log::info!(
                "Ignoring Advertise with status no-addrs-avail from server"
            );
            return Ok(());
        }
        let lease = match DhcpV6Lease::new_from_msg(
            raw,
            &msg,
            boot_time_sec(),
            self.config.ssid.as_deref(),
        ) {
            Ok(l) => l,
            Err(e) => {
                log::info!("Ignoring unusable Advertise: {e}");
                return Ok(());
            }
        };
        let save = match self.lease.as_ref() {
            Some(saved) => lease.preference > saved.preference,
            None => true,
        };
        if save {
            log::debug!(
                "Saving Advertise for {} with preference {}",
                lease.addr,
                lease.preference
            );
            self.lease = Some(lease);
        }
        let best_preference =
            self.lease.as_ref().map(|l| l.preference).unwrap_or(0);
        if self.retransmit.try_count > 1 || best_preference == MAX_PREFERENCE
        {
            self.enter_request()?;
        }
        Ok(())
    }
}
