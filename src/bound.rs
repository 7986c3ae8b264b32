// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{
    time::boot_time_sec, DhcpError, DhcpV6Client, DhcpV6Event,
    DhcpV6Notification, DhcpV6State, ErrorKind,
};

/// A T1 already in the past still gets a short breather instead of an
/// immediate Renew storm.
const MIN_RENEW_DELAY: Duration = Duration::from_secs(10);

impl DhcpV6Client {
    /// Lease acquired (or revalidated): mark the saved message verified,
    /// plumb the address with its remaining lifetimes and wait for the
    /// kernel DAD verdict. Re-entry with the same address skips the
    /// re-plumb but still arms the T1 timer.
    pub(crate) fn enter_bound(&mut self) -> Result<(), DhcpError> {
        let now = boot_time_sec();
        let (addr, prefix_len, remaining) = match self.lease.as_mut() {
            Some(lease) => {
                lease.verified = true;
                (
                    lease.addr,
                    lease.prefix_len,
                    lease
                        .valid_remaining(now)
                        .map(|valid| (valid, lease.preferred_remaining(now))),
                )
            }
            None => {
                return Err(DhcpError::new(
                    ErrorKind::Bug,
                    "enter_bound() without saved lease".to_string(),
                ));
            }
        };
        let (valid_remaining, preferred_remaining) = match remaining {
            Some(v) => v,
            // Already expired, or the clock went backwards.
            None => return self.enter_unbound(),
        };
        log::info!(
            "Bound to {addr}/{prefix_len} on {}, valid {valid_remaining}s, \
             preferred {preferred_remaining}s",
            self.config.iface_name
        );
        self.event_pool.del_timer(DhcpV6Event::TransmitWait)?;
        self.event_pool.del_timer(DhcpV6Event::Timeout)?;
        self.state = DhcpV6State::Bound;

        if self.bound_addr == Some(addr) && self.dad_clean {
            // Same address already live on the interface.
            self.arm_lease_timers(now)?;
            self.post_notification(DhcpV6Notification::StatusChanged(
                DhcpV6State::Bound,
            ));
            return Ok(());
        }

        if let Some(old) = self.bound_addr.take() {
            if old != addr {
                if let Err(e) =
                    self.plumb.remove(&self.config.iface_name, &old)
                {
                    log::warn!("Failed to remove stale address {old}: {e}");
                }
            }
        }
        self.dad_clean = false;
        if let Err(e) = self.plumb.add(
            &self.config.iface_name,
            &addr,
            prefix_len,
            valid_remaining,
            preferred_remaining,
        ) {
            log::error!("Failed to plumb address {addr}: {e}");
        }
        self.bound_addr = Some(addr);
        // No notification yet: the DAD result arrives as an address change
        // event and completes the transition. The expiry timer is armed
        // regardless so a lost DAD event cannot wedge the lease.
        self.arm_expiry_timer(now)?;
        Ok(())
    }

    /// Arm the T1 (renew) and valid lifetime timers. An infinite lease
    /// arms neither.
    pub(crate) fn arm_lease_timers(
        &mut self,
        now_sec: i64,
    ) -> Result<(), DhcpError> {
        let (infinite, t1_sec, elapsed) = match self.lease.as_ref() {
            Some(lease) => {
                (lease.is_infinite(), lease.t1_sec, lease.elapsed_sec(now_sec))
            }
            None => {
                return Err(DhcpError::new(
                    ErrorKind::Bug,
                    "arm_lease_timers() without saved lease".to_string(),
                ));
            }
        };
        if infinite {
            self.next_renew_sec = None;
            return Ok(());
        }
        let t1_delay = std::cmp::max(
            Duration::from_secs(
                u64::try_from(i64::from(t1_sec) - elapsed).unwrap_or(0),
            ),
            MIN_RENEW_DELAY,
        );
        log::debug!(
            "Arming renew timer for {} seconds",
            t1_delay.as_secs()
        );
        self.event_pool.add_timer(t1_delay, DhcpV6Event::Renew)?;
        self.next_renew_sec = Some(now_sec + t1_delay.as_secs() as i64);
        self.arm_expiry_timer(now_sec)
    }

    fn arm_expiry_timer(&mut self, now_sec: i64) -> Result<(), DhcpError> {
        let valid_remaining = match self.lease.as_ref() {
            Some(lease) if !lease.is_infinite() => {
                lease.valid_remaining(now_sec).unwrap_or(0)
            }
            _ => return Ok(()),
        };
        self.event_pool.add_timer(
            Duration::from_secs(valid_remaining.into()),
            DhcpV6Event::LeaseExpired,
        )
    }
}
