// SPDX-License-Identifier: Apache-2.0

use std::os::fd::AsFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{
    ClockId::CLOCK_BOOTTIME, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags,
};

use crate::{DhcpError, ErrorKind};

/// Seconds since boot, including suspend time. Lease absolute times are
/// stored against this clock so a sleep/wake cycle still expires leases.
pub(crate) fn boot_time_sec() -> i64 {
    match nix::time::clock_gettime(nix::time::ClockId::CLOCK_BOOTTIME) {
        Ok(ts) => ts.tv_sec(),
        Err(e) => {
            log::error!("Failed to read CLOCK_BOOTTIME: {e}");
            0
        }
    }
}

#[derive(Debug)]
pub(crate) struct DhcpTimerFd {
    pub(crate) fd: TimerFd,
}

impl AsRawFd for DhcpTimerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}

impl DhcpTimerFd {
    pub(crate) fn new(time: Duration) -> Result<Self, DhcpError> {
        // A zero it_value would disarm the timerfd instead of firing
        // immediately.
        let time = std::cmp::max(time, Duration::from_millis(1));
        let fd =
            TimerFd::new(CLOCK_BOOTTIME, TimerFlags::empty()).map_err(|e| {
                let e = DhcpError::new(
                    ErrorKind::Bug,
                    format!("Failed to create timerfd {e}"),
                );
                log::error!("{e}");
                e
            })?;
        fd.set(
            Expiration::OneShot(TimeSpec::from_duration(time)),
            TimerSetTimeFlags::empty(),
        )
        .map_err(|e| {
            let e = DhcpError::new(
                ErrorKind::Bug,
                format!("Failed to set timerfd {e}"),
            );
            log::error!("{e}");
            e
        })?;
        log::debug!(
            "TimerFd created {:?} with {} milliseconds",
            fd,
            time.as_millis()
        );
        Ok(Self { fd })
    }
}
