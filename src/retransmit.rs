// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

// RFC 3315 section 14.  Reliability of Client Initiated Message Exchanges
//  RT      Retransmission timeout
//  IRT     Initial retransmission time
//  MRC     Maximum retransmission count
//  MRT     Maximum retransmission time
//  MRD     Maximum retransmission duration
//  RAND    Randomization factor
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct RetransmitParams {
    pub(crate) irt: Duration,
    pub(crate) mrt: Duration,
    pub(crate) mrc: u32,
    pub(crate) mrd: Duration,
}

pub(crate) fn gen_retransmit_time(
    elapsed: Duration,
    retransmit_count: u32,
    rt: Duration,
    params: &RetransmitParams,
) -> Option<Duration> {
    if params.mrc != 0 && retransmit_count >= params.mrc {
        return None;
    }
    if params.mrd != Duration::new(0, 0) && params.mrd < elapsed {
        return None;
    }

    let rt = if rt == Duration::new(0, 0) {
        Duration::from_millis(
            (params.irt.as_millis() * rand::random_range(900..1100) / 1000)
                .try_into()
                .unwrap_or(u64::MAX),
        )
    } else {
        Duration::from_millis(
            (rt.as_millis() * rand::random_range(1900..2100) / 1000)
                .try_into()
                .unwrap_or(u64::MAX),
        )
    };

    if params.mrt != Duration::new(0, 0) && rt > params.mrt {
        Some(Duration::from_millis(
            (params.mrt.as_millis() * rand::random_range(900..1100) / 1000)
                .try_into()
                .unwrap_or(u64::MAX),
        ))
    } else {
        Some(rt)
    }
}

/// Initial transmit delay, uniform in [0, max_delay). Used by Solicit,
/// Confirm and Inform.
pub(crate) fn gen_initial_delay(max_delay: Duration) -> Duration {
    let max_ms = max_delay.as_millis() as u64;
    if max_ms == 0 {
        Duration::new(0, 0)
    } else {
        Duration::from_millis(rand::random_range(0..max_ms))
    }
}

/// Per-exchange retransmission state: the try counter, the previous RT and
/// the boottime second the exchange began.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct DhcpV6Retransmit {
    pub(crate) try_count: u32,
    rt: Duration,
    pub(crate) begin_sec: i64,
}

impl DhcpV6Retransmit {
    pub(crate) fn new(now_sec: i64) -> Self {
        Self {
            try_count: 0,
            rt: Duration::new(0, 0),
            begin_sec: now_sec,
        }
    }

    pub(crate) fn reset(&mut self, now_sec: i64) {
        *self = Self::new(now_sec);
    }

    pub(crate) fn elapsed(&self, now_sec: i64) -> Duration {
        Duration::from_secs(
            u64::try_from(now_sec.saturating_sub(self.begin_sec))
                .unwrap_or(0),
        )
    }

    /// Wait time before the next retransmit, `None` once MRC or MRD is
    /// exhausted. The returned RT is remembered for the doubling step of
    /// the following call.
    pub(crate) fn next_delay(
        &mut self,
        now_sec: i64,
        params: &RetransmitParams,
    ) -> Option<Duration> {
        let ret = gen_retransmit_time(
            self.elapsed(now_sec),
            self.try_count,
            self.rt,
            params,
        );
        if let Some(t) = ret {
            self.rt = t;
        }
        ret
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEST_PARAMS: RetransmitParams = RetransmitParams {
        irt: Duration::from_secs(1),
        mrt: Duration::from_secs(30),
        mrc: 0,
        mrd: Duration::new(0, 0),
    };

    #[test]
    fn first_wait_within_irt_bounds() {
        for _ in 0..100 {
            let rt = gen_retransmit_time(
                Duration::new(0, 0),
                0,
                Duration::new(0, 0),
                &TEST_PARAMS,
            )
            .unwrap();
            assert!(rt >= Duration::from_millis(900), "{rt:?}");
            assert!(rt < Duration::from_millis(1100), "{rt:?}");
        }
    }

    #[test]
    fn subsequent_wait_doubles_previous() {
        for _ in 0..100 {
            let prev = Duration::from_secs(4);
            let rt = gen_retransmit_time(
                Duration::new(0, 0),
                1,
                prev,
                &TEST_PARAMS,
            )
            .unwrap();
            assert!(rt >= Duration::from_millis(7600), "{rt:?}");
            assert!(rt < Duration::from_millis(8400), "{rt:?}");
        }
    }

    #[test]
    fn wait_clamps_to_mrt() {
        for _ in 0..100 {
            let prev = Duration::from_secs(25);
            let rt = gen_retransmit_time(
                Duration::new(0, 0),
                1,
                prev,
                &TEST_PARAMS,
            )
            .unwrap();
            // 2 * 25s exceeds MRT 30s, so the wait is MRT randomized
            assert!(rt >= Duration::from_millis(27000), "{rt:?}");
            assert!(rt < Duration::from_millis(33000), "{rt:?}");
        }
    }

    #[test]
    fn mrc_exhaustion() {
        let params = RetransmitParams {
            mrc: 10,
            ..TEST_PARAMS
        };
        assert!(gen_retransmit_time(
            Duration::new(0, 0),
            9,
            Duration::from_secs(1),
            &params
        )
        .is_some());
        assert!(gen_retransmit_time(
            Duration::new(0, 0),
            10,
            Duration::from_secs(1),
            &params
        )
        .is_none());
    }

    #[test]
    fn mrd_exhaustion() {
        let params = RetransmitParams {
            mrd: Duration::from_secs(10),
            ..TEST_PARAMS
        };
        assert!(gen_retransmit_time(
            Duration::from_secs(5),
            0,
            Duration::new(0, 0),
            &params
        )
        .is_some());
        assert!(gen_retransmit_time(
            Duration::from_secs(11),
            0,
            Duration::new(0, 0),
            &params
        )
        .is_none());
    }

    #[test]
    fn initial_delay_within_bounds() {
        for _ in 0..100 {
            let d = gen_initial_delay(Duration::from_secs(1));
            assert!(d < Duration::from_secs(1));
        }
        assert_eq!(gen_initial_delay(Duration::new(0, 0)), Duration::new(0, 0));
    }

    #[test]
    fn retransmit_tracker_remembers_rt() {
        let mut retransmit = DhcpV6Retransmit::new(100);
        let first = retransmit.next_delay(100, &TEST_PARAMS).unwrap();
        retransmit.try_count += 1;
        let second = retransmit.next_delay(101, &TEST_PARAMS).unwrap();
        // Millisecond truncation can shave the exact 1.9x lower bound.
        assert!(second >= first.mul_f64(1.89), "{first:?} {second:?}");
        assert!(second <= first.mul_f64(2.11), "{first:?} {second:?}");
    }
}
