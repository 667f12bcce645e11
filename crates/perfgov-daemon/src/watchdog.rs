//! Liveness tracking for the decision loop.
//!
//! The decision thread stamps [`Liveness`] after each cycle that finishes
//! within the check timeout. The watchdog thread compares that stamp with
//! the clock; once the gap exceeds the lag threshold it reports a stall
//! exactly once per stall episode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Outcome of one watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogVerdict {
    Healthy { lag_ms: u64 },
    /// First check to see this stall; the caller should act.
    Stalled { lag_ms: u64 },
    /// Still stalled, already acted on.
    AlreadyFlagged { lag_ms: u64 },
}

#[derive(Debug)]
pub struct Liveness {
    last_cycle_ms: AtomicU64,
    lagging: AtomicBool,
}

impl Liveness {
    #[must_use]
    pub const fn new(started_ms: u64) -> Self {
        Self {
            last_cycle_ms: AtomicU64::new(started_ms),
            lagging: AtomicBool::new(false),
        }
    }

    /// Stamp a completed cycle. Returns `false` (and leaves the stamp
    /// untouched) when the cycle itself overran `check_timeout_ms`.
    pub fn record_cycle(&self, started_ms: u64, finished_ms: u64, check_timeout_ms: u64) -> bool {
        if finished_ms.saturating_sub(started_ms) > check_timeout_ms {
            return false;
        }
        self.last_cycle_ms.store(finished_ms, Ordering::Release);
        if self.lagging.swap(false, Ordering::AcqRel) {
            tracing::info!(
                target: perfgov_core::tracing_config::targets::WATCHDOG,
                "decision loop recovered"
            );
        }
        true
    }

    pub fn check(&self, now_ms: u64, lag_threshold_ms: u64) -> WatchdogVerdict {
        let lag_ms = now_ms.saturating_sub(self.last_cycle_ms.load(Ordering::Acquire));
        if lag_ms <= lag_threshold_ms {
            return WatchdogVerdict::Healthy { lag_ms };
        }
        if self
            .lagging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            WatchdogVerdict::Stalled { lag_ms }
        } else {
            WatchdogVerdict::AlreadyFlagged { lag_ms }
        }
    }

    #[must_use]
    pub fn last_cycle_ms(&self) -> u64 {
        self.last_cycle_ms.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_lagging(&self) -> bool {
        self.lagging.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn stall_is_reported_once_per_episode() {
        let liveness = Liveness::new(0);
        assert_eq!(
            liveness.check(15_000, 15_000),
            WatchdogVerdict::Healthy { lag_ms: 15_000 }
        );
        assert_eq!(
            liveness.check(15_001, 15_000),
            WatchdogVerdict::Stalled { lag_ms: 15_001 }
        );
        assert!(liveness.is_lagging());
        assert_eq!(
            liveness.check(20_000, 15_000),
            WatchdogVerdict::AlreadyFlagged { lag_ms: 20_000 }
        );

        assert!(liveness.record_cycle(20_000, 20_100, 10_000));
        assert!(!liveness.is_lagging());
        assert_eq!(
            liveness.check(36_000, 15_000),
            WatchdogVerdict::Stalled { lag_ms: 15_900 }
        );
    }

    #[test]
    fn overrunning_cycle_does_not_refresh_liveness() {
        let liveness = Liveness::new(1_000);
        assert!(!liveness.record_cycle(1_000, 12_000, 10_000));
        assert_eq!(liveness.last_cycle_ms(), 1_000);
        assert!(liveness.record_cycle(12_000, 12_500, 10_000));
        assert_eq!(liveness.last_cycle_ms(), 12_500);
    }

    proptest! {
        #[test]
        fn one_stall_report_per_episode(
            gaps in proptest::collection::vec(0_u64..20_000, 1..40),
        ) {
            let liveness = Liveness::new(0);
            let mut now = 0_u64;
            let mut stalls = 0;
            for gap in gaps {
                now += gap;
                let verdict = liveness.check(now, 15_000);
                if matches!(verdict, WatchdogVerdict::Stalled { .. }) {
                    stalls += 1;
                }
                prop_assert_eq!(liveness.is_lagging(), now > 15_000);
            }
            prop_assert!(stalls <= 1);
        }
    }
}
