//! Consecutive-hit counters backing automatic-transition hysteresis.

use perfgov_core::OperationMode;
use serde::{Deserialize, Serialize};

/// One counter per mode. Recording a target zeroes every other counter, so at
/// most one counter is non-zero at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityCounters {
    counts: [u32; 4],
}

impl StabilityCounters {
    /// Count one more cycle favoring `target`; returns its new streak.
    pub fn record(&mut self, target: OperationMode) -> u32 {
        let streak = self.counts[target.index()].saturating_add(1);
        self.counts = [0; 4];
        self.counts[target.index()] = streak;
        streak
    }

    #[must_use]
    pub const fn get(&self, mode: OperationMode) -> u32 {
        self.counts[mode.index()]
    }

    /// The mode currently accumulating a streak, if any.
    #[must_use]
    pub fn leader(&self) -> Option<(OperationMode, u32)> {
        OperationMode::ALL
            .into_iter()
            .map(|mode| (mode, self.get(mode)))
            .find(|(_, count)| *count > 0)
    }

    pub fn reset(&mut self) {
        self.counts = [0; 4];
    }
}
