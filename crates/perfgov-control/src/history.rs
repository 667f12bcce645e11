//! Time-bounded record of decision-cycle samples.

use std::collections::VecDeque;

use perfgov_core::PerformanceSample;

const DEFAULT_RETENTION_MS: u64 = 60 * 60 * 1_000;

/// Samples in insertion order, which the decision loop guarantees is also
/// timestamp order.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    retention_ms: u64,
    samples: VecDeque<PerformanceSample>,
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION_MS)
    }
}

impl SampleHistory {
    #[must_use]
    pub fn with_retention(retention_ms: u64) -> Self {
        Self {
            retention_ms,
            samples: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn retention_ms(&self) -> u64 {
        self.retention_ms
    }

    pub fn set_retention_ms(&mut self, retention_ms: u64) {
        self.retention_ms = retention_ms;
    }

    pub fn push(&mut self, sample: PerformanceSample) {
        self.samples.push_back(sample);
    }

    /// Drop samples older than the retention window; returns how many.
    pub fn evict(&mut self, now_ms: u64) -> usize {
        let floor = now_ms.saturating_sub(self.retention_ms);
        let before = self.samples.len();
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.timestamp_ms < floor)
        {
            self.samples.pop_front();
        }
        before - self.samples.len()
    }

    /// Samples with `from_ms <= timestamp <= to_ms`, oldest first.
    #[must_use]
    pub fn range(&self, from_ms: u64, to_ms: u64) -> Vec<PerformanceSample> {
        self.samples
            .iter()
            .filter(|sample| (from_ms..=to_ms).contains(&sample.timestamp_ms))
            .copied()
            .collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<PerformanceSample> {
        self.samples.back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
