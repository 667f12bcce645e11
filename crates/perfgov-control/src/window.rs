//! Fixed-capacity ring of event timestamps.

use std::collections::VecDeque;

/// Keeps the most recent `capacity` timestamps and counts how many fall in a
/// trailing window. The oldest entry is overwritten once full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindow {
    capacity: usize,
    stamps: VecDeque<u64>,
}

impl SlidingWindow {
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            stamps: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, at_ms: u64) {
        if self.stamps.len() == self.capacity {
            self.stamps.pop_front();
        }
        self.stamps.push_back(at_ms);
    }

    /// Entries with `now_ms - window_ms <= stamp <= now_ms`.
    #[must_use]
    pub fn count_within(&self, now_ms: u64, window_ms: u64) -> usize {
        let floor = now_ms.saturating_sub(window_ms);
        self.stamps
            .iter()
            .filter(|stamp| **stamp >= floor && **stamp <= now_ms)
            .count()
    }

    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.stamps.back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }
}
