//! Lock-light counters describing governor activity.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use perfgov_core::lock_or_recover;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct GovernorStats {
    cycles: AtomicU64,
    cycle_failures: AtomicU64,
    transitions: AtomicU64,
    watchdog_trips: AtomicU64,
    slow_cycles: AtomicU64,
    notifications_dropped: AtomicU64,
    persist_failures: AtomicU64,
    response_time_total_ms: AtomicU64,
    response_time_samples: AtomicU64,
    errors: Mutex<BTreeMap<String, u64>>,
}

/// Point-in-time copy of [`GovernorStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub cycle_failures: u64,
    pub transitions: u64,
    pub watchdog_trips: u64,
    pub slow_cycles: u64,
    pub notifications_dropped: u64,
    pub persist_failures: u64,
    pub average_response_time_ms: f64,
    pub errors: BTreeMap<String, u64>,
}

impl GovernorStats {
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_failure(&self) {
        self.cycle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watchdog_trip(&self) {
        self.watchdog_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_cycle(&self) {
        self.slow_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, elapsed_ms: u64) {
        self.response_time_total_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: &str) {
        *lock_or_recover(&self.errors)
            .entry(kind.to_owned())
            .or_insert(0) += 1;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> StatsSnapshot {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        let total = self.response_time_total_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            watchdog_trips: self.watchdog_trips.load(Ordering::Relaxed),
            slow_cycles: self.slow_cycles.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            average_response_time_ms: if samples == 0 {
                0.0
            } else {
                total as f64 / samples as f64
            },
            errors: lock_or_recover(&self.errors).clone(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.cycles,
            &self.cycle_failures,
            &self.transitions,
            &self.watchdog_trips,
            &self.slow_cycles,
            &self.notifications_dropped,
            &self.persist_failures,
            &self.response_time_total_ms,
            &self.response_time_samples,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        lock_or_recover(&self.errors).clear();
    }
}
