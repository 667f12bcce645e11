//! Per-mode event handling profiles and the admission gate built on them.
//!
//! Hosts react to gameplay-style events (damage, deaths, level changes).
//! Each mode carries a profile that says whether such reactions run at all,
//! how often per key, how many per second overall, and whether only critical
//! events qualify.

use std::collections::BTreeMap;

use perfgov_core::OperationMode;
use serde::{Deserialize, Serialize};

use crate::window::SlidingWindow;

const GATE_WINDOW_CAPACITY: usize = 128;
const GATE_KEY_SOFT_LIMIT: usize = 1_024;
const CRITICAL_LEVEL_RATIO: f64 = 0.3;
const CRITICAL_MAGNITUDE_RATIO: f64 = 0.25;

/// Tuning of event reactions for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventProfile {
    pub enabled: bool,
    /// Minimum spacing between reactions for the same key.
    pub cooldown_ms: u64,
    /// Level cut-off compared per [`ThresholdDirection`]; 0 disables it.
    pub trigger_threshold: f64,
    pub only_critical_events: bool,
    pub max_events_per_second: u32,
}

impl EventProfile {
    const fn new(
        enabled: bool,
        cooldown_ms: u64,
        trigger_threshold: f64,
        only_critical_events: bool,
        max_events_per_second: u32,
    ) -> Self {
        Self {
            enabled,
            cooldown_ms,
            trigger_threshold,
            only_critical_events,
            max_events_per_second,
        }
    }

    /// Stateless part of admission: profile switch, threshold, criticality.
    #[must_use]
    pub fn should_process(&self, reading: EventReading, direction: ThresholdDirection) -> bool {
        self.enabled
            && direction.passes(reading.level, self.trigger_threshold)
            && (!self.only_critical_events || reading.is_critical())
    }
}

/// Which side of `trigger_threshold` an event's level must fall on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// React only while the level is at or below the threshold.
    #[default]
    ProcessBelow,
    /// React only while the level is at or above the threshold.
    ProcessAbove,
}

impl ThresholdDirection {
    #[must_use]
    pub fn passes(self, level: f64, threshold: f64) -> bool {
        if threshold <= 0.0 {
            return true;
        }
        match self {
            Self::ProcessBelow => level <= threshold,
            Self::ProcessAbove => level >= threshold,
        }
    }
}

/// One event observation: the subject's current and maximum level, and the
/// size of the change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventReading {
    pub level: f64,
    pub max_level: f64,
    pub magnitude: f64,
}

impl EventReading {
    /// Critical when the subject is under 30% of its maximum, the change is
    /// over 25% of the maximum, or the change would exhaust the level.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        if self.max_level <= 0.0 {
            return true;
        }
        self.level / self.max_level < CRITICAL_LEVEL_RATIO
            || self.magnitude / self.max_level > CRITICAL_MAGNITUDE_RATIO
            || self.magnitude >= self.level
    }
}

/// Immutable per-mode profile table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventProfiles {
    by_mode: [EventProfile; 4],
    pub direction: ThresholdDirection,
}

impl Default for EventProfiles {
    fn default() -> Self {
        Self {
            by_mode: [
                EventProfile::new(true, 3_000, 0.0, false, 20),
                EventProfile::new(true, 8_000, 10.0, false, 10),
                EventProfile::new(true, 15_000, 5.0, true, 5),
                EventProfile::new(false, 0, 0.0, false, 0),
            ],
            direction: ThresholdDirection::default(),
        }
    }
}

impl EventProfiles {
    #[must_use]
    pub const fn with_direction(mut self, direction: ThresholdDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn for_mode(&self, mode: OperationMode) -> EventProfile {
        self.by_mode[mode.index()]
    }
}

/// Outcome of [`EventGate::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAdmission {
    Admitted,
    FeatureDisabled,
    ProfileDisabled,
    OutsideThreshold,
    NotCritical,
    CoolingDown { remaining_ms: u64 },
    RateCapped,
}

impl EventAdmission {
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Stateful admission: per-key cooldown plus a global per-second cap.
#[derive(Debug, Clone)]
pub struct EventGate {
    last_by_key: BTreeMap<String, u64>,
    admitted: SlidingWindow,
}

impl Default for EventGate {
    fn default() -> Self {
        Self {
            last_by_key: BTreeMap::new(),
            admitted: SlidingWindow::with_capacity(GATE_WINDOW_CAPACITY),
        }
    }
}

impl EventGate {
    /// Decide whether an event for `key` runs now, recording it if so.
    pub fn admit(
        &mut self,
        key: &str,
        reading: EventReading,
        profile: EventProfile,
        direction: ThresholdDirection,
        now_ms: u64,
    ) -> EventAdmission {
        if !profile.enabled {
            return EventAdmission::ProfileDisabled;
        }
        if !direction.passes(reading.level, profile.trigger_threshold) {
            return EventAdmission::OutsideThreshold;
        }
        if profile.only_critical_events && !reading.is_critical() {
            return EventAdmission::NotCritical;
        }
        if let Some(last) = self.last_by_key.get(key) {
            let elapsed = now_ms.saturating_sub(*last);
            if elapsed < profile.cooldown_ms {
                return EventAdmission::CoolingDown {
                    remaining_ms: profile.cooldown_ms - elapsed,
                };
            }
        }
        let cap = usize::try_from(profile.max_events_per_second).unwrap_or(usize::MAX);
        if self.admitted.count_within(now_ms, 999) >= cap {
            return EventAdmission::RateCapped;
        }

        self.admitted.record(now_ms);
        self.last_by_key.insert(key.to_owned(), now_ms);
        if self.last_by_key.len() > GATE_KEY_SOFT_LIMIT {
            let floor = now_ms.saturating_sub(profile.cooldown_ms);
            self.last_by_key.retain(|_, last| *last >= floor);
        }
        EventAdmission::Admitted
    }

    pub fn clear(&mut self) {
        self.last_by_key.clear();
        self.admitted.clear();
    }
}
