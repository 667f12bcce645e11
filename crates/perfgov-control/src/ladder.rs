//! Priority-ordered feature degradation ladder.
//!
//! Each registered feature has a fixed priority (lower is more essential).
//! Applying a mode recomputes every feature's `(enabled, level)` pair from
//! `(mode, priority)` alone, so the result never depends on the previous
//! mode. Levels: 0 full quality, 1 light, 2 medium, 3 disabled.
//!
//! | mode      | enabled up to | levels                         |
//! |-----------|---------------|--------------------------------|
//! | full      | every feature | 0                              |
//! | lite      | priority 10   | 6-9 at 1, others 0             |
//! | basic     | priority 8    | 6-8 at 2, 5 at 1, 1-4 at 0     |
//! | emergency | priority 5    | 4-5 at 2, 1-3 at 1             |

use std::collections::BTreeMap;
use std::sync::Arc;

use perfgov_core::tracing_config::targets;
use perfgov_core::{DegradationLabel, GovernorError, GovernorResult, OperationMode};
use serde::{Deserialize, Serialize};

pub const LEVEL_FULL: u8 = 0;
pub const LEVEL_LIGHT: u8 = 1;
pub const LEVEL_MEDIUM: u8 = 2;
pub const LEVEL_DISABLED: u8 = 3;

/// Named priority ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureBand {
    /// 1-3: never shed.
    Core,
    /// 4-5: kept through emergency.
    Important,
    /// 6-9: event reactions.
    EventResponse,
    /// 10-12: quality-of-service extras.
    Enhanced,
    /// 13 and above: diagnostics and tuning.
    Advanced,
}

impl FeatureBand {
    #[must_use]
    pub const fn for_priority(priority: u8) -> Self {
        match priority {
            0..=3 => Self::Core,
            4..=5 => Self::Important,
            6..=9 => Self::EventResponse,
            10..=12 => Self::Enhanced,
            _ => Self::Advanced,
        }
    }
}

/// Enablement and optimization level of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureState {
    pub enabled: bool,
    pub level: u8,
}

impl FeatureState {
    const fn on(level: u8) -> Self {
        Self {
            enabled: true,
            level,
        }
    }

    const OFF: Self = Self {
        enabled: false,
        level: LEVEL_DISABLED,
    };

    /// The state `mode` assigns to a feature of `priority`.
    #[must_use]
    pub const fn for_mode(mode: OperationMode, priority: u8) -> Self {
        match mode {
            OperationMode::Full => Self::on(LEVEL_FULL),
            OperationMode::Lite => match priority {
                0..=5 | 10 => Self::on(LEVEL_FULL),
                6..=9 => Self::on(LEVEL_LIGHT),
                _ => Self::OFF,
            },
            OperationMode::Basic => match priority {
                0..=4 => Self::on(LEVEL_FULL),
                5 => Self::on(LEVEL_LIGHT),
                6..=8 => Self::on(LEVEL_MEDIUM),
                _ => Self::OFF,
            },
            OperationMode::Emergency => match priority {
                0..=3 => Self::on(LEVEL_LIGHT),
                4..=5 => Self::on(LEVEL_MEDIUM),
                _ => Self::OFF,
            },
        }
    }
}

/// Immutable feature → priority table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTable {
    priorities: BTreeMap<String, u8>,
}

impl FeatureTable {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] for an empty name, a zero
    /// priority, or a duplicate name.
    pub fn new<I, S>(entries: I) -> GovernorResult<Self>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let mut priorities = BTreeMap::new();
        for (name, priority) in entries {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(GovernorError::invalid_config(
                    "features",
                    name,
                    "feature names must be non-empty",
                ));
            }
            if priority == 0 {
                return Err(GovernorError::invalid_config(
                    format!("features.{name}"),
                    priority,
                    "priorities start at 1",
                ));
            }
            if priorities.insert(name.clone(), priority).is_some() {
                return Err(GovernorError::invalid_config(
                    format!("features.{name}"),
                    priority,
                    "feature registered twice",
                ));
            }
        }
        Ok(Self { priorities })
    }

    /// The host feature set the governor ships with.
    #[must_use]
    pub fn standard() -> Self {
        let entries: [(&str, u8); 22] = [
            ("core_requests", 1),
            ("command_processing", 1),
            ("error_handling", 1),
            ("permission_check", 4),
            ("cooldown_management", 4),
            ("rate_limiting", 5),
            ("message_validation", 5),
            ("damage_event_response", 6),
            ("death_event_response", 7),
            ("level_event_response", 8),
            ("advancement_event_response", 9),
            ("content_filter", 10),
            ("message_preprocessing", 10),
            ("help_system", 11),
            ("statistics_collection", 11),
            ("response_streaming", 12),
            ("context_enrichment", 12),
            ("advanced_caching", 13),
            ("detailed_logging", 13),
            ("performance_monitoring", 14),
            ("circuit_breaker", 14),
            ("config_hot_reload", 15),
        ];
        Self {
            priorities: entries
                .into_iter()
                .map(|(name, priority)| (name.to_owned(), priority))
                .collect(),
        }
    }

    #[must_use]
    pub fn priority(&self, name: &str) -> Option<u8> {
        self.priorities.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.priorities.iter().map(|(name, p)| (name.as_str(), *p))
    }
}

/// Features whose enablement flipped during one `apply_mode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderChange {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl LadderChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

/// Current per-feature state for one table.
///
/// Cloning is cheap enough to build a new ladder off to the side and swap it
/// in as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureLadder {
    #[serde(skip)]
    table: Arc<FeatureTable>,
    mode: OperationMode,
    states: BTreeMap<String, FeatureState>,
}

impl FeatureLadder {
    /// A ladder with `mode` already applied.
    #[must_use]
    pub fn new(table: Arc<FeatureTable>, mode: OperationMode) -> Self {
        let states = table
            .iter()
            .map(|(name, priority)| (name.to_owned(), FeatureState::for_mode(mode, priority)))
            .collect();
        Self {
            table,
            mode,
            states,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> OperationMode {
        self.mode
    }

    #[must_use]
    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    /// Recompute every feature for `mode`, discarding administrative
    /// overrides. Idempotent.
    pub fn apply_mode(&mut self, mode: OperationMode) -> LadderChange {
        let mut change = LadderChange::default();
        for (name, priority) in self.table.iter() {
            let next = FeatureState::for_mode(mode, priority);
            let previous = self.states.insert(name.to_owned(), next);
            match previous.map(|state| state.enabled) {
                Some(false) if next.enabled => change.enabled.push(name.to_owned()),
                Some(true) if !next.enabled => change.disabled.push(name.to_owned()),
                _ => {}
            }
        }
        self.mode = mode;
        tracing::debug!(
            target: targets::LADDER,
            mode = %mode,
            enabled = change.enabled.len(),
            disabled = change.disabled.len(),
            "feature ladder applied"
        );
        change
    }

    /// False for unknown features.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.states.get(name).is_some_and(|state| state.enabled)
    }

    /// 0 for unknown features.
    #[must_use]
    pub fn optimization_level(&self, name: &str) -> u8 {
        self.states.get(name).map_or(LEVEL_FULL, |state| state.level)
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<FeatureState> {
        self.states.get(name).copied()
    }

    pub fn states(&self) -> impl Iterator<Item = (&str, FeatureState)> {
        self.states.iter().map(|(name, state)| (name.as_str(), *state))
    }

    #[must_use]
    pub fn disabled_features(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| !state.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[must_use]
    pub fn enabled_features(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| state.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[must_use]
    pub fn degradation_label(&self) -> DegradationLabel {
        if self.states.is_empty() {
            return DegradationLabel::Minimal;
        }
        let disabled = self.states.values().filter(|state| !state.enabled).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = disabled as f64 / self.states.len() as f64;
        DegradationLabel::from_disabled_ratio(ratio)
    }

    /// Administrative override of one feature, effective until the next
    /// [`Self::apply_mode`].
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::UnknownFeature`] for names outside the table.
    pub fn set_feature_enabled(&mut self, name: &str, enabled: bool) -> GovernorResult<()> {
        let Some(state) = self.states.get_mut(name) else {
            return Err(GovernorError::UnknownFeature {
                name: name.to_owned(),
            });
        };
        *state = if enabled {
            FeatureState::on(state.level.min(LEVEL_MEDIUM))
        } else {
            FeatureState::OFF
        };
        tracing::info!(
            target: targets::LADDER,
            feature = name,
            enabled,
            "feature overridden until next mode change"
        );
        Ok(())
    }
}
