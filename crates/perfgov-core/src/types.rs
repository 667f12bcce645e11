//! Operation modes, hardware snapshots, and per-cycle samples.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GovernorError;

/// Discrete operating level of the host application.
///
/// Ordered from least to most conservative. The discriminant doubles as the
/// index into every per-mode table in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Every feature enabled at full quality.
    Full = 0,
    /// Enhanced and advanced features shed; event responses lightly optimized.
    Lite = 1,
    /// Only core, important, and most event-response features remain.
    Basic = 2,
    /// Only core and important features remain, all optimized.
    Emergency = 3,
}

impl OperationMode {
    /// All modes, least conservative first.
    pub const ALL: [Self; 4] = [Self::Full, Self::Lite, Self::Basic, Self::Emergency];

    /// Position in [`Self::ALL`]; used to index per-mode tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Self::index`]; `None` for out-of-range codes.
    #[must_use]
    pub const fn from_index(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Full),
            1 => Some(Self::Lite),
            2 => Some(Self::Basic),
            3 => Some(Self::Emergency),
            _ => None,
        }
    }

    /// Stable lowercase name used in config files, logs, and persisted state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Lite => "lite",
            Self::Basic => "basic",
            Self::Emergency => "emergency",
        }
    }

    /// Whether `self` sheds strictly more than `other`.
    #[must_use]
    pub const fn is_stricter_than(self, other: Self) -> bool {
        (self as u8) > (other as u8)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationMode {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "lite" => Ok(Self::Lite),
            "basic" => Ok(Self::Basic),
            "emergency" => Ok(Self::Emergency),
            _ => Err(GovernorError::UnknownMode {
                input: s.to_owned(),
            }),
        }
    }
}

/// Point-in-time host resource headroom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareStatus {
    /// Memory still available to the governed process, in GB.
    pub free_process_memory_gb: f64,
    /// Memory still available on the host, in GB.
    pub free_system_memory_gb: f64,
    /// Logical cores available to the process.
    pub available_cores: u32,
}

/// One decision cycle's observation. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp_ms: u64,
    /// Rate after clamping to the theoretical maximum.
    pub observed_rate: f64,
    pub hardware: HardwareStatus,
    pub hardware_passed: bool,
    /// Mode in effect when the sample was taken.
    pub current_mode: OperationMode,
    /// Mode the engine computed for this cycle.
    pub target_mode: OperationMode,
}

/// What caused a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Hysteresis and cooldown gates passed.
    Automatic,
    /// An operator pinned the mode.
    Manual,
    /// The hardware gate started failing.
    Hardware,
    /// The watchdog detected a stalled decision loop.
    Watchdog,
}

impl TransitionCause {
    /// Stable reason code for logs and status payloads.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::Automatic => "mode.transition.automatic",
            Self::Manual => "mode.transition.manual",
            Self::Hardware => "mode.transition.hardware_emergency",
            Self::Watchdog => "mode.transition.watchdog_forced",
        }
    }
}

/// A committed change of operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: OperationMode,
    pub to: OperationMode,
    pub cause: TransitionCause,
    pub at_ms: u64,
}

/// Coarse summary of how much of the feature table is currently shed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLabel {
    /// Under 10% of features disabled.
    Minimal,
    /// Under 30% disabled.
    Light,
    /// Under 60% disabled.
    Moderate,
    /// 60% or more disabled.
    Heavy,
}

impl DegradationLabel {
    /// Classify a disabled-feature ratio in `[0, 1]`.
    #[must_use]
    pub fn from_disabled_ratio(ratio: f64) -> Self {
        if ratio < 0.1 {
            Self::Minimal
        } else if ratio < 0.3 {
            Self::Light
        } else if ratio < 0.6 {
            Self::Moderate
        } else {
            Self::Heavy
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
        }
    }
}

impl fmt::Display for DegradationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_ordered_least_to_most_conservative() {
        assert!(OperationMode::Full < OperationMode::Lite);
        assert!(OperationMode::Lite < OperationMode::Basic);
        assert!(OperationMode::Basic < OperationMode::Emergency);
        assert!(OperationMode::Emergency.is_stricter_than(OperationMode::Basic));
        assert!(!OperationMode::Full.is_stricter_than(OperationMode::Full));
    }

    #[test]
    fn index_round_trips_for_every_mode() {
        for mode in OperationMode::ALL {
            let code = u8::try_from(mode.index()).unwrap();
            assert_eq!(OperationMode::from_index(code), Some(mode));
        }
        assert_eq!(OperationMode::from_index(4), None);
    }

    #[test]
    fn parse_is_case_insensitive_and_trims() {
        assert_eq!("LITE".parse::<OperationMode>().unwrap(), OperationMode::Lite);
        assert_eq!(
            " Emergency ".parse::<OperationMode>().unwrap(),
            OperationMode::Emergency
        );
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = "turbo".parse::<OperationMode>().unwrap_err();
        assert!(matches!(err, GovernorError::UnknownMode { input } if input == "turbo"));
        assert!("".parse::<OperationMode>().is_err());
    }

    #[test]
    fn mode_serializes_as_snake_case() {
        let json = serde_json::to_string(&OperationMode::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
        let back: OperationMode = serde_json::from_str("\"basic\"").unwrap();
        assert_eq!(back, OperationMode::Basic);
    }

    #[test]
    fn degradation_label_boundaries() {
        assert_eq!(DegradationLabel::from_disabled_ratio(0.0), DegradationLabel::Minimal);
        assert_eq!(DegradationLabel::from_disabled_ratio(0.09), DegradationLabel::Minimal);
        assert_eq!(DegradationLabel::from_disabled_ratio(0.1), DegradationLabel::Light);
        assert_eq!(DegradationLabel::from_disabled_ratio(0.3), DegradationLabel::Moderate);
        assert_eq!(DegradationLabel::from_disabled_ratio(0.59), DegradationLabel::Moderate);
        assert_eq!(DegradationLabel::from_disabled_ratio(0.6), DegradationLabel::Heavy);
        assert_eq!(DegradationLabel::from_disabled_ratio(1.0), DegradationLabel::Heavy);
    }

    #[test]
    fn transition_reason_codes_are_namespaced() {
        for cause in [
            TransitionCause::Automatic,
            TransitionCause::Manual,
            TransitionCause::Hardware,
            TransitionCause::Watchdog,
        ] {
            assert!(cause.reason_code().starts_with("mode.transition."));
        }
    }
}
