//! Operator-pinned mode.

use perfgov_core::OperationMode;
use perfgov_core::tracing_config::targets;
use serde::{Deserialize, Serialize};

/// Config key holding the override flag.
pub const KEY_MANUAL_ENABLED: &str = "manual.enabled";
/// Config key holding the pinned mode name.
pub const KEY_MANUAL_MODE: &str = "manual.mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverrideState {
    pub enabled: bool,
    pub mode: OperationMode,
    pub set_at_ms: Option<u64>,
}

impl Default for ManualOverrideState {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: OperationMode::Full,
            set_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualOverride {
    state: ManualOverrideState,
}

impl ManualOverride {
    /// Rebuild from persisted settings. An unparseable mode name falls back to
    /// FULL with a warning rather than refusing to start.
    #[must_use]
    pub fn from_persisted(enabled: bool, mode_name: &str) -> Self {
        let mode = mode_name.parse().unwrap_or_else(|error| {
            tracing::warn!(
                target: targets::CONFIG,
                mode = mode_name,
                %error,
                "persisted manual mode is invalid; using full"
            );
            OperationMode::Full
        });
        Self {
            state: ManualOverrideState {
                enabled,
                mode,
                set_at_ms: None,
            },
        }
    }

    pub fn enable(&mut self, mode: OperationMode, now_ms: u64) {
        self.state = ManualOverrideState {
            enabled: true,
            mode,
            set_at_ms: Some(now_ms),
        };
    }

    /// Returns whether the override was active.
    pub fn disable(&mut self) -> bool {
        std::mem::replace(&mut self.state.enabled, false)
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    #[must_use]
    pub const fn mode(&self) -> OperationMode {
        self.state.mode
    }

    /// The mode to force this cycle, if pinned.
    #[must_use]
    pub const fn pinned(&self) -> Option<OperationMode> {
        if self.state.enabled {
            Some(self.state.mode)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn set_at_ms(&self) -> Option<u64> {
        self.state.set_at_ms
    }

    #[must_use]
    pub const fn state(&self) -> ManualOverrideState {
        self.state
    }
}
