//! Tracing target and field-name constants shared by every perfgov crate.
//!
//! Consumers filter governor output with the common prefix:
//! ```text
//! RUST_LOG=perfgov=debug
//! ```

use tracing::Level;

/// Target prefix used by all perfgov tracing events.
pub const TARGET_PREFIX: &str = "perfgov";

/// Event targets, one per subsystem.
pub mod targets {
    /// Decision engine cycles and automatic transitions.
    pub const DECISION: &str = "perfgov::decision";
    /// Hardware gate evaluations and shortfall warnings.
    pub const HARDWARE: &str = "perfgov::hardware";
    /// Liveness checks and forced emergencies.
    pub const WATCHDOG: &str = "perfgov::watchdog";
    /// Feature ladder application and administrative overrides.
    pub const LADDER: &str = "perfgov::ladder";
    /// Background thread lifecycle.
    pub const RUNTIME: &str = "perfgov::runtime";
    /// Operator notification dispatch.
    pub const NOTIFY: &str = "perfgov::notify";
    /// Configuration loading, reload, and persistence.
    pub const CONFIG: &str = "perfgov::config";
    /// Event admission and message rate limiting.
    pub const EVENTS: &str = "perfgov::events";
}

/// Structured field names used in tracing events.
pub mod field_names {
    pub const FROM_MODE: &str = "from_mode";
    pub const TO_MODE: &str = "to_mode";
    pub const TARGET_MODE: &str = "target_mode";
    pub const OBSERVED_RATE: &str = "observed_rate";
    pub const RAW_RATE: &str = "raw_rate";
    pub const STABILITY_COUNT: &str = "stability_count";
    pub const REASON_CODE: &str = "reason_code";
    pub const LAG_MS: &str = "lag_ms";
    pub const FREE_PROCESS_MEMORY_GB: &str = "free_process_memory_gb";
    pub const FREE_SYSTEM_MEMORY_GB: &str = "free_system_memory_gb";
    pub const AVAILABLE_CORES: &str = "available_cores";
}

/// Parse a log level string (case-insensitive).
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}
