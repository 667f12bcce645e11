//! Governor configuration: documented keys, typed sections, validation.
//!
//! Every setting is addressed by a dotted key and read through a
//! [`ConfigStore`], so the same loader serves startup and
//! `reload_configuration()`. Missing keys take the defaults listed in
//! [`CONFIG_KEYS`].

use std::time::Duration;

use perfgov_control::{
    DecisionConfig, EventProfiles, HardwareThresholds, RateLimiterConfig, RateThresholds,
    ThresholdDirection,
};
use perfgov_core::tracing_config::targets;
use perfgov_core::{ConfigStore, GovernorError, GovernorResult, OperationMode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_MESSAGE_FULL: &str = "Performance is healthy; full mode enabled";
pub const DEFAULT_MESSAGE_LITE: &str = "Performance slightly degraded; switched to lite mode";
pub const DEFAULT_MESSAGE_BASIC: &str = "Performance moderately degraded; switched to basic mode";
pub const DEFAULT_MESSAGE_EMERGENCY: &str =
    "Performance severely degraded; switched to emergency mode";

/// Value type of a documented key, used when parsing env overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
}

/// One documented configuration key and its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKey {
    pub path: &'static str,
    pub default: &'static str,
    pub kind: ValueKind,
}

const fn key(path: &'static str, default: &'static str, kind: ValueKind) -> ConfigKey {
    ConfigKey {
        path,
        default,
        kind,
    }
}

/// Every recognized key with its default.
pub const CONFIG_KEYS: &[ConfigKey] = &[
    key("decision.check_interval_ms", "10000", ValueKind::Int),
    key("decision.rate_threshold_full", "18.0", ValueKind::Float),
    key("decision.rate_threshold_lite", "15.0", ValueKind::Float),
    key("decision.rate_threshold_basic", "10.0", ValueKind::Float),
    key("decision.max_rate", "20.0", ValueKind::Float),
    key("decision.severe_anomaly_factor", "1.25", ValueKind::Float),
    key("decision.stability_threshold", "5", ValueKind::Int),
    key("decision.cooldown_ms", "60000", ValueKind::Int),
    key("decision.history_retention_ms", "3600000", ValueKind::Int),
    key("decision.auto_optimize", "true", ValueKind::Bool),
    key("decision.hardware_bypasses_hysteresis", "true", ValueKind::Bool),
    key("hardware.min_free_process_memory_gb", "0.5", ValueKind::Float),
    key("hardware.min_free_system_memory_gb", "0.5", ValueKind::Float),
    key("hardware.min_available_cores", "2", ValueKind::Int),
    key("hardware.warning_cooldown_ms", "30000", ValueKind::Int),
    key(
        "hardware.warning_message",
        perfgov_control::hardware_gate::DEFAULT_WARNING_MESSAGE,
        ValueKind::Text,
    ),
    key("hardware.process_memory_limit_gb", "0.0", ValueKind::Float),
    key("watchdog.interval_ms", "5000", ValueKind::Int),
    key("watchdog.lag_threshold_ms", "15000", ValueKind::Int),
    key("watchdog.check_timeout_ms", "10000", ValueKind::Int),
    key("manual.enabled", "false", ValueKind::Bool),
    key("manual.mode", "full", ValueKind::Text),
    key("messages.full", DEFAULT_MESSAGE_FULL, ValueKind::Text),
    key("messages.lite", DEFAULT_MESSAGE_LITE, ValueKind::Text),
    key("messages.basic", DEFAULT_MESSAGE_BASIC, ValueKind::Text),
    key("messages.emergency", DEFAULT_MESSAGE_EMERGENCY, ValueKind::Text),
    key("events.threshold_direction", "process_below", ValueKind::Text),
    key("rate_limit.base_limit", "10", ValueKind::Int),
    key("runtime.shutdown_grace_ms", "5000", ValueKind::Int),
    key("runtime.notify_queue_capacity", "64", ValueKind::Int),
];

/// Look up a documented key.
#[must_use]
pub fn config_key(path: &str) -> Option<&'static ConfigKey> {
    CONFIG_KEYS.iter().find(|k| k.path == path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSection {
    pub check_interval_ms: u64,
    pub rate_threshold_full: f64,
    pub rate_threshold_lite: f64,
    pub rate_threshold_basic: f64,
    pub max_rate: f64,
    pub severe_anomaly_factor: f64,
    pub stability_threshold: u32,
    pub cooldown_ms: u64,
    pub history_retention_ms: u64,
    pub auto_optimize: bool,
    pub hardware_bypasses_hysteresis: bool,
}

impl Default for DecisionSection {
    fn default() -> Self {
        let engine = DecisionConfig::default();
        Self {
            check_interval_ms: 10_000,
            rate_threshold_full: engine.thresholds.full,
            rate_threshold_lite: engine.thresholds.lite,
            rate_threshold_basic: engine.thresholds.basic,
            max_rate: engine.max_rate,
            severe_anomaly_factor: engine.severe_anomaly_factor,
            stability_threshold: engine.stability_threshold,
            cooldown_ms: engine.cooldown_ms,
            history_retention_ms: 3_600_000,
            auto_optimize: engine.auto_optimize,
            hardware_bypasses_hysteresis: engine.hardware_bypasses_hysteresis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSection {
    pub min_free_process_memory_gb: f64,
    pub min_free_system_memory_gb: f64,
    pub min_available_cores: u32,
    pub warning_cooldown_ms: u64,
    pub warning_message: String,
    /// Memory budget of the governed process; 0 means "use system headroom".
    pub process_memory_limit_gb: f64,
}

impl Default for HardwareSection {
    fn default() -> Self {
        let thresholds = HardwareThresholds::default();
        Self {
            min_free_process_memory_gb: thresholds.min_free_process_memory_gb,
            min_free_system_memory_gb: thresholds.min_free_system_memory_gb,
            min_available_cores: thresholds.min_available_cores,
            warning_cooldown_ms: 30_000,
            warning_message: perfgov_control::hardware_gate::DEFAULT_WARNING_MESSAGE.to_owned(),
            process_memory_limit_gb: 0.0,
        }
    }
}

/// The watchdog has no enable switch; only its timing is tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogSection {
    pub interval_ms: u64,
    pub lag_threshold_ms: u64,
    pub check_timeout_ms: u64,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            lag_threshold_ms: 15_000,
            check_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSection {
    pub enabled: bool,
    pub mode: String,
}

impl Default for ManualSection {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: OperationMode::Full.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesSection {
    pub full: String,
    pub lite: String,
    pub basic: String,
    pub emergency: String,
}

impl Default for MessagesSection {
    fn default() -> Self {
        Self {
            full: DEFAULT_MESSAGE_FULL.to_owned(),
            lite: DEFAULT_MESSAGE_LITE.to_owned(),
            basic: DEFAULT_MESSAGE_BASIC.to_owned(),
            emergency: DEFAULT_MESSAGE_EMERGENCY.to_owned(),
        }
    }
}

impl MessagesSection {
    #[must_use]
    pub fn for_mode(&self, mode: OperationMode) -> &str {
        match mode {
            OperationMode::Full => &self.full,
            OperationMode::Lite => &self.lite,
            OperationMode::Basic => &self.basic,
            OperationMode::Emergency => &self.emergency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventsSection {
    pub threshold_direction: ThresholdDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSection {
    pub base_limit: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            base_limit: RateLimiterConfig::default().base_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSection {
    pub shutdown_grace_ms: u64,
    pub notify_queue_capacity: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 5_000,
            notify_queue_capacity: 64,
        }
    }
}

/// Fully resolved governor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub decision: DecisionSection,
    pub hardware: HardwareSection,
    pub watchdog: WatchdogSection,
    pub manual: ManualSection,
    pub messages: MessagesSection,
    pub events: EventsSection,
    pub rate_limit: RateLimitSection,
    pub runtime: RuntimeSection,
}

impl GovernorConfig {
    /// Read every documented key from `store` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when a value has the wrong
    /// sign or the resolved configuration is inconsistent.
    pub fn from_store(store: &dyn ConfigStore) -> GovernorResult<Self> {
        let d = Self::default();
        let direction_raw = store.get_string("events.threshold_direction", "process_below");
        let threshold_direction = parse_direction(&direction_raw)?;

        let config = Self {
            decision: DecisionSection {
                check_interval_ms: read_u64(
                    store,
                    "decision.check_interval_ms",
                    d.decision.check_interval_ms,
                )?,
                rate_threshold_full: store
                    .get_f64("decision.rate_threshold_full", d.decision.rate_threshold_full),
                rate_threshold_lite: store
                    .get_f64("decision.rate_threshold_lite", d.decision.rate_threshold_lite),
                rate_threshold_basic: store
                    .get_f64("decision.rate_threshold_basic", d.decision.rate_threshold_basic),
                max_rate: store.get_f64("decision.max_rate", d.decision.max_rate),
                severe_anomaly_factor: store.get_f64(
                    "decision.severe_anomaly_factor",
                    d.decision.severe_anomaly_factor,
                ),
                stability_threshold: read_u32(
                    store,
                    "decision.stability_threshold",
                    d.decision.stability_threshold,
                )?,
                cooldown_ms: read_u64(store, "decision.cooldown_ms", d.decision.cooldown_ms)?,
                history_retention_ms: read_u64(
                    store,
                    "decision.history_retention_ms",
                    d.decision.history_retention_ms,
                )?,
                auto_optimize: store.get_bool("decision.auto_optimize", d.decision.auto_optimize),
                hardware_bypasses_hysteresis: store.get_bool(
                    "decision.hardware_bypasses_hysteresis",
                    d.decision.hardware_bypasses_hysteresis,
                ),
            },
            hardware: HardwareSection {
                min_free_process_memory_gb: store.get_f64(
                    "hardware.min_free_process_memory_gb",
                    d.hardware.min_free_process_memory_gb,
                ),
                min_free_system_memory_gb: store.get_f64(
                    "hardware.min_free_system_memory_gb",
                    d.hardware.min_free_system_memory_gb,
                ),
                min_available_cores: read_u32(
                    store,
                    "hardware.min_available_cores",
                    d.hardware.min_available_cores,
                )?,
                warning_cooldown_ms: read_u64(
                    store,
                    "hardware.warning_cooldown_ms",
                    d.hardware.warning_cooldown_ms,
                )?,
                warning_message: store
                    .get_string("hardware.warning_message", &d.hardware.warning_message),
                process_memory_limit_gb: store.get_f64(
                    "hardware.process_memory_limit_gb",
                    d.hardware.process_memory_limit_gb,
                ),
            },
            watchdog: WatchdogSection {
                interval_ms: read_u64(store, "watchdog.interval_ms", d.watchdog.interval_ms)?,
                lag_threshold_ms: read_u64(
                    store,
                    "watchdog.lag_threshold_ms",
                    d.watchdog.lag_threshold_ms,
                )?,
                check_timeout_ms: read_u64(
                    store,
                    "watchdog.check_timeout_ms",
                    d.watchdog.check_timeout_ms,
                )?,
            },
            manual: ManualSection {
                enabled: store.get_bool("manual.enabled", d.manual.enabled),
                mode: store.get_string("manual.mode", &d.manual.mode),
            },
            messages: MessagesSection {
                full: store.get_string("messages.full", &d.messages.full),
                lite: store.get_string("messages.lite", &d.messages.lite),
                basic: store.get_string("messages.basic", &d.messages.basic),
                emergency: store.get_string("messages.emergency", &d.messages.emergency),
            },
            events: EventsSection {
                threshold_direction,
            },
            rate_limit: RateLimitSection {
                base_limit: read_u32(store, "rate_limit.base_limit", d.rate_limit.base_limit)?,
            },
            runtime: RuntimeSection {
                shutdown_grace_ms: read_u64(
                    store,
                    "runtime.shutdown_grace_ms",
                    d.runtime.shutdown_grace_ms,
                )?,
                notify_queue_capacity: usize::try_from(read_u64(
                    store,
                    "runtime.notify_queue_capacity",
                    d.runtime.notify_queue_capacity as u64,
                )?)
                .unwrap_or(usize::MAX),
            },
        };
        config.validate()
    }

    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] naming the first offending key.
    pub fn validate(self) -> GovernorResult<Self> {
        self.decision_config().validate()?;
        self.hardware_thresholds().validate()?;
        self.rate_limiter_config().validate()?;

        let positive = [
            ("decision.check_interval_ms", self.decision.check_interval_ms),
            ("decision.history_retention_ms", self.decision.history_retention_ms),
            ("watchdog.interval_ms", self.watchdog.interval_ms),
            ("watchdog.check_timeout_ms", self.watchdog.check_timeout_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(GovernorError::invalid_config(field, value, "must be > 0"));
            }
        }
        if self.watchdog.interval_ms >= self.decision.check_interval_ms {
            return Err(GovernorError::invalid_config(
                "watchdog.interval_ms",
                self.watchdog.interval_ms,
                format!(
                    "must be shorter than decision.check_interval_ms ({})",
                    self.decision.check_interval_ms
                ),
            ));
        }
        if self.watchdog.lag_threshold_ms <= self.watchdog.interval_ms {
            return Err(GovernorError::invalid_config(
                "watchdog.lag_threshold_ms",
                self.watchdog.lag_threshold_ms,
                format!(
                    "must be longer than watchdog.interval_ms ({})",
                    self.watchdog.interval_ms
                ),
            ));
        }
        // A healthy loop completes a cycle every check interval; a shorter
        // lag threshold would report it stalled on every tick.
        if self.watchdog.lag_threshold_ms <= self.decision.check_interval_ms {
            return Err(GovernorError::invalid_config(
                "watchdog.lag_threshold_ms",
                self.watchdog.lag_threshold_ms,
                format!(
                    "must be longer than decision.check_interval_ms ({})",
                    self.decision.check_interval_ms
                ),
            ));
        }
        if self.watchdog.check_timeout_ms >= self.watchdog.lag_threshold_ms {
            return Err(GovernorError::invalid_config(
                "watchdog.check_timeout_ms",
                self.watchdog.check_timeout_ms,
                format!(
                    "must be shorter than watchdog.lag_threshold_ms ({})",
                    self.watchdog.lag_threshold_ms
                ),
            ));
        }
        let limit = self.hardware.process_memory_limit_gb;
        if !limit.is_finite() || limit < 0.0 {
            return Err(GovernorError::invalid_config(
                "hardware.process_memory_limit_gb",
                limit,
                "must be a finite, non-negative number of GB (0 disables)",
            ));
        }
        if self.runtime.notify_queue_capacity == 0 {
            return Err(GovernorError::invalid_config(
                "runtime.notify_queue_capacity",
                0,
                "must be at least 1",
            ));
        }
        Ok(self)
    }

    #[must_use]
    pub const fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            thresholds: self.rate_thresholds(),
            max_rate: self.decision.max_rate,
            severe_anomaly_factor: self.decision.severe_anomaly_factor,
            stability_threshold: self.decision.stability_threshold,
            cooldown_ms: self.decision.cooldown_ms,
            auto_optimize: self.decision.auto_optimize,
            hardware_bypasses_hysteresis: self.decision.hardware_bypasses_hysteresis,
        }
    }

    #[must_use]
    pub const fn rate_thresholds(&self) -> RateThresholds {
        RateThresholds {
            full: self.decision.rate_threshold_full,
            lite: self.decision.rate_threshold_lite,
            basic: self.decision.rate_threshold_basic,
        }
    }

    #[must_use]
    pub const fn hardware_thresholds(&self) -> HardwareThresholds {
        HardwareThresholds {
            min_free_process_memory_gb: self.hardware.min_free_process_memory_gb,
            min_free_system_memory_gb: self.hardware.min_free_system_memory_gb,
            min_available_cores: self.hardware.min_available_cores,
        }
    }

    #[must_use]
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            base_limit: self.rate_limit.base_limit,
            thresholds: self.rate_thresholds(),
            ..RateLimiterConfig::default()
        }
    }

    #[must_use]
    pub fn event_profiles(&self) -> EventProfiles {
        EventProfiles::default().with_direction(self.events.threshold_direction)
    }

    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.decision.check_interval_ms)
    }

    #[must_use]
    pub const fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog.interval_ms)
    }

    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.runtime.shutdown_grace_ms)
    }
}

/// A non-fatal problem found while loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigWarning {
    pub reason_code: String,
    pub field: String,
    pub message: String,
}

/// Warnings for keys outside [`CONFIG_KEYS`].
#[must_use]
pub fn unknown_key_warnings<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<ConfigWarning> {
    paths
        .into_iter()
        .filter(|path| config_key(path).is_none())
        .map(|path| ConfigWarning {
            reason_code: "config.key.unknown".to_owned(),
            field: path.to_owned(),
            message: format!("unknown key {path:?} is ignored"),
        })
        .collect()
}

/// Log the resolved configuration and any warnings.
pub fn emit_config_loaded(config: &GovernorConfig, source: &str, warnings: &[ConfigWarning]) {
    for warning in warnings {
        warn!(
            target: targets::CONFIG,
            reason_code = %warning.reason_code,
            field = %warning.field,
            "{}",
            warning.message
        );
    }
    info!(
        target: targets::CONFIG,
        source,
        check_interval_ms = config.decision.check_interval_ms,
        stability_threshold = config.decision.stability_threshold,
        cooldown_ms = config.decision.cooldown_ms,
        watchdog_interval_ms = config.watchdog.interval_ms,
        lag_threshold_ms = config.watchdog.lag_threshold_ms,
        manual_enabled = config.manual.enabled,
        warnings = warnings.len(),
        "governor configuration loaded"
    );
}

fn parse_direction(raw: &str) -> GovernorResult<ThresholdDirection> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "process_below" | "below" => Ok(ThresholdDirection::ProcessBelow),
        "process_above" | "above" => Ok(ThresholdDirection::ProcessAbove),
        _ => Err(GovernorError::invalid_config(
            "events.threshold_direction",
            raw,
            "expected process_below|process_above",
        )),
    }
}

fn read_u64(store: &dyn ConfigStore, path: &str, default: u64) -> GovernorResult<u64> {
    let raw = store.get_i64(path, i64::try_from(default).unwrap_or(i64::MAX));
    u64::try_from(raw).map_err(|_| GovernorError::invalid_config(path, raw, "must be >= 0"))
}

fn read_u32(store: &dyn ConfigStore, path: &str, default: u32) -> GovernorResult<u32> {
    let raw = store.get_i64(path, i64::from(default));
    u32::try_from(raw).map_err(|_| {
        GovernorError::invalid_config(path, raw, format!("must be between 0 and {}", u32::MAX))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfgov_core::{ConfigValue, MemoryConfigStore};

    #[test]
    fn empty_store_yields_documented_defaults() {
        let config = GovernorConfig::from_store(&MemoryConfigStore::new()).unwrap();
        assert_eq!(config, GovernorConfig::default());
        assert_eq!(config.decision.check_interval_ms, 10_000);
        assert_eq!(config.watchdog.lag_threshold_ms, 15_000);
        assert_eq!(config.decision_config(), DecisionConfig::default());
    }

    #[test]
    fn documented_defaults_match_struct_defaults() {
        let d = GovernorConfig::default();
        let lookup = |path: &str| config_key(path).map(|k| k.default).unwrap();
        assert_eq!(lookup("decision.stability_threshold"), d.decision.stability_threshold.to_string());
        assert_eq!(lookup("decision.cooldown_ms"), d.decision.cooldown_ms.to_string());
        assert_eq!(lookup("watchdog.interval_ms"), d.watchdog.interval_ms.to_string());
        assert_eq!(lookup("messages.emergency"), d.messages.emergency);
        assert_eq!(lookup("manual.mode"), d.manual.mode);
    }

    #[test]
    fn store_values_override_defaults() {
        let store = MemoryConfigStore::new()
            .with("decision.stability_threshold", ConfigValue::Int(3))
            .with("decision.rate_threshold_full", ConfigValue::Float(19.0))
            .with("messages.lite", ConfigValue::Text("lite now".into()))
            .with("events.threshold_direction", ConfigValue::Text("above".into()));
        let config = GovernorConfig::from_store(&store).unwrap();
        assert_eq!(config.decision.stability_threshold, 3);
        assert!((config.rate_thresholds().full - 19.0).abs() < f64::EPSILON);
        assert_eq!(config.messages.for_mode(OperationMode::Lite), "lite now");
        assert_eq!(
            config.events.threshold_direction,
            ThresholdDirection::ProcessAbove
        );
    }

    #[test]
    fn watchdog_must_tick_faster_than_decision_loop() {
        let store = MemoryConfigStore::new()
            .with("watchdog.interval_ms", ConfigValue::Int(10_000))
            .with("decision.check_interval_ms", ConfigValue::Int(10_000));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(err.to_string().contains("watchdog.interval_ms"));
    }

    #[test]
    fn lag_threshold_must_exceed_watchdog_interval() {
        let store = MemoryConfigStore::new().with("watchdog.lag_threshold_ms", ConfigValue::Int(4_000));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(err.to_string().contains("watchdog.lag_threshold_ms"));
    }

    #[test]
    fn lag_threshold_must_exceed_decision_interval() {
        let store = MemoryConfigStore::new()
            .with("decision.check_interval_ms", ConfigValue::Int(20_000));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(matches!(
            err,
            GovernorError::InvalidConfig { ref field, .. } if field == "watchdog.lag_threshold_ms"
        ));
        assert!(err.to_string().contains("decision.check_interval_ms"));

        let raised = MemoryConfigStore::new()
            .with("decision.check_interval_ms", ConfigValue::Int(20_000))
            .with("watchdog.lag_threshold_ms", ConfigValue::Int(30_000));
        assert!(GovernorConfig::from_store(&raised).is_ok());
    }

    #[test]
    fn check_timeout_must_be_shorter_than_lag_threshold() {
        let store = MemoryConfigStore::new()
            .with("watchdog.check_timeout_ms", ConfigValue::Int(15_000));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(matches!(
            err,
            GovernorError::InvalidConfig { ref field, .. } if field == "watchdog.check_timeout_ms"
        ));
    }

    #[test]
    fn negative_durations_are_rejected() {
        let store = MemoryConfigStore::new().with("decision.cooldown_ms", ConfigValue::Int(-5));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(matches!(err, GovernorError::InvalidConfig { field, .. } if field == "decision.cooldown_ms"));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let store = MemoryConfigStore::new()
            .with("decision.rate_threshold_lite", ConfigValue::Float(19.0));
        assert!(GovernorConfig::from_store(&store).is_err());
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let store = MemoryConfigStore::new()
            .with("events.threshold_direction", ConfigValue::Text("sideways".into()));
        let err = GovernorConfig::from_store(&store).unwrap_err();
        assert!(err.to_string().contains("events.threshold_direction"));
    }

    #[test]
    fn unknown_keys_produce_warnings() {
        let warnings =
            unknown_key_warnings(["decision.max_rate", "decision.max_rte", "watchdog.enabled"]);
        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["decision.max_rte", "watchdog.enabled"]);
        assert!(warnings.iter().all(|w| w.reason_code == "config.key.unknown"));
    }

    #[test]
    fn every_documented_key_is_unique() {
        let mut paths: Vec<&str> = CONFIG_KEYS.iter().map(|k| k.path).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), CONFIG_KEYS.len());
    }
}
