//! Interfaces the governor consumes from its host application.
//!
//! The governor never reaches into host internals. Everything it observes
//! comes through [`MetricsProvider`], everything it announces goes through
//! [`Broadcaster`], and every setting it reads or persists goes through
//! [`ConfigStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::GovernorResult;
use crate::types::HardwareStatus;

/// Source of the raw performance signals.
///
/// Implementations must be cheap and non-blocking where possible. Errors are
/// absorbed by the governor and replaced with conservative defaults, so an
/// implementation should report failure rather than guess.
pub trait MetricsProvider: Send + Sync {
    /// Current throughput of the host's main loop, in ticks per second.
    ///
    /// # Errors
    ///
    /// Returns `GovernorError::SamplingFailed` when no reading is available.
    fn current_rate(&self) -> GovernorResult<f64>;

    /// Current memory and core headroom.
    ///
    /// # Errors
    ///
    /// Returns `GovernorError::SamplingFailed` when the host cannot be queried.
    fn hardware_readings(&self) -> GovernorResult<HardwareStatus>;
}

/// Outbound channel for operator-facing messages.
///
/// Called from the governor's notification thread, never from a decision
/// cycle, so a slow sink cannot delay monitoring.
pub trait Broadcaster: Send + Sync {
    fn notify(&self, message: &str);
}

/// Broadcaster that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn notify(&self, _message: &str) {}
}

/// A value written back through [`ConfigStore::persist`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Keyed configuration source addressed by dotted paths
/// (`decision.stability_threshold`).
///
/// Getters never fail: a missing or mistyped key yields `default`.
pub trait ConfigStore: Send + Sync {
    fn get_f64(&self, path: &str, default: f64) -> f64;
    fn get_i64(&self, path: &str, default: i64) -> i64;
    fn get_bool(&self, path: &str, default: bool) -> bool;
    fn get_string(&self, path: &str, default: &str) -> String;

    /// Durably record `value` under `path`.
    ///
    /// # Errors
    ///
    /// Returns `GovernorError::PersistFailed` when the backing storage rejects
    /// the write.
    fn persist(&self, path: &str, value: ConfigValue) -> GovernorResult<()>;

    /// Re-read the backing source. Stores without one have nothing to do.
    ///
    /// # Errors
    ///
    /// Returns `GovernorError::InvalidConfig` or `GovernorError::Io` when the
    /// source can no longer be read; the previous values stay in effect.
    fn refresh(&self) -> GovernorResult<()> {
        Ok(())
    }
}

/// In-memory [`ConfigStore`] for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<BTreeMap<String, ConfigValue>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(self, path: &str, value: ConfigValue) -> Self {
        self.set(path, value);
        self
    }

    pub fn set(&self, path: &str, value: ConfigValue) {
        write_or_recover(&self.values).insert(path.to_owned(), value);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<ConfigValue> {
        read_or_recover(&self.values).get(path).cloned()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_f64(&self, path: &str, default: f64) -> f64 {
        match self.get(path) {
            Some(ConfigValue::Float(v)) => v,
            #[allow(clippy::cast_precision_loss)]
            Some(ConfigValue::Int(v)) => v as f64,
            _ => default,
        }
    }

    fn get_i64(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            Some(ConfigValue::Int(v)) => v,
            _ => default,
        }
    }

    fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            Some(ConfigValue::Bool(v)) => v,
            _ => default,
        }
    }

    fn get_string(&self, path: &str, default: &str) -> String {
        match self.get(path) {
            Some(ConfigValue::Text(v)) => v,
            _ => default.to_owned(),
        }
    }

    fn persist(&self, path: &str, value: ConfigValue) -> GovernorResult<()> {
        self.set(path, value);
        Ok(())
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_returns_defaults_for_missing_keys() {
        let store = MemoryConfigStore::new();
        assert!((store.get_f64("decision.max_rate", 20.0) - 20.0).abs() < f64::EPSILON);
        assert_eq!(store.get_i64("decision.stability_threshold", 5), 5);
        assert!(store.get_bool("decision.auto_optimize", true));
        assert_eq!(store.get_string("manual.mode", "full"), "full");
    }

    #[test]
    fn memory_store_returns_default_on_type_mismatch() {
        let store = MemoryConfigStore::new().with("manual.enabled", ConfigValue::Text("yes".into()));
        assert!(!store.get_bool("manual.enabled", false));
    }

    #[test]
    fn memory_store_widens_ints_to_floats() {
        let store = MemoryConfigStore::new().with("decision.max_rate", ConfigValue::Int(30));
        assert!((store.get_f64("decision.max_rate", 20.0) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn persist_is_visible_to_subsequent_reads() {
        let store = MemoryConfigStore::new();
        store
            .persist("manual.mode", ConfigValue::Text("lite".into()))
            .unwrap();
        assert_eq!(store.get_string("manual.mode", "full"), "lite");
    }

    #[test]
    fn lock_or_recover_survives_poisoning() {
        let mutex = std::sync::Arc::new(Mutex::new(7_u32));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(mutex.is_poisoned());
        assert_eq!(*lock_or_recover(&mutex), 7);
    }

    #[test]
    fn config_value_display_is_plain() {
        assert_eq!(ConfigValue::Bool(true).to_string(), "true");
        assert_eq!(ConfigValue::Text("lite".into()).to_string(), "lite");
    }
}
