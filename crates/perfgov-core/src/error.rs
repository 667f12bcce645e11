/// Unified error type covering every failure mode of the performance governor.
///
/// Every variant carries an actionable message. The governor itself absorbs
/// transient failures: `SamplingFailed` falls back to conservative readings and
/// `PersistFailed` is logged while the in-memory state change stands. Only
/// `InvalidConfig` prevents a governor from starting or a reload from applying,
/// and `UnknownMode` / `UnknownFeature` reject operator input at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    // === Configuration errors ===
    /// A configuration value failed validation.
    #[error("Invalid config: {field} = {value:?}: {reason}")]
    InvalidConfig {
        /// Dotted configuration key that failed validation.
        field: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    // === Operator input errors ===
    /// A mode name did not match any operation mode.
    #[error("Unknown operation mode {input:?}. Expected one of: full, lite, basic, emergency.")]
    UnknownMode {
        /// The rejected input.
        input: String,
    },

    /// A feature name is not present in the priority table.
    #[error("Unknown feature {name:?}. Query feature_priority() for the registered names.")]
    UnknownFeature {
        /// The rejected feature name.
        name: String,
    },

    // === Collaborator errors ===
    /// A metrics provider could not produce a reading.
    #[error("Sampling {signal} failed: {source}. The governor falls back to conservative defaults.")]
    SamplingFailed {
        /// Which signal was being sampled (`rate`, `hardware`).
        signal: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The configuration store could not persist a value.
    #[error("Failed to persist {key}: {source}. Check that the config file is writable.")]
    PersistFailed {
        /// Dotted key being written.
        key: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error reported by an external subsystem.
    #[error("Subsystem {subsystem} error: {source}")]
    SubsystemError {
        /// Name of the subsystem.
        subsystem: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // === Lifecycle errors ===
    /// The governor has been shut down and no longer accepts control calls.
    #[error("Governor is shut down. Construct a new governor to resume monitoring.")]
    ShutDown,
}

impl GovernorError {
    /// Convenience constructor for configuration validation failures.
    #[must_use]
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for governor results.
pub type GovernorResult<T> = Result<T, GovernorError>;
