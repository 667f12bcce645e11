//! Core types, collaborator traits, and error types for the perfgov adaptive
//! performance governor.
//!
//! This crate defines the operation-mode vocabulary (`OperationMode`,
//! `HardwareStatus`, `PerformanceSample`), the interfaces the governor consumes
//! from its host (`MetricsProvider`, `Broadcaster`, `ConfigStore`), the time
//! source abstraction (`Clock`), and the shared error type (`GovernorError`).
//!
//! It is depended on by every other crate in the workspace.

#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod tracing_config;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GovernorError, GovernorResult};
pub use traits::{
    Broadcaster, ConfigStore, ConfigValue, MemoryConfigStore, MetricsProvider, NoopBroadcaster,
    lock_or_recover, read_or_recover, write_or_recover,
};
pub use types::{
    DegradationLabel, HardwareStatus, ModeTransition, OperationMode, PerformanceSample,
    TransitionCause,
};
