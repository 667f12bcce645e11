//! Threaded runtime for the perfgov adaptive performance governor.
//!
//! [`Governor`] owns the shared state and exposes the operator API. A
//! [`GovernorRuntime`] drives it with a decision thread and a watchdog
//! thread; notifications leave through a bounded queue on their own thread.
//! [`TomlConfigStore`] and [`HostMetricsProvider`] are the stock
//! collaborators used by the `perfgov` binary.

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod config_store;
pub mod governor;
pub mod host;
pub mod notify;
pub mod runtime;
pub mod shutdown;
pub mod stats;
pub mod tracing_setup;
pub mod watchdog;

pub use cli::{CliCommand, CliInput, USAGE, parse_cli_args};
pub use config::{ConfigWarning, GovernorConfig, emit_config_loaded};
pub use config_store::TomlConfigStore;
pub use governor::{CycleOutcome, CycleReport, Governor, GovernorBuilder, GovernorStatus};
pub use host::{HostMetricsProvider, TickRateMeter};
pub use notify::{LogBroadcaster, NotificationDispatcher};
pub use runtime::{GovernorRuntime, StopSignal};
pub use shutdown::{FORCE_EXIT_WINDOW, ShutdownState, SignalCoordinator};
pub use stats::{GovernorStats, StatsSnapshot};
pub use tracing_setup::{Verbosity, init_subscriber};
pub use watchdog::{Liveness, WatchdogVerdict};
