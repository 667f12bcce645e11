//! Tracing subscriber initialization for the `perfgov` binary.
//!
//! Filter priority, highest first:
//!
//! 1. `PERFGOV_LOG` (per-target directives, e.g. `perfgov::decision=debug,warn`)
//! 2. `RUST_LOG`
//! 3. CLI flags (`-v` → debug, `-q` → error)
//! 4. Default: `warn`, with governor targets at `info` so mode changes show.

use std::io;

use perfgov_core::tracing_config;
use perfgov_core::{GovernorError, GovernorResult};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_ENV_VAR: &str = "PERFGOV_LOG";

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `--quiet` / `-q`: only errors.
    Quiet,
    Normal,
    /// `--verbose` / `-v`: debug-level governor output.
    Verbose,
}

impl Verbosity {
    /// Verbose wins when both flags are set.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }

    /// Level applied to `perfgov::*` targets when no env filter is set.
    #[must_use]
    pub const fn governor_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// # Errors
///
/// Returns [`GovernorError::SubsystemError`] if a global subscriber is
/// already installed.
pub fn init_subscriber(verbosity: Verbosity, no_color: bool) -> GovernorResult<()> {
    let filter = build_env_filter(verbosity);

    let stderr_is_tty = io::IsTerminal::is_terminal(&io::stderr());
    let use_ansi = !no_color && stderr_is_tty;

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .with_target(true)
        .with_thread_names(true)
        .with_level(true);

    let installed = if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.compact())
            .try_init()
    };
    installed.map_err(|error| GovernorError::SubsystemError {
        subsystem: "tracing",
        source: Box::new(io::Error::other(error.to_string())),
    })
}

/// `PERFGOV_LOG` > `RUST_LOG` > CLI verbosity. Unparseable env values fall
/// through to the next source.
fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV_VAR)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = verbosity.default_level();
    let directive = default_directive(verbosity);
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn default_directive(verbosity: Verbosity) -> String {
    format!(
        "{level},{prefix}={governor}",
        level = verbosity.default_level(),
        prefix = tracing_config::TARGET_PREFIX,
        governor = verbosity.governor_level(),
    )
}
