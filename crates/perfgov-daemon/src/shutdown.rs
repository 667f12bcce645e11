//! Signal-driven lifecycle for the `perfgov` binary.
//!
//! `SIGINT`/`SIGTERM` request a graceful stop, and a second `SIGINT` within
//! [`FORCE_EXIT_WINDOW`] forces exit. `SIGHUP` queues a configuration reload
//! and `SIGQUIT` queues a status dump; neither stops the daemon. The main
//! loop polls the flags between ticks.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use perfgov_core::tracing_config::targets;
use perfgov_core::{GovernorError, GovernorResult, lock_or_recover};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::consts::signal::{SIGHUP, SIGQUIT};
use tracing::{debug, info, warn};

/// Time window where a second `SIGINT` forces immediate exit.
pub const FORCE_EXIT_WINDOW: Duration = Duration::from_secs(3);

const NO_SIGNAL: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    ForceExit,
}

impl ShutdownState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ShuttingDown,
            2 => Self::ForceExit,
            _ => Self::Running,
        }
    }
}

#[cfg(unix)]
struct Listener {
    handle: signal_hook::iterator::Handle,
    thread: thread::JoinHandle<()>,
}

/// Shutdown intent plus the reload and status-dump flags raised by signals.
pub struct SignalCoordinator {
    state: AtomicU8,
    shutdown_signal: AtomicI32,
    first_sigint_at: Mutex<Option<Instant>>,
    reload_requested: AtomicBool,
    status_dump_requested: AtomicBool,
    #[cfg(unix)]
    listener: Mutex<Option<Listener>>,
}

impl std::fmt::Debug for SignalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalCoordinator")
            .field("state", &self.state())
            .field("shutdown_signal", &self.shutdown_signal())
            .finish_non_exhaustive()
    }
}

impl Default for SignalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalCoordinator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            shutdown_signal: AtomicI32::new(NO_SIGNAL),
            first_sigint_at: Mutex::new(None),
            reload_requested: AtomicBool::new(false),
            status_dump_requested: AtomicBool::new(false),
            #[cfg(unix)]
            listener: Mutex::new(None),
        }
    }

    /// Start the listener thread. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::SubsystemError`] when handler registration or
    /// the listener thread fails.
    #[cfg(unix)]
    pub fn register_signals(self: &Arc<Self>) -> GovernorResult<()> {
        let mut listener = lock_or_recover(&self.listener);
        if listener.is_some() {
            return Ok(());
        }

        let mut signals = signal_hook::iterator::Signals::new([SIGINT, SIGTERM, SIGHUP, SIGQUIT])
            .map_err(|error| signal_error(format!("failed to register signal listeners: {error}")))?;
        let handle = signals.handle();
        let coordinator = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("perfgov-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    coordinator.handle_signal(signal);
                }
            })
            .map_err(|error| signal_error(format!("failed to start signal listener: {error}")))?;

        *listener = Some(Listener { handle, thread });
        debug!(target: targets::RUNTIME, "signal listener started");
        Ok(())
    }

    /// # Errors
    ///
    /// Never fails on this platform; signals are not observed.
    #[cfg(not(unix))]
    pub fn register_signals(self: &Arc<Self>) -> GovernorResult<()> {
        warn!(target: targets::RUNTIME, "signal handling is unavailable on this platform");
        Ok(())
    }

    /// Close the listener and join its thread.
    pub fn stop_signal_listener(&self) {
        #[cfg(unix)]
        if let Some(Listener { handle, thread }) = lock_or_recover(&self.listener).take() {
            handle.close();
            if thread.join().is_err() {
                warn!(target: targets::RUNTIME, "signal listener panicked while stopping");
            }
        }
    }

    #[must_use]
    pub fn take_reload_requested(&self) -> bool {
        self.reload_requested.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn take_status_dump_requested(&self) -> bool {
        self.status_dump_requested.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    #[must_use]
    pub fn is_force_exit_requested(&self) -> bool {
        self.state() == ShutdownState::ForceExit
    }

    /// The signal that started shutdown, if any.
    #[must_use]
    pub fn shutdown_signal(&self) -> Option<i32> {
        match self.shutdown_signal.load(Ordering::Acquire) {
            NO_SIGNAL => None,
            signal => Some(signal),
        }
    }

    fn begin_shutdown(&self, signal: i32) -> bool {
        let started = self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if started {
            self.shutdown_signal.store(signal, Ordering::Release);
        }
        started
    }

    fn handle_signal(&self, signal: i32) {
        match signal {
            SIGINT => self.handle_sigint(Instant::now()),
            SIGTERM => {
                if self.begin_shutdown(SIGTERM) {
                    info!(target: targets::RUNTIME, "received SIGTERM, initiating graceful shutdown");
                }
            }
            #[cfg(unix)]
            SIGHUP => {
                self.reload_requested.store(true, Ordering::Release);
                info!(target: targets::CONFIG, "received SIGHUP, configuration reload queued");
            }
            #[cfg(unix)]
            SIGQUIT => {
                self.status_dump_requested.store(true, Ordering::Release);
                info!(target: targets::RUNTIME, "received SIGQUIT, status dump queued");
            }
            _ => debug!(target: targets::RUNTIME, signal, "ignoring unexpected signal"),
        }
    }

    fn handle_sigint(&self, now: Instant) {
        let mut first_sigint_at = lock_or_recover(&self.first_sigint_at);
        match self.state() {
            ShutdownState::Running => {
                *first_sigint_at = Some(now);
                if self.begin_shutdown(SIGINT) {
                    info!(target: targets::RUNTIME, "received SIGINT, initiating graceful shutdown");
                }
            }
            ShutdownState::ShuttingDown => {
                if first_sigint_at
                    .is_some_and(|first| now.saturating_duration_since(first) <= FORCE_EXIT_WINDOW)
                {
                    self.state
                        .store(ShutdownState::ForceExit as u8, Ordering::Release);
                    warn!(target: targets::RUNTIME, "second SIGINT within window, forcing exit");
                } else {
                    *first_sigint_at = Some(now);
                    debug!(
                        target: targets::RUNTIME,
                        "SIGINT outside force-exit window; graceful shutdown continues"
                    );
                }
            }
            ShutdownState::ForceExit => {}
        }
    }
}

fn signal_error(message: String) -> GovernorError {
    GovernorError::SubsystemError {
        subsystem: "signals",
        source: Box::new(io::Error::other(message)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn sigterm_starts_graceful_shutdown_once() {
        let coordinator = SignalCoordinator::new();
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert_eq!(coordinator.shutdown_signal(), None);

        coordinator.handle_signal(SIGTERM);
        coordinator.handle_signal(SIGINT);

        assert_eq!(coordinator.state(), ShutdownState::ShuttingDown);
        assert_eq!(coordinator.shutdown_signal(), Some(SIGTERM));
    }

    #[test]
    fn second_sigint_within_window_forces_exit() {
        let coordinator = SignalCoordinator::new();
        let first = Instant::now();
        coordinator.handle_sigint(first);
        assert_eq!(coordinator.state(), ShutdownState::ShuttingDown);

        coordinator.handle_sigint(first + FORCE_EXIT_WINDOW);
        assert!(coordinator.is_force_exit_requested());
        assert_eq!(coordinator.shutdown_signal(), Some(SIGINT));
    }

    #[test]
    fn late_second_sigint_restarts_the_window() {
        let coordinator = SignalCoordinator::new();
        let first = Instant::now();
        coordinator.handle_sigint(first);

        let late = first + FORCE_EXIT_WINDOW + Duration::from_millis(1);
        coordinator.handle_sigint(late);
        assert_eq!(coordinator.state(), ShutdownState::ShuttingDown);

        coordinator.handle_sigint(late + Duration::from_secs(1));
        assert!(coordinator.is_force_exit_requested());
    }

    #[test]
    fn sighup_and_sigquit_raise_flags_without_shutdown() {
        let coordinator = SignalCoordinator::new();
        coordinator.handle_signal(SIGHUP);
        coordinator.handle_signal(SIGQUIT);

        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert!(coordinator.take_reload_requested());
        assert!(!coordinator.take_reload_requested());
        assert!(coordinator.take_status_dump_requested());
        assert!(!coordinator.take_status_dump_requested());
    }
}
