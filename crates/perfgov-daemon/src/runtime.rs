//! Background threads driving a [`Governor`]: the decision loop and the
//! watchdog. Both wait on a shared stop signal so shutdown wakes them
//! immediately.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use perfgov_core::tracing_config::targets;
use perfgov_core::{GovernorError, GovernorResult, lock_or_recover};
use tracing::{debug, info, warn};

use crate::governor::{CycleOutcome, Governor};
use crate::notify::join_within;

const RUNTIME_SUBSYSTEM: &str = "runtime";

/// One-shot stop flag that sleeping threads can wait on.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep up to `timeout`. Returns `true` once the signal has fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = lock_or_recover(&self.stopped);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard
    }

    pub fn trigger(&self) {
        *lock_or_recover(&self.stopped) = true;
        self.wake.notify_all();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *lock_or_recover(&self.stopped)
    }
}

/// Owns the decision and watchdog threads for one governor.
pub struct GovernorRuntime {
    governor: Arc<Governor>,
    stop: Arc<StopSignal>,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl std::fmt::Debug for GovernorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRuntime")
            .field("governor", &self.governor)
            .field("stopped", &self.stop.is_triggered())
            .finish_non_exhaustive()
    }
}

impl GovernorRuntime {
    /// Spawn `perfgov-decision` and `perfgov-watchdog`.
    ///
    /// Intervals are re-read from the governor's configuration every
    /// iteration, so a reload takes effect on the next wait.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::SubsystemError`] when a thread cannot be
    /// spawned. Threads already started are stopped first.
    pub fn start(governor: Arc<Governor>) -> GovernorResult<Self> {
        let runtime = Self {
            governor,
            stop: Arc::new(StopSignal::default()),
            workers: Mutex::new(Vec::with_capacity(2)),
        };

        let decision = {
            let governor = Arc::clone(&runtime.governor);
            let stop = Arc::clone(&runtime.stop);
            move || decision_loop(&governor, &stop)
        };
        runtime.spawn("perfgov-decision", decision)?;

        let watchdog = {
            let governor = Arc::clone(&runtime.governor);
            let stop = Arc::clone(&runtime.stop);
            move || watchdog_loop(&governor, &stop)
        };
        runtime.spawn("perfgov-watchdog", watchdog)?;

        let config = runtime.governor.config();
        info!(
            target: targets::RUNTIME,
            check_interval_ms = config.decision.check_interval_ms,
            watchdog_interval_ms = config.watchdog.interval_ms,
            "governor runtime started"
        );
        Ok(runtime)
    }

    fn spawn(&self, name: &'static str, body: impl FnOnce() + Send + 'static) -> GovernorResult<()> {
        match thread::Builder::new().name(name.to_owned()).spawn(body) {
            Ok(handle) => {
                lock_or_recover(&self.workers).push((name, handle));
                Ok(())
            }
            Err(error) => {
                self.shutdown();
                Err(GovernorError::SubsystemError {
                    subsystem: RUNTIME_SUBSYSTEM,
                    source: Box::new(io::Error::other(format!(
                        "failed to spawn {name} thread: {error}"
                    ))),
                })
            }
        }
    }

    #[must_use]
    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    /// Stop both threads, waiting up to the configured grace period for
    /// each, then shut the governor down. Idempotent.
    pub fn shutdown(&self) {
        self.stop.trigger();
        let grace = self.governor.config().shutdown_grace();
        let workers: Vec<_> = lock_or_recover(&self.workers).drain(..).collect();
        for (name, handle) in workers {
            if join_within(handle, grace) {
                debug!(target: targets::RUNTIME, thread = name, "thread stopped");
            } else {
                warn!(
                    target: targets::RUNTIME,
                    thread = name,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "thread still running after grace period; detaching"
                );
            }
        }
        self.governor.shutdown();
    }
}

impl Drop for GovernorRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn decision_loop(governor: &Governor, stop: &StopSignal) {
    debug!(target: targets::RUNTIME, "decision loop started");
    while !stop.wait(governor.config().check_interval()) {
        if let CycleOutcome::ShutDown = governor.run_cycle() {
            break;
        }
    }
    debug!(target: targets::RUNTIME, "decision loop exiting");
}

fn watchdog_loop(governor: &Governor, stop: &StopSignal) {
    debug!(target: targets::RUNTIME, "watchdog started");
    while !stop.wait(governor.config().watchdog_interval()) {
        if governor.is_shut_down() {
            break;
        }
        governor.watchdog_tick();
    }
    debug!(target: targets::RUNTIME, "watchdog exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stop_signal_wakes_waiters() {
        let stop = Arc::new(StopSignal::default());
        assert!(!stop.wait(Duration::from_millis(5)));

        let waiter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let started = Instant::now();
                let stopped = stop.wait(Duration::from_secs(30));
                (stopped, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        let (stopped, waited) = waiter.join().unwrap();
        assert!(stopped);
        assert!(waited < Duration::from_secs(5));
        assert!(stop.wait(Duration::ZERO));
    }
}
