//! Operator notification dispatch off the decision path.
//!
//! Messages go through a bounded queue to a dedicated thread that calls the
//! host [`Broadcaster`]. A full queue drops the message and counts it; a
//! panicking broadcaster is contained to the message that triggered it.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use perfgov_core::tracing_config::targets;
use perfgov_core::{Broadcaster, GovernorError, GovernorResult, lock_or_recover};
use tracing::{debug, info, warn};

use crate::stats::GovernorStats;

const NOTIFY_SUBSYSTEM: &str = "notify";
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct NotificationDispatcher {
    sender: Mutex<Option<SyncSender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<GovernorStats>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("running", &lock_or_recover(&self.sender).is_some())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Spawn the `perfgov-notify` thread.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::SubsystemError`] when the thread cannot be
    /// spawned.
    pub fn start(
        broadcaster: Arc<dyn Broadcaster>,
        capacity: usize,
        stats: Arc<GovernorStats>,
    ) -> GovernorResult<Self> {
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));
        let worker = thread::Builder::new()
            .name("perfgov-notify".to_owned())
            .spawn(move || {
                for message in receiver {
                    let outcome = catch_unwind(AssertUnwindSafe(|| broadcaster.notify(&message)));
                    if outcome.is_err() {
                        warn!(
                            target: targets::NOTIFY,
                            message = %message,
                            "broadcaster panicked; message lost"
                        );
                    }
                }
                debug!(target: targets::NOTIFY, "notification queue closed");
            })
            .map_err(|error| GovernorError::SubsystemError {
                subsystem: NOTIFY_SUBSYSTEM,
                source: Box::new(io::Error::other(format!(
                    "failed to spawn notification thread: {error}"
                ))),
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            stats,
        })
    }

    /// Queue `message` without blocking. Returns `false` when it was dropped.
    pub fn dispatch(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let guard = lock_or_recover(&self.sender);
        let Some(sender) = guard.as_ref() else {
            debug!(target: targets::NOTIFY, message = %message, "dispatcher stopped; message dropped");
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                drop(guard);
                self.stats.record_notification_dropped();
                warn!(target: targets::NOTIFY, message = %message, "notification queue full; message dropped");
                false
            }
            Err(TrySendError::Disconnected(message)) => {
                drop(guard);
                self.stats.record_notification_dropped();
                warn!(target: targets::NOTIFY, message = %message, "notification thread gone; message dropped");
                false
            }
        }
    }

    /// Close the queue and wait up to `grace` for queued messages to drain.
    /// A worker still running after `grace` is detached. Idempotent.
    pub fn shutdown(&self, grace: Duration) {
        drop(lock_or_recover(&self.sender).take());
        let Some(worker) = lock_or_recover(&self.worker).take() else {
            return;
        };
        if join_within(worker, grace) {
            debug!(target: targets::NOTIFY, "notification thread stopped");
        } else {
            warn!(
                target: targets::NOTIFY,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "notification thread still busy after grace period; detaching"
            );
        }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        drop(lock_or_recover(&self.sender).take());
    }
}

/// Broadcaster that writes each message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    fn notify(&self, message: &str) {
        info!(target: targets::NOTIFY, "{message}");
    }
}

/// Join `handle` if it finishes within `grace`. Returns `false` when the
/// thread was left running.
pub(crate) fn join_within(handle: JoinHandle<()>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if let Err(error) = handle.join() {
        warn!(target: targets::RUNTIME, ?error, "background thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl Broadcaster for Recording {
        fn notify(&self, message: &str) {
            lock_or_recover(&self.seen).push(message.to_owned());
        }
    }

    struct Blocking {
        release: Mutex<mpsc::Receiver<()>>,
        calls: AtomicUsize,
    }

    impl Broadcaster for Blocking {
        fn notify(&self, _message: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = lock_or_recover(&self.release).recv();
        }
    }

    struct Panicking;

    impl Broadcaster for Panicking {
        fn notify(&self, message: &str) {
            assert!(message != "boom", "broadcaster exploded");
        }
    }

    #[test]
    fn messages_are_delivered_in_order() {
        let sink = Arc::new(Recording::default());
        let stats = Arc::new(GovernorStats::default());
        let dispatcher = NotificationDispatcher::start(sink.clone(), 8, stats).unwrap();
        assert!(dispatcher.dispatch("one"));
        assert!(dispatcher.dispatch("two"));
        dispatcher.shutdown(Duration::from_secs(2));
        assert_eq!(*lock_or_recover(&sink.seen), vec!["one", "two"]);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(Blocking {
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });
        let stats = Arc::new(GovernorStats::default());
        let dispatcher =
            NotificationDispatcher::start(sink.clone(), 1, Arc::clone(&stats)).unwrap();

        assert!(dispatcher.dispatch("first"));
        while sink.calls.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        // Worker is parked inside notify; one slot remains.
        assert!(dispatcher.dispatch("second"));
        let started = Instant::now();
        assert!(!dispatcher.dispatch("third"));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(stats.snapshot().notifications_dropped, 1);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        dispatcher.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn panicking_broadcaster_does_not_kill_worker() {
        let stats = Arc::new(GovernorStats::default());
        let dispatcher = NotificationDispatcher::start(Arc::new(Panicking), 4, stats).unwrap();
        assert!(dispatcher.dispatch("boom"));
        thread::sleep(Duration::from_millis(50));
        assert!(dispatcher.dispatch("fine"));
        dispatcher.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn dispatch_after_shutdown_is_dropped() {
        let stats = Arc::new(GovernorStats::default());
        let dispatcher =
            NotificationDispatcher::start(Arc::new(Recording::default()), 4, stats).unwrap();
        dispatcher.shutdown(Duration::from_secs(1));
        dispatcher.shutdown(Duration::from_secs(1));
        assert!(!dispatcher.dispatch("late"));
    }
}
