//! The governor: shared state, the decision cycle, and the operator API.
//!
//! All control-plane state (engine, hardware gate, manual override, rate
//! limiter) lives behind one mutex that is held only while a cycle decides
//! and commits, never while sampling or notifying. Readers see published
//! snapshots: the mode is an atomic and the feature ladder is swapped as an
//! `Arc`, so queries never wait on a cycle.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use perfgov_control::manual_override::{KEY_MANUAL_ENABLED, KEY_MANUAL_MODE};
use perfgov_control::{
    AdaptiveRateLimiter, CycleDecision, CycleInput, EventAdmission, EventGate, EventProfile,
    EventProfiles, EventReading, FeatureLadder, FeatureState, FeatureTable, HardwareGate,
    HardwareVerdict, LadderChange, ManualOverride, ManualOverrideState, ModeDecisionEngine,
    RateReading, SampleHistory, SlidingWindow, sanitize_rate,
};
use perfgov_core::tracing_config::targets;
use perfgov_core::{
    Broadcaster, Clock, ConfigStore, ConfigValue, DegradationLabel, GovernorError,
    GovernorResult, MemoryConfigStore, MetricsProvider, ModeTransition, NoopBroadcaster,
    OperationMode, PerformanceSample, SystemClock, TransitionCause, lock_or_recover,
    read_or_recover, write_or_recover,
};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigWarning, GovernorConfig, emit_config_loaded};
use crate::notify::NotificationDispatcher;
use crate::stats::{GovernorStats, StatsSnapshot};
use crate::watchdog::{Liveness, WatchdogVerdict};

const MESSAGE_WINDOW_CAPACITY: usize = 64;

/// Result of one [`Governor::run_cycle`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(Box<CycleReport>),
    /// The cycle panicked; no state was changed.
    Failed,
    ShutDown,
}

impl CycleOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed | Self::ShutDown => None,
        }
    }
}

/// Everything one completed cycle observed and decided.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub sample: PerformanceSample,
    pub reading: RateReading,
    pub hardware: HardwareVerdict,
    pub decision: CycleDecision,
    pub ladder_change: Option<LadderChange>,
}

/// Serializable snapshot for status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernorStatus {
    pub mode: OperationMode,
    pub manual: ManualOverrideState,
    pub lagging: bool,
    pub degradation_label: DegradationLabel,
    pub disabled_features: Vec<String>,
    pub features: BTreeMap<String, FeatureState>,
    pub message_rate_limit: u32,
    pub last_sample: Option<PerformanceSample>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone)]
struct ControlState {
    engine: ModeDecisionEngine,
    gate: HardwareGate,
    manual: ManualOverride,
    limiter: AdaptiveRateLimiter,
}

/// Collaborators for a [`Governor`]. Only the metrics provider is required.
pub struct GovernorBuilder {
    metrics: Arc<dyn MetricsProvider>,
    broadcaster: Arc<dyn Broadcaster>,
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    table: FeatureTable,
    warnings: Vec<ConfigWarning>,
}

impl GovernorBuilder {
    #[must_use]
    pub fn new(metrics: Arc<dyn MetricsProvider>) -> Self {
        Self {
            metrics,
            broadcaster: Arc::new(NoopBroadcaster),
            store: Arc::new(MemoryConfigStore::new()),
            clock: Arc::new(SystemClock),
            table: FeatureTable::standard(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    #[must_use]
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn feature_table(mut self, table: FeatureTable) -> Self {
        self.table = table;
        self
    }

    /// Store-level warnings to report with the startup configuration.
    #[must_use]
    pub fn config_warnings(mut self, warnings: Vec<ConfigWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Load configuration from the store and start the notification thread.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] for an invalid configuration
    /// and [`GovernorError::SubsystemError`] when the notification thread
    /// cannot be spawned.
    pub fn build(self) -> GovernorResult<Governor> {
        let config = GovernorConfig::from_store(self.store.as_ref())?;
        let manual = ManualOverride::from_persisted(config.manual.enabled, &config.manual.mode);
        let start_mode = manual.pinned().unwrap_or(OperationMode::Full);

        let control = ControlState {
            engine: ModeDecisionEngine::starting_in(config.decision_config(), start_mode)?,
            gate: HardwareGate::new(
                config.hardware_thresholds(),
                config.hardware.warning_cooldown_ms,
                config.hardware.warning_message.clone(),
            )?,
            manual,
            limiter: AdaptiveRateLimiter::new(config.rate_limiter_config())?,
        };

        let stats = Arc::new(GovernorStats::default());
        let notifier = NotificationDispatcher::start(
            self.broadcaster,
            config.runtime.notify_queue_capacity,
            Arc::clone(&stats),
        )?;
        let ladder = FeatureLadder::new(Arc::new(self.table), start_mode);
        let now_ms = self.clock.now_ms();

        emit_config_loaded(&config, "startup", &self.warnings);
        info!(
            target: targets::RUNTIME,
            mode = %start_mode,
            manual = manual.is_enabled(),
            features = ladder.states().count(),
            "governor initialized"
        );

        Ok(Governor {
            metrics: self.metrics,
            store: self.store,
            clock: self.clock,
            mode: AtomicU8::new(start_mode as u8),
            ladder: RwLock::new(Arc::new(ladder)),
            manual: RwLock::new(manual.state()),
            history: RwLock::new(SampleHistory::with_retention(
                config.decision.history_retention_ms,
            )),
            profiles: RwLock::new(config.event_profiles()),
            config: RwLock::new(Arc::new(config)),
            control: Mutex::new(control),
            liveness: Liveness::new(now_ms),
            events: Mutex::new(EventGate::default()),
            messages: Mutex::new(SlidingWindow::with_capacity(MESSAGE_WINDOW_CAPACITY)),
            notifier,
            stats,
            shut_down: AtomicBool::new(false),
        })
    }
}

pub struct Governor {
    metrics: Arc<dyn MetricsProvider>,
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    config: RwLock<Arc<GovernorConfig>>,
    control: Mutex<ControlState>,
    mode: AtomicU8,
    ladder: RwLock<Arc<FeatureLadder>>,
    manual: RwLock<ManualOverrideState>,
    history: RwLock<SampleHistory>,
    profiles: RwLock<EventProfiles>,
    liveness: Liveness,
    events: Mutex<EventGate>,
    messages: Mutex<SlidingWindow>,
    notifier: NotificationDispatcher,
    stats: Arc<GovernorStats>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("mode", &self.current_mode())
            .field("manual", &self.manual_state())
            .field("lagging", &self.is_lagging())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Governor {
    // ─── Decision loop ──────────────────────────────────────────────────

    /// Sample, decide, and commit one cycle. Panics inside the cycle are
    /// contained and leave state untouched. Only a cycle that finishes within
    /// the check timeout refreshes liveness.
    pub fn run_cycle(&self) -> CycleOutcome {
        if self.is_shut_down() {
            return CycleOutcome::ShutDown;
        }
        let started_ms = self.clock.now_ms();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.cycle(started_ms)));
        let finished_ms = self.clock.now_ms();

        match outcome {
            Ok(report) => {
                self.stats.record_cycle();
                let timeout_ms = self.config().watchdog.check_timeout_ms;
                if !self
                    .liveness
                    .record_cycle(started_ms, finished_ms, timeout_ms)
                {
                    self.stats.record_slow_cycle();
                    warn!(
                        target: targets::WATCHDOG,
                        duration_ms = finished_ms.saturating_sub(started_ms),
                        check_timeout_ms = timeout_ms,
                        "decision cycle overran check timeout"
                    );
                }
                CycleOutcome::Completed(Box::new(report))
            }
            Err(payload) => {
                self.stats.record_cycle_failure();
                self.stats.record_error("cycle.panic");
                warn!(
                    target: targets::DECISION,
                    panic = %panic_message(payload.as_ref()),
                    "decision cycle panicked; state unchanged"
                );
                CycleOutcome::Failed
            }
        }
    }

    fn cycle(&self, now_ms: u64) -> CycleReport {
        let config = self.config();
        let raw_rate = self.metrics.current_rate().unwrap_or_else(|error| {
            debug!(
                target: targets::DECISION,
                %error,
                fallback = config.decision.max_rate,
                "rate unavailable; assuming healthy"
            );
            self.stats.record_error("sampling.rate");
            config.decision.max_rate
        });
        let readings = self.metrics.hardware_readings();
        if readings.is_err() {
            self.stats.record_error("sampling.hardware");
        }
        let reading = sanitize_rate(
            raw_rate,
            config.decision.max_rate,
            config.decision.severe_anomaly_factor,
        );

        let mut control = lock_or_recover(&self.control);
        let mut next = control.clone();
        let hardware = next.gate.evaluate(readings, now_ms);
        let decision = next.engine.decide(CycleInput {
            rate: reading.rate,
            hardware_passed: hardware.passed,
            hardware_newly_failed: hardware.newly_failed,
            manual: next.manual.pinned(),
            now_ms,
        });
        next.limiter.adjust(reading.rate, now_ms);

        let sample = PerformanceSample {
            timestamp_ms: now_ms,
            observed_rate: reading.rate,
            hardware: hardware.status,
            hardware_passed: hardware.passed,
            current_mode: decision.from,
            target_mode: decision.target,
        };
        let ladder_change = decision
            .transition
            .map(|transition| self.publish_mode(transition.to));
        self.record_sample(sample);
        *control = next;
        drop(control);

        if let Some(transition) = &decision.transition {
            self.announce(transition, Some(&sample), &config);
        }
        if let Some(warning) = &hardware.warning {
            self.notifier.dispatch(warning.clone());
        }
        debug!(
            target: targets::DECISION,
            observed_rate = reading.rate,
            hardware_passed = hardware.passed,
            current_mode = %self.current_mode(),
            target_mode = %decision.target,
            stability_count = decision.stability_count,
            reason_code = decision.reason_code(),
            "decision cycle complete"
        );

        CycleReport {
            sample,
            reading,
            hardware,
            decision,
            ladder_change,
        }
    }

    /// Check decision-loop liveness once, forcing EMERGENCY on a new stall.
    pub fn watchdog_tick(&self) -> WatchdogVerdict {
        let now_ms = self.clock.now_ms();
        let lag_threshold_ms = self.config().watchdog.lag_threshold_ms;
        let verdict = self.liveness.check(now_ms, lag_threshold_ms);
        match verdict {
            WatchdogVerdict::Stalled { lag_ms } => {
                self.stats.record_watchdog_trip();
                error!(
                    target: targets::WATCHDOG,
                    lag_ms,
                    lag_threshold_ms,
                    last_cycle_ms = self.liveness.last_cycle_ms(),
                    "decision loop stalled; forcing emergency mode"
                );
                self.force_emergency(now_ms);
            }
            WatchdogVerdict::AlreadyFlagged { lag_ms } => {
                debug!(target: targets::WATCHDOG, lag_ms, "decision loop still stalled");
            }
            WatchdogVerdict::Healthy { lag_ms } => {
                trace!(target: targets::WATCHDOG, lag_ms, "decision loop healthy");
            }
        }
        verdict
    }

    fn force_emergency(&self, now_ms: u64) {
        let mut control = lock_or_recover(&self.control);
        control.engine.reset_stability();
        let transition =
            control
                .engine
                .force(OperationMode::Emergency, TransitionCause::Watchdog, now_ms);
        if let Some(transition) = &transition {
            self.publish_mode(transition.to);
        }
        drop(control);
        if let Some(transition) = &transition {
            self.announce(transition, None, &self.config());
        }
    }

    /// Swap in the ladder and mode for `to`. Caller holds the control lock.
    fn publish_mode(&self, to: OperationMode) -> LadderChange {
        let mut ladder = FeatureLadder::clone(&self.ladder_snapshot());
        let change = ladder.apply_mode(to);
        *write_or_recover(&self.ladder) = Arc::new(ladder);
        self.mode.store(to as u8, Ordering::Release);
        change
    }

    fn record_sample(&self, sample: PerformanceSample) {
        let mut history = write_or_recover(&self.history);
        history.push(sample);
        let evicted = history.evict(sample.timestamp_ms);
        if evicted > 0 {
            trace!(target: targets::DECISION, evicted, "expired samples evicted");
        }
    }

    fn announce(
        &self,
        transition: &ModeTransition,
        sample: Option<&PerformanceSample>,
        config: &GovernorConfig,
    ) {
        self.stats.record_transition();
        info!(
            target: targets::DECISION,
            from_mode = %transition.from,
            to_mode = %transition.to,
            reason_code = transition.cause.reason_code(),
            observed_rate = sample.map(|s| s.observed_rate),
            free_process_memory_gb = sample.map(|s| s.hardware.free_process_memory_gb),
            free_system_memory_gb = sample.map(|s| s.hardware.free_system_memory_gb),
            available_cores = sample.map(|s| s.hardware.available_cores),
            "operation mode changed"
        );
        self.notifier
            .dispatch(config.messages.for_mode(transition.to));
    }

    // ─── Manual override ────────────────────────────────────────────────

    /// Pin `mode`, switching to it immediately. Returns the transition, or
    /// `None` when `mode` was already current.
    ///
    /// Persistence failures are logged and counted; the in-memory pin stands.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::ShutDown`] after [`Self::shutdown`].
    pub fn enable_manual_mode(&self, mode: OperationMode) -> GovernorResult<Option<ModeTransition>> {
        self.ensure_running()?;
        let now_ms = self.clock.now_ms();
        let mut control = lock_or_recover(&self.control);
        control.manual.enable(mode, now_ms);
        control.engine.reset_stability();
        let transition = control
            .engine
            .force(mode, TransitionCause::Manual, now_ms);
        if let Some(transition) = &transition {
            self.publish_mode(transition.to);
        }
        *write_or_recover(&self.manual) = control.manual.state();
        drop(control);

        info!(target: targets::DECISION, mode = %mode, "manual override enabled");
        self.persist_manual(true, mode);
        if let Some(transition) = &transition {
            self.announce(transition, None, &self.config());
        }
        Ok(transition)
    }

    /// [`Self::enable_manual_mode`] from an operator-supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::UnknownMode`] for an unrecognized name, with
    /// no state change.
    pub fn enable_manual_mode_named(&self, name: &str) -> GovernorResult<Option<ModeTransition>> {
        let mode: OperationMode = name.parse()?;
        self.enable_manual_mode(mode)
    }

    /// Resume automatic decisions from the next cycle. The current mode is
    /// kept. Returns whether an override was active.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::ShutDown`] after [`Self::shutdown`].
    pub fn disable_manual_mode(&self) -> GovernorResult<bool> {
        self.ensure_running()?;
        let mut control = lock_or_recover(&self.control);
        let was_enabled = control.manual.disable();
        control.engine.reset_stability();
        let state = control.manual.state();
        *write_or_recover(&self.manual) = state;
        drop(control);

        if was_enabled {
            info!(target: targets::DECISION, "manual override disabled");
            self.persist_manual(false, state.mode);
        }
        Ok(was_enabled)
    }

    #[must_use]
    pub fn is_manual_mode_enabled(&self) -> bool {
        read_or_recover(&self.manual).enabled
    }

    /// The pinned mode while the override is active.
    #[must_use]
    pub fn manual_mode(&self) -> Option<OperationMode> {
        let state = *read_or_recover(&self.manual);
        state.enabled.then_some(state.mode)
    }

    #[must_use]
    pub fn manual_state(&self) -> ManualOverrideState {
        *read_or_recover(&self.manual)
    }

    fn persist_manual(&self, enabled: bool, mode: OperationMode) {
        let writes = [
            (KEY_MANUAL_ENABLED, ConfigValue::Bool(enabled)),
            (KEY_MANUAL_MODE, ConfigValue::Text(mode.as_str().to_owned())),
        ];
        for (key, value) in writes {
            if let Err(error) = self.store.persist(key, value) {
                self.stats.record_persist_failure();
                warn!(
                    target: targets::CONFIG,
                    key,
                    %error,
                    "failed to persist manual override; in-memory state stands"
                );
            }
        }
    }

    // ─── Configuration ──────────────────────────────────────────────────

    /// Re-read the store and apply new tunables, then re-apply the current
    /// mode's feature ladder, dropping any per-feature overrides. No new
    /// target is evaluated: mode, counters, cooldown stamp, and the manual
    /// override are kept. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] or [`GovernorError::Io`] from
    /// the store, or [`GovernorError::ShutDown`].
    pub fn reload_configuration(&self) -> GovernorResult<()> {
        self.ensure_running()?;
        self.store.refresh()?;
        let config = GovernorConfig::from_store(self.store.as_ref())?;

        let mut control = lock_or_recover(&self.control);
        let mut next = control.clone();
        next.engine.reconfigure(config.decision_config())?;
        next.gate.reconfigure(
            config.hardware_thresholds(),
            config.hardware.warning_cooldown_ms,
            config.hardware.warning_message.clone(),
        )?;
        next.limiter = AdaptiveRateLimiter::new(config.rate_limiter_config())?;
        let mode = next.engine.current();
        *control = next;
        let change = self.publish_mode(mode);
        drop(control);
        if !change.is_empty() {
            debug!(
                target: targets::LADDER,
                mode = %mode,
                enabled = ?change.enabled,
                disabled = ?change.disabled,
                "feature ladder re-applied on reload"
            );
        }

        write_or_recover(&self.history).set_retention_ms(config.decision.history_retention_ms);
        *write_or_recover(&self.profiles) = config.event_profiles();
        emit_config_loaded(&config, "reload", &[]);
        *write_or_recover(&self.config) = Arc::new(config);
        Ok(())
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<GovernorConfig> {
        Arc::clone(&read_or_recover(&self.config))
    }

    // ─── Feature queries ────────────────────────────────────────────────

    #[must_use]
    pub fn current_mode(&self) -> OperationMode {
        OperationMode::from_index(self.mode.load(Ordering::Acquire))
            .unwrap_or(OperationMode::Emergency)
    }

    fn ladder_snapshot(&self) -> Arc<FeatureLadder> {
        Arc::clone(&read_or_recover(&self.ladder))
    }

    /// `false` for names outside the feature table.
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.ladder_snapshot().is_enabled(name)
    }

    /// `0` for names outside the feature table.
    #[must_use]
    pub fn optimization_level(&self, name: &str) -> u8 {
        self.ladder_snapshot().optimization_level(name)
    }

    #[must_use]
    pub fn disabled_features(&self) -> Vec<String> {
        self.ladder_snapshot().disabled_features()
    }

    #[must_use]
    pub fn overall_degradation_label(&self) -> DegradationLabel {
        self.ladder_snapshot().degradation_label()
    }

    #[must_use]
    pub fn feature_priority(&self, name: &str) -> Option<u8> {
        self.ladder_snapshot().table().priority(name)
    }

    #[must_use]
    pub fn feature_states(&self) -> BTreeMap<String, FeatureState> {
        self.ladder_snapshot()
            .states()
            .map(|(name, state)| (name.to_owned(), state))
            .collect()
    }

    /// Override one feature until the next mode change.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::UnknownFeature`] for names outside the table.
    pub fn set_feature_enabled(&self, name: &str, enabled: bool) -> GovernorResult<()> {
        let control = lock_or_recover(&self.control);
        let mut ladder = FeatureLadder::clone(&self.ladder_snapshot());
        ladder.set_feature_enabled(name, enabled)?;
        *write_or_recover(&self.ladder) = Arc::new(ladder);
        drop(control);
        Ok(())
    }

    // ─── History and liveness ───────────────────────────────────────────

    /// Samples with `from_ms <= timestamp <= to_ms`, oldest first.
    #[must_use]
    pub fn history(&self, from_ms: u64, to_ms: u64) -> Vec<PerformanceSample> {
        read_or_recover(&self.history).range(from_ms, to_ms)
    }

    #[must_use]
    pub fn latest_sample(&self) -> Option<PerformanceSample> {
        read_or_recover(&self.history).latest()
    }

    #[must_use]
    pub fn is_lagging(&self) -> bool {
        self.liveness.is_lagging()
    }

    // ─── Events and message rate ────────────────────────────────────────

    /// Profile for the current mode.
    #[must_use]
    pub fn event_profile(&self) -> EventProfile {
        read_or_recover(&self.profiles).for_mode(self.current_mode())
    }

    /// Whether the host should react to an event for `key`, handled by
    /// `feature`. Admitted events count against the cooldown and cap.
    pub fn should_process_event(
        &self,
        feature: &str,
        key: &str,
        reading: EventReading,
    ) -> EventAdmission {
        if !self.is_feature_enabled(feature) {
            return EventAdmission::FeatureDisabled;
        }
        let profiles = *read_or_recover(&self.profiles);
        let profile = profiles.for_mode(self.current_mode());
        let now_ms = self.clock.now_ms();
        let admission = lock_or_recover(&self.events).admit(
            key,
            reading,
            profile,
            profiles.direction,
            now_ms,
        );
        trace!(target: targets::EVENTS, feature, key, ?admission, "event admission");
        admission
    }

    /// Effective per-minute message limit right now.
    #[must_use]
    pub fn message_rate_limit(&self) -> u32 {
        let now_ms = self.clock.now_ms();
        lock_or_recover(&self.control).limiter.current_limit(now_ms)
    }

    /// Admit one outbound message if the trailing window has room.
    pub fn try_acquire_message(&self) -> bool {
        let now_ms = self.clock.now_ms();
        let control = lock_or_recover(&self.control);
        let mut window = lock_or_recover(&self.messages);
        let allowed = control.limiter.is_allowed(&window, now_ms);
        if allowed {
            window.record(now_ms);
        } else {
            debug!(
                target: targets::EVENTS,
                limit = control.limiter.current_limit(now_ms),
                "message rate limit reached"
            );
        }
        allowed
    }

    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `limit` is out of bounds.
    pub fn set_base_message_limit(&self, limit: u32) -> GovernorResult<()> {
        lock_or_recover(&self.control).limiter.set_base_limit(limit)
    }

    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `limit` is out of bounds.
    pub fn set_temporary_message_limit(&self, limit: u32, duration: Duration) -> GovernorResult<()> {
        let now_ms = self.clock.now_ms();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        lock_or_recover(&self.control)
            .limiter
            .set_temporary_limit(limit, duration_ms, now_ms)
    }

    // ─── Statistics and status ──────────────────────────────────────────

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Clear counters and sample history.
    pub fn reset_stats(&self) {
        self.stats.reset();
        write_or_recover(&self.history).clear();
        info!(target: targets::RUNTIME, "statistics reset");
    }

    pub fn record_error(&self, kind: &str) {
        self.stats.record_error(kind);
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        self.stats
            .record_response_time(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    #[must_use]
    pub fn status(&self) -> GovernorStatus {
        let ladder = self.ladder_snapshot();
        GovernorStatus {
            mode: self.current_mode(),
            manual: self.manual_state(),
            lagging: self.is_lagging(),
            degradation_label: ladder.degradation_label(),
            disabled_features: ladder.disabled_features(),
            features: ladder
                .states()
                .map(|(name, state)| (name.to_owned(), state))
                .collect(),
            message_rate_limit: self.message_rate_limit(),
            last_sample: self.latest_sample(),
            stats: self.stats(),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Stop accepting control calls and drain pending notifications.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(target: targets::RUNTIME, mode = %self.current_mode(), "governor shutting down");
        self.notifier.shutdown(self.config().shutdown_grace());
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> GovernorResult<()> {
        if self.is_shut_down() {
            Err(GovernorError::ShutDown)
        } else {
            Ok(())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfgov_core::{HardwareStatus, ManualClock};

    struct Steady;

    impl MetricsProvider for Steady {
        fn current_rate(&self) -> GovernorResult<f64> {
            Ok(20.0)
        }

        fn hardware_readings(&self) -> GovernorResult<HardwareStatus> {
            Ok(HardwareStatus {
                free_process_memory_gb: 4.0,
                free_system_memory_gb: 8.0,
                available_cores: 8,
            })
        }
    }

    struct Exploding;

    impl MetricsProvider for Exploding {
        fn current_rate(&self) -> GovernorResult<f64> {
            panic!("provider bug");
        }

        fn hardware_readings(&self) -> GovernorResult<HardwareStatus> {
            Ok(HardwareStatus::default())
        }
    }

    fn governor(metrics: Arc<dyn MetricsProvider>) -> (Governor, ManualClock) {
        let clock = ManualClock::starting_at(1_000_000);
        let governor = GovernorBuilder::new(metrics)
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        (governor, clock)
    }

    #[test]
    fn starts_in_full_with_every_feature_enabled() {
        let (governor, _clock) = governor(Arc::new(Steady));
        assert_eq!(governor.current_mode(), OperationMode::Full);
        assert!(governor.disabled_features().is_empty());
        assert_eq!(governor.overall_degradation_label(), DegradationLabel::Minimal);
        assert_eq!(governor.feature_priority("core_requests"), Some(1));
        assert_eq!(governor.feature_priority("nope"), None);
    }

    #[test]
    fn persisted_manual_pin_sets_start_mode() {
        let store = MemoryConfigStore::new()
            .with(KEY_MANUAL_ENABLED, ConfigValue::Bool(true))
            .with(KEY_MANUAL_MODE, ConfigValue::Text("basic".into()));
        let governor = GovernorBuilder::new(Arc::new(Steady))
            .config_store(Arc::new(store))
            .clock(Arc::new(ManualClock::starting_at(0)))
            .build()
            .unwrap();
        assert_eq!(governor.current_mode(), OperationMode::Basic);
        assert_eq!(governor.manual_mode(), Some(OperationMode::Basic));
        assert!(!governor.is_feature_enabled("content_filter"));
    }

    #[test]
    fn panicking_provider_fails_cycle_without_state_change() {
        let (governor, clock) = governor(Arc::new(Exploding));
        clock.advance_ms(10_000);
        assert_eq!(governor.run_cycle(), CycleOutcome::Failed);
        assert_eq!(governor.current_mode(), OperationMode::Full);
        assert!(governor.history(0, u64::MAX).is_empty());
        let stats = governor.stats();
        assert_eq!(stats.cycle_failures, 1);
        assert_eq!(stats.errors.get("cycle.panic"), Some(&1));
    }

    #[test]
    fn unknown_manual_mode_is_rejected_without_change() {
        let (governor, _clock) = governor(Arc::new(Steady));
        let err = governor.enable_manual_mode_named("turbo").unwrap_err();
        assert!(matches!(err, GovernorError::UnknownMode { .. }));
        assert!(!governor.is_manual_mode_enabled());
        assert_eq!(governor.current_mode(), OperationMode::Full);
    }

    #[test]
    fn control_calls_fail_after_shutdown() {
        let (governor, _clock) = governor(Arc::new(Steady));
        governor.shutdown();
        governor.shutdown();
        assert!(matches!(
            governor.enable_manual_mode(OperationMode::Lite),
            Err(GovernorError::ShutDown)
        ));
        assert_eq!(governor.run_cycle(), CycleOutcome::ShutDown);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let (governor, clock) = governor(Arc::new(Steady));
        clock.advance_ms(10_000);
        let json = serde_json::to_string(&governor.run_cycle()).unwrap();
        assert!(json.contains("\"outcome\":\"completed\""));
        assert!(json.contains("\"decision\""));
    }
}
