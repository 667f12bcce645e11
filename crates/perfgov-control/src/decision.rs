//! Mode decision engine.
//!
//! One call to [`ModeDecisionEngine::decide`] is one decision cycle: pick a
//! target mode from the manual pin, the hardware gate, or the rate thresholds,
//! then decide whether the stability and cooldown gates allow committing it.
//! The engine owns `current`, `last_transition_ms`, and the stability
//! counters; callers own sampling, ladder application, and notification.

use perfgov_core::tracing_config::targets;
use perfgov_core::{GovernorError, GovernorResult, ModeTransition, OperationMode, TransitionCause};
use serde::{Deserialize, Serialize};

use crate::stability::StabilityCounters;

const DEFAULT_THRESHOLD_FULL: f64 = 18.0;
const DEFAULT_THRESHOLD_LITE: f64 = 15.0;
const DEFAULT_THRESHOLD_BASIC: f64 = 10.0;
const DEFAULT_MAX_RATE: f64 = 20.0;
const DEFAULT_SEVERE_ANOMALY_FACTOR: f64 = 1.25;
const DEFAULT_STABILITY_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN_MS: u64 = 60_000;

pub const REASON_HOLD_IN_TARGET: &str = "decision.hold.in_target";
pub const REASON_HOLD_STABILITY: &str = "decision.hold.awaiting_stability";
pub const REASON_HOLD_COOLDOWN: &str = "decision.hold.cooldown";
pub const REASON_HOLD_AUTO_OFF: &str = "decision.hold.auto_optimize_disabled";

/// Rate floors for each mode. A rate at or above `full` selects FULL, and so
/// on down; anything under `basic` selects EMERGENCY.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateThresholds {
    pub full: f64,
    pub lite: f64,
    pub basic: f64,
}

impl Default for RateThresholds {
    fn default() -> Self {
        Self {
            full: DEFAULT_THRESHOLD_FULL,
            lite: DEFAULT_THRESHOLD_LITE,
            basic: DEFAULT_THRESHOLD_BASIC,
        }
    }
}

impl RateThresholds {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] unless
    /// `full > lite > basic >= 0`.
    pub fn validate(self) -> GovernorResult<Self> {
        if !self.basic.is_finite() || self.basic < 0.0 {
            return Err(GovernorError::invalid_config(
                "decision.rate_threshold_basic",
                self.basic,
                "must be a finite, non-negative rate",
            ));
        }
        if self.lite.is_nan() || self.lite <= self.basic {
            return Err(GovernorError::invalid_config(
                "decision.rate_threshold_lite",
                self.lite,
                format!("must be greater than the basic threshold ({})", self.basic),
            ));
        }
        if !self.full.is_finite() || self.full <= self.lite {
            return Err(GovernorError::invalid_config(
                "decision.rate_threshold_full",
                self.full,
                format!("must be greater than the lite threshold ({})", self.lite),
            ));
        }
        Ok(self)
    }

    #[must_use]
    pub fn mode_for(self, rate: f64) -> OperationMode {
        if rate >= self.full {
            OperationMode::Full
        } else if rate >= self.lite {
            OperationMode::Lite
        } else if rate >= self.basic {
            OperationMode::Basic
        } else {
            OperationMode::Emergency
        }
    }
}

/// Tunables of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub thresholds: RateThresholds,
    /// Theoretical maximum rate; anomalous readings clamp to it.
    pub max_rate: f64,
    /// Readings above `max_rate * severe_anomaly_factor` log at warn.
    pub severe_anomaly_factor: f64,
    pub stability_threshold: u32,
    pub cooldown_ms: u64,
    /// When false, automatic cycles hold without evaluating a target.
    pub auto_optimize: bool,
    /// When true, the hardware gate's pass-to-fail edge commits EMERGENCY
    /// immediately instead of waiting out stability and cooldown.
    pub hardware_bypasses_hysteresis: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            thresholds: RateThresholds::default(),
            max_rate: DEFAULT_MAX_RATE,
            severe_anomaly_factor: DEFAULT_SEVERE_ANOMALY_FACTOR,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            auto_optimize: true,
            hardware_bypasses_hysteresis: true,
        }
    }
}

impl DecisionConfig {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] for inconsistent thresholds, a
    /// zero stability threshold, or an invalid rate ceiling.
    pub fn validate(self) -> GovernorResult<Self> {
        self.thresholds.validate()?;
        if !self.max_rate.is_finite() || self.max_rate <= 0.0 {
            return Err(GovernorError::invalid_config(
                "decision.max_rate",
                self.max_rate,
                "must be a finite, positive rate",
            ));
        }
        if !self.severe_anomaly_factor.is_finite() || self.severe_anomaly_factor < 1.0 {
            return Err(GovernorError::invalid_config(
                "decision.severe_anomaly_factor",
                self.severe_anomaly_factor,
                "must be >= 1.0",
            ));
        }
        if self.stability_threshold == 0 {
            return Err(GovernorError::invalid_config(
                "decision.stability_threshold",
                0,
                "must be at least 1",
            ));
        }
        Ok(self)
    }
}

/// Why a raw rate was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateAnomaly {
    NonFinite,
    Negative,
    AboveMax { severe: bool },
}

/// A rate reading after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateReading {
    pub raw: f64,
    pub rate: f64,
    pub anomaly: Option<RateAnomaly>,
}

/// Clamp a raw rate into `[0, max_rate]`.
///
/// Negative, non-finite, and above-ceiling readings all normalize to
/// `max_rate`. Only readings above `max_rate * severe_factor` warn; smaller
/// overshoots are routine measurement jitter and log at debug.
#[must_use]
pub fn sanitize_rate(raw: f64, max_rate: f64, severe_factor: f64) -> RateReading {
    let anomaly = if !raw.is_finite() {
        Some(RateAnomaly::NonFinite)
    } else if raw < 0.0 {
        Some(RateAnomaly::Negative)
    } else if raw > max_rate {
        Some(RateAnomaly::AboveMax {
            severe: raw > max_rate * severe_factor,
        })
    } else {
        None
    };

    match anomaly {
        None => {
            return RateReading {
                raw,
                rate: raw,
                anomaly,
            };
        }
        Some(RateAnomaly::AboveMax { severe: true }) => {
            tracing::warn!(
                target: targets::DECISION,
                raw_rate = raw,
                max_rate,
                "rate far above theoretical maximum; clamping"
            );
        }
        Some(kind) => {
            tracing::debug!(
                target: targets::DECISION,
                raw_rate = raw,
                max_rate,
                anomaly = ?kind,
                "rate outside expected range; clamping"
            );
        }
    }

    RateReading {
        raw,
        rate: max_rate,
        anomaly,
    }
}

/// Inputs to one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInput {
    /// Already sanitized rate.
    pub rate: f64,
    pub hardware_passed: bool,
    pub hardware_newly_failed: bool,
    /// Pinned mode when the manual override is active.
    pub manual: Option<OperationMode>,
    pub now_ms: u64,
}

/// Why a cycle did not commit its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    AlreadyInTarget,
    AwaitingStability { observed: u32, required: u32 },
    CoolingDown { remaining_ms: u64 },
    AutoOptimizeDisabled,
}

impl HoldReason {
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::AlreadyInTarget => REASON_HOLD_IN_TARGET,
            Self::AwaitingStability { .. } => REASON_HOLD_STABILITY,
            Self::CoolingDown { .. } => REASON_HOLD_COOLDOWN,
            Self::AutoOptimizeDisabled => REASON_HOLD_AUTO_OFF,
        }
    }
}

/// Result of one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleDecision {
    pub from: OperationMode,
    pub target: OperationMode,
    pub stability_count: u32,
    /// Set when the cycle committed a mode change.
    pub transition: Option<ModeTransition>,
    /// Set when the cycle held.
    pub hold: Option<HoldReason>,
}

impl CycleDecision {
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match (self.transition, self.hold) {
            (Some(transition), _) => transition.cause.reason_code(),
            (None, Some(hold)) => hold.reason_code(),
            (None, None) => REASON_HOLD_IN_TARGET,
        }
    }
}

/// State machine over [`OperationMode`].
#[derive(Debug, Clone)]
pub struct ModeDecisionEngine {
    config: DecisionConfig,
    current: OperationMode,
    last_transition_ms: Option<u64>,
    counters: StabilityCounters,
}

impl Default for ModeDecisionEngine {
    fn default() -> Self {
        Self {
            config: DecisionConfig::default(),
            current: OperationMode::Full,
            last_transition_ms: None,
            counters: StabilityCounters::default(),
        }
    }
}

impl ModeDecisionEngine {
    /// Start in FULL with no transition history, so the first qualifying
    /// change is not held by cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `config` is invalid.
    pub fn new(config: DecisionConfig) -> GovernorResult<Self> {
        Ok(Self {
            config: config.validate()?,
            ..Self::default()
        })
    }

    /// Like [`Self::new`] but starting from `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `config` is invalid.
    pub fn starting_in(config: DecisionConfig, mode: OperationMode) -> GovernorResult<Self> {
        let mut engine = Self::new(config)?;
        engine.current = mode;
        Ok(engine)
    }

    #[must_use]
    pub const fn current(&self) -> OperationMode {
        self.current
    }

    #[must_use]
    pub const fn config(&self) -> DecisionConfig {
        self.config
    }

    #[must_use]
    pub const fn last_transition_ms(&self) -> Option<u64> {
        self.last_transition_ms
    }

    #[must_use]
    pub const fn counters(&self) -> StabilityCounters {
        self.counters
    }

    /// Replace tunables; mode, counters, and cooldown stamp are kept.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `config` is invalid.
    pub fn reconfigure(&mut self, config: DecisionConfig) -> GovernorResult<()> {
        self.config = config.validate()?;
        Ok(())
    }

    pub fn reset_stability(&mut self) {
        self.counters.reset();
    }

    /// Run one cycle.
    pub fn decide(&mut self, input: CycleInput) -> CycleDecision {
        let from = self.current;

        if let Some(pinned) = input.manual {
            return if pinned == from {
                self.hold(pinned, 0, HoldReason::AlreadyInTarget)
            } else {
                let transition = self.commit(pinned, TransitionCause::Manual, input.now_ms);
                CycleDecision {
                    from,
                    target: pinned,
                    stability_count: 0,
                    transition: Some(transition),
                    hold: None,
                }
            };
        }

        let target = if input.hardware_passed {
            self.config.thresholds.mode_for(input.rate)
        } else {
            OperationMode::Emergency
        };

        if !self.config.auto_optimize {
            return self.hold(target, 0, HoldReason::AutoOptimizeDisabled);
        }

        let streak = self.counters.record(target);

        if input.hardware_newly_failed
            && self.config.hardware_bypasses_hysteresis
            && from != OperationMode::Emergency
        {
            let transition =
                self.commit(OperationMode::Emergency, TransitionCause::Hardware, input.now_ms);
            return CycleDecision {
                from,
                target: OperationMode::Emergency,
                stability_count: streak,
                transition: Some(transition),
                hold: None,
            };
        }

        if target == from {
            return self.hold(target, streak, HoldReason::AlreadyInTarget);
        }
        if streak < self.config.stability_threshold {
            return self.hold(
                target,
                streak,
                HoldReason::AwaitingStability {
                    observed: streak,
                    required: self.config.stability_threshold,
                },
            );
        }
        if let Some(last) = self.last_transition_ms {
            let elapsed = input.now_ms.saturating_sub(last);
            if elapsed <= self.config.cooldown_ms {
                return self.hold(
                    target,
                    streak,
                    HoldReason::CoolingDown {
                        remaining_ms: self.config.cooldown_ms - elapsed,
                    },
                );
            }
        }

        let transition = self.commit(target, TransitionCause::Automatic, input.now_ms);
        CycleDecision {
            from,
            target,
            stability_count: streak,
            transition: Some(transition),
            hold: None,
        }
    }

    /// Switch to `mode` unconditionally, bypassing stability and cooldown.
    /// Returns `None` when already in `mode`.
    pub fn force(
        &mut self,
        mode: OperationMode,
        cause: TransitionCause,
        now_ms: u64,
    ) -> Option<ModeTransition> {
        (mode != self.current).then(|| self.commit(mode, cause, now_ms))
    }

    fn commit(&mut self, to: OperationMode, cause: TransitionCause, now_ms: u64) -> ModeTransition {
        let transition = ModeTransition {
            from: self.current,
            to,
            cause,
            at_ms: now_ms,
        };
        self.current = to;
        self.last_transition_ms = Some(now_ms);
        self.counters.reset();
        transition
    }

    fn hold(&self, target: OperationMode, streak: u32, reason: HoldReason) -> CycleDecision {
        CycleDecision {
            from: self.current,
            target,
            stability_count: streak,
            transition: None,
            hold: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto(rate: f64, now_ms: u64) -> CycleInput {
        CycleInput {
            rate,
            hardware_passed: true,
            hardware_newly_failed: false,
            manual: None,
            now_ms,
        }
    }

    #[test]
    fn threshold_map_uses_inclusive_floors() {
        let t = RateThresholds::default();
        assert_eq!(t.mode_for(20.0), OperationMode::Full);
        assert_eq!(t.mode_for(18.0), OperationMode::Full);
        assert_eq!(t.mode_for(17.9), OperationMode::Lite);
        assert_eq!(t.mode_for(15.0), OperationMode::Lite);
        assert_eq!(t.mode_for(10.0), OperationMode::Basic);
        assert_eq!(t.mode_for(9.99), OperationMode::Emergency);
        assert_eq!(t.mode_for(0.0), OperationMode::Emergency);
    }

    #[test]
    fn thresholds_must_be_strictly_descending() {
        let bad = RateThresholds {
            full: 15.0,
            lite: 15.0,
            basic: 10.0,
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("decision.rate_threshold_full"));

        let negative = RateThresholds {
            basic: -1.0,
            ..RateThresholds::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_stability_threshold() {
        let config = DecisionConfig {
            stability_threshold: 0,
            ..DecisionConfig::default()
        };
        assert!(ModeDecisionEngine::new(config).is_err());
    }

    #[test]
    fn sanitize_rate_clamps_negative_and_overshoot() {
        let negative = sanitize_rate(-3.0, 20.0, 1.25);
        assert!((negative.rate - 20.0).abs() < f64::EPSILON);
        assert_eq!(negative.anomaly, Some(RateAnomaly::Negative));

        let mild = sanitize_rate(22.0, 20.0, 1.25);
        assert!((mild.rate - 20.0).abs() < f64::EPSILON);
        assert_eq!(mild.anomaly, Some(RateAnomaly::AboveMax { severe: false }));

        let severe = sanitize_rate(30.0, 20.0, 1.25);
        assert_eq!(severe.anomaly, Some(RateAnomaly::AboveMax { severe: true }));

        let nan = sanitize_rate(f64::NAN, 20.0, 1.25);
        assert!((nan.rate - 20.0).abs() < f64::EPSILON);
        assert_eq!(nan.anomaly, Some(RateAnomaly::NonFinite));
    }

    #[test]
    fn sanitize_rate_passes_through_normal_readings() {
        let reading = sanitize_rate(12.5, 20.0, 1.25);
        assert!((reading.rate - 12.5).abs() < f64::EPSILON);
        assert_eq!(reading.anomaly, None);
    }

    #[test]
    fn basic_to_full_commits_exactly_on_fifth_sample() {
        let mut engine =
            ModeDecisionEngine::starting_in(DecisionConfig::default(), OperationMode::Basic)
                .unwrap();
        for i in 1..=4_u64 {
            let decision = engine.decide(auto(20.0, i * 10_000));
            assert!(decision.transition.is_none(), "cycle {i} must hold");
            assert_eq!(
                decision.hold,
                Some(HoldReason::AwaitingStability {
                    observed: u32::try_from(i).unwrap(),
                    required: 5
                })
            );
        }
        let decision = engine.decide(auto(20.0, 50_000));
        let transition = decision.transition.unwrap();
        assert_eq!(transition.from, OperationMode::Basic);
        assert_eq!(transition.to, OperationMode::Full);
        assert_eq!(transition.cause, TransitionCause::Automatic);
        assert_eq!(engine.current(), OperationMode::Full);
    }

    #[test]
    fn interrupted_streak_restarts() {
        let mut engine = ModeDecisionEngine::default();
        for i in 0..4 {
            engine.decide(auto(12.0, i * 1_000));
        }
        // One LITE reading breaks the BASIC streak.
        engine.decide(auto(16.0, 5_000));
        let decision = engine.decide(auto(12.0, 6_000));
        assert_eq!(decision.stability_count, 1);
        assert!(decision.transition.is_none());
    }

    #[test]
    fn cooldown_blocks_second_automatic_transition() {
        let mut engine = ModeDecisionEngine::default();
        let mut now = 0;
        for _ in 0..5 {
            now += 1_000;
            engine.decide(auto(12.0, now));
        }
        assert_eq!(engine.current(), OperationMode::Basic);
        let first = engine.last_transition_ms().unwrap();

        for _ in 0..10 {
            now += 1_000;
            let decision = engine.decide(auto(20.0, now));
            assert!(decision.transition.is_none());
            assert!(matches!(
                decision.hold,
                Some(HoldReason::CoolingDown { .. } | HoldReason::AwaitingStability { .. })
            ));
        }

        // Exactly at the cooldown boundary still holds.
        let decision = engine.decide(auto(20.0, first + 60_000));
        assert!(matches!(decision.hold, Some(HoldReason::CoolingDown { remaining_ms: 0 })));

        let decision = engine.decide(auto(20.0, first + 60_001));
        assert_eq!(decision.transition.unwrap().to, OperationMode::Full);
    }

    #[test]
    fn failed_hardware_targets_emergency() {
        let config = DecisionConfig {
            hardware_bypasses_hysteresis: false,
            ..DecisionConfig::default()
        };
        let mut engine = ModeDecisionEngine::new(config).unwrap();
        let decision = engine.decide(CycleInput {
            rate: 20.0,
            hardware_passed: false,
            hardware_newly_failed: true,
            manual: None,
            now_ms: 1_000,
        });
        assert_eq!(decision.target, OperationMode::Emergency);
        assert!(decision.transition.is_none(), "hysteresis still applies");
    }

    #[test]
    fn hardware_edge_bypasses_hysteresis_when_enabled() {
        let mut engine = ModeDecisionEngine::default();
        // Fresh transition puts the engine inside cooldown.
        engine.force(OperationMode::Lite, TransitionCause::Manual, 1_000);
        let decision = engine.decide(CycleInput {
            rate: 20.0,
            hardware_passed: false,
            hardware_newly_failed: true,
            manual: None,
            now_ms: 2_000,
        });
        let transition = decision.transition.unwrap();
        assert_eq!(transition.to, OperationMode::Emergency);
        assert_eq!(transition.cause, TransitionCause::Hardware);
    }

    #[test]
    fn manual_pin_bypasses_stability_and_cooldown() {
        let mut engine = ModeDecisionEngine::default();
        engine.force(OperationMode::Lite, TransitionCause::Automatic, 1_000);
        let decision = engine.decide(CycleInput {
            manual: Some(OperationMode::Basic),
            ..auto(20.0, 1_500)
        });
        let transition = decision.transition.unwrap();
        assert_eq!(transition.to, OperationMode::Basic);
        assert_eq!(transition.cause, TransitionCause::Manual);

        let again = engine.decide(CycleInput {
            manual: Some(OperationMode::Basic),
            ..auto(20.0, 1_600)
        });
        assert!(again.transition.is_none());
        assert_eq!(again.hold, Some(HoldReason::AlreadyInTarget));
    }

    #[test]
    fn auto_optimize_off_holds_without_counting() {
        let config = DecisionConfig {
            auto_optimize: false,
            ..DecisionConfig::default()
        };
        let mut engine = ModeDecisionEngine::new(config).unwrap();
        for i in 0..10 {
            let decision = engine.decide(auto(1.0, i * 100_000));
            assert_eq!(decision.hold, Some(HoldReason::AutoOptimizeDisabled));
        }
        assert_eq!(engine.current(), OperationMode::Full);
        assert_eq!(engine.counters().leader(), None);
    }

    #[test]
    fn force_is_noop_for_current_mode() {
        let mut engine = ModeDecisionEngine::default();
        assert!(
            engine
                .force(OperationMode::Full, TransitionCause::Watchdog, 5)
                .is_none()
        );
        assert_eq!(engine.last_transition_ms(), None);
    }

    #[test]
    fn reason_codes_follow_outcome() {
        let mut engine = ModeDecisionEngine::default();
        let hold = engine.decide(auto(20.0, 0));
        assert_eq!(hold.reason_code(), REASON_HOLD_IN_TARGET);
        let pending = engine.decide(auto(5.0, 1));
        assert_eq!(pending.reason_code(), REASON_HOLD_STABILITY);
    }
}
