//! Deterministic control plane of the perfgov governor.
//!
//! Everything in this crate is single-threaded and clock-free: callers pass
//! the current time in milliseconds and own the state. The daemon crate wraps
//! these pieces in shared state and background threads.
//!
//! - [`HardwareGate`]: memory and core minimums, fail-open on sampling errors.
//! - [`StabilityCounters`]: consecutive-hit hysteresis per candidate mode.
//! - [`ModeDecisionEngine`]: target selection, stability and cooldown gating.
//! - [`FeatureLadder`]: priority table mapped to per-mode enablement.
//! - [`ManualOverride`], [`EventProfiles`], [`AdaptiveRateLimiter`],
//!   [`SampleHistory`]: supporting state.

#![forbid(unsafe_code)]

pub mod decision;
pub mod event_profile;
pub mod hardware_gate;
pub mod history;
pub mod ladder;
pub mod manual_override;
pub mod rate_limiter;
pub mod stability;
pub mod window;

pub use decision::{
    CycleDecision, CycleInput, DecisionConfig, HoldReason, ModeDecisionEngine, RateAnomaly,
    RateReading, RateThresholds, sanitize_rate,
};
pub use event_profile::{
    EventAdmission, EventGate, EventProfile, EventProfiles, EventReading, ThresholdDirection,
};
pub use hardware_gate::{HardwareGate, HardwareThresholds, HardwareVerdict};
pub use history::SampleHistory;
pub use ladder::{FeatureBand, FeatureLadder, FeatureState, FeatureTable, LadderChange};
pub use manual_override::{ManualOverride, ManualOverrideState};
pub use rate_limiter::{AdaptiveRateLimiter, RateLimiterConfig};
pub use stability::StabilityCounters;
pub use window::SlidingWindow;
