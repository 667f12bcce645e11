//! Hardware headroom gate.
//!
//! Checks free process memory, free system memory, and available cores
//! against configured minimums. All three must pass. A sampling error fails
//! open: the governor must never shed features because it could not read the
//! host.

use perfgov_core::tracing_config::targets;
use perfgov_core::{GovernorError, GovernorResult, HardwareStatus};
use serde::{Deserialize, Serialize};

const DEFAULT_MIN_FREE_PROCESS_MEMORY_GB: f64 = 0.5;
const DEFAULT_MIN_FREE_SYSTEM_MEMORY_GB: f64 = 0.5;
const DEFAULT_MIN_AVAILABLE_CORES: u32 = 2;
const DEFAULT_WARNING_COOLDOWN_MS: u64 = 30_000;
pub const DEFAULT_WARNING_MESSAGE: &str = "Host hardware resources are insufficient";

/// Minimum headroom required for the gate to pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareThresholds {
    pub min_free_process_memory_gb: f64,
    pub min_free_system_memory_gb: f64,
    pub min_available_cores: u32,
}

impl Default for HardwareThresholds {
    fn default() -> Self {
        Self {
            min_free_process_memory_gb: DEFAULT_MIN_FREE_PROCESS_MEMORY_GB,
            min_free_system_memory_gb: DEFAULT_MIN_FREE_SYSTEM_MEMORY_GB,
            min_available_cores: DEFAULT_MIN_AVAILABLE_CORES,
        }
    }
}

impl HardwareThresholds {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when a memory minimum is
    /// negative or not finite.
    pub fn validate(self) -> GovernorResult<Self> {
        for (field, value) in [
            (
                "hardware.min_free_process_memory_gb",
                self.min_free_process_memory_gb,
            ),
            (
                "hardware.min_free_system_memory_gb",
                self.min_free_system_memory_gb,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GovernorError::invalid_config(
                    field,
                    value,
                    "must be a finite, non-negative number of GB",
                ));
            }
        }
        Ok(self)
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareVerdict {
    pub passed: bool,
    pub status: HardwareStatus,
    pub process_memory_ok: bool,
    pub system_memory_ok: bool,
    pub cores_ok: bool,
    /// False when readings were unavailable and the gate failed open.
    pub sampled: bool,
    /// The gate passed on the previous evaluation and fails on this one.
    pub newly_failed: bool,
    /// Operator warning to broadcast, present at most once per cooldown.
    pub warning: Option<String>,
}

/// Stateful gate tracking pass/fail edges and warning rate limits.
#[derive(Debug, Clone)]
pub struct HardwareGate {
    thresholds: HardwareThresholds,
    warning_cooldown_ms: u64,
    warning_message: String,
    last_passed: bool,
    last_warning_ms: Option<u64>,
    last_status: HardwareStatus,
}

impl Default for HardwareGate {
    fn default() -> Self {
        Self {
            thresholds: HardwareThresholds::default(),
            warning_cooldown_ms: DEFAULT_WARNING_COOLDOWN_MS,
            warning_message: DEFAULT_WARNING_MESSAGE.to_owned(),
            last_passed: true,
            last_warning_ms: None,
            last_status: HardwareStatus::default(),
        }
    }
}

impl HardwareGate {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `thresholds` are invalid.
    pub fn new(
        thresholds: HardwareThresholds,
        warning_cooldown_ms: u64,
        warning_message: impl Into<String>,
    ) -> GovernorResult<Self> {
        Ok(Self {
            thresholds: thresholds.validate()?,
            warning_cooldown_ms,
            warning_message: warning_message.into(),
            ..Self::default()
        })
    }

    #[must_use]
    pub const fn thresholds(&self) -> HardwareThresholds {
        self.thresholds
    }

    #[must_use]
    pub const fn last_passed(&self) -> bool {
        self.last_passed
    }

    /// Swap thresholds and warning settings, keeping edge and rate-limit state.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `thresholds` are invalid.
    pub fn reconfigure(
        &mut self,
        thresholds: HardwareThresholds,
        warning_cooldown_ms: u64,
        warning_message: impl Into<String>,
    ) -> GovernorResult<()> {
        self.thresholds = thresholds.validate()?;
        self.warning_cooldown_ms = warning_cooldown_ms;
        self.warning_message = warning_message.into();
        Ok(())
    }

    /// Evaluate one set of readings taken at `now_ms`.
    pub fn evaluate(
        &mut self,
        readings: GovernorResult<HardwareStatus>,
        now_ms: u64,
    ) -> HardwareVerdict {
        let status = match readings {
            Ok(status) => status,
            Err(error) => {
                tracing::debug!(
                    target: targets::HARDWARE,
                    error = %error,
                    "hardware readings unavailable; gate fails open"
                );
                return HardwareVerdict {
                    passed: true,
                    status: self.last_status,
                    process_memory_ok: true,
                    system_memory_ok: true,
                    cores_ok: true,
                    sampled: false,
                    newly_failed: false,
                    warning: None,
                };
            }
        };

        let t = self.thresholds;
        let process_memory_ok = status.free_process_memory_gb >= t.min_free_process_memory_gb;
        let system_memory_ok = status.free_system_memory_gb >= t.min_free_system_memory_gb;
        let cores_ok = status.available_cores >= t.min_available_cores;
        let passed = process_memory_ok && system_memory_ok && cores_ok;
        let newly_failed = self.last_passed && !passed;

        let warning = if newly_failed && self.warning_due(now_ms) {
            self.last_warning_ms = Some(now_ms);
            tracing::warn!(
                target: targets::HARDWARE,
                free_process_memory_gb = status.free_process_memory_gb,
                free_system_memory_gb = status.free_system_memory_gb,
                available_cores = status.available_cores,
                process_memory_ok,
                system_memory_ok,
                cores_ok,
                "hardware gate failed"
            );
            Some(self.warning_message.clone())
        } else {
            None
        };

        if !newly_failed && passed != self.last_passed {
            tracing::info!(
                target: targets::HARDWARE,
                free_process_memory_gb = status.free_process_memory_gb,
                free_system_memory_gb = status.free_system_memory_gb,
                available_cores = status.available_cores,
                "hardware gate recovered"
            );
        }

        self.last_passed = passed;
        self.last_status = status;

        HardwareVerdict {
            passed,
            status,
            process_memory_ok,
            system_memory_ok,
            cores_ok,
            sampled: true,
            newly_failed,
            warning,
        }
    }

    fn warning_due(&self, now_ms: u64) -> bool {
        self.last_warning_ms
            .is_none_or(|last| now_ms.saturating_sub(last) > self.warning_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> HardwareStatus {
        HardwareStatus {
            free_process_memory_gb: 2.0,
            free_system_memory_gb: 8.0,
            available_cores: 8,
        }
    }

    fn starved_process_memory() -> HardwareStatus {
        HardwareStatus {
            free_process_memory_gb: 0.1,
            ..healthy()
        }
    }

    #[test]
    fn healthy_readings_pass_every_dimension() {
        let mut gate = HardwareGate::default();
        let verdict = gate.evaluate(Ok(healthy()), 0);
        assert!(verdict.passed);
        assert!(verdict.sampled);
        assert!(!verdict.newly_failed);
        assert!(verdict.warning.is_none());
    }

    #[test]
    fn low_process_memory_fails_gate() {
        let mut gate = HardwareGate::default();
        let verdict = gate.evaluate(Ok(starved_process_memory()), 0);
        assert!(!verdict.passed);
        assert!(!verdict.process_memory_ok);
        assert!(verdict.system_memory_ok);
        assert!(verdict.cores_ok);
        assert!(verdict.newly_failed);
        assert_eq!(verdict.warning.as_deref(), Some(DEFAULT_WARNING_MESSAGE));
    }

    #[test]
    fn each_dimension_is_required() {
        let single_core = HardwareStatus {
            available_cores: 1,
            ..healthy()
        };
        let low_system = HardwareStatus {
            free_system_memory_gb: 0.2,
            ..healthy()
        };
        for status in [single_core, low_system] {
            let mut gate = HardwareGate::default();
            assert!(!gate.evaluate(Ok(status), 0).passed);
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let exact = HardwareStatus {
            free_process_memory_gb: 0.5,
            free_system_memory_gb: 0.5,
            available_cores: 2,
        };
        let mut gate = HardwareGate::default();
        assert!(gate.evaluate(Ok(exact), 0).passed);
    }

    #[test]
    fn sampling_error_fails_open_and_keeps_edge_state() {
        let mut gate = HardwareGate::default();
        let _ = gate.evaluate(Ok(starved_process_memory()), 0);
        let verdict = gate.evaluate(
            Err(GovernorError::SamplingFailed {
                signal: "hardware",
                source: Box::new(std::io::Error::other("sysinfo unavailable")),
            }),
            1_000,
        );
        assert!(verdict.passed);
        assert!(!verdict.sampled);
        assert!(!gate.last_passed());

        // Still failing after the blip: no new edge.
        let verdict = gate.evaluate(Ok(starved_process_memory()), 2_000);
        assert!(!verdict.newly_failed);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            perfgov_core::lock_or_recover(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sampling_error_logs_below_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut gate = HardwareGate::default();
            let _ = gate.evaluate(
                Err(GovernorError::SamplingFailed {
                    signal: "hardware",
                    source: Box::new(std::io::Error::other("sysinfo unavailable")),
                }),
                0,
            );
        });

        let output = String::from_utf8_lossy(&perfgov_core::lock_or_recover(&logs.0)).into_owned();
        let line = output
            .lines()
            .find(|line| line.contains("gate fails open"))
            .unwrap_or_default();
        assert!(line.contains("DEBUG"), "{output}");
    }

    #[test]
    fn warnings_are_rate_limited() {
        let mut gate = HardwareGate::default();
        assert!(gate.evaluate(Ok(starved_process_memory()), 0).warning.is_some());
        assert!(gate.evaluate(Ok(healthy()), 1_000).passed);

        let second_edge = gate.evaluate(Ok(starved_process_memory()), 10_000);
        assert!(second_edge.newly_failed);
        assert!(second_edge.warning.is_none(), "inside 30s cooldown");

        assert!(gate.evaluate(Ok(healthy()), 20_000).passed);
        let third_edge = gate.evaluate(Ok(starved_process_memory()), 40_001);
        assert!(third_edge.warning.is_some());
    }

    #[test]
    fn sustained_failure_is_not_a_new_edge() {
        let mut gate = HardwareGate::default();
        assert!(gate.evaluate(Ok(starved_process_memory()), 0).newly_failed);
        assert!(!gate.evaluate(Ok(starved_process_memory()), 100_000).newly_failed);
    }

    #[test]
    fn validate_rejects_negative_minimums() {
        let thresholds = HardwareThresholds {
            min_free_system_memory_gb: -1.0,
            ..HardwareThresholds::default()
        };
        let err = HardwareGate::new(thresholds, 30_000, "x").unwrap_err();
        assert!(err.to_string().contains("hardware.min_free_system_memory_gb"));
    }
}
