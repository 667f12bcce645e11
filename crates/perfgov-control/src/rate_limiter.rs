//! Message rate limit that follows host throughput.
//!
//! A healthy host allows `base + 5` messages per minute, a slightly degraded
//! one `base`, a struggling one `base - 3`, and a critical one the floor. The
//! limit is re-derived at most once per adjust interval, and immediately when
//! the base changes.

use perfgov_core::tracing_config::targets;
use perfgov_core::{GovernorError, GovernorResult};
use serde::{Deserialize, Serialize};

use crate::decision::RateThresholds;
use crate::window::SlidingWindow;

const DEFAULT_MIN_LIMIT: u32 = 3;
const DEFAULT_MAX_LIMIT: u32 = 20;
const DEFAULT_BASE_LIMIT: u32 = 10;
const DEFAULT_ADJUST_INTERVAL_MS: u64 = 5_000;
const DEFAULT_WINDOW_MS: u64 = 60_000;
const HEALTHY_BONUS: u32 = 5;
const STRUGGLING_PENALTY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub min_limit: u32,
    pub max_limit: u32,
    pub base_limit: u32,
    pub adjust_interval_ms: u64,
    /// Trailing window that [`AdaptiveRateLimiter::is_allowed`] counts over.
    pub window_ms: u64,
    pub thresholds: RateThresholds,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            base_limit: DEFAULT_BASE_LIMIT,
            adjust_interval_ms: DEFAULT_ADJUST_INTERVAL_MS,
            window_ms: DEFAULT_WINDOW_MS,
            thresholds: RateThresholds::default(),
        }
    }
}

impl RateLimiterConfig {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] unless
    /// `1 <= min <= base <= max`, with valid thresholds.
    pub fn validate(self) -> GovernorResult<Self> {
        if self.min_limit == 0 || self.min_limit > self.max_limit {
            return Err(GovernorError::invalid_config(
                "rate_limit.min_limit",
                self.min_limit,
                format!("must be between 1 and max_limit ({})", self.max_limit),
            ));
        }
        if !(self.min_limit..=self.max_limit).contains(&self.base_limit) {
            return Err(GovernorError::invalid_config(
                "rate_limit.base_limit",
                self.base_limit,
                format!(
                    "must be between {} and {}",
                    self.min_limit, self.max_limit
                ),
            ));
        }
        self.thresholds.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TemporaryLimit {
    limit: u32,
    until_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    current: u32,
    last_adjust_ms: Option<u64>,
    last_rate: Option<f64>,
    temporary: Option<TemporaryLimit>,
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        let config = RateLimiterConfig::default();
        Self {
            current: config.base_limit,
            config,
            last_adjust_ms: None,
            last_rate: None,
            temporary: None,
        }
    }
}

impl AdaptiveRateLimiter {
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `config` is invalid.
    pub fn new(config: RateLimiterConfig) -> GovernorResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            current: config.base_limit,
            config,
            last_adjust_ms: None,
            last_rate: None,
            temporary: None,
        })
    }

    /// Effective limit at `now_ms`; an unexpired temporary limit wins.
    #[must_use]
    pub fn current_limit(&self, now_ms: u64) -> u32 {
        match self.temporary {
            Some(temp) if now_ms < temp.until_ms => temp.limit,
            _ => self.current,
        }
    }

    #[must_use]
    pub const fn base_limit(&self) -> u32 {
        self.config.base_limit
    }

    /// Re-derive the limit from `rate`. Returns the new limit when an
    /// adjustment ran, `None` inside the adjust interval.
    pub fn adjust(&mut self, rate: f64, now_ms: u64) -> Option<u32> {
        if let Some(last) = self.last_adjust_ms
            && now_ms.saturating_sub(last) < self.config.adjust_interval_ms
        {
            return None;
        }

        let next = self.limit_for(rate);
        let previous = std::mem::replace(&mut self.current, next);
        self.last_adjust_ms = Some(now_ms);
        self.last_rate = Some(rate);
        if previous != next {
            tracing::debug!(
                target: targets::EVENTS,
                previous,
                next,
                observed_rate = rate,
                "message rate limit adjusted"
            );
        }
        Some(next)
    }

    /// Whether one more message fits in the trailing window of `history`.
    #[must_use]
    pub fn is_allowed(&self, history: &SlidingWindow, now_ms: u64) -> bool {
        let count = history.count_within(now_ms, self.config.window_ms);
        u32::try_from(count).unwrap_or(u32::MAX) < self.current_limit(now_ms)
    }

    /// Change the base and re-derive the limit from the last observed rate
    /// without waiting for the adjust interval.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `limit` is outside the
    /// configured bounds.
    pub fn set_base_limit(&mut self, limit: u32) -> GovernorResult<()> {
        self.check_bounds("rate_limit.base_limit", limit)?;
        self.config.base_limit = limit;
        self.current = self.last_rate.map_or(limit, |rate| self.limit_for(rate));
        Ok(())
    }

    /// Override the limit until `now_ms + duration_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] when `limit` is outside the
    /// configured bounds.
    pub fn set_temporary_limit(
        &mut self,
        limit: u32,
        duration_ms: u64,
        now_ms: u64,
    ) -> GovernorResult<()> {
        self.check_bounds("rate_limit.temporary_limit", limit)?;
        self.temporary = Some(TemporaryLimit {
            limit,
            until_ms: now_ms.saturating_add(duration_ms),
        });
        Ok(())
    }

    /// Back to the base limit with no adjustment history.
    pub fn reset(&mut self) {
        self.current = self.config.base_limit;
        self.last_adjust_ms = None;
        self.last_rate = None;
        self.temporary = None;
    }

    fn limit_for(&self, rate: f64) -> u32 {
        let c = &self.config;
        if rate >= c.thresholds.full {
            (c.base_limit + HEALTHY_BONUS).min(c.max_limit)
        } else if rate >= c.thresholds.lite {
            c.base_limit
        } else if rate >= c.thresholds.basic {
            c.base_limit.saturating_sub(STRUGGLING_PENALTY).max(c.min_limit)
        } else {
            c.min_limit
        }
    }

    fn check_bounds(&self, field: &str, limit: u32) -> GovernorResult<()> {
        if (self.config.min_limit..=self.config.max_limit).contains(&limit) {
            Ok(())
        } else {
            Err(GovernorError::invalid_config(
                field,
                limit,
                format!(
                    "must be between {} and {}",
                    self.config.min_limit, self.config.max_limit
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_tracks_rate_bands() {
        let mut limiter = AdaptiveRateLimiter::default();
        assert_eq!(limiter.adjust(19.5, 0), Some(15));
        assert_eq!(limiter.adjust(16.0, 5_000), Some(10));
        assert_eq!(limiter.adjust(11.0, 10_000), Some(7));
        assert_eq!(limiter.adjust(4.0, 15_000), Some(3));
    }

    #[test]
    fn adjustments_are_spaced_by_interval() {
        let mut limiter = AdaptiveRateLimiter::default();
        assert_eq!(limiter.adjust(4.0, 1_000), Some(3));
        assert_eq!(limiter.adjust(20.0, 5_999), None);
        assert_eq!(limiter.current_limit(5_999), 3);
        assert_eq!(limiter.adjust(20.0, 6_000), Some(15));
    }

    #[test]
    fn healthy_bonus_is_capped_and_penalty_floored() {
        let mut limiter = AdaptiveRateLimiter::default();
        limiter.set_base_limit(18).unwrap();
        assert_eq!(limiter.adjust(20.0, 0), Some(20));

        limiter.set_base_limit(4).unwrap();
        assert_eq!(limiter.adjust(12.0, 10_000), Some(3));
    }

    #[test]
    fn base_change_applies_without_waiting_for_interval() {
        let mut limiter = AdaptiveRateLimiter::default();
        limiter.set_base_limit(12).unwrap();
        assert_eq!(limiter.current_limit(0), 12);

        assert_eq!(limiter.adjust(16.0, 0), Some(12));
        limiter.set_base_limit(8).unwrap();
        assert_eq!(limiter.current_limit(1), 8);

        assert_eq!(limiter.adjust(19.0, 5_000), Some(13));
        limiter.set_base_limit(6).unwrap();
        assert_eq!(limiter.current_limit(5_001), 11);
        assert_eq!(limiter.adjust(19.0, 5_002), None);
    }

    #[test]
    fn window_admission_uses_current_limit() {
        let mut limiter = AdaptiveRateLimiter::default();
        limiter.adjust(4.0, 0);
        let mut history = SlidingWindow::with_capacity(32);
        for stamp in [1_000, 2_000] {
            history.record(stamp);
        }
        assert!(limiter.is_allowed(&history, 3_000));
        history.record(2_500);
        assert!(!limiter.is_allowed(&history, 3_000));
        // The first messages age out of the minute window.
        assert!(limiter.is_allowed(&history, 62_200));
    }

    #[test]
    fn temporary_limit_expires_lazily() {
        let mut limiter = AdaptiveRateLimiter::default();
        limiter.set_temporary_limit(4, 10_000, 0).unwrap();
        assert_eq!(limiter.current_limit(9_999), 4);
        assert_eq!(limiter.current_limit(10_000), 10);
    }

    #[test]
    fn out_of_bounds_limits_are_rejected() {
        let mut limiter = AdaptiveRateLimiter::default();
        assert!(limiter.set_base_limit(2).is_err());
        assert!(limiter.set_base_limit(21).is_err());
        assert!(limiter.set_temporary_limit(50, 1_000, 0).is_err());
        assert_eq!(limiter.base_limit(), 10);
    }

    #[test]
    fn reset_restores_base() {
        let mut limiter = AdaptiveRateLimiter::default();
        limiter.adjust(1.0, 0);
        limiter.set_temporary_limit(5, 60_000, 0).unwrap();
        limiter.reset();
        assert_eq!(limiter.current_limit(1), 10);
        assert_eq!(limiter.adjust(1.0, 1), Some(3), "no interval after reset");
    }

    #[test]
    fn config_validation() {
        let bad = RateLimiterConfig {
            base_limit: 30,
            ..RateLimiterConfig::default()
        };
        assert!(AdaptiveRateLimiter::new(bad).is_err());
        assert!(AdaptiveRateLimiter::new(RateLimiterConfig::default()).is_ok());
    }
}
