use rand::Rng;
use serde::{Serialize, Deserialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

use crate::models::GenerationError;

pub const JITTER_RATIO: f64 = 0.25;

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total endpoint calls allowed, including the first one.
    pub max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "baseDelayMs")]
    pub base_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "maxDelayMs")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self
    }
}

/// Un-jittered delay before retrying after failed `attempt`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.max(1) - 1;
    let multiplier = if config.backoff_multiplier.is_finite() { config.backoff_multiplier.max(0.0) } else { 1.0 };
    let base_ms = config.base_delay.as_millis() as f64;
    let max_ms = config.max_delay.as_millis() as f64;
    if base_ms <= 0.0 {
        return Duration::ZERO;
    }
    let raw = base_ms * multiplier.powi(exponent.min(i32::MAX as u32) as i32);
    // powi overflows to inf for large attempts
    let capped = if raw.is_finite() { raw.min(max_ms) } else { max_ms };
    Duration::from_millis(capped.max(0.0) as u64)
}

pub fn apply_jitter(delay: Duration, sample: f64, max_delay: Duration) -> Duration {
    let sample = sample.clamp(-1.0, 1.0);
    let jittered = delay.as_millis() as f64 * (1.0 + JITTER_RATIO * sample);
    let clamped = jittered.max(0.0).min(max_delay.as_millis() as f64);
    Duration::from_millis(clamped.round() as u64)
}

pub fn next_delay<R: Rng>(attempt: u32, config: &RetryConfig, rng: &mut R) -> Duration {
    let sample = rng.gen_range(-1.0..=1.0);
    apply_jitter(backoff_delay(attempt, config), sample, config.max_delay)
}

pub fn should_retry(error: &GenerationError, attempt: u32, config: &RetryConfig) -> bool {
    error.retryable && attempt < config.max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn backoff_doubles_until_capped() {
        let config = RetryConfig::default();
        let expected = [1000, 2000, 4000, 8000, 8000, 8000];
        for (i, &ms) in expected.iter().enumerate() {
            assert_eq!(backoff_delay(i as u32 + 1, &config), Duration::from_millis(ms));
        }
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(0, &config), Duration::from_millis(1000));
    }

    #[test]
    fn huge_attempts_stay_at_cap() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(u32::MAX, &config), Duration::from_millis(8000));
    }

    #[test]
    fn zero_base_delay_never_backs_off() {
        let config = RetryConfig { base_delay: Duration::ZERO, ..Default::default() };
        assert_eq!(backoff_delay(u32::MAX, &config), Duration::ZERO);
        assert_eq!(backoff_delay(3, &config), Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(next_delay(2000, &config, &mut rng), Duration::ZERO);
    }

    #[test]
    fn first_retry_jitters_within_a_quarter() {
        let config = RetryConfig::default();
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ms = next_delay(1, &config, &mut rng).as_millis();
            assert!((750..=1250).contains(&ms), "seed {seed} gave {ms}ms");
        }
    }

    #[test]
    fn capped_retry_never_exceeds_max_delay() {
        let config = RetryConfig::default();
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ms = next_delay(4, &config, &mut rng).as_millis();
            assert!((6000..=8000).contains(&ms), "seed {seed} gave {ms}ms");
        }
    }

    #[test]
    fn jitter_extremes_are_deterministic() {
        let max = Duration::from_secs(60);
        let delay = Duration::from_millis(1000);
        assert_eq!(apply_jitter(delay, -1.0, max), Duration::from_millis(750));
        assert_eq!(apply_jitter(delay, 0.0, max), Duration::from_millis(1000));
        assert_eq!(apply_jitter(delay, 1.0, max), Duration::from_millis(1250));
        assert_eq!(apply_jitter(delay, 7.0, max), Duration::from_millis(1250));
        assert_eq!(apply_jitter(Duration::ZERO, -1.0, max), Duration::ZERO);
    }

    #[test]
    fn retry_requires_retryable_error_and_budget() {
        let config = RetryConfig::default();
        let transient = GenerationError::overloaded("busy");
        assert!(should_retry(&transient, 1, &config));
        assert!(should_retry(&transient, 2, &config));
        assert!(!should_retry(&transient, 3, &config));

        let invalid = GenerationError::validation("bad");
        for attempt in 0..10 {
            assert!(!should_retry(&invalid, attempt, &config));
        }
    }

    #[test]
    fn normalized_keeps_at_least_one_attempt() {
        let config = RetryConfig { max_attempts: 0, ..Default::default() }.normalized();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn serializes_delays_as_milliseconds() {
        let json = serde_json::to_value(RetryConfig::default()).unwrap();
        assert_eq!(json["maxAttempts"], 3);
        assert_eq!(json["baseDelayMs"], 1000);
        assert_eq!(json["maxDelayMs"], 8000);
        assert_eq!(json["backoffMultiplier"], 2.0);
    }
}
