use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::controller::ControllerConfig;
use crate::endpoint::MockConfig;
use crate::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StudioConfig {
    pub data_dir: Option<PathBuf>,
    pub mock: MockConfig,
    pub controller: ControllerConfig,
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: Duration| {
            parse_var::<u64>(&lookup, key).map(Duration::from_millis).unwrap_or(default)
        };

        let mock_defaults = MockConfig::default();
        let mut min_delay = millis("STUDIO_MIN_DELAY_MS", mock_defaults.min_delay);
        let mut max_delay = millis("STUDIO_MAX_DELAY_MS", mock_defaults.max_delay);
        if min_delay > max_delay {
            std::mem::swap(&mut min_delay, &mut max_delay);
        }
        let error_rate = parse_var::<f64>(&lookup, "STUDIO_ERROR_RATE")
            .filter(|rate| rate.is_finite())
            .map(|rate| rate.clamp(0.0, 1.0))
            .unwrap_or(mock_defaults.error_rate);

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: parse_var(&lookup, "STUDIO_MAX_ATTEMPTS").unwrap_or(retry_defaults.max_attempts),
            base_delay: millis("STUDIO_BASE_DELAY_MS", retry_defaults.base_delay),
            max_delay: millis("STUDIO_MAX_BACKOFF_MS", retry_defaults.max_delay),
            backoff_multiplier: parse_var::<f64>(&lookup, "STUDIO_BACKOFF_MULTIPLIER")
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(retry_defaults.backoff_multiplier),
        }
        .normalized();

        let controller_defaults = ControllerConfig::default();
        Self {
            data_dir: lookup("STUDIO_DATA_DIR").filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            mock: MockConfig { error_rate, min_delay, max_delay },
            controller: ControllerConfig {
                retry,
                progress_step: millis("STUDIO_PROGRESS_STEP_MS", controller_defaults.progress_step),
            },
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}
