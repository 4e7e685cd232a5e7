// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Bounded retries with capped exponential backoff for transient failures.

use crate::clock::Clock;
use crate::error::{LinkisError, Result};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Retry strategy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one; 0 disables retrying
    pub max_retries: usize,
    /// Delay before the first retry
    #[serde(with = "crate::config::duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "crate::config::duration_ms")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add ±10% jitter to each delay
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let base_millis = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base_millis.min(self.max_delay.as_millis() as f64);

        if self.jitter_enabled {
            let jitter_factor = rand::rng().random_range(0.9..=1.1);
            Duration::from_millis((capped * jitter_factor) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    clock: &dyn Clock,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if should_retry(&error, attempt, config) => {
                let delay = config.next_delay(attempt);
                tracing::warn!(
                    operation = what,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "transient failure, retrying"
                );
                clock.sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Whether a failure on attempt `attempt` (0-based) earns another try.
pub fn should_retry(error: &LinkisError, attempt: usize, config: &RetryConfig) -> bool {
    attempt < config.max_retries && error.is_retryable()
}
