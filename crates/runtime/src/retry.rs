//! Exponential backoff for transient provider failures.

use crate::model::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry settings, as found under `[retry]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one; 0 disables retry.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Retry state for one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
    next_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            next_delay: Duration::from_millis(config.initial_delay_ms),
            config,
            attempt: 0,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_retries
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Current delay; advances the schedule for the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        self.attempt += 1;
        let grown = self.next_delay.as_millis() as f64 * self.config.backoff_multiplier;
        self.next_delay = Duration::from_millis(grown.min(self.config.max_delay_ms as f64) as u64);
        delay
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: RetryConfig,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut policy = RetryPolicy::new(config);
    loop {
        match operation().await {
            Ok(value) => {
                if policy.attempt() > 0 {
                    debug!(attempts = policy.attempt() + 1, "provider call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if !policy.should_retry() => {
                if config.max_retries > 0 {
                    warn!(max_retries = config.max_retries, error = %err, "retries exhausted");
                }
                return Err(err);
            }
            Err(err) => {
                let delay = policy.next_delay();
                warn!(attempt = policy.attempt(), ?delay, error = %err, "transient provider failure, retrying");
                sleep(delay).await;
            }
        }
    }
}
