//! Retry policy shared by every fetch path.
//!
//! # Responsibilities
//! - Run an attempt up to `max_attempts` times
//! - Sleep `calculate_backoff(attempt)` between attempts (linear by default)
//! - Stop early on errors that another attempt cannot fix
//! - Wrap the final attempt error in `ExhaustedRetries`

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{FetchError, Result};
use crate::resilience::backoff::{calculate_backoff, BackoffStrategy};

/// Parameters for [`RetryPolicy::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            strategy: config.strategy,
        }
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            self.strategy,
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.jitter,
        )
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Terminal errors
    /// (see [`FetchError::is_terminal`]) are returned unchanged; any other
    /// error that ends the loop is wrapped in `ExhaustedRetries`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.max_attempts || !err.is_retryable() {
                tracing::warn!(attempts = attempt, error = %err, "Giving up");
                return Err(FetchError::ExhaustedRetries {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            tracing::info!(attempt, delay = ?delay, error = %err, "Attempt failed, backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
