//! Bounded retry with exponential backoff.
//!
//! A failed call is retried only when [`QueryGateError::is_retryable`] holds
//! (network failures, 429, 503). Between attempts the wrapper sleeps
//! `base_delay * 2^attempt_index`, without jitter. Once attempts are exhausted
//! the last failure is returned.

use crate::{Result, config::ServerConfig};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Suspends the current task between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt count and base delay for one backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first
    pub attempts: u32,
    /// Delay before the second try; doubles for each later one
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `attempts` is raised to at least 1.
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Policy taken from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay)
    }

    /// Sleep after the failed attempt at `attempt_index` (0-based).
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `call` under `policy`, sleeping through `sleeper` between attempts.
///
/// # Errors
/// Returns the first terminal error, or the last retryable error once all
/// attempts are used.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt_index = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt_index.saturating_add(1) < policy.attempts => {
                let delay = policy.delay_for(attempt_index);
                tracing::warn!(
                    operation,
                    attempt = attempt_index.saturating_add(1),
                    max_attempts = policy.attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retryable backend failure: {}",
                    error
                );
                sleeper.sleep(delay).await;
                attempt_index = attempt_index.saturating_add(1);
            }
            Err(error) => {
                if error.is_retryable() {
                    tracing::error!(
                        operation,
                        attempts = policy.attempts,
                        "Backend call failed after all attempts: {}",
                        error
                    );
                }
                return Err(error);
            }
        }
    }
}
