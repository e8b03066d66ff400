//! Bounded exponential backoff around a fallible async operation.
//!
//! The delay after the k-th failure is `min(base_delay * 2^(k-1), max_delay)`.
//! When retries run out the last error is returned as-is, so callers see
//! the real cause rather than a wrapper.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::SearchError;
use crate::search::logger::StructuredLogger;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        SearchError::is_retryable(self)
    }
}

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Run `operation`, retrying retryable failures according to `policy`.
///
/// Non-retryable errors are returned immediately. Backoff sleeps only
/// suspend the calling task.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    logger: &StructuredLogger,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut failures: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => {
                failures += 1;
                if failures > policy.max_retries {
                    logger.log_retry_exhausted(operation_name, failures);
                    return Err(error);
                }

                let delay = policy.delay_for(failures);
                logger.log_retry(
                    operation_name,
                    failures,
                    policy.max_attempts(),
                    delay,
                    &error,
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
