//! Bounded exponential-backoff retry
//!
//! Only rate-limit-classified failures are retried. Terminal failures and
//! exhausted budgets propagate the last error unchanged.

use crate::error::GenerationError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Decides whether a failure is worth another attempt
pub trait RetryClassifier {
    /// Whether the failure signals quota exhaustion
    fn is_rate_limited(&self) -> bool;
}

impl RetryClassifier for GenerationError {
    fn is_rate_limited(&self) -> bool {
        GenerationError::is_rate_limited(self)
    }
}

/// Retry budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Create policy; a zero attempt budget is treated as one attempt
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Total attempts, first call included
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second attempt
    #[inline]
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Delay slept after the given failed attempt (1-based)
    #[inline]
    #[must_use]
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1 << doublings)
    }

    /// Upper bound on total backoff sleeping
    #[must_use]
    pub fn worst_case_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `operation`, retrying rate-limited failures
    ///
    /// Sleeping suspends only the calling task.
    ///
    /// # Errors
    /// The final error once attempts are exhausted, or the first terminal
    /// error.
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifier + Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts && error.is_rate_limited() => {
                    let delay = self.delay_after_attempt(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        remaining = self.max_attempts - attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "rate limit hit, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_ASSET_MAX_ATTEMPTS,
            Duration::from_millis(crate::config::DEFAULT_ASSET_INITIAL_DELAY_MS),
        )
    }
}
