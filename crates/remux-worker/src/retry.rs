//! Per-unit retry policy with exponential backoff.
//!
//! One policy applies uniformly to every stage unit; there is no
//! stage-specific retry logic. Job-level retry is not handled here at
//! all — that is the broker's redelivery.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy for a single unit invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("UNIT_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            base_delay: Duration::from_millis(
                std::env::var("UNIT_RETRY_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            max_delay: defaults.max_delay,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Run an operation, retrying failures the predicate accepts.
    ///
    /// The last error is returned once attempts are exhausted or the
    /// predicate rejects an error.
    pub async fn run<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        retryable: P,
        operation: F,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.max_attempts && retryable(&e) => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} attempt {} failed, retrying in {:?}: {}",
                        operation_name, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
