//! Retry with exponential backoff for operations that fail transiently
//!
//! Unlike [`poll_until`](crate::poll::poll_until), which waits for a condition, this
//! re-runs an *action* that errors while something it depends on is still being
//! created (a CRD not yet registered, a new identity not yet replicated).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Backoff schedule for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Fixed delay between attempts, enough attempts to cover `window`.
    #[must_use]
    pub fn fixed_within(delay: Duration, window: Duration) -> Self {
        let attempts = if delay.is_zero() {
            1
        } else {
            u32::try_from(window.as_nanos() / delay.as_nanos()).unwrap_or(u32::MAX - 1) + 1
        };
        Self {
            max_attempts: attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempts are exhausted. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
}
