//! Retry policy implementation.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Errors raised when building an invalid [`RetryPolicy`].
#[derive(Debug, Error)]
pub enum RetryError {
    /// Invalid policy parameter.
    #[error("invalid retry configuration: {0}")]
    Config(String),
}

/// A bounded retry schedule with linearly increasing delay.
///
/// `max_retry` is the total number of attempts. The executor sleeps
/// `retry_delay` before the first attempt and adds `extra_delay` to the
/// wait after every failed attempt, so with `(3, 500ms, 500ms)` the
/// attempts run after 500ms, 1000ms and 1500ms of waiting respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retry: u32,
    retry_delay: Duration,
    extra_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_delay: Duration::from_millis(500),
            extra_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// # Errors
    /// Returns [`RetryError::Config`] if `max_retry` is zero. Delays may
    /// be zero; a zero delay still yields to the runtime before the
    /// attempt runs.
    pub fn new(
        max_retry: u32,
        retry_delay: Duration,
        extra_delay: Duration,
    ) -> Result<Self, RetryError> {
        if max_retry == 0 {
            return Err(RetryError::Config(
                "max_retry must be greater than zero".into(),
            ));
        }

        Ok(Self {
            max_retry,
            retry_delay,
            extra_delay,
        })
    }

    /// Total number of attempts the policy allows.
    #[must_use]
    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Delay before the first attempt.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Delay added after every failed attempt.
    #[must_use]
    pub fn extra_delay(&self) -> Duration {
        self.extra_delay
    }

    /// Run `job` until it succeeds or the attempt budget is exhausted.
    ///
    /// The final failure is returned unchanged; intermediate failures are
    /// logged at debug level.
    pub async fn run<T, E, F, Fut>(&self, mut job: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.retry_delay;

        for attempt in 1..=self.max_retry {
            sleep(delay).await;

            match job().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt == self.max_retry => {
                    tracing::debug!(attempt, error = %error, "retry budget exhausted");
                    return Err(error);
                }
                Err(error) => {
                    tracing::debug!(attempt, error = %error, "attempt failed, retrying");
                    delay += self.extra_delay;
                }
            }
        }

        // The loop always returns on the last attempt.
        unreachable!("retry loop exited without settling")
    }
}

/// Resolve after `duration` has elapsed.
///
/// A zero duration never blocks but still suspends, so the caller always
/// observes an await point.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}
