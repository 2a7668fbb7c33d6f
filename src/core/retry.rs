//! Retry logic with exponential backoff
//!
//! Phases that talk to external systems retry transient failures a bounded
//! number of times. Whether an error is transient is decided by its
//! [`Retryable`] implementation, never by matching on message text.

use crate::core::error::Retryable;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Options for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(rename = "initialDelayMs", with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(rename = "maxDelayMs", with = "millis")]
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryOptions {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
        }
    }
}

/// Value or error together with the number of attempts spent on it
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use course_publisher::core::{AdapterError, RetryManager, RetryOptions};
///
/// # async fn example() {
/// let manager = RetryManager::new(RetryOptions::default());
/// let outcome = manager
///     .retry(|| async { Ok::<_, AdapterError>("fetched") })
///     .await;
/// assert_eq!(outcome.unwrap().attempts, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Execute the given async operation with retry logic
    ///
    /// Non-retryable errors return immediately. The error of the last
    /// attempt is returned once `max_attempts` is reached.
    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> Result<Attempted<T>, Attempted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    if !error.is_retryable() || attempt >= max_attempts {
                        return Err(Attempted {
                            value: error,
                            attempts: attempt,
                        });
                    }

                    debug!(attempt, ?delay, %error, "retrying after transient failure");
                    sleep(delay).await;

                    delay = Duration::try_from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .unwrap_or(self.options.max_delay)
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Serialize a `Duration` as whole milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
