//! Bounded exponential-backoff retry for remote calls.

use rand::Rng;
use snapboard_client::StoreError;
use snapboard_core::config::CacheRetryConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Errors that can tell whether retrying could help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CacheRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_delay.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + self.jitter()
    }
}

/// Failure of a retried operation, carrying the last error.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not transient; no further attempts were made.
    Permanent {
        operation: String,
        attempts: u32,
        error: E,
    },
    /// Every allowed attempt failed with a transient error.
    Exhausted {
        operation: String,
        attempts: u32,
        error: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            RetryError::Permanent { operation, .. } | RetryError::Exhausted { operation, .. } => {
                operation
            }
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Permanent {
                operation,
                attempts,
                error,
            } => write!(
                f,
                "{} failed permanently on attempt {}: {}",
                operation, attempts, error
            ),
            RetryError::Exhausted {
                operation,
                attempts,
                error,
            } => write!(
                f,
                "{} failed after {} attempts: {}",
                operation, attempts, error
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner())
    }
}

/// Run `f` until it succeeds, fails permanently, or `max_retries + 1` attempts are used.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = %operation,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                return Err(RetryError::Permanent {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    error,
                });
            }
            Err(error) => {
                if attempt + 1 >= max_attempts {
                    tracing::warn!(
                        operation = %operation,
                        attempts = attempt + 1,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                        error,
                    });
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
