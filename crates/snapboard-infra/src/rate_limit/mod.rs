//! Rate limiting service
//!
//! `RateLimiter` answers "may `identifier` perform `purpose` now?" against a
//! pluggable `RateLimitStore`. The in-memory store keeps a sliding log per key; the
//! Postgres store keeps a fixed-window counter row shared by every instance.

use async_trait::async_trait;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

mod limiter;
mod memory;
#[cfg(feature = "rate-limit-postgres")]
mod postgres;

pub use limiter::{FailurePolicy, RateLimiter};
pub use memory::MemoryRateLimitStore;
#[cfg(feature = "rate-limit-postgres")]
pub use postgres::PostgresRateLimitStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Rejected { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// What a request is being limited for. Each purpose has its own counter per identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPurpose {
    Api,
    Metadata,
    Batch,
    Webhook,
}

impl RateLimitPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitPurpose::Api => "api",
            RateLimitPurpose::Metadata => "metadata",
            RateLimitPurpose::Batch => "batch",
            RateLimitPurpose::Webhook => "webhook",
        }
    }
}

impl Display for RateLimitPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("Rate limit backend error: {0}")]
    Backend(String),
}

/// Counter storage behind the rate limiter.
///
/// `check_and_record` must be atomic per key: two concurrent callers can never both
/// take the last slot.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Round a wait up to whole seconds, never below 1.
pub(crate) fn retry_after_secs(wait: Duration) -> u64 {
    (wait.as_secs_f64().ceil() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
