//! Snapboard Infrastructure Library
//!
//! Shared infrastructure used by the services and the HTTP layer:
//! - Rate limiting (in-memory and Postgres-backed)
//! - Response cache with reverse-index invalidation
//! - Bounded exponential-backoff retry
//! - Webhook signature verification
//! - Telemetry initialization

pub mod cache;
pub mod rate_limit;
pub mod retry;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "webhook")]
pub mod webhook;

// Re-export commonly used types
pub use cache::{cache_key, ResponseCache};
pub use rate_limit::{
    FailurePolicy, MemoryRateLimitStore, RateLimitDecision, RateLimitPurpose, RateLimitStore,
    RateLimiter,
};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(feature = "webhook")]
pub use webhook::{WebhookNotification, WebhookVerifier};
