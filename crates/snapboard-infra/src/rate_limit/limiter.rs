use std::sync::Arc;
use std::time::Duration;

use super::{
    retry_after_secs, MemoryRateLimitStore, RateLimitDecision, RateLimitPurpose, RateLimitStore,
};

/// What to do when the counter store itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Allow the request through.
    Open,
    /// Reject the request as if the limit were hit.
    #[default]
    Closed,
}

/// Rate limiter keyed by `{purpose}:{identifier}`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        window: Duration,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            window,
            failure_policy,
        }
    }

    /// In-memory limiter, failing closed.
    pub fn in_memory(window: Duration) -> Self {
        Self::new(
            Arc::new(MemoryRateLimitStore::new()),
            window,
            FailurePolicy::Closed,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn check(
        &self,
        identifier: &str,
        limit: u32,
        purpose: RateLimitPurpose,
    ) -> RateLimitDecision {
        let key = format!("{}:{}", purpose, identifier);

        match self.store.check_and_record(&key, limit, self.window).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    policy = ?self.failure_policy,
                    "Rate limit store failed"
                );
                match self.failure_policy {
                    FailurePolicy::Open => RateLimitDecision::Allowed { remaining: limit },
                    FailurePolicy::Closed => RateLimitDecision::Rejected {
                        retry_after_secs: retry_after_secs(self.window),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::RateLimitStoreError;
    use super::*;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn check_and_record(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
        ) -> Result<RateLimitDecision, RateLimitStoreError> {
            Err(RateLimitStoreError::Backend("connection refused".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_purposes_have_separate_counters() {
        let limiter = RateLimiter::in_memory(Duration::from_secs(60));
        assert!(limiter.check("1.2.3.4", 1, RateLimitPurpose::Api).await.is_allowed());
        assert!(!limiter.check("1.2.3.4", 1, RateLimitPurpose::Api).await.is_allowed());
        assert!(limiter
            .check("1.2.3.4", 1, RateLimitPurpose::Batch)
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_on_store_error() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            Duration::from_secs(30),
            FailurePolicy::Closed,
        );
        assert_eq!(
            limiter.check("x", 10, RateLimitPurpose::Metadata).await,
            RateLimitDecision::Rejected {
                retry_after_secs: 30
            }
        );
    }

    #[tokio::test]
    async fn test_fail_open_allows_on_store_error() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            Duration::from_secs(30),
            FailurePolicy::Open,
        );
        assert_eq!(
            limiter.check("x", 10, RateLimitPurpose::Webhook).await,
            RateLimitDecision::Allowed { remaining: 10 }
        );
    }

    #[test]
    fn test_default_policy_is_closed() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Closed);
    }
}
