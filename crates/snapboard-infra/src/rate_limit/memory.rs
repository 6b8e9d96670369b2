use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{retry_after_secs, RateLimitDecision, RateLimitStore, RateLimitStoreError};

type Shard = Arc<Mutex<HashMap<String, VecDeque<Instant>>>>;

/// Sliding-log rate limit store held in process memory
///
/// Keys are spread across mutex shards to reduce contention; each key holds the
/// timestamps of its accepted requests inside the current window.
#[derive(Clone)]
pub struct MemoryRateLimitStore {
    shards: Vec<Shard>,
    shard_count: usize,
}

impl MemoryRateLimitStore {
    /// Create a store with the default shard count (16 shards)
    pub fn new() -> Self {
        Self::with_shards(16)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            shard_count,
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }

    /// Drop timestamps that left the window and remove keys left empty.
    pub async fn cleanup_expired(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        for shard in &self.shards {
            let mut logs = shard.lock().await;
            let before = logs.len();
            logs.retain(|_, log| {
                prune(log, now, window);
                !log.is_empty()
            });
            removed += before - logs.len();
        }

        if removed > 0 {
            tracing::debug!(keys_removed = removed, "Cleaned up idle rate limit keys");
        }
        removed
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let now = Instant::now();
        let shard_index = self.shard_index(key);
        let mut logs = self.shards[shard_index].lock().await;

        let log = logs.entry(key.to_string()).or_default();
        prune(log, now, window);

        if log.len() >= limit as usize {
            let wait = match log.front() {
                Some(oldest) => (*oldest + window).saturating_duration_since(now),
                None => window,
            };
            if log.is_empty() {
                logs.remove(key);
            }
            tracing::debug!(
                key = %key,
                shard_index = shard_index,
                limit = limit,
                "Rate limit reached"
            );
            return Ok(RateLimitDecision::Rejected {
                retry_after_secs: retry_after_secs(wait),
            });
        }

        log.push_back(now);
        let remaining = limit.saturating_sub(log.len() as u32);
        Ok(RateLimitDecision::Allowed { remaining })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_allows_exactly_limit_then_rejects() {
        let store = MemoryRateLimitStore::new();

        for expected_remaining in (0..5).rev() {
            let decision = store.check_and_record("api:1.2.3.4", 5, WINDOW).await.unwrap();
            assert_eq!(
                decision,
                RateLimitDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }

        match store.check_and_record("api:1.2.3.4", 5, WINDOW).await.unwrap() {
            RateLimitDecision::Rejected { retry_after_secs } => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_again_after_window() {
        let store = MemoryRateLimitStore::new();
        for _ in 0..3 {
            store.check_and_record("k", 3, WINDOW).await.unwrap();
        }
        assert!(!store.check_and_record("k", 3, WINDOW).await.unwrap().is_allowed());

        tokio::time::advance(WINDOW).await;
        assert!(store.check_and_record("k", 3, WINDOW).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let store = MemoryRateLimitStore::new();
        store.check_and_record("k", 2, WINDOW).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        store.check_and_record("k", 2, WINDOW).await.unwrap();

        // First entry is 40s old: retry once it ages out in 20s.
        tokio::time::advance(Duration::from_secs(10)).await;
        match store.check_and_record("k", 2, WINDOW).await.unwrap() {
            RateLimitDecision::Rejected { retry_after_secs } => assert_eq!(retry_after_secs, 20),
            other => panic!("expected rejection, got {:?}", other),
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(
            store.check_and_record("k", 2, WINDOW).await.unwrap(),
            RateLimitDecision::Allowed { remaining: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let store = MemoryRateLimitStore::with_shards(1);
        store.check_and_record("api:a", 1, WINDOW).await.unwrap();
        assert!(!store.check_and_record("api:a", 1, WINDOW).await.unwrap().is_allowed());
        assert!(store.check_and_record("api:b", 1, WINDOW).await.unwrap().is_allowed());
        assert!(store.check_and_record("batch:a", 1, WINDOW).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_never_exceed_limit() {
        let store = MemoryRateLimitStore::new();
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.check_and_record("hot", 10, WINDOW).await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_idle_keys() {
        let store = MemoryRateLimitStore::new();
        store.check_and_record("a", 5, WINDOW).await.unwrap();
        store.check_and_record("b", 5, WINDOW).await.unwrap();
        assert_eq!(store.tracked_keys().await, 2);

        tokio::time::advance(WINDOW).await;
        assert_eq!(store.cleanup_expired(WINDOW).await, 2);
        assert_eq!(store.tracked_keys().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_rejects_without_tracking() {
        let store = MemoryRateLimitStore::new();
        match store.check_and_record("k", 0, WINDOW).await.unwrap() {
            RateLimitDecision::Rejected { retry_after_secs } => assert_eq!(retry_after_secs, 60),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(store.tracked_keys().await, 0);
    }
}
