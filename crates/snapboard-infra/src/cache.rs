//! TTL response cache with a reverse index for invalidation.
//!
//! Entries are keyed by `operation?k1=v1&k2=v2` with parameters sorted, so the same
//! call with parameters in any order hits the same entry. Each entry may name the
//! resource ids it depends on; `invalidate_resource` drops exactly those entries.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Build a cache key from an operation name and its parameters.
pub fn cache_key(operation: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));

    let query = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    if query.is_empty() {
        operation.to_string()
    } else {
        format!("{}?{}", operation, query)
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    dependencies: Vec<String>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

struct CacheInner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    /// resource id -> keys of entries that depend on it
    dependents: HashMap<String, HashSet<String>>,
}

impl<V> CacheInner<V> {
    fn unlink(&mut self, key: &str, dependencies: &[String]) {
        for dep in dependencies {
            if let Some(keys) = self.dependents.get_mut(dep) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.unlink(key, &entry.dependencies);
                true
            }
            None => false,
        }
    }
}

/// Bounded, thread-safe TTL cache.
///
/// The lock is never held across an await point.
pub struct ResponseCache<V> {
    inner: Mutex<CacheInner<V>>,
    default_ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                dependents: HashMap::new(),
            }),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live value for `key`. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
            tracing::trace!(key = %key, "Cache entry expired");
        }
        None
    }

    pub fn insert(&self, key: String, value: V, ttl: Option<Duration>, dependencies: Vec<String>) {
        let mut inner = self.lock();
        inner.remove(&key);

        for dep in &dependencies {
            inner
                .dependents
                .entry(dep.clone())
                .or_default()
                .insert(key.clone());
        }

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            dependencies,
        };

        if let Some((evicted_key, evicted)) = inner.entries.push(key.clone(), entry) {
            if evicted_key != key {
                inner.unlink(&evicted_key, &evicted.dependencies);
                tracing::trace!(key = %evicted_key, "Evicted least recently used cache entry");
            }
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    /// Drop every entry that depends on `resource_id`. Returns how many were dropped.
    pub fn invalidate_resource(&self, resource_id: &str) -> usize {
        let mut inner = self.lock();
        let keys = inner.dependents.remove(resource_id).unwrap_or_default();

        let mut removed = 0;
        for key in keys {
            if inner.remove(&key) {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(resource_id = %resource_id, entries = removed, "Invalidated cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.dependents.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = cache_key("list", &params(&[("user", "u1"), ("game", "3")]));
        let b = cache_key("list", &params(&[("game", "3"), ("user", "u1")]));
        assert_eq!(a, b);
        assert_eq!(a, "list?game=3&user=u1");
        assert_eq!(cache_key("health", &[]), "health");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_then_miss_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(300), 10);
        cache.insert("k".to_string(), 1, Some(Duration::from_secs(5)), vec![]);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let cache = ResponseCache::new(Duration::from_secs(300), 10);
        cache.insert("k".to_string(), "v", None, vec![]);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k"), Some("v"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_invalidate_resource_uses_reverse_index() {
        let cache = ResponseCache::new(Duration::from_secs(300), 10);
        cache.insert("list?game=1".to_string(), 1, None, vec!["p1".into(), "p2".into()]);
        cache.insert("list?game=2".to_string(), 2, None, vec!["p3".into()]);
        cache.insert("list?game=10".to_string(), 3, None, vec!["p1".into()]);

        assert_eq!(cache.invalidate_resource("p1"), 2);
        assert_eq!(cache.get("list?game=1"), None);
        assert_eq!(cache.get("list?game=10"), None);
        assert_eq!(cache.get("list?game=2"), Some(2));
        assert_eq!(cache.invalidate_resource("p1"), 0);
    }

    #[test]
    fn test_lru_eviction_unlinks_dependencies() {
        let cache = ResponseCache::new(Duration::from_secs(300), 2);
        cache.insert("a".to_string(), 1, None, vec!["p".into()]);
        cache.insert("b".to_string(), 2, None, vec![]);
        cache.insert("c".to_string(), 3, None, vec![]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.invalidate_resource("p"), 0);
    }

    #[test]
    fn test_reinsert_replaces_dependencies() {
        let cache = ResponseCache::new(Duration::from_secs(300), 10);
        cache.insert("k".to_string(), 1, None, vec!["old".into()]);
        cache.insert("k".to_string(), 2, None, vec!["new".into()]);

        assert_eq!(cache.invalidate_resource("old"), 0);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.invalidate_resource("new"), 1);
    }
}
