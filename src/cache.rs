//! In-memory response cache for expensive season-wide reads.
//!
//! Probability and first-scorer rankings fold every player row of a season,
//! so the API keeps the last answer per (season, season type) for a short
//! TTL. Entries are keyed by string; expired entries are dropped lazily on
//! `get` and in bulk by `sweep_expired`.
//!
//! The cache is owned by the API state. Clones share the same store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe TTL cache with a size bound.
#[derive(Clone)]
pub struct ResponseCache<V> {
    inner: Arc<RwLock<HashMap<String, Entry<V>>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        ResponseCache {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn is_fresh(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) < self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let inner = self.inner.read().await;
            match inner.get(key) {
                Some(e) if self.is_fresh(e, now) => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Stale: drop it so the next writer starts clean.
        let mut inner = self.inner.write().await;
        if inner.get(key).is_some_and(|e| !self.is_fresh(e, now)) {
            inner.remove(key);
        }
        None
    }

    /// Insert or replace a value. When the cache is full, expired entries are
    /// swept first, then the oldest insertion is evicted.
    pub async fn set(&self, key: &str, value: V) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        if !inner.contains_key(key) && inner.len() >= self.max_entries {
            inner.retain(|_, e| now.duration_since(e.inserted_at) < self.ttl);
            if inner.len() >= self.max_entries {
                let oldest = inner
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    debug!("ResponseCache full, evicting {}", k);
                    inner.remove(&k);
                }
            }
        }

        inner.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub async fn evict(&self, key: &str) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, e| now.duration_since(e.inserted_at) < self.ttl);
        before - inner.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.set("2024:REG", 1u32).await;
        assert_eq!(cache.get("2024:REG").await, Some(1));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("2024:REG").await, Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("2024:REG").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.set("a", 1u32).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("b", 2).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_prefers_sweeping_expired() {
        let cache = ResponseCache::new(Duration::from_secs(10), 2);
        cache.set("old", 1u32).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("recent", 2).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set("new", 3).await;

        assert_eq!(cache.get("recent").await, Some(2));
        assert_eq!(cache.get("new").await, Some(3));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(5), 10);
        cache.set("a", 1u32).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.set("b", 2).await;

        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.len().await, 1);

        assert!(cache.evict("b").await);
        assert!(!cache.evict("b").await);

        cache.set("c", 3).await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        let other = cache.clone();
        cache.set("k", "v".to_string()).await;
        assert_eq!(other.get("k").await.as_deref(), Some("v"));
    }
}
