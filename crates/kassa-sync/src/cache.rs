//! # Response Cache
//!
//! In-memory read cache owned by the shared-store client.
//!
//! Entries older than the TTL read as absent. Any mutating call clears
//! the whole cache; the dataset is small and partial invalidation is
//! where stale-read bugs come from.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Bumped by every `clear`.
    generation: u64,
}

/// TTL cache keyed by logical resource name (e.g. `products`,
/// `products/p-1`, `products?q=bana`).
///
/// Readers take the [`generation`](Self::generation) before their request
/// and hand it back to [`put`](Self::put). A clear in between makes the
/// put a no-op, so a read racing a mutation never caches the old answer.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Fresh value for `key`. Expired entries are evicted on read.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock().await;
        match state.entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Stores `value` unless the cache was cleared after `generation` was
    /// read. Returns whether it was stored.
    pub async fn put(&self, key: impl Into<String>, value: Value, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return false;
        }
        state.entries.insert(
            key.into(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
        true
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        cache.put("products", json!([{"id": "p-1"}]), 0).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("products").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("products").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let generation = cache.generation().await;
        cache.put("products", json!([]), generation).await;
        cache.put("employees", json!([]), generation).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert!(cache.get("products").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_read_started_before_clear_is_not_cached() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let before = cache.generation().await;

        // A mutation lands while the read is in flight
        cache.clear().await;

        assert!(!cache.put("products", json!([{"id": "p-old"}]), before).await);
        assert!(cache.get("products").await.is_none());

        let after = cache.generation().await;
        assert!(cache.put("products", json!([{"id": "p-new"}]), after).await);
        assert_eq!(cache.get("products").await, Some(json!([{"id": "p-new"}])));
    }
}
