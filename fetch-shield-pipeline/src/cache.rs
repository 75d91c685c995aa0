//! Last-known-good response storage.
//!
//! The stale cache keeps, per request signature, the most recent response the
//! transport classified as successful. It is written on every success and read
//! only after an attempt sequence has been exhausted. There is no expiry in the
//! default store; alternative stores (with TTLs, persistence, size bounds) plug
//! in through the [`ResponseStore`] trait.
//!
//! # Examples
//!
//! ```no_run
//! use fetch_shield_core::{Request, RequestSignature, Response};
//! use fetch_shield_pipeline::cache::{ResponseStore, StaleResponseCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = StaleResponseCache::new();
//!     let key = RequestSignature::compute(&Request::get("/messages").build());
//!
//!     cache.put(key, Arc::new(Response::ok("[]"))).await;
//!     if let Some(entry) = cache.get(&key).await {
//!         println!("cached at {}", entry.stored_at);
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fetch_shield_core::{Response, SignatureKey};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A stored response with its metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub signature: SignatureKey,
    pub response: Arc<Response>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(signature: SignatureKey, response: Arc<Response>) -> Self {
        Self {
            signature,
            response,
            stored_at: Utc::now(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    /// Lookups that found an entry.
    pub hits: u64,

    /// Lookups that found nothing.
    pub misses: u64,

    /// Successful responses recorded.
    pub writes: u64,

    /// Current number of entries in cache.
    pub current_entries: usize,

    /// Cache hit rate (0.0 - 1.0).
    pub hit_rate: f64,

    /// Timestamp when statistics were collected.
    pub collected_at: DateTime<Utc>,
}

impl CacheStatistics {
    fn new(hits: u64, misses: u64, writes: u64, current_entries: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        Self {
            hits,
            misses,
            writes,
            current_entries,
            hit_rate,
            collected_at: Utc::now(),
        }
    }
}

/// Storage backend for last-known-good responses.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Records a successful response, replacing any previous entry.
    async fn put(&self, signature: SignatureKey, response: Arc<Response>);

    /// Looks up the last successful response for a signature.
    async fn get(&self, signature: &SignatureKey) -> Option<CacheEntry>;

    /// Removes a value from the store.
    async fn remove(&self, signature: &SignatureKey) -> Option<CacheEntry>;

    /// Clears all entries.
    async fn clear(&self);

    /// Gets the current number of entries.
    async fn len(&self) -> usize;

    /// Checks if the store is empty.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Gets store statistics.
    async fn statistics(&self) -> CacheStatistics;
}

/// In-memory stale cache backed by a sharded `DashMap`.
///
/// Lookups and writes for different signatures touch different shards, and
/// an entry is always replaced whole, so readers never observe a partial
/// write.
#[derive(Debug, Default)]
pub struct StaleResponseCache {
    entries: DashMap<SignatureKey, CacheEntry>,
    stats_hits: AtomicU64,
    stats_misses: AtomicU64,
    stats_writes: AtomicU64,
}

impl StaleResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates all entries whose signature matches a predicate.
    pub fn invalidate_matching<F>(&self, predicate: F)
    where
        F: Fn(&SignatureKey) -> bool,
    {
        self.entries.retain(|key, _| !predicate(key));
    }
}

#[async_trait]
impl ResponseStore for StaleResponseCache {
    async fn put(&self, signature: SignatureKey, response: Arc<Response>) {
        self.entries
            .insert(signature, CacheEntry::new(signature, response));
        self.stats_writes.fetch_add(1, Ordering::Relaxed);
    }

    async fn get(&self, signature: &SignatureKey) -> Option<CacheEntry> {
        match self.entries.get(signature) {
            Some(entry) => {
                self.stats_hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.stats_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn remove(&self, signature: &SignatureKey) -> Option<CacheEntry> {
        self.entries.remove(signature).map(|(_, entry)| entry)
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }

    async fn statistics(&self) -> CacheStatistics {
        CacheStatistics::new(
            self.stats_hits.load(Ordering::Relaxed),
            self.stats_misses.load(Ordering::Relaxed),
            self.stats_writes.load(Ordering::Relaxed),
            self.entries.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetch_shield_core::{Request, RequestSignature};

    fn key(path: &str) -> SignatureKey {
        RequestSignature::compute(&Request::get(path).build())
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = StaleResponseCache::new();
        assert!(cache.get(&key("/nothing")).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = StaleResponseCache::new();
        let k = key("/messages");

        cache.put(k, Arc::new(Response::ok("first"))).await;
        cache.put(k, Arc::new(Response::ok("second"))).await;

        let entry = cache.get(&k).await.unwrap();
        assert_eq!(entry.response.text(), "second");
        assert_eq!(entry.signature, k);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = StaleResponseCache::new();
        cache.put(key("/a"), Arc::new(Response::ok("a"))).await;
        cache.put(key("/b"), Arc::new(Response::ok("b"))).await;

        let removed = cache.remove(&key("/a")).await;
        assert_eq!(removed.unwrap().response.text(), "a");
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_statistics() {
        let cache = StaleResponseCache::new();
        cache.put(key("/a"), Arc::new(Response::ok("a"))).await;

        cache.get(&key("/a")).await;
        cache.get(&key("/a")).await;
        cache.get(&key("/b")).await;

        let stats = cache.statistics().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.current_entries, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalidate_matching() {
        let cache = StaleResponseCache::new();
        let keep = key("/keep");
        let evict = key("/evict");
        cache.put(keep, Arc::new(Response::ok("k"))).await;
        cache.put(evict, Arc::new(Response::ok("d"))).await;

        cache.invalidate_matching(|k| *k == evict);

        assert!(cache.get(&keep).await.is_some());
        assert!(cache.get(&evict).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_tear_entries() {
        let cache = Arc::new(StaleResponseCache::new());
        let k = key("/hot");

        let mut handles = Vec::new();
        for writer in 0..8u8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let body = vec![writer; 64];
                    cache.put(k, Arc::new(Response::ok(body))).await;
                    if let Some(entry) = cache.get(&k).await {
                        let first = entry.response.body[0];
                        assert!(entry.response.body.iter().all(|b| *b == first));
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 1);
    }
}
