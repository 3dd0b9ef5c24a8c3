//! Generic TTL cache with age-ordered eviction

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Confidence class of a cached value, selecting its time-to-live
///
/// Fallback results live about twice as long as primary results: they are
/// lower-confidence to begin with, so there is less reason to demand they
/// be fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtlClass {
    /// Full-confidence result from healthy backends
    Primary,
    /// Degraded or best-effort result
    Fallback,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before age-ordered eviction kicks in
    pub max_entries: usize,
    /// TTL for primary results
    pub primary_ttl: Duration,
    /// TTL for fallback results
    pub fallback_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 128,
            primary_ttl: Duration::from_secs(30),
            fallback_ttl: Duration::from_secs(60),
        }
    }
}

struct Entry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Keyed TTL cache with bounded capacity
///
/// Expiry is lazy: a read of an expired entry removes it and reports a miss.
/// When an insert would exceed `max_entries`, the entry with the smallest
/// `created_at` is evicted — eviction order is by age, independent of read
/// recency, so this is deliberately not an LRU.
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, Entry<V>>>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with explicit configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a value, removing it if its TTL has elapsed
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;

        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite a value under the TTL of the given class
    ///
    /// A later `put` for the same key always replaces the existing entry,
    /// so a full-confidence result supersedes a still-valid fallback one
    /// immediately rather than waiting for natural expiry.
    pub async fn put(&self, key: K, value: V, class: TtlClass) {
        let ttl = match class {
            TtlClass::Primary => self.config.primary_ttl,
            TtlClass::Fallback => self.config.fallback_ttl,
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );

        while entries.len() > self.config.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    debug!(len = entries.len(), "Evicted oldest cache entry");
                }
                None => break,
            }
        }
    }

    /// Remove every entry matching the predicate, returning the removal count
    pub async fn invalidate_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    /// Remove all entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live entries (expired-but-unread entries included)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Ratio of hits to total lookups, in `[0.0, 1.0]`
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            max_entries,
            primary_ttl: Duration::from_millis(80),
            fallback_ttl: Duration::from_millis(160),
        }
    }

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let cache: TtlCache<String, i32> = TtlCache::new();
        cache.put("a".to_string(), 1, TtlClass::Primary).await;

        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_primary_ttl_boundary() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(test_config(16));
        cache.put("k".to_string(), 7, TtlClass::Primary).await;

        // Well inside the TTL: hit.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"k".to_string()).await, Some(7));

        // Past the TTL: miss, and the entry is removed on access.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_fallback_ttl_outlives_primary() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(test_config(16));
        cache.put("p".to_string(), 1, TtlClass::Primary).await;
        cache.put("f".to_string(), 2, TtlClass::Fallback).await;

        // Past the primary TTL but inside the fallback TTL.
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(cache.get(&"p".to_string()).await, None);
        assert_eq!(cache.get(&"f".to_string()).await, Some(2));

        // Past the fallback TTL too.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&"f".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_eviction_removes_oldest_by_age() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(CacheConfig {
            max_entries: 3,
            ..test_config(3)
        });

        cache.put("a".to_string(), 1, TtlClass::Primary).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.put("b".to_string(), 2, TtlClass::Primary).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.put("c".to_string(), 3, TtlClass::Primary).await;

        // Reading "a" must not protect it: eviction is by age, not recency.
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.put("d".to_string(), 4, TtlClass::Primary).await;

        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert_eq!(cache.get(&"b".to_string()).await, Some(2));
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
        assert_eq!(cache.get(&"d".to_string()).await, Some(4));
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_entry() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(test_config(16));
        cache.put("k".to_string(), 1, TtlClass::Fallback).await;
        cache.put("k".to_string(), 2, TtlClass::Primary).await;

        assert_eq!(cache.get(&"k".to_string()).await, Some(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_matching() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(test_config(16));
        cache.put("src/a.rs".to_string(), 1, TtlClass::Primary).await;
        cache.put("src/b.rs".to_string(), 2, TtlClass::Primary).await;
        cache.put("lib/c.py".to_string(), 3, TtlClass::Primary).await;

        let removed = cache
            .invalidate_matching(|key| key.starts_with("src/"))
            .await;

        assert_eq!(removed, 2);
        assert_eq!(cache.get(&"lib/c.py".to_string()).await, Some(3));
        assert_eq!(cache.get(&"src/a.rs".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_hit_ratio() {
        let cache: TtlCache<String, i32> = TtlCache::with_config(test_config(16));
        cache.put("k".to_string(), 1, TtlClass::Primary).await;

        let _ = cache.get(&"k".to_string()).await;
        let _ = cache.get(&"k".to_string()).await;
        let _ = cache.get(&"missing".to_string()).await;
        let _ = cache.get(&"missing".to_string()).await;

        assert!((cache.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
