//! Session cache: identity → access token, with TTL
//!
//! Access tokens are short-lived and only ever live here; the durable store
//! holds refresh tokens exclusively. Entries expire after the TTL supplied
//! by the identity provider and are evicted lazily on read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Thread-safe access-token cache with per-entry TTL expiry
pub struct SessionCache {
    /// Entries keyed by caller identity
    entries: DashMap<String, CachedToken>,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached access token with TTL metadata
struct CachedToken {
    /// The bearer token value
    token: String,
    /// When this entry was cached
    cached_at: Instant,
    /// Time-to-live duration
    ttl: Duration,
}

impl CachedToken {
    /// Check if this entry has expired
    fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.cached_at) > self.ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

impl SessionCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached access token if present and not expired.
    ///
    /// Expired entries are evicted on access; a read after TTL expiry
    /// returns `None`.
    pub fn get(&self, identity: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(identity) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(identity);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.token.clone())
            }
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store an access token for an identity with the given TTL
    pub fn insert(&self, identity: &str, token: String, ttl: Duration) {
        let entry = CachedToken {
            token,
            cached_at: Instant::now(),
            ttl,
        };
        self.entries.insert(identity.to_string(), entry);
    }

    /// Remove all expired entries (background maintenance)
    pub fn evict_expired(&self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter_map(|entry| entry.value().is_expired().then(|| entry.key().clone()))
            .collect();

        let count = expired.len();
        for key in expired {
            self.entries.remove(&key);
        }

        if count > 0 {
            self.stats
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit() {
        let cache = SessionCache::new();
        cache.insert("u1", "token-a".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get("u1"), Some("token-a".to_string()));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache = SessionCache::new();
        assert_eq!(cache.get("nobody"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_read_after_expiry_returns_absent() {
        let cache = SessionCache::new();
        cache.insert("u1", "short-lived".to_string(), Duration::from_millis(1));

        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get("u1"), None);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_insert_overwrites_previous_token() {
        let cache = SessionCache::new();
        cache.insert("u1", "old".to_string(), Duration::from_secs(60));
        cache.insert("u1", "new".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get("u1"), Some("new".to_string()));
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn test_evict_expired() {
        let cache = SessionCache::new();
        cache.insert("short", "a".to_string(), Duration::from_millis(1));
        cache.insert("long", "b".to_string(), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(5));
        cache.evict_expired();

        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.get("long"), Some("b".to_string()));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_independent_identities() {
        let cache = SessionCache::new();
        cache.insert("u1", "a".to_string(), Duration::from_secs(60));
        cache.insert("u2", "b".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get("u1"), Some("a".to_string()));
        assert_eq!(cache.get("u2"), Some("b".to_string()));
    }
}
