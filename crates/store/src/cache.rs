//! TTL cache for per-tenant derived values (knowledge stats).
//!
//! Backed by `moka::sync::Cache` with a per-entry expiry, so each `set` can
//! choose its own lifetime. Entries are only ever replaced or invalidated,
//! never mutated in place, so concurrent writers need no extra locking.

use moka::Expiry;
use moka::sync::Cache as MokaCache;
use ragline_config::CacheConfig;
use ragline_core::store::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: serde_json::Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct TtlCache {
    cache: MokaCache<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl Cache for TtlCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.cache.insert(key.to_string(), Entry { value, ttl });
    }

    fn delete(&self, key: &str) {
        self.cache.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_delete() {
        let cache = TtlCache::default();
        cache.set("knowledge_stats:t1", json!({"faq": 3}), Duration::from_secs(60));
        assert_eq!(cache.get("knowledge_stats:t1"), Some(json!({"faq": 3})));

        cache.delete("knowledge_stats:t1");
        assert_eq!(cache.get("knowledge_stats:t1"), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn delete_missing_key_is_harmless() {
        let cache = TtlCache::default();
        cache.delete("nope");
        cache.delete("nope");
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn entries_expire() {
        let cache = TtlCache::default();
        cache.set("k", json!(1), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
    }
}
