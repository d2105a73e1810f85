use crate::fingerprint::fingerprint;
use logtriage_core::CacheConfig;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached tool response
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
}

impl CacheEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Cache counters, reported by `server_stats`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL-bounded LRU of tool responses keyed by request fingerprint.
///
/// Values are opaque JSON. Concurrent writers of the same key race and the
/// last one wins. A disabled cache never stores anything and counts nothing.
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<LruCache<String, CacheEntry>>,
    stats: Mutex<CacheStats>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Self::with_limits(Duration::from_secs(config.ttl_secs), config.max_entries);
        if config.enabled {
            cache
        } else {
            cache.into_disabled()
        }
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: true,
            ttl,
            max_entries: capacity.get(),
            entries: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats {
                enabled: true,
                max_entries: capacity.get(),
                ..Default::default()
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::with_limits(Duration::ZERO, 1).into_disabled()
    }

    fn into_disabled(mut self) -> Self {
        self.enabled = false;
        self.stats.get_mut().enabled = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a response. Expired entries are dropped on access.
    pub fn get(&self, tool: &str, arguments: &Value) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let key = fingerprint(tool, arguments);

        let mut entries = self.entries.lock();
        let mut stats = self.stats.lock();
        let expired = match entries.get(&key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                stats.hits += 1;
                debug!("Cache hit for {} ({})", tool, &key[..12]);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&key);
            stats.expirations += 1;
            debug!("Cache entry for {} expired ({})", tool, &key[..12]);
        }
        stats.misses += 1;
        stats.entries = entries.len();
        None
    }

    pub fn put(&self, tool: &str, arguments: &Value, value: Value) {
        if !self.enabled {
            return;
        }
        let key = fingerprint(tool, arguments);

        let mut entries = self.entries.lock();
        let evicted = entries.push(key.clone(), CacheEntry::new(value));
        let mut stats = self.stats.lock();
        if matches!(evicted, Some((old_key, _)) if old_key != key) {
            stats.evictions += 1;
        }
        stats.entries = entries.len();
        debug!("Cached {} response ({} entries)", tool, stats.entries);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.stats.lock().entries = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.entries = self.entries.lock().len();
        stats.max_entries = self.max_entries;
        stats
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
