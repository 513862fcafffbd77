//! Upstream response cache
//!
//! [`CachedExchange`] wraps any [`DnsExchange`] and serves repeated queries
//! from a moka cache. Only positive responses (`NoError` with answers) are
//! stored, each for the minimum TTL among its answers.
//!
//! ```text
//! Query → CachedExchange::exchange()
//!           │
//!           ├── Hit → cached response (ID rewritten, TTLs capped)
//!           │
//!           └── Miss → inner.exchange() → insert if positive
//! ```

pub mod entry;
pub mod key;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use tracing::trace;

use super::client::DnsExchange;
use super::error::DnsResult;
pub use entry::{is_positive_response, CacheEntry};
pub use key::CacheKey;

/// Default maximum number of cached responses
pub const DEFAULT_CACHE_CAPACITY: u64 = 4096;

/// Cache statistics
///
/// All counters are atomic for thread-safe access without locking.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Create a snapshot of all statistics
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStatsSnapshot {
    /// Calculate hit rate as a percentage
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Per-entry expiry driven by the cached TTL
struct CacheEntryExpiry;

impl Expiry<CacheKey, CacheEntry> for CacheEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _current_time: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(u64::from(value.original_ttl())))
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        Some(Duration::from_secs(u64::from(value.original_ttl())))
    }
}

/// Exchange decorator caching positive upstream responses
pub struct CachedExchange {
    inner: Arc<dyn DnsExchange>,
    cache: Cache<CacheKey, CacheEntry>,
    stats: Arc<CacheStats>,
}

impl CachedExchange {
    /// Wrap `inner` with a cache of [`DEFAULT_CACHE_CAPACITY`] entries
    #[must_use]
    pub fn new(inner: Arc<dyn DnsExchange>) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap `inner` with a cache holding at most `max_entries` responses
    #[must_use]
    pub fn with_capacity(inner: Arc<dyn DnsExchange>, max_entries: u64) -> Self {
        let stats = Arc::new(CacheStats::default());
        let stats_for_listener = Arc::clone(&stats);

        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(CacheEntryExpiry)
            .eviction_listener(move |_key, _value, cause| match cause {
                RemovalCause::Size => {
                    stats_for_listener.evictions.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Expired => {
                    stats_for_listener.expirations.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Explicit | RemovalCause::Replaced => {}
            })
            .build();

        Self {
            inner,
            cache,
            stats,
        }
    }

    /// Look up a cached response for `query`
    #[must_use]
    pub fn get(&self, query: &Message) -> Option<Message> {
        let key = CacheKey::from_query(query)?;
        let entry = self.cache.get(&key)?;
        if entry.is_expired() {
            return None;
        }
        entry.to_adjusted_message(query.id())
    }

    /// Store `response` for `query` if it is cacheable
    pub fn insert(&self, query: &Message, response: &Message) {
        let Some(key) = CacheKey::from_query(query) else {
            return;
        };
        let Some(entry) = CacheEntry::from_message(response) else {
            return;
        };
        trace!(qname = %key.qname(), ttl = entry.original_ttl(), "caching upstream response");
        self.cache.insert(key, entry);
        self.stats.record_insert();
    }

    /// Drop all cached responses
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Number of cached responses (approximate)
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Check if the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[async_trait]
impl DnsExchange for CachedExchange {
    async fn exchange(&self, query: &Message) -> DnsResult<Message> {
        if let Some(response) = self.get(query) {
            self.stats.record_hit();
            return Ok(response);
        }
        self.stats.record_miss();

        let response = self.inner.exchange(query).await?;
        self.insert(query, &response);
        Ok(response)
    }

    fn address(&self) -> &str {
        self.inner.address()
    }
}

impl std::fmt::Debug for CachedExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedExchange")
            .field("inner", &self.inner)
            .field("entries", &self.cache.entry_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
