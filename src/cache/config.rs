//! Cache configuration.
//!
//! Controls entry lifetimes, listing abstracts, the precache heuristic and backfill limits.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::entities::DEFAULT_ABSTRACT_CHARS;

const DEFAULT_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_FIRST_PAGE_LIMIT: u32 = 100;
const DEFAULT_PRECACHE_MAX_BYTES: usize = 1024 * 1024;
const DEFAULT_BACKFILL_TIMEOUT_MS: u64 = 1000;
const DEFAULT_KV_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of every cache entry, in seconds.
    pub ttl_seconds: u64,
    /// Characters kept per body in the first-page listing.
    pub abstract_chars: usize,
    /// Page size that is served from the first-page cache.
    pub first_page_limit: u32,
    /// Warm one detail entry after every listing read.
    pub precache_enabled: bool,
    /// Fixed item to warm, loaded from the draft store when not in the listing.
    /// `None` warms the first listed item.
    pub precache_id: Option<i64>,
    /// Bodies at or above this size are never precached.
    pub precache_max_bytes: usize,
    /// Own deadline of each detached backfill.
    pub backfill_timeout_ms: u64,
    /// Entry capacity of the in-process key-value store.
    pub kv_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            abstract_chars: DEFAULT_ABSTRACT_CHARS,
            first_page_limit: DEFAULT_FIRST_PAGE_LIMIT,
            precache_enabled: true,
            precache_id: None,
            precache_max_bytes: DEFAULT_PRECACHE_MAX_BYTES,
            backfill_timeout_ms: DEFAULT_BACKFILL_TIMEOUT_MS,
            kv_capacity: DEFAULT_KV_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl_seconds,
            abstract_chars: settings.abstract_chars,
            first_page_limit: settings.first_page_limit,
            precache_enabled: settings.precache_enabled,
            precache_id: settings.precache_id,
            precache_max_bytes: settings.precache_max_bytes,
            backfill_timeout_ms: settings.backfill_timeout_ms,
            kv_capacity: settings.kv_capacity,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_millis(self.backfill_timeout_ms)
    }

    /// Returns the KV capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn kv_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.kv_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Whether a listing request maps onto the cached first page.
    pub fn is_first_page(&self, offset: u32, limit: u32) -> bool {
        offset == 0 && limit == self.first_page_limit
    }

    /// Whether an item of `body_len` bytes is eligible for precaching.
    pub fn should_precache(&self, body_len: usize) -> bool {
        body_len < self.precache_max_bytes
    }
}
