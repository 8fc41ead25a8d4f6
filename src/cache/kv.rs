//! Key-value cache capability.
//!
//! [`KvStore`] is the contract the content and interaction caches are written against.
//! [`MemoryKvStore`] is the in-process implementation: an LRU of string or hash entries,
//! each with its own expiry.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;

use super::lock::mutex_lock;
use crate::domain::clock::{Clock, SystemClock};

const SOURCE: &str = "cache::kv";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("key `{key}` holds a value of another type")]
    WrongType { key: String },
    #[error("cached value under `{key}` could not be decoded: {reason}")]
    Corrupt { key: String, reason: String },
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Result of a conditional hash increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrOutcome {
    Incremented,
    /// Nothing cached under the key; nothing was written.
    KeyAbsent,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// All fields of a hash; empty when the key is absent.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError>;

    /// Write `fields` into the hash at `key` and (re)apply `ttl`.
    async fn hset(&self, key: &str, fields: &[(&str, i64)], ttl: Duration)
    -> Result<(), CacheError>;

    /// Atomically add `delta` to `field` only when `key` already exists. The field is
    /// floored at zero.
    async fn hincr_if_exists(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<IncrOutcome, CacheError>;
}

#[derive(Debug, Clone)]
enum Value {
    Bytes(Bytes),
    Hash(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: i64,
}

pub struct MemoryKvStore {
    entries: Mutex<LruCache<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: NonZeroUsize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut entries = mutex_lock(&self.entries, SOURCE, "contains");
        live(&mut entries, key, now).is_some()
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_add(ttl_ms)
    }
}

/// Live entry under `key`, evicting it first when expired.
fn live<'a>(entries: &'a mut LruCache<String, Entry>, key: &str, now: i64) -> Option<&'a mut Entry> {
    let expired = entries.peek(key).is_some_and(|entry| entry.expires_at <= now);
    if expired {
        entries.pop(key);
        return None;
    }
    entries.get_mut(key)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = self.clock.now_millis();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match live(&mut entries, key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        mutex_lock(&self.entries, SOURCE, "set").put(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError> {
        let now = self.clock.now_millis();
        let mut entries = mutex_lock(&self.entries, SOURCE, "hget_all");
        match live(&mut entries, key, now) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn hset(
        &self,
        key: &str,
        fields: &[(&str, i64)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = self.clock.now_millis();
        let expires_at = self.expiry(ttl);
        let mut entries = mutex_lock(&self.entries, SOURCE, "hset");

        let mut hash = match live(&mut entries, key, now) {
            None => HashMap::new(),
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) => std::mem::take(existing),
            Some(_) => {
                return Err(CacheError::WrongType {
                    key: key.to_string(),
                });
            }
        };
        for (field, value) in fields {
            hash.insert((*field).to_string(), *value);
        }
        entries.put(
            key.to_string(),
            Entry {
                value: Value::Hash(hash),
                expires_at,
            },
        );
        Ok(())
    }

    async fn hincr_if_exists(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<IncrOutcome, CacheError> {
        let now = self.clock.now_millis();
        let mut entries = mutex_lock(&self.entries, SOURCE, "hincr_if_exists");
        match live(&mut entries, key, now) {
            None => Ok(IncrOutcome::KeyAbsent),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                let value = fields.entry(field.to_string()).or_insert(0);
                *value = value.saturating_add(delta).max(0);
                Ok(IncrOutcome::Incremented)
            }
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }
}
