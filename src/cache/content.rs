//! Content entries: author first page, draft detail, published detail.
//!
//! Values are JSON snapshots with the configured TTL. None of them is authoritative.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::config::CacheConfig;
use super::keys;
use super::kv::{CacheError, KvStore};
use crate::domain::entities::ContentItem;

pub const CACHE_FIRST_PAGE: &str = "first_page";
pub const CACHE_DETAIL: &str = "detail";
pub const CACHE_PUBLISHED: &str = "published";

pub(crate) fn record_lookup<T>(cache: &'static str, result: &Result<Option<T>, CacheError>) {
    match result {
        Ok(Some(_)) => metrics::counter!("folio_cache_hit_total", "cache" => cache).increment(1),
        Ok(None) => metrics::counter!("folio_cache_miss_total", "cache" => cache).increment(1),
        Err(_) => metrics::counter!("folio_cache_error_total", "cache" => cache).increment(1),
    }
}

#[derive(Clone)]
pub struct ContentCache {
    kv: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl ContentCache {
    pub fn new(kv: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get_first_page(
        &self,
        author_id: i64,
    ) -> Result<Option<Vec<ContentItem>>, CacheError> {
        let result = self.read(&keys::first_page(author_id)).await;
        record_lookup(CACHE_FIRST_PAGE, &result);
        result
    }

    /// Stores the listing with every body cut down to its abstract.
    pub async fn set_first_page(
        &self,
        author_id: i64,
        items: &[ContentItem],
    ) -> Result<(), CacheError> {
        let abstracts: Vec<ContentItem> = items
            .iter()
            .map(|item| item.abstracted(self.config.abstract_chars))
            .collect();
        self.write(&keys::first_page(author_id), &abstracts).await
    }

    pub async fn del_first_page(&self, author_id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::first_page(author_id)).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<ContentItem>, CacheError> {
        let result = self.read(&keys::detail(id)).await;
        record_lookup(CACHE_DETAIL, &result);
        result
    }

    pub async fn set(&self, item: &ContentItem) -> Result<(), CacheError> {
        self.write(&keys::detail(item.id), item).await
    }

    pub async fn del(&self, id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::detail(id)).await
    }

    pub async fn get_published(&self, id: i64) -> Result<Option<ContentItem>, CacheError> {
        let result = self.read(&keys::published_detail(id)).await;
        record_lookup(CACHE_PUBLISHED, &result);
        result
    }

    pub async fn set_published(&self, item: &ContentItem) -> Result<(), CacheError> {
        self.write(&keys::published_detail(item.id), item).await
    }

    pub async fn del_published(&self, id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::published_detail(id)).await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| CacheError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_vec(value)?;
        self.kv.set(key, Bytes::from(raw), self.config.ttl()).await
    }
}
