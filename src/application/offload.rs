//! Body offloading to an object store.
//!
//! In offload mode the published row keeps metadata only; the body is stored under the
//! content id and removed again when the item turns private.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

/// Content type used for offloaded bodies.
pub const BODY_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("stored object `{key}` is not valid utf-8")]
    Encoding { key: String },
    #[error("object store backend error: {0}")]
    Backend(String),
}

/// Metadata returned by a successful put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub etag: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPayload {
    pub content_type: String,
    pub data: Bytes,
}

/// Put/Get/Delete object service. Puts with the same key overwrite; deletes of missing keys succeed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Option<ObjectPayload>, ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

#[derive(Clone)]
pub struct OffloadManager {
    objects: Arc<dyn ObjectStore>,
    prefix: String,
}

impl OffloadManager {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            objects,
            prefix: String::new(),
        }
    }

    /// Prefix every key, e.g. `"articles/"`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn key(&self, id: i64) -> String {
        format!("{}{id}", self.prefix)
    }

    pub async fn offload(&self, id: i64, body: &str) -> Result<StoredObject, ObjectStoreError> {
        let key = self.key(id);
        let stored = self
            .objects
            .put(&key, Bytes::copy_from_slice(body.as_bytes()), BODY_CONTENT_TYPE)
            .await?;
        debug!(content_id = id, key = %stored.key, size = stored.size_bytes, "body offloaded");
        Ok(stored)
    }

    pub async fn remove(&self, id: i64) -> Result<(), ObjectStoreError> {
        let key = self.key(id);
        self.objects.delete(&key).await?;
        debug!(content_id = id, key = %key, "offloaded body removed");
        Ok(())
    }

    /// Body stored for `id`, if any.
    pub async fn load(&self, id: i64) -> Result<Option<String>, ObjectStoreError> {
        let key = self.key(id);
        match self.objects.get(&key).await? {
            Some(payload) => String::from_utf8(payload.data.to_vec())
                .map(Some)
                .map_err(|_| ObjectStoreError::Encoding { key }),
            None => Ok(None),
        }
    }
}
