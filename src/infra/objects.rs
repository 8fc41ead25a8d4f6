//! Object store backends for offloaded bodies.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};

use crate::application::offload::{ObjectPayload, ObjectStore, ObjectStoreError, StoredObject};
use crate::cache::lock::{rw_read, rw_write};

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn etag_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Filesystem-backed object store. Each object is a file under the root with its content type
/// in a sibling file.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Store rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        if key.is_empty()
            || key.ends_with(CONTENT_TYPE_SUFFIX)
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(component, Component::ParentDir | Component::Prefix(_))
            })
        {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

async fn remove_if_present(path: &Path) -> Result<(), ObjectStoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ObjectStoreError::Io(err)),
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        let absolute = self.resolve(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        fs::write(sidecar(&absolute), content_type.as_bytes()).await?;

        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            etag: etag_of(&data),
            size_bytes: data.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<ObjectPayload>, ObjectStoreError> {
        let absolute = self.resolve(key)?;
        let data = match fs::read(&absolute).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ObjectStoreError::Io(err)),
        };
        let content_type = match fs::read_to_string(sidecar(&absolute)).await {
            Ok(value) => value,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                DEFAULT_CONTENT_TYPE.to_string()
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        };
        Ok(Some(ObjectPayload {
            content_type,
            data: Bytes::from(data),
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let absolute = self.resolve(key)?;
        remove_if_present(&absolute).await?;
        remove_if_present(&sidecar(&absolute)).await
    }
}

/// In-process object store with put fault injection.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, ObjectPayload>>,
    failing_puts: AtomicU32,
}

impl MemoryObjectStore {
    /// Make the next `count` puts fail with a backend error.
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.objects, "infra::objects", "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        let injected = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ObjectStoreError::Backend(format!("put `{key}` rejected")));
        }
        if key.is_empty() {
            return Err(ObjectStoreError::InvalidKey(String::new()));
        }

        let stored = StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            etag: etag_of(&data),
            size_bytes: data.len() as u64,
        };
        rw_write(&self.objects, "infra::objects", "put").insert(
            key.to_string(),
            ObjectPayload {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Option<ObjectPayload>, ObjectStoreError> {
        Ok(rw_read(&self.objects, "infra::objects", "get").get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        rw_write(&self.objects, "infra::objects", "delete").remove(key);
        Ok(())
    }
}
