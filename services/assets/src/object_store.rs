use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// A stored object as returned by a single-key read
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Acknowledgement of a single write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutReceipt {
    pub e_tag: Option<String>,
}

/// Per-key failure inside a batch delete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Outcome of a batch delete. Keys that never existed count as deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchDeleteResult {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

impl BatchDeleteResult {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Object store operations the asset manager relies on.
///
/// Each implementation is bound to a single bucket at construction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError>;

    /// All keys starting with `prefix`, in key order.
    ///
    /// Implementations follow pagination internally; callers treat the whole
    /// scan as one call.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Read one object. Returns `StoreError::NotFound` if the key is absent.
    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError>;

    /// Delete `keys` in one request. Missing keys are not errors.
    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteResult, StoreError>;

    /// Time-limited GET URL for `key`; does not check that the key exists
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError>;
}

/// In-process bucket for tests and local development
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        // A panicked writer cannot leave the map half-updated
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        let e_tag = format!("\"{:016x}\"", fnv1a(&body));
        self.write().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: Some(content_type.to_string()),
            },
        );
        debug!(bucket = %self.bucket, key, "Stored object in memory");
        Ok(PutReceipt { e_tag: Some(e_tag) })
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.read();
        let keys = objects
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteResult, StoreError> {
        let mut objects = self.write();
        for key in keys {
            objects.remove(key);
        }
        Ok(BatchDeleteResult {
            deleted: keys.to_vec(),
            errors: Vec::new(),
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }
}

/// Content hash for fake ETags
fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
