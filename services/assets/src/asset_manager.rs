use crate::config::{AssetsConfig, Config};
use crate::error::{AssetError, StoreError};
use crate::object_store::{BatchDeleteResult, ObjectStore, StoredObject};
use crate::variant_deriver::{derive_variants, object_key, DerivedVariant, VariantDescriptor};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one variant write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub label: String,
    pub key: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub e_tag: Option<String>,
}

/// One listed asset, keyed by its representative variant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetEntry {
    /// Full key of the representative object, e.g. `25%_resize/cat.png`
    pub name: String,
    /// Key with the representative label stripped, e.g. `cat.png`
    pub asset_name: String,
    /// Signed read URL for `name`
    pub image: String,
}

/// Signed URL for the original-size variant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedUrl {
    #[serde(rename = "signedRequest")]
    pub signed_request: String,
    pub expires_at: DateTime<Utc>,
}

/// Manages groups of same-image variants stored under `<label>/<asset name>`.
///
/// The object store is the only record of which assets exist. An asset is
/// listed when its representative variant is present, and deleting an asset
/// targets every configured label whether or not the object exists.
pub struct AssetManager {
    store: Arc<dyn ObjectStore>,
    assets: AssetsConfig,
    url_expiry: Duration,
    operation_timeout: Duration,
}

impl AssetManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        assets: AssetsConfig,
        url_expiry: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            assets,
            url_expiry,
            operation_timeout,
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.assets.clone(),
            config.presigned_url_expiry(),
            config.operation_timeout(),
        )
    }

    pub fn variants(&self) -> &[VariantDescriptor] {
        &self.assets.variants
    }

    /// Every key an asset named `asset_name` may occupy
    pub fn group_keys(&self, asset_name: &str) -> Vec<String> {
        self.assets
            .variants
            .iter()
            .map(|variant| variant.key_for(asset_name))
            .collect()
    }

    /// Decode a base64 image payload, derive all variants and upload them
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn upload(
        &self,
        payload: String,
        asset_name: &str,
    ) -> Result<Vec<UploadResult>, AssetError> {
        validate_asset_name(asset_name)?;

        let descriptors = self.assets.variants.clone();
        let variants = tokio::task::spawn_blocking(move || derive_variants(&payload, &descriptors))
            .await
            .map_err(|e| AssetError::Internal(format!("image worker failed: {e}")))??;

        self.upload_group(variants, asset_name).await
    }

    /// Upload already derived variants concurrently as one asset.
    ///
    /// Every write is attempted and awaited before the outcome is decided. If
    /// any write failed, the first failure in variant order is returned.
    /// Writes that landed stay in the bucket unless rollback is enabled, in
    /// which case the whole group is deleted before the error is returned.
    #[instrument(skip(self, variants), fields(variants = variants.len()))]
    pub async fn upload_group(
        &self,
        variants: Vec<DerivedVariant>,
        asset_name: &str,
    ) -> Result<Vec<UploadResult>, AssetError> {
        validate_asset_name(asset_name)?;

        let started = Instant::now();
        let total_bytes: usize = variants.iter().map(|v| v.buffer.len()).sum();

        let uploads = variants.into_iter().map(|variant| {
            let key = object_key(&variant.label, asset_name);
            async move {
                let size_bytes = variant.buffer.len();
                let receipt = self
                    .timed(
                        "put_object",
                        self.store
                            .put_object(&key, variant.buffer, variant.mime_type),
                    )
                    .await
                    .map_err(|source| (variant.label.clone(), source))?;

                debug!(key = %key, size_bytes, "Variant uploaded");

                Ok::<_, (String, StoreError)>(UploadResult {
                    label: variant.label,
                    key,
                    content_type: variant.mime_type.to_string(),
                    size_bytes,
                    e_tag: receipt.e_tag,
                })
            }
        });

        // join_all keeps variant order, so the first Err is the earliest label
        let outcomes = join_all(uploads).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err((label, source)) => {
                    error!(asset_name, label = %label, error = %source, "Variant upload failed");
                    if first_failure.is_none() {
                        first_failure = Some((label, source));
                    }
                }
            }
        }

        let Some((label, source)) = first_failure else {
            metrics::histogram!("assets.upload.duration_seconds")
                .record(started.elapsed().as_secs_f64());
            metrics::counter!("assets.uploads.completed").increment(1);
            metrics::counter!("assets.bytes.uploaded").increment(total_bytes as u64);

            info!(
                asset_name,
                variants = results.len(),
                size_bytes = total_bytes,
                "Asset uploaded"
            );
            return Ok(results);
        };

        metrics::counter!("assets.uploads.failed").increment(1);
        warn!(asset_name, landed = results.len(), "Asset upload incomplete");

        if self.assets.rollback_on_partial_failure {
            self.rollback(asset_name).await;
        }

        Err(AssetError::UploadGroup {
            asset_name: asset_name.to_string(),
            label,
            source,
        })
    }

    /// Best-effort removal of a partially uploaded group
    async fn rollback(&self, asset_name: &str) {
        let keys = self.group_keys(asset_name);
        match self
            .timed("delete_objects", self.store.delete_objects(&keys))
            .await
        {
            Ok(result) if result.is_complete() => {
                warn!(asset_name, "Rolled back partially uploaded asset");
            }
            Ok(result) => {
                warn!(
                    asset_name,
                    failed_keys = ?result.errors,
                    "Rollback left objects behind"
                );
            }
            Err(e) => {
                error!(asset_name, error = %e, "Rollback of partial upload failed");
            }
        }
    }

    /// List every asset that has a representative variant, with a signed URL
    /// for that variant.
    ///
    /// The prefix scan is one store call, so all of its pages share a single
    /// operation timeout. Each signing call gets its own.
    #[instrument(skip(self))]
    pub async fn list_assets(&self) -> Result<Vec<AssetEntry>, AssetError> {
        let prefix = format!("{}/", self.assets.list_label);
        let keys = self
            .timed("list_objects", self.store.list_objects(&prefix))
            .await
            .map_err(AssetError::List)?;

        metrics::counter!("assets.list.requests").increment(1);

        let prefix = prefix.as_str();
        // Skip a bare folder marker object
        let keys = keys.into_iter().filter(|key| key.len() > prefix.len());

        let entries: Vec<AssetEntry> = stream::iter(keys)
            .map(|key| async move {
                let image = self
                    .timed("presign_get", self.store.presign_get(&key, self.url_expiry))
                    .await
                    .map_err(|source| AssetError::Sign {
                        key: key.clone(),
                        source,
                    })?;
                let asset_name = key.strip_prefix(prefix).unwrap_or(key.as_str()).to_string();

                Ok::<_, AssetError>(AssetEntry {
                    name: key,
                    asset_name,
                    image,
                })
            })
            .buffered(self.assets.sign_concurrency)
            .try_collect()
            .await?;

        debug!(count = entries.len(), "Listed assets");
        Ok(entries)
    }

    /// Read one object by its exact key
    #[instrument(skip(self))]
    pub async fn get_file(&self, key: &str) -> Result<StoredObject, AssetError> {
        if key.is_empty() {
            return Err(AssetError::InvalidKey(key.to_string()));
        }

        self.timed("get_object", self.store.get_object(key))
            .await
            .map_err(|source| AssetError::Fetch {
                key: key.to_string(),
                source,
            })
    }

    /// Signed URL for the original-size variant of the asset named in
    /// `composite_key`.
    ///
    /// The label part of `composite_key` is ignored; the configured original
    /// label is always substituted.
    #[instrument(skip(self))]
    pub async fn signed_original_url(&self, composite_key: &str) -> Result<SignedUrl, AssetError> {
        let asset_name = parse_composite_key(composite_key)?;
        let key = object_key(&self.assets.original_label, asset_name);

        let signed_request = self
            .timed("presign_get", self.store.presign_get(&key, self.url_expiry))
            .await
            .map_err(|source| AssetError::Sign {
                key: key.clone(),
                source,
            })?;

        Ok(SignedUrl {
            signed_request,
            expires_at: Utc::now() + chrono::Duration::seconds(self.url_expiry.as_secs() as i64),
        })
    }

    /// Delete every variant of `asset_name` in one batch request.
    ///
    /// Missing variants are not an error; per-key failures are reported in
    /// the result and not retried.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, asset_name: &str) -> Result<BatchDeleteResult, AssetError> {
        validate_asset_name(asset_name)?;

        let keys = self.group_keys(asset_name);
        let result = self
            .timed("delete_objects", self.store.delete_objects(&keys))
            .await
            .map_err(|source| AssetError::Delete {
                asset_name: asset_name.to_string(),
                source,
            })?;

        if result.is_complete() {
            metrics::counter!("assets.deletes.completed").increment(1);
            info!(asset_name, deleted = result.deleted.len(), "Asset deleted");
        } else {
            metrics::counter!("assets.deletes.partial").increment(1);
            warn!(
                asset_name,
                deleted = result.deleted.len(),
                failed_keys = ?result.errors,
                "Asset partially deleted"
            );
        }

        Ok(result)
    }

    /// Delete the asset named by a `<label>/<asset name>` key
    pub async fn delete_by_composite_key(
        &self,
        composite_key: &str,
    ) -> Result<BatchDeleteResult, AssetError> {
        let asset_name = parse_composite_key(composite_key)?;
        self.delete_group(asset_name).await
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("assets.store.timeouts", "operation" => operation).increment(1);
                Err(StoreError::Timeout {
                    operation,
                    after: self.operation_timeout,
                })
            }
        }
    }
}

/// Asset name part of `<label>/<asset name>`
pub fn parse_composite_key(composite_key: &str) -> Result<&str, AssetError> {
    match composite_key.split_once('/') {
        Some((_, asset_name)) if !asset_name.is_empty() => Ok(asset_name),
        _ => Err(AssetError::InvalidKey(composite_key.to_string())),
    }
}

fn validate_asset_name(asset_name: &str) -> Result<(), AssetError> {
    if asset_name.is_empty() || asset_name.chars().any(char::is_control) {
        return Err(AssetError::InvalidAssetName(asset_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{DeleteFailure, MemoryObjectStore, MockObjectStore, PutReceipt};
    use crate::test_support::{manager_with_store, memory_manager, png_payload};
    use crate::variant_deriver::decode_bytes;
    use async_trait::async_trait;

    const CAT_KEYS: [&str; 4] = [
        "original_size/cat.png",
        "50%_resize/cat.png",
        "25%_resize/cat.png",
        "10%_resize/cat.png",
    ];

    /// Store whose calls never complete
    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn put_object(&self, _: &str, _: Vec<u8>, _: &str) -> Result<PutReceipt, StoreError> {
            std::future::pending().await
        }
        async fn list_objects(&self, _: &str) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }
        async fn get_object(&self, _: &str) -> Result<StoredObject, StoreError> {
            std::future::pending().await
        }
        async fn delete_objects(&self, _: &[String]) -> Result<BatchDeleteResult, StoreError> {
            std::future::pending().await
        }
        async fn presign_get(&self, _: &str, _: Duration) -> Result<String, StoreError> {
            std::future::pending().await
        }
    }

    /// In-memory store whose accepted writes land only after a delay, and
    /// which rejects writes for one label outright
    struct SlowWriteStore {
        inner: MemoryObjectStore,
        delay: Duration,
        rejected_label: &'static str,
    }

    #[async_trait]
    impl ObjectStore for SlowWriteStore {
        async fn put_object(
            &self,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> Result<PutReceipt, StoreError> {
            if key.starts_with(self.rejected_label) {
                return Err(StoreError::Backend("slow down".to_string()));
            }
            tokio::time::sleep(self.delay).await;
            self.inner.put_object(key, body, content_type).await
        }
        async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_objects(prefix).await
        }
        async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
            self.inner.get_object(key).await
        }
        async fn delete_objects(&self, keys: &[String]) -> Result<BatchDeleteResult, StoreError> {
            self.inner.delete_objects(keys).await
        }
        async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
            self.inner.presign_get(key, expires_in).await
        }
    }

    fn failing_put_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store.expect_put_object().returning(|key, _, _| {
            if key.starts_with("50%_resize/") {
                Err(StoreError::Backend("connection reset".to_string()))
            } else {
                Ok(PutReceipt::default())
            }
        });
        store
    }

    #[tokio::test]
    async fn test_upload_cat_creates_all_variants() {
        let (manager, store) = memory_manager();

        let results = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap();

        let keys: Vec<_> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, CAT_KEYS);
        assert!(results.iter().all(|r| r.content_type == "image/png"));
        assert!(results.iter().all(|r| r.e_tag.is_some()));

        let expected = [100, 50, 25, 10];
        for (key, side) in CAT_KEYS.iter().zip(expected) {
            assert!(store.contains(key));
            let object = manager.get_file(key).await.unwrap();
            assert_eq!(object.content_type.as_deref(), Some("image/png"));
            let decoded = decode_bytes(&object.body).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (side, side));
        }
    }

    #[tokio::test]
    async fn test_decode_failure_writes_nothing() {
        let (manager, store) = memory_manager();

        let err = manager
            .upload("data:image/png;base64,bm90IGFuIGltYWdl".to_string(), "cat.png")
            .await
            .unwrap_err();

        assert!(matches!(err, AssetError::Decode(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_asset_name() {
        let (manager, store) = memory_manager();
        let err = manager.upload(png_payload(10, 10), "").await.unwrap_err();
        assert!(matches!(err, AssetError::InvalidAssetName(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_then_delete_leaves_nothing() {
        let (manager, store) = memory_manager();
        manager.upload(png_payload(100, 100), "cat.png").await.unwrap();
        manager.upload(png_payload(20, 20), "dog.png").await.unwrap();

        let result = manager.delete_group("cat.png").await.unwrap();
        assert!(result.is_complete());
        assert_eq!(result.deleted.len(), 4);

        for key in CAT_KEYS {
            assert!(!store.contains(key));
        }
        assert_eq!(store.len(), 4);

        let listed = manager.list_assets().await.unwrap();
        assert!(listed.iter().all(|e| e.name != "25%_resize/cat.png"));
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (manager, _store) = memory_manager();
        manager.upload(png_payload(30, 30), "cat.png").await.unwrap();

        tokio_test::assert_ok!(manager.delete_group("cat.png").await);
        tokio_test::assert_ok!(manager.delete_group("cat.png").await);
        tokio_test::assert_ok!(manager.delete_group("never-existed.png").await);
    }

    #[tokio::test]
    async fn test_delete_by_composite_key_uses_asset_name() {
        let (manager, store) = memory_manager();
        manager.upload(png_payload(40, 40), "cat.png").await.unwrap();

        manager
            .delete_by_composite_key("25%_resize/cat.png")
            .await
            .unwrap();
        assert!(store.is_empty());

        let err = manager.delete_by_composite_key("cat.png").await.unwrap_err();
        assert!(matches!(err, AssetError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_list_returns_one_entry_per_asset() {
        let (manager, _store) = memory_manager();
        for name in ["a.png", "b.png", "c.png"] {
            manager.upload(png_payload(16, 16), name).await.unwrap();
        }

        let entries = manager.list_assets().await.unwrap();

        assert_eq!(entries.len(), 3);
        let names: Vec<_> = entries.iter().map(|e| e.asset_name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
        for entry in &entries {
            assert!(entry.name.starts_with("25%_resize/"));
            assert!(!entry.image.is_empty());
            assert!(entry.image.contains(&entry.name));
        }
    }

    #[tokio::test]
    async fn test_list_empty_bucket() {
        let (manager, _store) = memory_manager();
        assert!(manager.list_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signed_original_url_ignores_supplied_label() {
        let (manager, _store) = memory_manager();

        let signed = manager
            .signed_original_url("10%_resize/cat.png")
            .await
            .unwrap();

        assert!(signed.signed_request.contains("/original_size/cat.png"));
        assert!(signed.expires_at > Utc::now());

        let json = serde_json::to_value(&signed).unwrap();
        assert!(json.get("signedRequest").is_some());
    }

    #[tokio::test]
    async fn test_signed_original_url_rejects_bare_name() {
        let (manager, _store) = memory_manager();
        for key in ["cat.png", "original_size/", ""] {
            let err = manager.signed_original_url(key).await.unwrap_err();
            assert!(matches!(err, AssetError::InvalidKey(_)), "{key:?}");
        }
    }

    #[tokio::test]
    async fn test_get_file_missing_is_not_found() {
        let (manager, _store) = memory_manager();
        let err = manager.get_file("original_size/ghost.png").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_partial_upload_failure_names_label_without_rollback() {
        let mut store = failing_put_store();
        store.expect_delete_objects().times(0);
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();

        match err {
            AssetError::UploadGroup { asset_name, label, .. } => {
                assert_eq!(asset_name, "cat.png");
                assert_eq!(label, "50%_resize");
            }
            other => panic!("expected UploadGroup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_partial_upload_failure_rolls_back_when_enabled() {
        let mut store = failing_put_store();
        store
            .expect_delete_objects()
            .withf(|keys| keys.len() == 4 && keys.iter().all(|k| k.ends_with("/cat.png")))
            .times(1)
            .returning(|keys| {
                Ok(BatchDeleteResult {
                    deleted: keys.to_vec(),
                    errors: Vec::new(),
                })
            });

        let assets = AssetsConfig {
            rollback_on_partial_failure: true,
            ..AssetsConfig::default()
        };
        let manager = manager_with_store(Arc::new(store), assets);

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::UploadGroup { .. }));
    }

    #[tokio::test]
    async fn test_delete_transport_failure_is_delete_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_delete_objects()
            .returning(|_| Err(StoreError::Backend("access denied".to_string())));
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager.delete_group("cat.png").await.unwrap_err();
        assert!(matches!(err, AssetError::Delete { .. }));
        assert_eq!(err.code(), "DELETE_ERROR");
    }

    #[tokio::test]
    async fn test_list_sign_failure_is_sign_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_| Ok(vec!["25%_resize/cat.png".to_string()]));
        store
            .expect_presign_get()
            .returning(|_, _| Err(StoreError::Signing("no credentials".to_string())));
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager.list_assets().await.unwrap_err();
        match err {
            AssetError::Sign { key, .. } => assert_eq!(key, "25%_resize/cat.png"),
            other => panic!("expected Sign, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_scan_failure_is_list_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|prefix| prefix.to_string() == "25%_resize/")
            .returning(|_| Err(StoreError::Backend("bucket missing".to_string())));
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager.list_assets().await.unwrap_err();
        assert!(matches!(err, AssetError::List(_)));
    }

    #[tokio::test]
    async fn test_upload_attempts_every_variant_when_first_fails() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(4).returning(|key, _, _| {
            if key.starts_with("original_size/") {
                Err(StoreError::Backend("connection reset".to_string()))
            } else {
                Ok(PutReceipt::default())
            }
        });
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();

        match err {
            AssetError::UploadGroup { label, .. } => assert_eq!(label, "original_size"),
            other => panic!("expected UploadGroup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_reports_first_failing_label_in_variant_order() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(4).returning(|key, _, _| {
            if key.starts_with("50%_resize/") || key.starts_with("10%_resize/") {
                Err(StoreError::Backend("connection reset".to_string()))
            } else {
                Ok(PutReceipt::default())
            }
        });
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();

        match err {
            AssetError::UploadGroup { label, .. } => assert_eq!(label, "50%_resize"),
            other => panic!("expected UploadGroup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rollback_waits_for_slow_writes() {
        let store = Arc::new(SlowWriteStore {
            inner: MemoryObjectStore::new("test-bucket"),
            delay: Duration::from_millis(30),
            rejected_label: "50%_resize/",
        });
        let assets = AssetsConfig {
            rollback_on_partial_failure: true,
            ..AssetsConfig::default()
        };
        let manager = manager_with_store(store.clone(), assets);

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::UploadGroup { .. }));
        assert!(store.inner.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_without_rollback_landed_writes_remain() {
        let store = Arc::new(SlowWriteStore {
            inner: MemoryObjectStore::new("test-bucket"),
            delay: Duration::from_millis(10),
            rejected_label: "50%_resize/",
        });
        let manager = manager_with_store(store.clone(), AssetsConfig::default());

        manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();

        assert_eq!(store.inner.len(), 3);
        assert!(!store.inner.contains("50%_resize/cat.png"));
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let mut store = failing_put_store();
        store
            .expect_delete_objects()
            .times(1)
            .returning(|_| Err(StoreError::Backend("access denied".to_string())));
        let assets = AssetsConfig {
            rollback_on_partial_failure: true,
            ..AssetsConfig::default()
        };
        let manager = manager_with_store(Arc::new(store), assets);

        let err = manager
            .upload(png_payload(100, 100), "cat.png")
            .await
            .unwrap_err();

        match err {
            AssetError::UploadGroup { label, source, .. } => {
                assert_eq!(label, "50%_resize");
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("expected UploadGroup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_reports_per_key_failures() {
        let mut store = MockObjectStore::new();
        store.expect_delete_objects().times(1).returning(|keys| {
            Ok(BatchDeleteResult {
                deleted: keys[1..].to_vec(),
                errors: vec![DeleteFailure {
                    key: keys[0].clone(),
                    code: Some("AccessDenied".to_string()),
                    message: Some("Access Denied".to_string()),
                }],
            })
        });
        let manager = manager_with_store(Arc::new(store), AssetsConfig::default());

        let result = manager.delete_group("cat.png").await.unwrap();

        assert!(!result.is_complete());
        assert_eq!(result.deleted.len(), 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key, "original_size/cat.png");
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let manager = AssetManager::new(
            Arc::new(StalledStore),
            AssetsConfig::default(),
            Duration::from_secs(900),
            Duration::from_millis(20),
        );

        let err = manager.list_assets().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, AssetError::List(_)));

        let err = manager.delete_group("cat.png").await.unwrap_err();
        assert!(err.is_timeout());

        let err = manager
            .upload(png_payload(10, 10), "cat.png")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn test_parse_composite_key() {
        assert_eq!(parse_composite_key("25%_resize/cat.png").unwrap(), "cat.png");
        assert_eq!(
            parse_composite_key("original_size/albums/cat.png").unwrap(),
            "albums/cat.png"
        );
        assert!(parse_composite_key("cat.png").is_err());
    }
}
