//! Storage backend abstraction for S3-compatible object storage.
//!
//! This module defines the narrow object contract the dispatcher needs:
//! whole-object reads and writes, metadata lookups, prefix listing and
//! server-side copy. Two implementations are provided:
//!
//! - [`MemoryBackend`]: in-process map for tests and dry runs
//! - [`ObjectStoreBackend`]: any `object_store` implementation, built for S3
//!   endpoints through [`ObjectStoreBackend::s3`]
//!
//! Keys are plain `/`-separated strings (`<destinationDir>/<fileName>`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;

use crate::error::{Error, Result};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag, when the backend reports one.
    pub etag: Option<String>,
}

/// Storage backend trait for object storage.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes an object, replacing any previous content.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Deletes an object.
    ///
    /// Succeeds even if the object doesn't exist (idempotent).
    async fn delete(&self, path: &str) -> Result<()>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;

    /// Lists objects with the given prefix.
    ///
    /// Ordering is backend-specific; callers needing a stable order sort.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Copies an object server-side.
    ///
    /// Returns `Error::NotFound` if the source doesn't exist.
    async fn copy(&self, from: &str, to: &str) -> Result<()>;
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Endpoint URL, e.g. `http://minio.storage:9000`.
    pub endpoint_url: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket", &self.bucket)
            .field("access_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// In-memory storage backend.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::Internal {
            message: "lock poisoned".into(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(
                path.to_string(),
                StoredObject {
                    data,
                    last_modified: Utc::now(),
                },
            );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(path);
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        Ok(objects.get(path).map(|obj| meta_of(path, obj)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| meta_of(path, obj))
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;

        let source = objects
            .get(from)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object not found: {from}")))?;
        objects.insert(
            to.to_string(),
            StoredObject {
                data: source.data,
                last_modified: Utc::now(),
            },
        );
        drop(objects);
        Ok(())
    }
}

fn meta_of(path: &str, obj: &StoredObject) -> ObjectMeta {
    ObjectMeta {
        path: path.to_string(),
        size: obj.data.len() as u64,
        last_modified: Some(obj.last_modified),
        etag: None,
    }
}

/// Storage backend over any [`object_store::ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreBackend {
    /// Wraps an existing object store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Builds a backend for an S3-compatible endpoint.
    ///
    /// Uses path-style addressing and allows plain HTTP, which on-premise
    /// gateways (MinIO, Ceph RGW) require.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the client cannot be configured.
    pub fn s3(settings: &S3Settings) -> Result<Self> {
        let store = object_store::aws::AmazonS3Builder::new()
            .with_endpoint(&settings.endpoint_url)
            .with_bucket_name(&settings.bucket)
            .with_access_key_id(&settings.access_key)
            .with_secret_access_key(&settings.secret_key)
            .with_region("us-east-1")
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false)
            .build()
            .map_err(|e| Error::storage_with_source("failed to configure S3 client", e))?;

        Ok(Self::new(Arc::new(store), settings.bucket.clone()))
    }

    /// Bucket this backend writes to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn map_store_error(op: &str, path: &str, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => {
            Error::NotFound(format!("object not found: {path}"))
        }
        other => Error::storage_with_source(format!("{op} failed for {path}"), other),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = ObjectPath::from(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_store_error("get", path, e))?;
        result
            .bytes()
            .await
            .map_err(|e| map_store_error("get", path, e))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let location = ObjectPath::from(path);
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| map_store_error("put", path, e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = ObjectPath::from(path);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_store_error("delete", path, e)),
        }
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let location = ObjectPath::from(path);
        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
                etag: meta.e_tag,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_store_error("head", path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let location = ObjectPath::from(prefix);
        let metas: Vec<object_store::ObjectMeta> = self
            .store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| map_store_error("list", prefix, e))?;

        Ok(metas
            .into_iter()
            .map(|meta| ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
                etag: meta.e_tag,
            })
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.store
            .copy(&ObjectPath::from(from), &ObjectPath::from(to))
            .await
            .map_err(|e| map_store_error("copy", from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let data = Bytes::from("hello world");

        backend
            .put("out/file.txt", data.clone())
            .await
            .expect("put should succeed");

        let retrieved = backend.get("out/file.txt").await.expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get("nope").await.expect_err("should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_head_reports_size() {
        let backend = MemoryBackend::new();
        backend
            .put("test.txt", Bytes::from("data"))
            .await
            .expect("put should succeed");

        let meta = backend
            .head("test.txt")
            .await
            .expect("head should succeed")
            .expect("object should exist");
        assert_eq!(meta.path, "test.txt");
        assert_eq!(meta.size, 4);
        assert!(meta.last_modified.is_some());

        assert!(backend.head("other.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MemoryBackend::new();
        backend.put("a/1.txt", Bytes::from("a1")).await.unwrap();
        backend.put("a/2.txt", Bytes::from("a2")).await.unwrap();
        backend.put("b/1.txt", Bytes::from("b1")).await.unwrap();

        assert_eq!(backend.list("a/").await.unwrap().len(), 2);
        assert_eq!(backend.list("b/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_copy_requires_source() {
        let backend = MemoryBackend::new();
        let err = backend.copy("missing", "dest").await.expect_err("no source");
        assert!(err.is_not_found());

        backend.put("src", Bytes::from("x")).await.unwrap();
        backend.copy("src", "dest").await.unwrap();
        assert_eq!(backend.get("dest").await.unwrap(), Bytes::from("x"));
        assert!(backend.head("src").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.put("del.txt", Bytes::from("data")).await.unwrap();
        backend.delete("del.txt").await.expect("should succeed");
        backend.delete("del.txt").await.expect("second delete should succeed");
        assert!(backend.head("del.txt").await.unwrap().is_none());
    }

    #[test]
    fn test_s3_settings_debug_redacts_secrets() {
        let settings = S3Settings {
            endpoint_url: "http://minio:9000".into(),
            bucket: "tickets".into(),
            access_key: "AKIA123".into(),
            secret_key: "s3cr3t".into(),
        };
        let rendered = format!("{settings:?}");
        assert!(rendered.contains("tickets"));
        assert!(!rendered.contains("AKIA123"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_s3_backend_builds_without_network() {
        let settings = S3Settings {
            endpoint_url: "http://127.0.0.1:9000".into(),
            bucket: "tickets".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
        };
        let backend = ObjectStoreBackend::s3(&settings).expect("builder should accept settings");
        assert_eq!(backend.bucket(), "tickets");
    }
}
