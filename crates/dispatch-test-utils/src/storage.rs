//! Test storage implementations with operation tracing.
//!
//! Provides in-memory storage that records all operations for test assertions
//! and can inject failures or corrupt read-backs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dispatch_core::error::{Error, Result};
use dispatch_core::storage::{ObjectMeta, StorageBackend};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Get operation.
    Get {
        /// Path that was read.
        path: String,
    },
    /// Head operation (metadata only).
    Head {
        /// Path that was checked.
        path: String,
    },
    /// Put operation.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
    },
    /// Delete operation.
    Delete {
        /// Path that was deleted.
        path: String,
    },
    /// List operation.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
    /// Copy operation.
    Copy {
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
    },
}

/// In-memory storage backend with operation tracing.
///
/// Records all operations for later assertion in tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    data: Arc<Mutex<HashMap<String, StoredObject>>>,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
    corrupt_paths: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Number of recorded puts.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StorageOp::Put { .. }))
            .count()
    }

    /// Injects a failure for the given path prefix.
    pub fn inject_failure(&self, path: impl Into<String>) {
        self.fail_paths.lock().expect("lock").push(path.into());
    }

    /// Makes reads of paths under the prefix return altered content, as if the
    /// object had been damaged in transit.
    pub fn corrupt_reads(&self, path: impl Into<String>) {
        self.corrupt_paths.lock().expect("lock").push(path.into());
    }

    /// Clears all injected failures and corruptions.
    pub fn clear_failures(&self) {
        self.fail_paths.lock().expect("lock").clear();
        self.corrupt_paths.lock().expect("lock").clear();
    }

    /// Returns all stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.data.lock().expect("lock").keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Returns the stored content of `path`.
    #[must_use]
    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.data
            .lock()
            .expect("lock")
            .get(path)
            .map(|o| o.data.clone())
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        let fail_paths = self.fail_paths.lock().expect("lock");
        if fail_paths.iter().any(|p| path.starts_with(p)) {
            return Err(Error::storage(format!("injected failure for path: {path}")));
        }
        Ok(())
    }

    fn is_corrupted(&self, path: &str) -> bool {
        self.corrupt_paths
            .lock()
            .expect("lock")
            .iter()
            .any(|p| path.starts_with(p))
    }

    fn meta(path: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            last_modified: Some(obj.last_modified),
            etag: None,
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        self.check_failure(path)?;
        self.record(StorageOp::Get {
            path: path.to_string(),
        });

        let data = self
            .data
            .lock()
            .expect("lock")
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))?;

        if self.is_corrupted(path) {
            let mut damaged = data.to_vec();
            damaged.extend_from_slice(b"\0corrupted");
            return Ok(Bytes::from(damaged));
        }
        Ok(data)
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.check_failure(path)?;
        self.record(StorageOp::Put {
            path: path.to_string(),
            size: data.len(),
        });

        self.data.lock().expect("lock").insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_failure(path)?;
        self.record(StorageOp::Delete {
            path: path.to_string(),
        });

        self.data.lock().expect("lock").remove(path);
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.check_failure(path)?;
        self.record(StorageOp::Head {
            path: path.to_string(),
        });

        let data = self.data.lock().expect("lock");
        Ok(data.get(path).map(|o| Self::meta(path, o)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.check_failure(prefix)?;
        self.record(StorageOp::List {
            prefix: prefix.to_string(),
        });

        let data = self.data.lock().expect("lock");
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Self::meta(k, v))
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.check_failure(from)?;
        self.check_failure(to)?;
        self.record(StorageOp::Copy {
            from: from.to_string(),
            to: to.to_string(),
        });

        let mut data = self.data.lock().expect("lock");
        let source = data
            .get(from)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object not found: {from}")))?;
        data.insert(
            to.to_string(),
            StoredObject {
                data: source.data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }
}
