//! Object-store client used by the dispatcher actions.
//!
//! Wraps a [`StorageBackend`] with the file-level primitives the pipelines
//! need: verified upload of a local file, download, existence check, delete
//! and copy-then-delete rename.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::storage::StorageBackend;

/// Successful, verified upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object key the file was written to.
    pub key: String,
    /// Hex SHA-256 of the content (local and read-back agree).
    pub digest: String,
    /// Number of bytes uploaded.
    pub size: u64,
}

/// Result of an upload attempt that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The read-back digest matches the local digest.
    Verified(UploadReceipt),
    /// The object read back differs from what was sent.
    DigestMismatch {
        /// Object key the file was written to.
        key: String,
        /// Digest of the local file.
        local: String,
        /// Digest of the object read back.
        remote: String,
    },
}

/// Computes the lowercase hex SHA-256 digest of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Builds the object key for `file_name` under `prefix`.
#[must_use]
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

/// File-level object-store client.
#[derive(Clone)]
pub struct ObjectClient {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for ObjectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClient").finish_non_exhaustive()
    }
}

impl ObjectClient {
    /// Creates a client over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Uploads `local_path` to `<dest_prefix>/<basename>` and verifies it.
    ///
    /// The local digest is computed before transfer; the object is then read
    /// back and hashed. A mismatch is reported as
    /// [`UploadOutcome::DigestMismatch`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a store call fails.
    pub async fn upload(&self, local_path: &Path, dest_prefix: &str) -> Result<UploadOutcome> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("no file name in {}", local_path.display()))
            })?;
        let key = object_key(dest_prefix, file_name);

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| Error::io(local_path, e))?;
        let local = sha256_hex(&content);
        let size = content.len() as u64;
        tracing::debug!(path = %local_path.display(), digest = %local, "local checksum computed");

        self.backend.put(&key, Bytes::from(content)).await?;
        tracing::info!(path = %local_path.display(), key = %key, size, "file uploaded");

        let stored = self.backend.get(&key).await?;
        let remote = sha256_hex(&stored);
        tracing::debug!(key = %key, digest = %remote, "remote checksum computed");

        if local == remote {
            Ok(UploadOutcome::Verified(UploadReceipt {
                key,
                digest: local,
                size,
            }))
        } else {
            tracing::error!(key = %key, local = %local, remote = %remote, "checksum mismatch after upload");
            Ok(UploadOutcome::DigestMismatch { key, local, remote })
        }
    }

    /// Downloads `key` into `local_path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object is missing, or an I/O error.
    pub async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = self.backend.get(key).await?;
        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| Error::io(local_path, e))?;
        tracing::info!(key = %key, path = %local_path.display(), "object downloaded");
        Ok(())
    }

    /// Returns true if `key` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata lookup fails.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.backend.head(key).await?.is_some())
    }

    /// Deletes `key`. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store call fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await?;
        tracing::info!(key = %key, "object deleted");
        Ok(())
    }

    /// Renames `old_key` to `new_key` by copy-then-delete.
    ///
    /// Returns `Ok(false)` when the source does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy or the delete fails. A failed delete
    /// leaves both objects in place.
    pub async fn rename(&self, old_key: &str, new_key: &str) -> Result<bool> {
        if self.backend.head(old_key).await?.is_none() {
            tracing::warn!(key = %old_key, "rename source not found");
            return Ok(false);
        }

        match self.backend.copy(old_key, new_key).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::warn!(key = %old_key, "rename source vanished before copy");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        tracing::info!(from = %old_key, to = %new_key, "object copied");

        self.backend.delete(old_key).await?;
        tracing::info!(key = %old_key, "source object deleted");
        Ok(true)
    }

    /// Lists the keys under `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .backend
            .list(prefix)
            .await?
            .into_iter()
            .map(|m| m.path)
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn client() -> (Arc<MemoryBackend>, ObjectClient) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), ObjectClient::new(backend))
    }

    #[test]
    fn object_key_joins_prefix() {
        assert_eq!(object_key("in/tickets", "b.txt"), "in/tickets/b.txt");
        assert_eq!(object_key("in/tickets/", "b.txt"), "in/tickets/b.txt");
        assert_eq!(object_key("", "b.txt"), "b.txt");
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn upload_verifies_and_stores_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch1.txt");
        std::fs::write(&path, "a\nb\n").unwrap();
        let (backend, client) = client();

        let outcome = client.upload(&path, "landing").await.unwrap();
        let UploadOutcome::Verified(receipt) = outcome else {
            panic!("expected verified upload");
        };
        assert_eq!(receipt.key, "landing/batch1.txt");
        assert_eq!(receipt.size, 4);
        assert_eq!(receipt.digest, sha256_hex(b"a\nb\n"));
        assert_eq!(backend.get("landing/batch1.txt").await.unwrap(), Bytes::from("a\nb\n"));
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, client) = client();
        let err = client
            .upload(&dir.path().join("missing.txt"), "landing")
            .await
            .expect_err("missing file");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rename_missing_source_is_clean_failure() {
        let (_, client) = client();
        assert!(!client.rename("a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_object() {
        let (backend, client) = client();
        backend.put("a", Bytes::from("x")).await.unwrap();
        assert!(client.rename("a", "b").await.unwrap());
        assert!(!client.exists("a").await.unwrap());
        assert!(client.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn download_writes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, client) = client();
        backend.put("k/obj", Bytes::from("payload")).await.unwrap();

        let target = dir.path().join("obj");
        client.download("k/obj", &target).await.unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "payload");
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let (backend, client) = client();
        backend.put("p/b", Bytes::new()).await.unwrap();
        backend.put("p/a", Bytes::new()).await.unwrap();
        assert_eq!(client.list("p/").await.unwrap(), vec!["p/a", "p/b"]);
    }
}
