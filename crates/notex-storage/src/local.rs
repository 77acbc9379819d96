use crate::traits::{ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage backend for development and tests.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// # Arguments
    /// * `base_path` - Root directory for object storage
    /// * `base_url` - Base URL the objects are served from (e.g. "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert a storage key to a filesystem path, rejecting keys that could
    /// escape the base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<String> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        file.write_all(&data)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        tracing::debug!(key = %key, path = %path.display(), "Object written to local storage");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    async fn presigned_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        // No signing locally; serve straight from the configured base URL.
        self.key_to_path(key)?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn health_check(&self) -> bool {
        fs::metadata(&self.base_path).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:3000/files".to_string())
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn put_then_get_and_delete() {
        let (_dir, storage) = storage().await;

        let key = storage
            .put("abc.png", b"payload".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(key, "abc.png");
        assert!(storage.exists("abc.png").await.unwrap());
        assert_eq!(storage.get("abc.png").await.unwrap(), b"payload");

        storage.delete("abc.png").await.unwrap();
        assert!(!storage.exists("abc.png").await.unwrap());
        assert!(matches!(
            storage.delete("abc.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let (_dir, storage) = storage().await;
        assert!(matches!(
            storage.get("../outside").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put("/abs", vec![], "text/plain").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn presigned_url_joins_base_url() {
        let (_dir, storage) = storage().await;
        let url = storage
            .presigned_url("abc.png", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/files/abc.png");
    }
}
