//! Storage abstraction trait
//!
//! All object storage backends must implement [`ObjectStorage`]. The upload
//! worker treats every backend failure as transient and leaves retry policy
//! to the task record; callers that need to distinguish a missing object can
//! match on [`StorageError::NotFound`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object storage abstraction.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key` with the given content type; returns the key.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Fetch the full object body.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Temporary URL for direct client access (GET).
    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Whether the backend is reachable. Used for readiness reporting only;
    /// the pipeline never gates enqueue on it.
    async fn health_check(&self) -> bool;
}
