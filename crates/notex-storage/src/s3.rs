use crate::traits::{ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutOptions,
    PutPayload,
};
use std::time::Duration;

/// S3-compatible storage backend.
///
/// Works against AWS S3 as well as MinIO and other S3-compatible providers
/// through a custom `endpoint_url` (http endpoints enable path-style access
/// with `allow_http`). Credentials come from the environment.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn location(key: &str) -> StorageResult<ObjectPath> {
        if key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(ObjectPath::from(key))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let location = Self::location(key)?;
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), opts)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 put failed");
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Object uploaded");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let location = Self::location(key)?;
        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        self.store.delete(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DeleteFailed(other.to_string()),
        })
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn health_check(&self) -> bool {
        // A head on a probe key answers reachability; a missing object still
        // means the bucket responded.
        let location = ObjectPath::from(".notex-healthcheck");
        match self.store.head(&location).await {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => true,
            Err(e) => {
                tracing::warn!(error = %e, bucket = %self.bucket, "S3 health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_keys_rejected() {
        assert!(matches!(
            S3Storage::location("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            S3Storage::location("/abs/key"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(S3Storage::location("a1b2c3.png").is_ok());
    }
}
