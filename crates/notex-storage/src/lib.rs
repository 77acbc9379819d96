//! Notex Storage Library
//!
//! Object storage abstraction consumed by the upload pipeline. The
//! [`ObjectStorage`] trait covers put/get/delete/presign/health-check; the
//! S3 backend speaks to any S3-compatible endpoint (AWS, MinIO, Spaces via a
//! custom endpoint URL), and the local backend exists for development.
//!
//! Keys are flat object names generated by the enqueuer (uuid + original
//! extension). Keys must not contain `..` or a leading `/`.

#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectStorage, StorageError, StorageResult};
