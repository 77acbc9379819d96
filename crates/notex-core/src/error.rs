//! Error types module
//!
//! Unified error type for the upload pipeline. Validation failures
//! (`InvalidInput`, `PayloadTooLarge`, `NotFound`) are surfaced synchronously
//! to the enqueue caller and never retried; `Storage` and `Database` failures
//! inside the worker are recorded on the task and handled by the retry sweep.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(e: SqlxError) -> Self {
        match e {
            SqlxError::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_includes_detail() {
        let e = AppError::NotFound("note 42".to_string());
        assert_eq!(e.to_string(), "Not found: note 42");
    }

    #[test]
    fn io_error_maps_to_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e: AppError = io.into();
        assert!(matches!(e, AppError::Internal(_)));
    }
}
