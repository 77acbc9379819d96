//! Shared constants for the upload pipeline.

/// Maximum number of retry attempts for a failed upload task. Once
/// `retry_count` reaches this value the task stays failed forever and is
/// only visible through the audit queries.
pub const MAX_RETRIES: i32 = 3;

/// Directory name under the system temp dir used for staged upload files.
pub const TEMP_DIR_NAME: &str = "notex-uploads";
