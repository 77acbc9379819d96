//! Configuration module
//!
//! Tuning knobs for the upload pipeline: worker pool sizing, retry policy,
//! staging directory and upload validation limits. Values come from the
//! environment with sensible defaults; `Default` mirrors `from_env` with an
//! empty environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{MAX_RETRIES, TEMP_DIR_NAME};

const DEFAULT_WORKER_COUNT: usize = 5;
const DEFAULT_QUEUE_DEPTH: usize = 100;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_RETRY_COOLDOWN_SECS: i64 = 300;
const DEFAULT_PUT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_PUT_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// One accepted upload type: a file extension and the content type it must
/// carry. Extension and content type are validated as a pair, so a `.png`
/// declared as `application/pdf` is rejected.
#[derive(Clone, Debug)]
pub struct AllowedType {
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub content_type: String,
}

/// Upload pipeline configuration.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Number of concurrent worker loops draining the task queue.
    pub worker_count: usize,
    /// Bounded dispatch queue depth; when full, submissions run inline on the
    /// submitting future instead of being dropped.
    pub queue_depth: usize,
    /// Retry cap per task, shared by the worker and the retry sweep.
    pub max_retries: i32,
    /// Period of the retry sweep.
    pub sweep_interval_secs: u64,
    /// Minimum elapsed time since the last failure before a task is eligible
    /// for another retry.
    pub retry_cooldown_secs: i64,
    /// Attempts for the bounded retry wrapper around the object-store put.
    pub put_retry_attempts: u32,
    /// Fixed delay between put attempts.
    pub put_retry_delay_ms: u64,
    /// Durable local directory for staged upload files.
    pub temp_dir: PathBuf,
    pub max_file_size_bytes: usize,
    /// Accepted extension/content-type pairs.
    pub allowed_types: Vec<AllowedType>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_retries: MAX_RETRIES,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            retry_cooldown_secs: DEFAULT_RETRY_COOLDOWN_SECS,
            put_retry_attempts: DEFAULT_PUT_RETRY_ATTEMPTS,
            put_retry_delay_ms: DEFAULT_PUT_RETRY_DELAY_MS,
            temp_dir: env::temp_dir().join(TEMP_DIR_NAME),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_types: default_allowed_types(),
        }
    }
}

impl UploadConfig {
    /// Build the configuration from `UPLOAD_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: env_parse("UPLOAD_WORKER_COUNT", defaults.worker_count),
            queue_depth: env_parse("UPLOAD_QUEUE_DEPTH", defaults.queue_depth),
            max_retries: env_parse("UPLOAD_MAX_RETRIES", defaults.max_retries),
            sweep_interval_secs: env_parse(
                "UPLOAD_RETRY_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            retry_cooldown_secs: env_parse(
                "UPLOAD_RETRY_COOLDOWN_SECS",
                defaults.retry_cooldown_secs,
            ),
            put_retry_attempts: env_parse("UPLOAD_PUT_RETRY_ATTEMPTS", defaults.put_retry_attempts),
            put_retry_delay_ms: env_parse("UPLOAD_PUT_RETRY_DELAY_MS", defaults.put_retry_delay_ms),
            temp_dir: env::var("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            max_file_size_bytes: env_parse("UPLOAD_MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes),
            allowed_types: env_allowed_types("UPLOAD_ALLOWED_TYPES")
                .unwrap_or(defaults.allowed_types),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn put_retry_delay(&self) -> Duration {
        Duration::from_millis(self.put_retry_delay_ms)
    }

    /// `ext` is matched lowercase, without the leading dot.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_types.iter().any(|t| t.extension == ext)
    }

    /// Whether the extension/content-type pair is accepted. Matching them
    /// independently would let a `.png` through with any allowed content
    /// type, so the pair is the unit of validation.
    pub fn type_allowed(&self, ext: &str, content_type: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_types
            .iter()
            .any(|t| t.extension == ext && t.content_type == content_type)
    }
}

fn default_allowed_types() -> Vec<AllowedType> {
    [
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("pdf", "application/pdf"),
        (
            "pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        (
            "docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        ("txt", "text/plain"),
    ]
    .iter()
    .map(|(extension, content_type)| AllowedType {
        extension: extension.to_string(),
        content_type: content_type.to_string(),
    })
    .collect()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// Comma-separated `extension=content/type` pairs, e.g.
// "png=image/png,pdf=application/pdf".
fn env_allowed_types(key: &str) -> Option<Vec<AllowedType>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .filter_map(|entry| {
                let (extension, content_type) = entry.trim().split_once('=')?;
                if extension.is_empty() || content_type.is_empty() {
                    return None;
                }
                Some(AllowedType {
                    extension: extension.to_ascii_lowercase(),
                    content_type: content_type.to_string(),
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_contract() {
        let config = UploadConfig::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.queue_depth, 100);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.retry_cooldown_secs, 300);
        assert_eq!(config.max_file_size_bytes, 10 * 1024 * 1024);
        assert!(config.temp_dir.ends_with("notex-uploads"));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = UploadConfig::default();
        assert!(config.extension_allowed("png"));
        assert!(config.extension_allowed("PNG"));
        assert!(!config.extension_allowed("exe"));
    }

    #[test]
    fn extension_and_content_type_match_as_a_pair() {
        let config = UploadConfig::default();
        assert!(config.type_allowed("png", "image/png"));
        assert!(config.type_allowed("jpg", "image/jpeg"));
        assert!(config.type_allowed("jpeg", "image/jpeg"));
        // Both halves allowed in isolation, but not together.
        assert!(!config.type_allowed("png", "application/pdf"));
        assert!(!config.type_allowed("png", "image/svg+xml"));
    }
}
