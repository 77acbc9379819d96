use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::MAX_RETRIES;

/// Lifecycle state of an upload task.
///
/// `Pending --start--> Processing --success--> Completed` (terminal);
/// `Processing --failure--> Failed`, which is terminal unless the retry
/// sweep requeues it back to `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Processing => write!(f, "processing"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// One durable unit of deferred upload work.
///
/// Created `Pending` by the enqueuer, mutated only by the worker
/// (`Pending -> Processing -> Completed | Failed`) and by the retry sweep
/// (`Failed -> Pending` while eligible). Never deleted; completed and
/// exhausted tasks remain as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: Uuid,
    /// Storage key in the object store; also the staged file's unique name.
    pub filename: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub user_id: Uuid,
    pub note_id: Uuid,
    pub status: UploadStatus,
    /// Last failure detail; set only when `status == Failed`.
    pub error_message: Option<String>,
    pub retry_count: i32,
    /// Staged copy of the payload on durable local disk; required for retry.
    pub temp_file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl UploadTask {
    pub fn is_pending(&self) -> bool {
        self.status == UploadStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == UploadStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == UploadStatus::Failed
    }

    /// Whether the retry sweep may requeue this task.
    pub fn can_retry(&self) -> bool {
        self.status == UploadStatus::Failed && self.retry_count < MAX_RETRIES
    }
}

/// Insert payload for a new upload task.
#[derive(Debug, Clone)]
pub struct NewUploadTask {
    pub filename: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub user_id: Uuid,
    pub note_id: Uuid,
    pub temp_file_path: String,
}

/// Response model for the task status/audit endpoints.
#[derive(Debug, Serialize)]
pub struct UploadTaskResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub note_id: Uuid,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<UploadTask> for UploadTaskResponse {
    fn from(task: UploadTask) -> Self {
        Self {
            id: task.id,
            original_filename: task.original_filename,
            content_type: task.content_type,
            file_size: task.file_size,
            note_id: task.note_id,
            status: task.status,
            error_message: task.error_message,
            retry_count: task.retry_count,
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for UploadTask {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UploadTask {
            id: row.get("id"),
            filename: row.get("filename"),
            original_filename: row.get("original_filename"),
            content_type: row.get("content_type"),
            file_size: row.get("file_size"),
            user_id: row.get("user_id"),
            note_id: row.get("note_id"),
            status: row.get::<String, _>("status").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse upload status: {}", e).into())
            })?,
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            temp_file_path: row.get("temp_file_path"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
            last_retry_at: row.get("last_retry_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(status: UploadStatus, retry_count: i32) -> UploadTask {
        UploadTask {
            id: Uuid::new_v4(),
            filename: "abc.png".to_string(),
            original_filename: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            file_size: 500_000,
            user_id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
            status,
            error_message: None,
            retry_count,
            temp_file_path: "/tmp/notex-uploads/abc.png".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            last_retry_at: None,
        }
    }

    #[test]
    fn status_display_round_trips() {
        for status in [
            UploadStatus::Pending,
            UploadStatus::Processing,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn can_retry_requires_failed_status() {
        assert!(!task_with(UploadStatus::Pending, 0).can_retry());
        assert!(!task_with(UploadStatus::Processing, 0).can_retry());
        assert!(!task_with(UploadStatus::Completed, 0).can_retry());
        assert!(task_with(UploadStatus::Failed, 0).can_retry());
    }

    #[test]
    fn can_retry_bounded_by_max_retries() {
        assert!(task_with(UploadStatus::Failed, MAX_RETRIES - 1).can_retry());
        assert!(!task_with(UploadStatus::Failed, MAX_RETRIES).can_retry());
        assert!(!task_with(UploadStatus::Failed, MAX_RETRIES + 2).can_retry());
    }

    #[test]
    fn response_from_task_keeps_audit_fields() {
        let mut task = task_with(UploadStatus::Failed, 2);
        task.error_message = Some("object store unreachable".to_string());
        let id = task.id;

        let response = UploadTaskResponse::from(task);
        assert_eq!(response.id, id);
        assert_eq!(response.status, UploadStatus::Failed);
        assert_eq!(response.retry_count, 2);
        assert_eq!(
            response.error_message.as_deref(),
            Some("object store unreachable")
        );
    }
}
