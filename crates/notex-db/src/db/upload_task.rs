use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use notex_core::constants::MAX_RETRIES;
use notex_core::models::{NewUploadTask, UploadStatus, UploadTask};

const TASK_COLUMNS: &str = r#"
    id, filename, original_filename, content_type, file_size,
    user_id, note_id, status, error_message, retry_count, temp_file_path,
    created_at, updated_at, completed_at, last_retry_at
"#;

/// Persistence for upload task records and their state transitions.
///
/// Tasks are never deleted; completed and exhausted tasks remain as an audit
/// trail. Every mutation touches exactly one row and refreshes `updated_at`.
#[derive(Clone)]
pub struct UploadTaskRepository {
    pool: PgPool,
}

impl UploadTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new task in `pending` state.
    #[tracing::instrument(skip(self, new_task))]
    pub async fn create(&self, new_task: NewUploadTask) -> Result<UploadTask> {
        let task: UploadTask = sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            INSERT INTO upload_tasks (
                filename, original_filename, content_type, file_size,
                user_id, note_id, status, temp_file_path
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&new_task.filename)
        .bind(&new_task.original_filename)
        .bind(&new_task.content_type)
        .bind(new_task.file_size)
        .bind(new_task.user_id)
        .bind(new_task.note_id)
        .bind(UploadStatus::Pending.to_string())
        .bind(&new_task.temp_file_path)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert upload task")?;

        tracing::info!(
            task_id = %task.id,
            note_id = %task.note_id,
            user_id = %task.user_id,
            "Upload task created"
        );

        Ok(task)
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM upload_tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load upload task")
    }

    /// Atomically transition `pending -> processing` and return the claimed
    /// task. Returns `None` when the task is missing or no longer pending,
    /// which makes double-dispatch (enqueue racing the retry sweep) a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn claim_pending(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            UPDATE upload_tasks
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = $3
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(UploadStatus::Processing.to_string())
        .bind(UploadStatus::Pending.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim upload task")
    }

    /// Transition `processing -> completed` and stamp `completed_at`.
    #[tracing::instrument(skip(self))]
    pub async fn mark_completed(&self, task_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_tasks
            SET status = $2, completed_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(UploadStatus::Completed.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to mark upload task completed")?;
        Ok(())
    }

    /// Record a failure: set the error message, bump `retry_count` and stamp
    /// `last_retry_at` so the sweep's cooldown window starts now.
    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_tasks
            SET status = $2, error_message = $3,
                retry_count = retry_count + 1, last_retry_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(UploadStatus::Failed.to_string())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark upload task failed")?;
        Ok(())
    }

    /// Fail a task with no further retries (payload unrecoverable). Pins
    /// `retry_count` to the cap so `can_retry` never holds again.
    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed_permanent(&self, task_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_tasks
            SET status = $2, error_message = $3,
                retry_count = GREATEST(retry_count, $4), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(UploadStatus::Failed.to_string())
        .bind(error)
        .bind(MAX_RETRIES)
        .execute(&self.pool)
        .await
        .context("Failed to mark upload task permanently failed")?;
        Ok(())
    }

    /// Transition `failed -> pending` ahead of a retry dispatch. A task that
    /// moved state since the sweep read it is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn requeue(&self, task_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_tasks
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(task_id)
        .bind(UploadStatus::Pending.to_string())
        .bind(UploadStatus::Failed.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to requeue upload task")?;
        Ok(())
    }

    /// Failed tasks eligible for another retry: under the retry cap and past
    /// the cooldown window (or never retried).
    pub async fn find_retryable(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Vec<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM upload_tasks
            WHERE status = $1 AND retry_count < $2
              AND (last_retry_at IS NULL OR last_retry_at < $3)
            ORDER BY created_at ASC
            "#
        ))
        .bind(UploadStatus::Failed.to_string())
        .bind(max_retries)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query retryable upload tasks")
    }

    /// Pending tasks untouched since before the cutoff. Dispatch after enqueue
    /// (and after a sweep requeue) is fire-and-forget; a task whose dispatch
    /// was lost sits in `pending` with no queued work, and only this query
    /// gets it moving again.
    pub async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM upload_tasks
            WHERE status = $1 AND updated_at < $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(UploadStatus::Pending.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query stale pending upload tasks")
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM upload_tasks WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list upload tasks for user")
    }

    pub async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<UploadTask>> {
        sqlx::query_as::<Postgres, UploadTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM upload_tasks WHERE note_id = $1 ORDER BY created_at ASC"
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list upload tasks for note")
    }

    pub async fn count_for_user_with_status(
        &self,
        user_id: Uuid,
        status: UploadStatus,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_tasks WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(status.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count upload tasks for user")?;
        Ok(count)
    }
}
