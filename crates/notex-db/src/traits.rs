//! Store trait abstractions for the upload pipeline
//!
//! These traits define the minimal persistence interface the pipeline needs,
//! allowing tests to run against in-memory stores without a database. The
//! concrete Postgres repositories implement them by delegation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use notex_core::models::{NewNoteImage, NewUploadTask, Note, NoteImage, UploadTask};

use crate::db::{NoteImageRepository, NoteRepository, UploadTaskRepository};

/// Durable store for upload task records and their state transitions.
#[async_trait]
pub trait UploadTaskStore: Send + Sync {
    async fn create(&self, new_task: NewUploadTask) -> Result<UploadTask>;

    async fn get(&self, task_id: Uuid) -> Result<Option<UploadTask>>;

    /// Atomic `pending -> processing` transition; `None` when the task is
    /// missing or not pending (idempotent-dispatch guard).
    async fn claim_pending(&self, task_id: Uuid) -> Result<Option<UploadTask>>;

    async fn mark_completed(&self, task_id: Uuid) -> Result<()>;

    /// Record a failure: error message, `retry_count + 1`, `last_retry_at`.
    async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<()>;

    /// Fail with retries exhausted; the task is never requeued again.
    async fn mark_failed_permanent(&self, task_id: Uuid, error: &str) -> Result<()>;

    /// `failed -> pending` ahead of a retry dispatch.
    async fn requeue(&self, task_id: Uuid) -> Result<()>;

    async fn find_retryable(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Vec<UploadTask>>;

    /// Pending tasks untouched since before the cutoff, i.e. tasks whose
    /// dispatch was lost.
    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadTask>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UploadTask>>;

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<UploadTask>>;
}

/// Store for the final note-image metadata.
#[async_trait]
pub trait NoteImageStore: Send + Sync {
    async fn insert(&self, new_image: NewNoteImage) -> Result<NoteImage>;

    /// Highest existing order index for the note, `None` when it has none.
    async fn max_order_index(&self, note_id: Uuid) -> Result<Option<i32>>;

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<NoteImage>>;
}

/// Existence check for upload targets.
#[async_trait]
pub trait NoteLookup: Send + Sync {
    async fn find(&self, note_id: Uuid) -> Result<Option<Note>>;
}

#[async_trait]
impl UploadTaskStore for UploadTaskRepository {
    async fn create(&self, new_task: NewUploadTask) -> Result<UploadTask> {
        self.create(new_task).await
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        self.get(task_id).await
    }

    async fn claim_pending(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        self.claim_pending(task_id).await
    }

    async fn mark_completed(&self, task_id: Uuid) -> Result<()> {
        self.mark_completed(task_id).await
    }

    async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.mark_failed(task_id, error).await
    }

    async fn mark_failed_permanent(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.mark_failed_permanent(task_id, error).await
    }

    async fn requeue(&self, task_id: Uuid) -> Result<()> {
        self.requeue(task_id).await
    }

    async fn find_retryable(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Vec<UploadTask>> {
        self.find_retryable(cutoff, max_retries).await
    }

    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadTask>> {
        self.find_stale_pending(cutoff).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UploadTask>> {
        self.list_for_user(user_id).await
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<UploadTask>> {
        self.list_for_note(note_id).await
    }
}

#[async_trait]
impl NoteImageStore for NoteImageRepository {
    async fn insert(&self, new_image: NewNoteImage) -> Result<NoteImage> {
        self.insert(new_image).await
    }

    async fn max_order_index(&self, note_id: Uuid) -> Result<Option<i32>> {
        self.max_order_index(note_id).await
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<NoteImage>> {
        self.list_for_note(note_id).await
    }
}

#[async_trait]
impl NoteLookup for NoteRepository {
    async fn find(&self, note_id: Uuid) -> Result<Option<Note>> {
        self.find(note_id).await
    }
}
