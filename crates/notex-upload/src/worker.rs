//! Upload worker: drains exactly one task per invocation.
//!
//! State machine for a task:
//!
//! ```text
//! PENDING --start--> PROCESSING --success--> COMPLETED   (terminal)
//! PROCESSING --failure--> FAILED                          (terminal unless requeued)
//! FAILED --retry sweep, while eligible--> PENDING
//! ```
//!
//! A task whose status is no longer `pending` is skipped without side effects,
//! which makes double-dispatch (initial enqueue racing the retry sweep)
//! harmless. A failure records the error on the task and leaves the staged
//! file in place so a later retry can reuse it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

use notex_core::models::UploadTask;
use notex_core::NoteCache;
use notex_db::UploadTaskStore;
use notex_storage::ObjectStorage;

use crate::order_index::OrderIndexAllocator;

/// Why a worker invocation had nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    NotPending,
}

/// Result of one worker invocation. Skipping is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Skipped(SkipReason),
}

/// Bounded fixed-delay retry for the object-store put, applied within a
/// single worker invocation. Independent of (and much tighter than) the
/// task-level retry sweep.
#[derive(Debug, Clone, Copy)]
pub struct PutRetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PutRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

pub struct UploadWorker {
    tasks: Arc<dyn UploadTaskStore>,
    storage: Arc<dyn ObjectStorage>,
    allocator: Arc<OrderIndexAllocator>,
    cache: Arc<dyn NoteCache>,
    retry_policy: PutRetryPolicy,
}

impl UploadWorker {
    pub fn new(
        tasks: Arc<dyn UploadTaskStore>,
        storage: Arc<dyn ObjectStorage>,
        allocator: Arc<OrderIndexAllocator>,
        cache: Arc<dyn NoteCache>,
        retry_policy: PutRetryPolicy,
    ) -> Self {
        Self {
            tasks,
            storage,
            allocator,
            cache,
            retry_policy,
        }
    }

    /// Process one task end to end.
    ///
    /// On failure the error is recorded on the task and re-raised to the
    /// caller; the caller (the pool) logs it instead of propagating further,
    /// so nothing ever reaches the request that triggered the upload.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, task_id: Uuid) -> Result<ProcessOutcome> {
        let Some(task) = self
            .tasks
            .get(task_id)
            .await
            .context("Failed to load upload task")?
        else {
            tracing::warn!(task_id = %task_id, "Upload task not found, nothing to process");
            return Ok(ProcessOutcome::Skipped(SkipReason::NotFound));
        };

        if !task.is_pending() {
            tracing::debug!(
                task_id = %task_id,
                status = %task.status,
                "Upload task not pending, skipping"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::NotPending));
        }

        // Atomic claim; losing the race to another dispatch is a skip.
        let Some(task) = self
            .tasks
            .claim_pending(task_id)
            .await
            .context("Failed to claim upload task")?
        else {
            return Ok(ProcessOutcome::Skipped(SkipReason::NotPending));
        };

        match self.run(&task).await {
            Ok(()) => {
                self.tasks
                    .mark_completed(task.id)
                    .await
                    .context("Failed to finalize completed upload task")?;

                if let Err(e) = fs::remove_file(&task.temp_file_path).await {
                    tracing::warn!(
                        task_id = %task.id,
                        path = %task.temp_file_path,
                        error = %e,
                        "Failed to delete staged file after upload"
                    );
                }

                self.cache.evict(task.note_id).await;

                tracing::info!(
                    task_id = %task.id,
                    note_id = %task.note_id,
                    key = %task.filename,
                    "Upload task completed"
                );
                Ok(ProcessOutcome::Completed)
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    retry_count = task.retry_count + 1,
                    "Upload task failed"
                );
                if let Err(mark_err) = self.tasks.mark_failed(task.id, &format!("{e:#}")).await {
                    tracing::error!(
                        task_id = %task.id,
                        error = %mark_err,
                        "Failed to record upload task failure"
                    );
                }
                // Staged file kept for the retry sweep.
                Err(e)
            }
        }
    }

    async fn run(&self, task: &UploadTask) -> Result<()> {
        let data = fs::read(&task.temp_file_path).await.with_context(|| {
            format!("Failed to read staged file {}", task.temp_file_path)
        })?;

        self.put_with_retry(&task.filename, data, &task.content_type)
            .await?;

        let image = self
            .allocator
            .assign_next(task.note_id, &task.filename)
            .await
            .context("Failed to assign image order index")?;

        tracing::debug!(
            task_id = %task.id,
            image_id = %image.id,
            order_index = image.order_index,
            "Note image recorded"
        );
        Ok(())
    }

    async fn put_with_retry(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let attempts = self.retry_policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.storage.put(key, data.clone(), content_type).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        attempts,
                        error = %e,
                        "Object store put failed"
                    );
                    if attempt >= attempts {
                        return Err(anyhow::Error::new(e)
                            .context("Object store put exhausted its attempts"));
                    }
                    tokio::time::sleep(self.retry_policy.delay).await;
                }
            }
        }
    }
}
