//! Synchronous half of the pipeline: validate, stage to disk, record a
//! pending task, dispatch to the pool, return immediately.
//!
//! The returned task id is the caller's handle for polling status; the
//! upload itself happens on the worker pool. Dispatch failure is not
//! surfaced to the caller because the retry sweep will pick the pending
//! task up anyway.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use uuid::Uuid;

use notex_core::models::{NewUploadTask, UploadTask};
use notex_core::{AppError, UploadConfig};
use notex_db::{NoteLookup, UploadTaskStore};

use crate::pool::WorkerPool;

/// An upload as received from the outer surface, already buffered.
pub struct UploadFile {
    pub original_filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct Enqueuer {
    config: UploadConfig,
    tasks: Arc<dyn UploadTaskStore>,
    notes: Arc<dyn NoteLookup>,
    pool: Arc<WorkerPool>,
}

impl Enqueuer {
    pub fn new(
        config: UploadConfig,
        tasks: Arc<dyn UploadTaskStore>,
        notes: Arc<dyn NoteLookup>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            config,
            tasks,
            notes,
            pool,
        }
    }

    /// Accept an upload for a note. Returns the id of the pending task.
    #[tracing::instrument(skip(self, file), fields(filename = %file.original_filename, size = file.data.len()))]
    pub async fn enqueue(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        file: UploadFile,
    ) -> Result<Uuid, AppError> {
        let extension = self.validate(&file)?;

        self.notes
            .find(note_id)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to look up note: {e:#}")))?
            .ok_or_else(|| AppError::NotFound(format!("Note {note_id} not found")))?;

        let unique_filename = format!("{}.{}", Uuid::new_v4(), extension);
        let temp_path = self.stage_file(&unique_filename, &file.data).await?;

        let task = self
            .tasks
            .create(NewUploadTask {
                filename: unique_filename,
                original_filename: file.original_filename,
                content_type: file.content_type,
                file_size: file.data.len() as i64,
                user_id,
                note_id,
                temp_file_path: temp_path.to_string_lossy().into_owned(),
            })
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload task: {e:#}")))?;

        if let Err(e) = self.pool.dispatch(task.id).await {
            tracing::warn!(
                task_id = %task.id,
                error = %e,
                "Dispatch failed, task stays pending for the retry sweep"
            );
        }

        tracing::info!(
            task_id = %task.id,
            note_id = %note_id,
            user_id = %user_id,
            "Upload task enqueued"
        );
        Ok(task.id)
    }

    pub async fn task(&self, task_id: Uuid) -> Result<UploadTask, AppError> {
        self.tasks
            .get(task_id)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to load upload task: {e:#}")))?
            .ok_or_else(|| AppError::NotFound(format!("Upload task {task_id} not found")))
    }

    pub async fn tasks_for_user(&self, user_id: Uuid) -> Result<Vec<UploadTask>, AppError> {
        self.tasks
            .list_for_user(user_id)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list upload tasks: {e:#}")))
    }

    pub async fn tasks_for_note(&self, note_id: Uuid) -> Result<Vec<UploadTask>, AppError> {
        self.tasks
            .list_for_note(note_id)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list upload tasks: {e:#}")))
    }

    /// Returns the lowercased extension on success.
    fn validate(&self, file: &UploadFile) -> Result<String, AppError> {
        if file.data.is_empty() {
            return Err(AppError::InvalidInput("File is empty".to_string()));
        }
        if file.data.len() > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.config.max_file_size_bytes
            )));
        }

        let extension = file
            .original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .ok_or_else(|| {
                AppError::InvalidInput("Filename has no extension".to_string())
            })?;

        if !self.config.extension_allowed(&extension) {
            return Err(AppError::InvalidInput(format!(
                "File type .{extension} is not allowed"
            )));
        }
        if !self.config.type_allowed(&extension, &file.content_type) {
            return Err(AppError::InvalidInput(format!(
                "Content type {} does not match .{extension}",
                file.content_type
            )));
        }
        Ok(extension)
    }

    async fn stage_file(&self, unique_filename: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|e| {
                AppError::Internal(format!("Failed to create staging directory: {e}"))
            })?;
        let path = self.config.temp_dir.join(unique_filename);
        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stage upload: {e}")))?;
        Ok(path)
    }
}
