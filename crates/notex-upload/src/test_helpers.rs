//! In-memory store and storage fakes for pipeline tests.
//!
//! These implement the same traits as the Postgres repositories and the real
//! object storage backends, with small hooks for injecting latency and
//! transient failures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use notex_core::constants::MAX_RETRIES;
use notex_core::models::{
    NewNoteImage, NewUploadTask, Note, NoteImage, UploadStatus, UploadTask,
};
use notex_core::NoteCache;
use notex_db::{NoteImageStore, NoteLookup, UploadTaskStore};
use notex_storage::{ObjectStorage, StorageError, StorageResult};

/// Write `data` into `dir` under a fresh storage key and return a pending
/// task pointing at it.
pub async fn staged_task(dir: &Path, data: &[u8]) -> UploadTask {
    let filename = format!("{}.png", Uuid::new_v4());
    let path = dir.join(&filename);
    tokio::fs::write(&path, data).await.unwrap();
    UploadTask {
        id: Uuid::new_v4(),
        filename,
        original_filename: "photo.png".to_string(),
        content_type: "image/png".to_string(),
        file_size: data.len() as i64,
        user_id: Uuid::new_v4(),
        note_id: Uuid::new_v4(),
        status: UploadStatus::Pending,
        error_message: None,
        retry_count: 0,
        temp_file_path: path.to_string_lossy().into_owned(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        completed_at: None,
        last_retry_at: None,
    }
}

#[derive(Default)]
pub struct MockUploadTaskStore {
    tasks: Mutex<HashMap<Uuid, UploadTask>>,
}

impl MockUploadTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task in an arbitrary state.
    pub fn insert_task(&self, task: UploadTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    fn update<F>(&self, task_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut UploadTask),
    {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("Upload task {task_id} not found"))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UploadTaskStore for MockUploadTaskStore {
    async fn create(&self, new_task: NewUploadTask) -> Result<UploadTask> {
        let now = Utc::now();
        let task = UploadTask {
            id: Uuid::new_v4(),
            filename: new_task.filename,
            original_filename: new_task.original_filename,
            content_type: new_task.content_type,
            file_size: new_task.file_size,
            user_id: new_task.user_id,
            note_id: new_task.note_id,
            status: UploadStatus::Pending,
            error_message: None,
            retry_count: 0,
            temp_file_path: new_task.temp_file_path,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_retry_at: None,
        };
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        Ok(self.tasks.lock().unwrap().get(&task_id).cloned())
    }

    async fn claim_pending(&self, task_id: Uuid) -> Result<Option<UploadTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&task_id) {
            Some(task) if task.status == UploadStatus::Pending => {
                task.status = UploadStatus::Processing;
                task.updated_at = Utc::now();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_completed(&self, task_id: Uuid) -> Result<()> {
        self.update(task_id, |task| {
            task.status = UploadStatus::Completed;
            task.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.update(task_id, |task| {
            task.status = UploadStatus::Failed;
            task.error_message = Some(error.to_string());
            task.retry_count += 1;
            task.last_retry_at = Some(Utc::now());
        })
    }

    async fn mark_failed_permanent(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.update(task_id, |task| {
            task.status = UploadStatus::Failed;
            task.error_message = Some(error.to_string());
            task.retry_count = task.retry_count.max(MAX_RETRIES);
            task.last_retry_at = Some(Utc::now());
        })
    }

    async fn requeue(&self, task_id: Uuid) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&task_id) {
            Some(task) if task.status == UploadStatus::Failed => {
                task.status = UploadStatus::Pending;
                task.updated_at = Utc::now();
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(anyhow!("Upload task {task_id} not found")),
        }
    }

    async fn find_retryable(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Vec<UploadTask>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<UploadTask> = tasks
            .values()
            .filter(|t| {
                t.status == UploadStatus::Failed
                    && t.retry_count < max_retries
                    && t.last_retry_at.map(|at| at < cutoff).unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }

    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadTask>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<UploadTask> = tasks
            .values()
            .filter(|t| t.status == UploadStatus::Pending && t.updated_at < cutoff)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UploadTask>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<UploadTask> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(matching)
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<UploadTask>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<UploadTask> = tasks
            .values()
            .filter(|t| t.note_id == note_id)
            .cloned()
            .collect();
        matching.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MockNoteImageStore {
    images: Mutex<Vec<NoteImage>>,
    max_index_delays: Mutex<HashMap<Uuid, Duration>>,
}

impl MockNoteImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate images for a note at the given order indices.
    pub async fn seed(&self, note_id: Uuid, indices: &[i32]) {
        let mut images = self.images.lock().unwrap();
        for &order_index in indices {
            images.push(NoteImage {
                id: Uuid::new_v4(),
                note_id,
                filename: format!("{}.png", Uuid::new_v4()),
                order_index,
                created_at: Utc::now(),
            });
        }
    }

    /// Make `max_order_index` for this note artificially slow.
    pub async fn delay_max_index(&self, note_id: Uuid, delay: Duration) {
        self.max_index_delays.lock().unwrap().insert(note_id, delay);
    }
}

#[async_trait]
impl NoteImageStore for MockNoteImageStore {
    async fn insert(&self, new_image: NewNoteImage) -> Result<NoteImage> {
        let mut images = self.images.lock().unwrap();
        // Same uniqueness rule the database constraint enforces.
        if images
            .iter()
            .any(|i| i.note_id == new_image.note_id && i.order_index == new_image.order_index)
        {
            return Err(anyhow!(
                "duplicate order index {} for note {}",
                new_image.order_index,
                new_image.note_id
            ));
        }
        let image = NoteImage {
            id: Uuid::new_v4(),
            note_id: new_image.note_id,
            filename: new_image.filename,
            order_index: new_image.order_index,
            created_at: Utc::now(),
        };
        images.push(image.clone());
        Ok(image)
    }

    async fn max_order_index(&self, note_id: Uuid) -> Result<Option<i32>> {
        let delay = self
            .max_index_delays
            .lock()
            .unwrap()
            .get(&note_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let images = self.images.lock().unwrap();
        Ok(images
            .iter()
            .filter(|i| i.note_id == note_id)
            .map(|i| i.order_index)
            .max())
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<NoteImage>> {
        let images = self.images.lock().unwrap();
        let mut matching: Vec<NoteImage> = images
            .iter()
            .filter(|i| i.note_id == note_id)
            .cloned()
            .collect();
        matching.sort_by_key(|i| i.order_index);
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MockNoteLookup {
    notes: Mutex<HashMap<Uuid, Note>>,
}

impl MockNoteLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_note(&self) -> Uuid {
        let note = Note {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Lecture notes".to_string(),
            created_at: Utc::now(),
        };
        let id = note.id;
        self.notes.lock().unwrap().insert(id, note);
        id
    }
}

#[async_trait]
impl NoteLookup for MockNoteLookup {
    async fn find(&self, note_id: Uuid) -> Result<Option<Note>> {
        Ok(self.notes.lock().unwrap().get(&note_id).cloned())
    }
}

#[derive(Default)]
pub struct MockObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_next: AtomicU32,
    put_count: AtomicUsize,
    put_delay: Mutex<Option<Duration>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` puts with a transient backend error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Slow every put down, for saturation tests.
    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<String> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::UploadFailed(
                "injected transient failure".to_string(),
            ));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presigned_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("mock://storage/{key}"))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RecordingNoteCache {
    evictions: Mutex<Vec<Uuid>>,
}

impl RecordingNoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evicted(&self) -> Vec<Uuid> {
        self.evictions.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoteCache for RecordingNoteCache {
    async fn evict(&self, note_id: Uuid) {
        self.evictions.lock().unwrap().push(note_id);
    }
}
