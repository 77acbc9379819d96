//! End-to-end pipeline tests over in-memory stores and a fake object store.
//!
//! The background sweep interval is kept long so tests drive retries
//! deterministically through `sweep_once`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use notex_core::models::{UploadStatus, UploadTask};
use notex_db::traits::{NoteImageStore, UploadTaskStore};
use notex_core::UploadConfig;
use notex_upload::test_helpers::{
    staged_task, MockNoteImageStore, MockNoteLookup, MockObjectStorage, MockUploadTaskStore,
    RecordingNoteCache,
};
use notex_upload::{
    Enqueuer, OrderIndexAllocator, PutRetryPolicy, RetrySweeper, UploadFile, UploadPipeline,
    UploadWorker, WorkerPool, WorkerPoolConfig,
};

struct Harness {
    enqueuer: Enqueuer,
    sweeper: RetrySweeper,
    tasks: Arc<MockUploadTaskStore>,
    images: Arc<MockNoteImageStore>,
    notes: Arc<MockNoteLookup>,
    storage: Arc<MockObjectStorage>,
    cache: Arc<RecordingNoteCache>,
    _staging: tempfile::TempDir,
}

/// Manual assembly with an immediate retry cooldown and no put retries, so
/// each failure needs one `sweep_once` to come back.
fn harness(pool_config: WorkerPoolConfig) -> Harness {
    let staging = tempfile::tempdir().unwrap();
    let config = UploadConfig {
        temp_dir: staging.path().to_path_buf(),
        ..UploadConfig::default()
    };

    let tasks = Arc::new(MockUploadTaskStore::new());
    let images = Arc::new(MockNoteImageStore::new());
    let notes = Arc::new(MockNoteLookup::new());
    let storage = Arc::new(MockObjectStorage::new());
    let cache = Arc::new(RecordingNoteCache::new());

    let worker = Arc::new(UploadWorker::new(
        tasks.clone(),
        storage.clone(),
        Arc::new(OrderIndexAllocator::new(images.clone())),
        cache.clone(),
        PutRetryPolicy {
            attempts: 1,
            delay: Duration::from_millis(0),
        },
    ));
    let pool = Arc::new(WorkerPool::new(worker, pool_config));
    let sweeper = RetrySweeper::new(
        tasks.clone(),
        pool.clone(),
        config.max_retries,
        Duration::from_millis(0),
    );
    let enqueuer = Enqueuer::new(config, tasks.clone(), notes.clone(), pool);

    Harness {
        enqueuer,
        sweeper,
        tasks,
        images,
        notes,
        storage,
        cache,
        _staging: staging,
    }
}

fn png(data: Vec<u8>) -> UploadFile {
    UploadFile {
        original_filename: "photo.png".to_string(),
        content_type: "image/png".to_string(),
        data,
    }
}

async fn wait_for_task(
    tasks: &MockUploadTaskStore,
    task_id: Uuid,
    what: &str,
    pred: impl Fn(&UploadTask) -> bool,
) -> UploadTask {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(task) = tasks.get(task_id).await.unwrap() {
            if pred(&task) {
                return task;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_completes_end_to_end() {
    let staging = tempfile::tempdir().unwrap();
    let config = UploadConfig {
        temp_dir: staging.path().to_path_buf(),
        // Keep the background sweep out of this test.
        sweep_interval_secs: 3600,
        ..UploadConfig::default()
    };

    let tasks: Arc<MockUploadTaskStore> = Arc::new(MockUploadTaskStore::new());
    let notes = Arc::new(MockNoteLookup::new());
    let images = Arc::new(MockNoteImageStore::new());
    let storage = Arc::new(MockObjectStorage::new());
    let cache = Arc::new(RecordingNoteCache::new());

    let pipeline = UploadPipeline::new(
        config,
        tasks.clone(),
        images.clone(),
        notes.clone(),
        storage.clone(),
        cache.clone(),
    );

    let note_id = notes.add_note().await;
    let user_id = Uuid::new_v4();
    let task_id = pipeline
        .enqueuer()
        .enqueue(note_id, user_id, png(vec![7; 500_000]))
        .await
        .unwrap();

    // Cache eviction is the worker's last side effect.
    wait_for("note cache eviction", || cache.evicted().contains(&note_id)).await;

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert!(task.completed_at.is_some());
    assert_eq!(storage.object(&task.filename), Some(vec![7; 500_000]));
    assert!(!tokio::fs::try_exists(&task.temp_file_path).await.unwrap());

    let recorded = images.list_for_note(note_id).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].order_index, 0);
    assert_eq!(recorded[0].filename, task.filename);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_uploads_to_one_note_get_dense_distinct_indices() {
    let h = harness(WorkerPoolConfig::default());
    let note_id = h.notes.add_note().await;
    let user_id = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(
            h.enqueuer
                .enqueue(note_id, user_id, png(vec![1, 2, 3]))
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        wait_for_task(&h.tasks, *id, "upload completion", UploadTask::is_completed).await;
    }

    let indices: Vec<i32> = h
        .images
        .list_for_note(note_id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.order_index)
        .collect();
    assert_eq!(indices, (0..12).collect::<Vec<i32>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn uploads_to_different_notes_do_not_interfere() {
    let h = harness(WorkerPoolConfig::default());
    let user_id = Uuid::new_v4();

    let mut expectations = Vec::new();
    for _ in 0..4 {
        let note_id = h.notes.add_note().await;
        let first = h.enqueuer.enqueue(note_id, user_id, png(vec![1])).await.unwrap();
        let second = h.enqueuer.enqueue(note_id, user_id, png(vec![2])).await.unwrap();
        expectations.push((note_id, first, second));
    }
    for (_, first, second) in &expectations {
        wait_for_task(&h.tasks, *first, "upload completion", UploadTask::is_completed).await;
        wait_for_task(&h.tasks, *second, "upload completion", UploadTask::is_completed).await;
    }

    for (note_id, _, _) in &expectations {
        let indices: Vec<i32> = h
            .images
            .list_for_note(*note_id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.order_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_sweep_recovers_from_transient_failures() {
    let h = harness(WorkerPoolConfig::default());
    let note_id = h.notes.add_note().await;
    h.storage.fail_next(2);

    let task_id = h
        .enqueuer
        .enqueue(note_id, Uuid::new_v4(), png(vec![9]))
        .await
        .unwrap();

    let task = wait_for_task(&h.tasks, task_id, "first failure", |t| {
        t.is_failed() && t.retry_count == 1
    })
    .await;
    assert!(task.error_message.is_some());
    assert!(tokio::fs::try_exists(&task.temp_file_path).await.unwrap());

    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 1);
    wait_for_task(&h.tasks, task_id, "second failure", |t| {
        t.is_failed() && t.retry_count == 2
    })
    .await;

    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 1);
    let task = wait_for_task(&h.tasks, task_id, "completion", UploadTask::is_completed).await;

    assert_eq!(h.images.list_for_note(note_id).await.unwrap().len(), 1);
    assert!(h.storage.object(&task.filename).is_some());
    assert!(!tokio::fs::try_exists(&task.temp_file_path).await.unwrap());
    assert_eq!(h.cache.evicted(), vec![note_id]);
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_stop_after_the_cap() {
    let h = harness(WorkerPoolConfig::default());
    let note_id = h.notes.add_note().await;
    h.storage.fail_next(u32::MAX);

    let task_id = h
        .enqueuer
        .enqueue(note_id, Uuid::new_v4(), png(vec![9]))
        .await
        .unwrap();

    for expected_retries in 1..=3 {
        wait_for_task(&h.tasks, task_id, "failure", move |t| {
            t.is_failed() && t.retry_count == expected_retries
        })
        .await;
        if expected_retries < 3 {
            assert_eq!(h.sweeper.sweep_once().await.unwrap(), 1);
        }
    }

    // Retries exhausted; the sweep leaves the task alone.
    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 0);
    let task = h.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, UploadStatus::Failed);
    assert_eq!(task.retry_count, 3);
    assert!(h.images.list_for_note(note_id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_pending_task_is_redispatched_by_the_sweep() {
    let h = harness(WorkerPoolConfig::default());
    let staging = tempfile::tempdir().unwrap();

    // A pending task whose dispatch was lost: staged file intact, nothing
    // queued. Without the sweep this would sit in `pending` forever.
    let task = staged_task(staging.path(), b"payload").await;
    h.tasks.insert_task(task.clone());
    assert_eq!(h.storage.put_count(), 0);

    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 1);
    let task = wait_for_task(&h.tasks, task.id, "completion", UploadTask::is_completed).await;
    assert!(h.storage.object(&task.filename).is_some());
    assert_eq!(task.retry_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_staged_file_fails_permanently_without_processing() {
    let h = harness(WorkerPoolConfig::default());
    let staging = tempfile::tempdir().unwrap();

    let mut task = staged_task(staging.path(), b"gone").await;
    tokio::fs::remove_file(&task.temp_file_path).await.unwrap();
    task.status = UploadStatus::Failed;
    task.retry_count = 1;
    task.error_message = Some("object store unreachable".to_string());
    h.tasks.insert_task(task.clone());

    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 0);

    let stored = h.tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UploadStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .contains("Staged file missing"));
    // Never handed to a worker again.
    assert_eq!(h.storage.put_count(), 0);
    assert_eq!(h.sweeper.sweep_once().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn saturated_queue_slows_producers_instead_of_dropping_work() {
    let h = harness(WorkerPoolConfig {
        worker_count: 1,
        queue_depth: 1,
    });
    h.storage.set_put_delay(Duration::from_millis(50));
    let user_id = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..6 {
        let note_id = h.notes.add_note().await;
        ids.push(
            h.enqueuer
                .enqueue(note_id, user_id, png(vec![1]))
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        wait_for_task(&h.tasks, *id, "upload completion", UploadTask::is_completed).await;
    }
    assert_eq!(h.storage.object_count(), 6);
}
