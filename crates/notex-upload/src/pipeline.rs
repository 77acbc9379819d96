//! Wires the upload subsystem together: allocator, worker, pool, retry
//! sweeper and enqueuer, all from one [`UploadConfig`].

use std::sync::Arc;
use std::time::Duration;

use notex_core::{NoteCache, UploadConfig};
use notex_db::{NoteImageStore, NoteLookup, UploadTaskStore};
use notex_storage::ObjectStorage;

use crate::enqueuer::Enqueuer;
use crate::order_index::OrderIndexAllocator;
use crate::pool::{WorkerPool, WorkerPoolConfig};
use crate::sweeper::{RetrySweeper, SweeperHandle};
use crate::worker::{PutRetryPolicy, UploadWorker};

pub struct UploadPipeline {
    enqueuer: Arc<Enqueuer>,
    pool: Arc<WorkerPool>,
    sweeper: SweeperHandle,
}

impl UploadPipeline {
    pub fn new(
        config: UploadConfig,
        tasks: Arc<dyn UploadTaskStore>,
        images: Arc<dyn NoteImageStore>,
        notes: Arc<dyn NoteLookup>,
        storage: Arc<dyn ObjectStorage>,
        cache: Arc<dyn NoteCache>,
    ) -> Self {
        let allocator = Arc::new(OrderIndexAllocator::new(images));
        let worker = Arc::new(UploadWorker::new(
            tasks.clone(),
            storage,
            allocator,
            cache,
            PutRetryPolicy {
                attempts: config.put_retry_attempts,
                delay: config.put_retry_delay(),
            },
        ));
        let pool = Arc::new(WorkerPool::new(
            worker,
            WorkerPoolConfig {
                worker_count: config.worker_count,
                queue_depth: config.queue_depth,
            },
        ));

        let sweeper = Arc::new(RetrySweeper::new(
            tasks.clone(),
            pool.clone(),
            config.max_retries,
            Duration::from_secs(config.retry_cooldown_secs.max(0) as u64),
        ))
        .start(config.sweep_interval());

        let enqueuer = Arc::new(Enqueuer::new(config, tasks, notes, pool.clone()));

        Self {
            enqueuer,
            pool,
            sweeper,
        }
    }

    pub fn enqueuer(&self) -> Arc<Enqueuer> {
        self.enqueuer.clone()
    }

    /// Stop the retry sweep and signal worker loops to drain.
    pub async fn shutdown(&self) {
        self.sweeper.shutdown().await;
        self.pool.shutdown();
    }
}
