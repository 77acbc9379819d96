//! Bounded worker pool.
//!
//! A fixed number of worker loops share one bounded channel of task ids.
//! When the channel is full, `dispatch` runs the task on the submitting
//! task instead of dropping it, so saturation slows producers down rather
//! than losing work.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::worker::{ProcessOutcome, UploadWorker};

#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub queue_depth: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_depth: 100,
        }
    }
}

pub struct WorkerPool {
    worker: Arc<UploadWorker>,
    tx: mpsc::Sender<Uuid>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(worker: Arc<UploadWorker>, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Uuid>(config.queue_depth.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..config.worker_count.max(1) {
            let worker = worker.clone();
            let rx = rx.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                tracing::debug!(worker_id, "Upload worker loop started");
                loop {
                    // Hold the receiver lock only while waiting for the next
                    // id, never while processing, so the loops run tasks
                    // concurrently.
                    let next = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            _ = shutdown_rx.changed() => None,
                            msg = guard.recv() => msg,
                        }
                    };
                    match next {
                        Some(task_id) => Self::run_one(&worker, task_id).await,
                        None => break,
                    }
                }
                tracing::debug!(worker_id, "Upload worker loop stopped");
            });
        }

        Self {
            worker,
            tx,
            shutdown_tx,
        }
    }

    /// Hand a task to the pool. Returns once the task is queued (the common
    /// case) or, under saturation, once it has been processed inline.
    pub async fn dispatch(&self, task_id: Uuid) -> Result<()> {
        match self.tx.try_send(task_id) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task_id)) => {
                tracing::warn!(
                    task_id = %task_id,
                    "Upload queue saturated, running task on the submitting thread"
                );
                Self::run_one(&self.worker, task_id).await;
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(anyhow!("Upload worker pool is shut down"))
            }
        }
    }

    async fn run_one(worker: &UploadWorker, task_id: Uuid) {
        match worker.process(task_id).await {
            Ok(ProcessOutcome::Completed) => {}
            Ok(ProcessOutcome::Skipped(reason)) => {
                tracing::debug!(task_id = %task_id, ?reason, "Upload task skipped");
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    error = %e,
                    "Upload task failed, retry sweep will revisit if eligible"
                );
            }
        }
    }

    /// Signal all worker loops to stop after their current task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
