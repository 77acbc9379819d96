//! Retry sweep: periodically requeues failed tasks whose cooldown has
//! elapsed, redispatches pending tasks whose dispatch was lost, and
//! permanently fails tasks whose staged file is gone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs;
use tokio::sync::mpsc;

use notex_core::models::UploadTask;
use notex_db::UploadTaskStore;

use crate::pool::WorkerPool;

pub struct RetrySweeper {
    tasks: Arc<dyn UploadTaskStore>,
    pool: Arc<WorkerPool>,
    max_retries: i32,
    cooldown: chrono::Duration,
}

/// Stops the sweep loop when dropped or shut down explicitly.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl RetrySweeper {
    pub fn new(
        tasks: Arc<dyn UploadTaskStore>,
        pool: Arc<WorkerPool>,
        max_retries: i32,
        cooldown: Duration,
    ) -> Self {
        Self {
            tasks,
            pool,
            max_retries,
            cooldown: chrono::Duration::from_std(cooldown)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    /// Spawn the periodic sweep loop.
    pub fn start(self: Arc<Self>, period: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh start
            // does not race the initial dispatch of just-enqueued tasks.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.sweep_once().await {
                            Ok(0) => {}
                            Ok(n) => tracing::info!(requeued = n, "Retry sweep requeued failed uploads"),
                            Err(e) => tracing::error!(error = %e, "Retry sweep failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Retry sweeper stopped");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown_tx }
    }

    /// One sweep pass. Returns the number of tasks put back in flight.
    ///
    /// Two kinds of candidates: failed tasks past their cooldown and under
    /// the retry cap, and pending tasks untouched since before the cutoff,
    /// whose dispatch was lost (pool shut down mid-flight, or a requeue whose
    /// redispatch failed). Redispatching a task that is in fact still queued
    /// is harmless; the worker's claim is a compare-and-set.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.cooldown;
        let mut candidates = self
            .tasks
            .find_retryable(cutoff, self.max_retries)
            .await
            .context("Failed to query retryable upload tasks")?;
        candidates.extend(
            self.tasks
                .find_stale_pending(cutoff)
                .await
                .context("Failed to query stale pending upload tasks")?,
        );

        let mut requeued = 0;
        for task in candidates {
            if !task.is_pending() && !task.can_retry() {
                continue;
            }
            match self.revisit(&task).await {
                Ok(true) => requeued += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        task_id = %task.id,
                        error = %e,
                        "Failed to revisit upload task, leaving it for the next sweep"
                    );
                }
            }
        }
        Ok(requeued)
    }

    /// Put one eligible task back in flight, or fail it permanently when its
    /// staged file is gone. Returns whether it was redispatched.
    async fn revisit(&self, task: &UploadTask) -> Result<bool> {
        let staged = fs::try_exists(&task.temp_file_path)
            .await
            .with_context(|| format!("Failed to stat staged file {}", task.temp_file_path))?;

        if !staged {
            tracing::warn!(
                task_id = %task.id,
                path = %task.temp_file_path,
                "Staged file missing, failing upload task permanently"
            );
            self.tasks
                .mark_failed_permanent(task.id, "Staged file missing, payload unrecoverable")
                .await
                .context("Failed to permanently fail upload task")?;
            return Ok(false);
        }

        // A stale pending task is already in the right state; it only needs
        // a fresh dispatch.
        if task.is_failed() {
            tracing::info!(
                task_id = %task.id,
                retry_count = task.retry_count,
                "Requeueing failed upload task"
            );
            self.tasks
                .requeue(task.id)
                .await
                .context("Failed to requeue upload task")?;
        } else {
            tracing::info!(task_id = %task.id, "Redispatching stale pending upload task");
        }
        self.pool
            .dispatch(task.id)
            .await
            .context("Failed to dispatch upload task")?;
        Ok(true)
    }
}
