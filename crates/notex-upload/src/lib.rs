//! Notex upload pipeline
//!
//! Decouples user-facing requests from slow, fallible object-storage writes.
//! The [`Enqueuer`] stages the file to durable local disk, persists a pending
//! [`notex_core::models::UploadTask`] and returns immediately; a bounded
//! [`WorkerPool`] drains tasks through the [`UploadWorker`], which uploads the
//! bytes, assigns a per-note order index via the [`OrderIndexAllocator`] and
//! finalizes the task; the [`RetrySweeper`] periodically requeues failed tasks
//! that are still under the retry cap and past their cooldown.
//!
//! Delivery to the object store is at-least-once with idempotent retry; no
//! failure after enqueue ever reaches the original request path.

pub mod enqueuer;
pub mod order_index;
pub mod pipeline;
pub mod pool;
pub mod sweeper;
pub mod test_helpers;
pub mod worker;

pub use enqueuer::{Enqueuer, UploadFile};
pub use order_index::OrderIndexAllocator;
pub use pipeline::UploadPipeline;
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use sweeper::{RetrySweeper, SweeperHandle};
pub use worker::{ProcessOutcome, PutRetryPolicy, SkipReason, UploadWorker};
