//! Hooks for collaborating subsystems
//!
//! The upload pipeline does not own the note read path; it only needs to tell
//! whoever caches note views that a note changed. The note service implements
//! this trait over its real cache; the pipeline calls `evict` after a task
//! completes so subsequent reads see the new image.

use async_trait::async_trait;
use uuid::Uuid;

/// Cache invalidation hook for note views.
#[async_trait]
pub trait NoteCache: Send + Sync {
    /// Drop any cached view of the given note.
    async fn evict(&self, note_id: Uuid);
}

/// No-op implementation for deployments without a note cache.
pub struct NoOpNoteCache;

#[async_trait]
impl NoteCache for NoOpNoteCache {
    async fn evict(&self, note_id: Uuid) {
        tracing::debug!(note_id = %note_id, "No note cache configured, eviction skipped");
    }
}
