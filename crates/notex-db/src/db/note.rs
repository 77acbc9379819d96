use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use notex_core::models::Note;

/// Read-only lookup into the notes table.
///
/// The notes table is owned by the note service; the upload pipeline only
/// checks that an upload target exists at enqueue time.
#[derive(Clone)]
pub struct NoteRepository {
    pool: PgPool,
}

impl NoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, note_id: Uuid) -> Result<Option<Note>> {
        sqlx::query_as::<Postgres, Note>(
            "SELECT id, owner_id, title, created_at FROM notes WHERE id = $1",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up note")
    }
}
