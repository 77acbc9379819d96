use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use notex_core::models::{NewNoteImage, NoteImage};

/// Persistence for the final note-image records.
///
/// The table carries a UNIQUE (note_id, order_index) constraint as a backstop
/// behind the allocator's per-note serialization; an insert that would collide
/// surfaces as an error instead of silently corrupting display order.
#[derive(Clone)]
pub struct NoteImageRepository {
    pool: PgPool,
}

impl NoteImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, new_image))]
    pub async fn insert(&self, new_image: NewNoteImage) -> Result<NoteImage> {
        let image: NoteImage = sqlx::query_as::<Postgres, NoteImage>(
            r#"
            INSERT INTO note_images (note_id, filename, order_index)
            VALUES ($1, $2, $3)
            RETURNING id, note_id, filename, order_index, created_at
            "#,
        )
        .bind(new_image.note_id)
        .bind(&new_image.filename)
        .bind(new_image.order_index)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert note image")?;

        tracing::info!(
            image_id = %image.id,
            note_id = %image.note_id,
            order_index = image.order_index,
            "Note image created"
        );

        Ok(image)
    }

    /// Highest existing order index for a note, `None` when the note has no
    /// images. Indices may be sparse after the note editor compacts or
    /// deletes; callers must not assume density.
    pub async fn max_order_index(&self, note_id: Uuid) -> Result<Option<i32>> {
        let max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(order_index) FROM note_images WHERE note_id = $1")
                .bind(note_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to read max order index")?;
        Ok(max)
    }

    pub async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<NoteImage>> {
        sqlx::query_as::<Postgres, NoteImage>(
            r#"
            SELECT id, note_id, filename, order_index, created_at
            FROM note_images
            WHERE note_id = $1
            ORDER BY order_index ASC
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list note images")
    }
}
