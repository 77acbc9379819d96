use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable result of a completed upload task.
///
/// `order_index` is unique within one note and defines display order. The
/// pipeline creates each image exactly once and never mutates it afterwards;
/// deletion and index compaction belong to the note editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteImage {
    pub id: Uuid,
    pub note_id: Uuid,
    /// Storage key in the object store.
    pub filename: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new note image.
#[derive(Debug, Clone)]
pub struct NewNoteImage {
    pub note_id: Uuid,
    pub filename: String,
    pub order_index: i32,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for NoteImage {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(NoteImage {
            id: row.get("id"),
            note_id: row.get("note_id"),
            filename: row.get("filename"),
            order_index: row.get("order_index"),
            created_at: row.get("created_at"),
        })
    }
}
