use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal view of a note.
///
/// The note CRUD surface lives outside the upload pipeline; this model only
/// carries what the enqueuer needs to validate that an upload target exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Note {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Note {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        })
    }
}
