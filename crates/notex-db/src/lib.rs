//! Notex database layer
//!
//! Postgres repositories for upload tasks and note images, the store traits
//! the pipeline consumes, and pool setup with embedded migrations.
//!
//! Repositories are concrete structs over a `PgPool`; the pipeline depends on
//! the object-safe traits in [`traits`] so tests can substitute in-memory
//! stores without a database.

pub mod db;
pub mod setup;
pub mod traits;

pub use db::{NoteImageRepository, NoteRepository, UploadTaskRepository};
pub use setup::connect;
pub use traits::{NoteImageStore, NoteLookup, UploadTaskStore};
