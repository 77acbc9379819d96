//! Repository implementations for the upload pipeline's persisted state.
//!
//! Each repository owns the SQL for one entity and relies on single-row
//! read-modify-write statements for all state transitions, so concurrent
//! workers and the retry sweep never observe a half-applied mutation.

pub mod note;
pub mod note_image;
pub mod upload_task;

pub use note::NoteRepository;
pub use note_image::NoteImageRepository;
pub use upload_task::UploadTaskRepository;
