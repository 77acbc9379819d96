//! Domain models for the upload pipeline.

pub mod note;
pub mod note_image;
pub mod upload_task;

pub use note::Note;
pub use note_image::{NewNoteImage, NoteImage};
pub use upload_task::{NewUploadTask, UploadStatus, UploadTask, UploadTaskResponse};
