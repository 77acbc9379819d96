//! Notex Core Library
//!
//! This crate provides the domain models, error types, configuration and cache
//! hooks shared by the Notex upload pipeline crates.
//!
//! The sqlx row mappings are gated behind the on-by-default `sqlx` feature so
//! consumers that never touch the database can build without it.

pub mod config;
pub mod constants;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export commonly used types
pub use config::{AllowedType, UploadConfig};
pub use error::AppError;
pub use hooks::{NoOpNoteCache, NoteCache};
