//! SQLite and file persistence for nugget annotation state.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Snapshot files are written next to the
//! database rows they mirror.

mod encode;
mod schema;

pub mod annotation;
pub mod database;
pub mod error;
pub mod files;
pub mod loader;
pub mod saver;
pub mod tsv;

pub use annotation::{AnnotationSchema, AnnotationStore};
pub use database::{ActivityLog, Database, LogEntry, NuggetRecord};
pub use error::{Error, Result};
pub use files::SnapshotDir;
pub use loader::{NuggetLoader, NuggetSource};
pub use saver::NuggetSaver;
