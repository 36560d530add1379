//! Core value types for the nugget annotation workflow.
//!
//! This crate holds the in-memory state (nugget sets, sentence-level nugget
//! selections, the keyed annotation table, and the curation revision buffer)
//! and is deliberately free of database and filesystem dependencies. Storage
//! backends (e.g. `nugget-store-sqlite`) build on these types.

pub mod content;
pub mod error;
pub mod nugget;
pub mod revision;
pub mod selection;

pub use error::{Error, ErrorKind, Result};
