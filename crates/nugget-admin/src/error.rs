//! Error type for `nugget-admin`.

use std::path::PathBuf;

use nugget_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] nugget_core::Error),

  #[error("store error: {0}")]
  Store(#[from] nugget_store_sqlite::Error),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("i/o error on {}: {source}", .path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("malformed json in {}: {source}", .path.display())]
  MalformedJson {
    path:   PathBuf,
    source: serde_json::Error,
  },

  #[error("malformed rubric record at {}:{line}: {source}", .path.display())]
  MalformedRubric {
    path:   PathBuf,
    line:   usize,
    source: serde_json::Error,
  },

  /// A document cannot be marked as having no nugget while it is evidence
  /// for one.
  #[error("document {doc_id:?} of topic {topic_id:?} already has nuggets")]
  DocumentHasNugget { topic_id: String, doc_id: String },

  #[error("{option:?} is not one of the configured {field} options")]
  UnknownOption { field: &'static str, option: String },

  #[error("({question:?}, {answer:?}) is not a selectable nugget for topic {topic_id:?}")]
  UnknownNugget {
    topic_id: String,
    question: String,
    answer:   String,
  },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Store(e) => e.kind(),
      Self::Io { .. } => ErrorKind::StorageUnavailable,
      Self::Config(_) | Self::MalformedJson { .. } | Self::MalformedRubric { .. } => {
        ErrorKind::DataCorruption
      }
      Self::DocumentHasNugget { .. } | Self::UnknownOption { .. } | Self::UnknownNugget { .. } => {
        ErrorKind::InvalidOperation
      }
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
