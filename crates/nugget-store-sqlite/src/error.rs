//! Error type for `nugget-store-sqlite`.

use std::path::PathBuf;

use nugget_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] nugget_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("i/o error on {}: {source}", .path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("malformed nugget file {}: {source}", .path.display())]
  MalformedSnapshot {
    path:   PathBuf,
    source: serde_json::Error,
  },

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A table, column, topic or user name that cannot be used as a SQL
  /// identifier or file name component.
  #[error("invalid identifier: {0:?}")]
  InvalidIdentifier(String),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Database(_) | Self::Io { .. } => ErrorKind::StorageUnavailable,
      Self::Json(_) | Self::MalformedSnapshot { .. } | Self::DateParse(_) => {
        ErrorKind::DataCorruption
      }
      Self::InvalidIdentifier(_) => ErrorKind::InvalidOperation,
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
