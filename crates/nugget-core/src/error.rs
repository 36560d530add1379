//! Error types for `nugget-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("question not found: {0:?}")]
  QuestionNotFound(String),

  #[error("question must not be blank")]
  EmptyQuestion,

  #[error("empty document id for answer {answer:?} of {question:?}")]
  EmptyDocId { question: String, answer: String },

  #[error("answer {answer:?} not found under question {question:?}")]
  AnswerNotFound { question: String, answer: String },

  #[error("document {doc_id:?} is not evidence for answer {answer:?} of {question:?}")]
  EvidenceNotFound {
    question: String,
    answer:   String,
    doc_id:   String,
  },

  #[error("group name {0:?} is reserved")]
  ReservedGroup(String),

  #[error("group name must not be empty")]
  EmptyGroupName,

  #[error("unknown annotation key: {0:?}")]
  UnknownKey(Vec<String>),

  #[error("unknown slot: {0:?}")]
  UnknownSlot(String),

  #[error("unknown level: {0:?}")]
  UnknownLevel(String),

  #[error("slot {slot:?} holds {expected} values")]
  SlotKindMismatch { slot: String, expected: String },

  #[error("malformed content universe: {0}")]
  ContentShape(String),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A precondition was violated; indicates a bug in the calling layer.
  InvalidOperation,
  /// A log or file could not be read or written. In-memory state is intact.
  StorageUnavailable,
  /// Persisted data could not be decoded.
  DataCorruption,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Json(_) | Self::ContentShape(_) => ErrorKind::DataCorruption,
      _ => ErrorKind::InvalidOperation,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
