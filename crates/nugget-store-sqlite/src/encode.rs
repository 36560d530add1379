//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision, so
//! lexical order matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use nugget_core::nugget::NuggetSet;

use crate::{
  Error, Result,
  database::{LogEntry, NuggetRecord},
};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `logs` row.
pub struct RawLogEntry {
  pub username: String,
  pub query:    String,
  pub args:     String,
  pub ts:       String,
}

impl RawLogEntry {
  pub fn into_entry(self) -> Result<LogEntry> {
    Ok(LogEntry {
      username: self.username,
      query:    self.query,
      args:     serde_json::from_str(&self.args)?,
      ts:       decode_dt(&self.ts)?,
    })
  }
}

/// Raw strings read directly from a `nuggets` row.
pub struct RawNuggetRecord {
  pub username:    String,
  pub topic_id:    String,
  pub nugget_json: String,
  pub ts:          String,
}

impl RawNuggetRecord {
  pub fn into_record(self) -> Result<NuggetRecord> {
    Ok(NuggetRecord {
      username:    self.username,
      topic_id:    self.topic_id,
      nugget_json: self.nugget_json,
      ts:          decode_dt(&self.ts)?,
    })
  }

  pub fn decode_nuggets(&self) -> Result<NuggetSet> {
    Ok(serde_json::from_str(&self.nugget_json)?)
  }
}

/// One persisted annotation write, with the level values gathered into a key.
pub struct RawAnnotation {
  pub key:        Vec<String>,
  pub slot_name:  String,
  pub annotation: String,
}
