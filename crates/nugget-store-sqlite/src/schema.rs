//! SQL schema for the annotation databases.
//!
//! [`SCHEMA`] is executed on every connection open. Annotation tables are
//! declared per store from their level names, see [`annotation_table`].

use crate::{Error, Result};

/// Shared tables; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Audit trail of every write. Informational only; never replayed.
CREATE TABLE IF NOT EXISTS logs (
    username TEXT NOT NULL,
    query    TEXT NOT NULL,
    args     TEXT NOT NULL,   -- JSON object
    ts       TEXT NOT NULL    -- RFC 3339 UTC
);

-- One authoritative serialized NuggetSet per topic, upserted on flush.
CREATE TABLE IF NOT EXISTS nuggets (
    username    TEXT NOT NULL,   -- last writer
    topic_id    TEXT NOT NULL,
    nugget_json TEXT NOT NULL,
    ts          TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS nuggets_topic_idx ON nuggets(topic_id);
CREATE INDEX IF NOT EXISTS logs_user_idx ON logs(username);

PRAGMA user_version = 1;
";

/// Columns every annotation table carries besides its level columns.
pub const RESERVED_COLUMNS: [&str; 4] = ["username", "slot_name", "annotation", "ts"];

/// Accept plain ASCII identifiers only, so names can be interpolated into
/// DDL and queries without quoting games.
pub fn check_identifier(name: &str) -> Result<()> {
  let mut chars = name.chars();
  let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid { Ok(()) } else { Err(Error::InvalidIdentifier(name.to_owned())) }
}

/// DDL for an append-only annotation table with one text column per level.
///
/// Rows are never updated or deleted; the current value of a cell is the
/// most recent row for `(username, levels..., slot_name)`.
pub fn annotation_table(table: &str, levels: &[String]) -> Result<String> {
  check_identifier(table)?;
  for level in levels {
    check_identifier(level)?;
    if RESERVED_COLUMNS.contains(&level.as_str()) {
      return Err(Error::InvalidIdentifier(level.clone()));
    }
  }

  let level_columns: String = levels
    .iter()
    .map(|level| format!("    {level} TEXT NOT NULL,\n"))
    .collect();
  Ok(format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    username   TEXT NOT NULL,
{level_columns}    slot_name  TEXT NOT NULL,
    annotation TEXT NOT NULL,
    ts         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS {table}_user_idx ON {table}(username);
"
  ))
}
