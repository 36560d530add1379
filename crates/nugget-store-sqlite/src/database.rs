//! [`Database`] handle and the [`ActivityLog`] audit trail.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
  Result,
  encode::{RawLogEntry, RawNuggetRecord, encode_dt},
  schema::SCHEMA,
};

// ─── Database ────────────────────────────────────────────────────────────────

/// A SQLite file holding the audit log, the per-topic nugget rows and any
/// number of annotation tables.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct Database {
  conn: tokio_rusqlite::Connection,
}

impl Database {
  /// Open (or create) a database at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let db = Self { conn };
    db.init_schema().await?;
    Ok(db)
  }

  /// Open an in-memory database, for tests and dry runs.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let db = Self { conn };
    db.init_schema().await?;
    Ok(db)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub(crate) fn conn(&self) -> &tokio_rusqlite::Connection { &self.conn }

  /// Every row of the `nuggets` table, ordered by topic.
  pub async fn nugget_records(&self) -> Result<Vec<NuggetRecord>> {
    let raws = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT username, topic_id, nugget_json, ts FROM nuggets ORDER BY topic_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawNuggetRecord {
              username:    row.get(0)?,
              topic_id:    row.get(1)?,
              nugget_json: row.get(2)?,
              ts:          row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNuggetRecord::into_record).collect()
  }
}

/// A row of the `nuggets` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NuggetRecord {
  /// The user whose flush wrote the row last.
  pub username:    String,
  pub topic_id:    String,
  pub nugget_json: String,
  pub ts:          DateTime<Utc>,
}

// ─── Activity log ────────────────────────────────────────────────────────────

/// A row of the `logs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
  pub username: String,
  pub query:    String,
  pub args:     Value,
  pub ts:       DateTime<Utc>,
}

/// Append-only audit trail of one user's writes.
#[derive(Clone)]
pub struct ActivityLog {
  db:       Database,
  username: String,
}

impl ActivityLog {
  pub fn new(db: Database, username: impl Into<String>) -> Self {
    Self { db, username: username.into() }
  }

  pub fn username(&self) -> &str { &self.username }

  /// Record that `query` is about to run with `args`.
  pub async fn log(&self, query: &str, args: &Value) -> Result<()> {
    let username = self.username.clone();
    let query = query.to_owned();
    let args_str = serde_json::to_string(args)?;
    let ts = encode_dt(Utc::now());

    debug!(username = %username, query = %query, args = %args_str, "activity");

    self
      .db
      .conn()
      .call(move |conn| {
        conn.execute(
          "INSERT INTO logs (username, query, args, ts) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![username, query, args_str, ts],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// This user's entries, oldest first.
  pub async fn entries(&self) -> Result<Vec<LogEntry>> {
    let username = self.username.clone();
    let raws = self
      .db
      .conn()
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT username, query, args, ts FROM logs
           WHERE username = ?1
           ORDER BY ts, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![username], |row| {
            Ok(RawLogEntry {
              username: row.get(0)?,
              query:    row.get(1)?,
              args:     row.get(2)?,
              ts:       row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLogEntry::into_entry).collect()
  }
}
