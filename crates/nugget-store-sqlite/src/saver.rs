//! [`NuggetSaver`]: one user's writable view of every topic's nugget set.
//!
//! Each topic has exactly one row in `nuggets`. A flush replaces that row
//! wholesale and rewrites the user's snapshot file, so two sessions flushing
//! the same topic overwrite each other: the last writer wins.

use std::collections::BTreeMap;

use chrono::Utc;
use nugget_core::{nugget::NuggetSet, revision::RevisedNuggetSink};
use serde_json::json;
use tracing::{debug, info};

use crate::{
  Error, Result,
  database::{ActivityLog, Database},
  encode::encode_dt,
  files::{SnapshotDir, write_atomic},
};

const UPSERT_NUGGETS: &str = "
INSERT INTO nuggets (username, topic_id, nugget_json, ts) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (topic_id) DO UPDATE SET
    username    = excluded.username,
    nugget_json = excluded.nugget_json,
    ts          = excluded.ts
";

pub struct NuggetSaver {
  db:      Database,
  log:     ActivityLog,
  dir:     SnapshotDir,
  nuggets: BTreeMap<String, NuggetSet>,
}

impl NuggetSaver {
  /// Load every topic row from the database, then seed topics without a row
  /// from their preload files.
  pub async fn open(db: Database, log: ActivityLog, dir: SnapshotDir) -> Result<Self> {
    let mut nuggets = BTreeMap::new();
    for record in db.nugget_records().await? {
      let set: NuggetSet = serde_json::from_str(&record.nugget_json)?;
      nuggets.insert(record.topic_id, set);
    }
    let from_db = nuggets.len();

    for topic in dir.preload_topics().await? {
      if nuggets.contains_key(&topic) {
        continue;
      }
      let path = dir.preload_path(&topic)?;
      if let Some(set) = dir.read(&path).await? {
        nuggets.insert(topic, set);
      }
    }

    info!(
      username = %log.username(),
      from_db,
      preloaded = nuggets.len() - from_db,
      "nugget saver opened"
    );
    Ok(Self { db, log, dir, nuggets })
  }

  pub fn username(&self) -> &str { self.log.username() }

  pub fn dir(&self) -> &SnapshotDir { &self.dir }

  pub fn contains(&self, topic_id: &str) -> bool { self.nuggets.contains_key(topic_id) }

  pub fn get(&self, topic_id: &str) -> Option<&NuggetSet> { self.nuggets.get(topic_id) }

  /// The set for `topic_id`, materialized empty on first access.
  pub fn topic(&mut self, topic_id: &str) -> &NuggetSet {
    self.nuggets.entry(topic_id.to_owned()).or_default()
  }

  /// Topics currently held, sorted.
  pub fn topics(&self) -> impl Iterator<Item = &str> { self.nuggets.keys().map(String::as_str) }

  /// Apply `edit` to a copy of the topic's set and flush it. The held set is
  /// replaced only once the flush has succeeded.
  pub async fn edit<F>(&mut self, topic_id: &str, edit: F) -> Result<()>
  where
    F: FnOnce(&mut NuggetSet) -> nugget_core::Result<()>,
  {
    let mut next = self.nuggets.get(topic_id).cloned().unwrap_or_default();
    edit(&mut next)?;
    self.persist(topic_id, &next).await?;
    self.nuggets.insert(topic_id.to_owned(), next);
    Ok(())
  }

  /// Write the held set for `topic_id` to the database and the snapshot file.
  pub async fn flush(&self, topic_id: &str) -> Result<()> {
    let empty = NuggetSet::new();
    let set = self.nuggets.get(topic_id).unwrap_or(&empty);
    self.persist(topic_id, set).await
  }

  /// Upsert the topic row and rewrite the snapshot file in one transaction.
  /// If the file cannot be written the row is rolled back.
  async fn persist(&self, topic_id: &str, set: &NuggetSet) -> Result<()> {
    let path = self.dir.snapshot_path(topic_id, self.username())?;
    let json = set.to_json()?;
    self
      .log
      .log("upsert_nuggets", &json!({ "topic_id": topic_id, "nugget_json": json }))
      .await?;

    let username = self.username().to_owned();
    let topic = topic_id.to_owned();
    let ts = encode_dt(Utc::now());
    let target = path.clone();

    self
      .db
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(UPSERT_NUGGETS, rusqlite::params![username, topic, json, ts])?;
        write_atomic(&target, &json).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(|e| match e {
        tokio_rusqlite::Error::Other(inner) => match inner.downcast::<std::io::Error>() {
          Ok(io) => Error::Io { path, source: *io },
          Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
        },
        other => Error::Database(other),
      })?;

    debug!(topic = %topic_id, username = %self.username(), "nuggets flushed");
    Ok(())
  }

  /// Replace the revised file for `topic_id`. The user's own set and the
  /// database row are untouched.
  pub async fn save_revised_nugget(&self, topic_id: &str, set: &NuggetSet) -> Result<()> {
    let path = self.dir.revised_path(topic_id)?;
    self
      .log
      .log("save_revised_nugget", &json!({ "topic_id": topic_id, "questions": set.len() }))
      .await?;
    self.dir.write(&path, set).await?;
    info!(topic = %topic_id, questions = set.len(), "revised nuggets saved");
    Ok(())
  }
}

impl RevisedNuggetSink for NuggetSaver {
  type Error = Error;

  async fn save_revised(&self, topic_id: &str, nuggets: &NuggetSet) -> Result<()> {
    self.save_revised_nugget(topic_id, nuggets).await
  }
}
