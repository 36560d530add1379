//! [`NuggetLoader`]: read-only resolution of a topic's nugget set from one of
//! the persisted sources.

use nugget_core::nugget::NuggetSet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::{
  Result,
  database::Database,
  encode::RawNuggetRecord,
  files::SnapshotDir,
};

/// Where a [`NuggetLoader`] reads from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NuggetSource {
  /// Union of the per-user snapshot files.
  #[default]
  Json,
  /// Union of the rows in the `nuggets` table.
  Db,
  /// The topic's revised file alone.
  Revised,
  /// The topic's preload file alone.
  Preload,
}

#[derive(Clone)]
pub struct NuggetLoader {
  db:            Database,
  dir:           SnapshotDir,
  username:      String,
  source:        NuggetSource,
  combine_users: bool,
}

impl NuggetLoader {
  pub fn new(db: Database, dir: SnapshotDir, username: impl Into<String>) -> Self {
    Self {
      db,
      dir,
      username: username.into(),
      source: NuggetSource::default(),
      combine_users: false,
    }
  }

  /// Default source for [`load`](Self::load).
  pub fn with_source(mut self, source: NuggetSource) -> Self {
    self.source = source;
    self
  }

  /// Merge every user's state for the `json` and `db` sources instead of
  /// only this loader's user.
  pub fn combine_users(mut self, combine: bool) -> Self {
    self.combine_users = combine;
    self
  }

  pub fn source(&self) -> NuggetSource { self.source }

  pub async fn load(&self, topic_id: &str) -> Result<NuggetSet> {
    self.load_from(topic_id, self.source).await
  }

  /// Resolve `topic_id` from `source`. Missing files and rows yield an empty
  /// set; malformed ones are an error.
  pub async fn load_from(&self, topic_id: &str, source: NuggetSource) -> Result<NuggetSet> {
    let set = match source {
      NuggetSource::Json => self.load_snapshots(topic_id).await?,
      NuggetSource::Db => self.load_rows(topic_id).await?,
      NuggetSource::Revised => {
        let path = self.dir.revised_path(topic_id)?;
        self.dir.read(&path).await?.unwrap_or_default()
      }
      NuggetSource::Preload => {
        let path = self.dir.preload_path(topic_id)?;
        self.dir.read(&path).await?.unwrap_or_default()
      }
    };
    debug!(topic = %topic_id, %source, questions = set.len(), "nuggets loaded");
    Ok(set)
  }

  async fn load_snapshots(&self, topic_id: &str) -> Result<NuggetSet> {
    if !self.combine_users {
      let path = self.dir.snapshot_path(topic_id, &self.username)?;
      return Ok(self.dir.read(&path).await?.unwrap_or_default());
    }
    let mut merged = NuggetSet::new();
    for (_, path) in self.dir.snapshots(topic_id).await? {
      if let Some(set) = self.dir.read(&path).await? {
        merged += &set;
      }
    }
    Ok(merged)
  }

  async fn load_rows(&self, topic_id: &str) -> Result<NuggetSet> {
    let topic = topic_id.to_owned();
    let username = (!self.combine_users).then(|| self.username.clone());
    let raws = self
      .db
      .conn()
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT username, topic_id, nugget_json, ts FROM nuggets
           WHERE topic_id = ?1 AND (?2 IS NULL OR username = ?2)
           ORDER BY ts, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![topic, username], |row| {
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

    raws
      .iter()
      .map(RawNuggetRecord::decode_nuggets)
      .sum::<Result<NuggetSet>>()
  }
}
