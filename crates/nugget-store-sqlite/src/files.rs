//! File-based nugget snapshots.
//!
//! All files live directly in one directory:
//!
//! - `nuggets_<topic>_<username>.json`: a user's live snapshot, rewritten on
//!   every flush.
//! - `nuggets_<topic>.revised.json`: the curated set for a topic.
//! - `nuggets_<topic>.preload.json`: a baseline seeded before annotation.
//!
//! Topic ids may not contain `_` and usernames may not contain `.`, so every
//! file name parses back to exactly one topic and user.

use std::{
  io,
  path::{Path, PathBuf},
};

use nugget_core::nugget::NuggetSet;

use crate::{Error, Result};

const PREFIX: &str = "nuggets_";
const REVISED_SUFFIX: &str = ".revised.json";
const PRELOAD_SUFFIX: &str = ".preload.json";

/// Topic and user names end up in file names.
fn check_component(name: &str) -> Result<()> {
  if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
    return Err(Error::InvalidIdentifier(name.to_owned()));
  }
  Ok(())
}

fn check_topic(topic_id: &str) -> Result<()> {
  check_topic(topic_id)?;
  if topic_id.contains('_') {
    return Err(Error::InvalidIdentifier(topic_id.to_owned()));
  }
  Ok(())
}

fn check_username(username: &str) -> Result<()> {
  check_component(username)?;
  if username.contains('.') {
    return Err(Error::InvalidIdentifier(username.to_owned()));
  }
  Ok(())
}

/// Write `contents` next to `path` and rename it into place, so readers never
/// observe a half-written file. Blocking; callers on the runtime go through
/// [`SnapshotDir::write`].
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = PathBuf::from(tmp);
  std::fs::write(&tmp, contents)?;
  std::fs::rename(&tmp, path)
}

#[derive(Debug, Clone)]
pub struct SnapshotDir {
  root: PathBuf,
}

impl SnapshotDir {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn snapshot_path(&self, topic_id: &str, username: &str) -> Result<PathBuf> {
    check_topic(topic_id)?;
    check_username(username)?;
    Ok(self.root.join(format!("{PREFIX}{topic_id}_{username}.json")))
  }

  pub fn revised_path(&self, topic_id: &str) -> Result<PathBuf> {
    check_topic(topic_id)?;
    Ok(self.root.join(format!("{PREFIX}{topic_id}{REVISED_SUFFIX}")))
  }

  pub fn preload_path(&self, topic_id: &str) -> Result<PathBuf> {
    check_topic(topic_id)?;
    Ok(self.root.join(format!("{PREFIX}{topic_id}{PRELOAD_SUFFIX}")))
  }

  /// Read a nugget file; `None` if it does not exist.
  pub async fn read(&self, path: &Path) -> Result<Option<NuggetSet>> {
    let json = match tokio::fs::read_to_string(path).await {
      Ok(json) => json,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Error::io(path)(e)),
    };
    serde_json::from_str(&json)
      .map(Some)
      .map_err(|source| Error::MalformedSnapshot { path: path.to_owned(), source })
  }

  /// Atomically replace the file at `path` with `nuggets`.
  pub async fn write(&self, path: &Path, nuggets: &NuggetSet) -> Result<()> {
    let json = nuggets.to_json()?;
    let target = path.to_owned();
    tokio::task::spawn_blocking(move || write_atomic(&target, &json))
      .await
      .map_err(|e| Error::io(path)(io::Error::other(e)))?
      .map_err(Error::io(path))
  }

  /// File names in the directory, sorted. A missing directory is empty.
  async fn file_names(&self) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(Error::io(&self.root)(e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(Error::io(&self.root))? {
      if let Some(name) = entry.file_name().to_str() {
        names.push(name.to_owned());
      }
    }
    names.sort();
    Ok(names)
  }

  /// Per-user snapshots of `topic_id` as `(username, path)`, sorted by
  /// username.
  pub async fn snapshots(&self, topic_id: &str) -> Result<Vec<(String, PathBuf)>> {
    check_topic(topic_id)?;
    let prefix = format!("{PREFIX}{topic_id}_");
    Ok(
      self
        .file_names()
        .await?
        .into_iter()
        .filter_map(|name| {
          let username = name.strip_prefix(&prefix)?.strip_suffix(".json")?;
          check_username(username)
            .is_ok()
            .then(|| (username.to_owned(), self.root.join(&name)))
        })
        .collect(),
    )
  }

  async fn topics_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
    Ok(
      self
        .file_names()
        .await?
        .into_iter()
        .filter_map(|name| {
          let topic = name.strip_prefix(PREFIX)?.strip_suffix(suffix)?;
          check_topic(topic).is_ok().then(|| topic.to_owned())
        })
        .collect(),
    )
  }

  /// Topics with a preload baseline.
  pub async fn preload_topics(&self) -> Result<Vec<String>> {
    self.topics_with_suffix(PRELOAD_SUFFIX).await
  }

  /// Topics with a revised set.
  pub async fn revised_topics(&self) -> Result<Vec<String>> {
    self.topics_with_suffix(REVISED_SUFFIX).await
  }
}
