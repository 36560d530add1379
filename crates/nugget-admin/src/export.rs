//! Export of a task's annotation state into a directory of TSV and JSON
//! files.

use std::path::{Path, PathBuf};

use nugget_store_sqlite::tsv;
use serde::Serialize;
use strum::IntoEnumIterator as _;
use tracing::info;

use crate::{
  Error, Result,
  resources::Task,
  session::{ManagerKind, SessionCache},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
  /// Every file written, in write order.
  pub files:          Vec<PathBuf>,
  pub revised_topics: usize,
  pub nugget_records: usize,
}

async fn write(dest: &Path, name: &str, contents: String, summary: &mut ExportSummary) -> Result<()> {
  let path = dest.join(name);
  tokio::fs::write(&path, contents).await.map_err(Error::io(&path))?;
  summary.files.push(path);
  Ok(())
}

/// Current state of every assigned user, prefixed with a `username` column.
async fn state_tsv(task: &Task, kind: ManagerKind, cache: &mut SessionCache) -> Result<String> {
  let schema = kind.schema();
  let mut out = tsv::row(
    std::iter::once("username")
      .chain(schema.levels().iter().map(String::as_str))
      .chain(schema.slots().iter().map(|s| s.name.as_str())),
  );
  for username in task.config.job_assignment.keys() {
    let dump = cache.store(task, username, kind).await?.to_tsv(false).await?;
    let prefix = tsv::escape(username);
    for line in dump.lines().skip(1) {
      out.push_str(&prefix);
      out.push('\t');
      out.push_str(line);
      out.push('\n');
    }
  }
  Ok(out)
}

/// Write the task's state into `dest` as seen by `admin`, whose store supplies
/// the raw log dumps.
pub async fn export(task: &Task, admin: &str, dest: &Path) -> Result<ExportSummary> {
  tokio::fs::create_dir_all(dest).await.map_err(Error::io(dest))?;
  let mut cache = SessionCache::new();
  let mut summary = ExportSummary::default();

  for kind in ManagerKind::iter() {
    let table = kind.schema().table().to_owned();
    let state = state_tsv(task, kind, &mut cache).await?;
    write(dest, &format!("{table}.tsv"), state, &mut summary).await?;

    let log = cache.store(task, admin, kind).await?.to_tsv(true).await?;
    write(dest, &format!("{table}.log.tsv"), log, &mut summary).await?;
  }

  let dir = task.config.snapshot_dir();
  for topic_id in dir.revised_topics().await? {
    let source = dir.revised_path(&topic_id)?;
    let Some(name) = source.file_name() else { continue };
    let target = dest.join(name);
    tokio::fs::copy(&source, &target).await.map_err(Error::io(&source))?;
    summary.files.push(target);
    summary.revised_topics += 1;
  }

  let records = task.annotation_db.nugget_records().await?;
  let mut annotator = tsv::row(["username", "topic_id", "nugget_json", "ts"]);
  for record in &records {
    let ts = record.ts.to_rfc3339();
    annotator.push_str(&tsv::row([
      record.username.as_str(),
      record.topic_id.as_str(),
      record.nugget_json.as_str(),
      ts.as_str(),
    ]));
  }
  summary.nugget_records = records.len();
  write(dest, "annotator_nuggets.tsv", annotator, &mut summary).await?;

  info!(
    task = %task.name(),
    dest = %dest.display(),
    files = summary.files.len(),
    "export finished"
  );
  Ok(summary)
}
