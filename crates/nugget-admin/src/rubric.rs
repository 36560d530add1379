//! Conversion of JSON-lines rubric files into baseline nugget files.
//!
//! Each line is `{"query_id": .., "items": [{"question_text": .., "gold_answers": [..]}]}`.
//! Every query becomes a set whose answers carry no evidence yet, written as
//! the topic's preload file (or its revised file when the rubric has already
//! been curated). Existing files are never overwritten. Inputs ending in
//! `.gz` are decompressed first.

use std::{collections::BTreeMap, fmt, io::Read, path::Path};

use flate2::read::GzDecoder;

use nugget_core::nugget::NuggetSet;
use nugget_store_sqlite::SnapshotDir;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryId {
  Text(String),
  Number(i64),
}

impl fmt::Display for QueryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(id) => f.write_str(id),
      Self::Number(id) => write!(f, "{id}"),
    }
  }
}

#[derive(Debug, Deserialize)]
struct RubricItem {
  question_text: String,
  gold_answers:  Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RubricRecord {
  query_id: QueryId,
  items:    Vec<RubricItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RubricSummary {
  pub written: Vec<String>,
  /// Topics whose target file already existed.
  pub skipped: Vec<String>,
}

async fn read_input(input: &Path) -> Result<String> {
  if input.extension().is_none_or(|ext| ext != "gz") {
    return tokio::fs::read_to_string(input).await.map_err(Error::io(input));
  }
  let path = input.to_owned();
  tokio::task::spawn_blocking(move || -> Result<String> {
    let file = std::fs::File::open(&path).map_err(Error::io(&path))?;
    let mut raw = String::new();
    GzDecoder::new(file).read_to_string(&mut raw).map_err(Error::io(&path))?;
    Ok(raw)
  })
  .await
  .map_err(|e| Error::io(input)(std::io::Error::other(e)))?
}

/// Parse `input` into topic → baseline set. A later record for the same
/// query replaces an earlier one; repeated questions within a record merge.
pub async fn read_rubric(input: &Path) -> Result<BTreeMap<String, NuggetSet>> {
  let raw = read_input(input).await?;
  let mut topics = BTreeMap::new();
  for (idx, line) in raw.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let record: RubricRecord = serde_json::from_str(line).map_err(|source| Error::MalformedRubric {
      path: input.to_owned(),
      line: idx + 1,
      source,
    })?;

    let mut set = NuggetSet::new();
    for item in record.items {
      set.add(&item.question_text, std::iter::empty::<(String, String)>())?;
      for answer in item.gold_answers {
        set.add_answer(&item.question_text, answer)?;
      }
    }
    topics.insert(record.query_id.to_string(), set);
  }
  Ok(topics)
}

/// Convert every file in `inputs` into `out`.
pub async fn convert_rubric(
  inputs: &[impl AsRef<Path>],
  out: &SnapshotDir,
  already_revised: bool,
) -> Result<RubricSummary> {
  tokio::fs::create_dir_all(out.root()).await.map_err(Error::io(out.root()))?;
  let mut summary = RubricSummary::default();

  for input in inputs {
    for (topic_id, set) in read_rubric(input.as_ref()).await? {
      let path = if already_revised {
        out.revised_path(&topic_id)?
      } else {
        out.preload_path(&topic_id)?
      };
      if tokio::fs::try_exists(&path).await.map_err(Error::io(&path))? {
        warn!(topic = %topic_id, path = %path.display(), "nugget file exists, skipped");
        summary.skipped.push(topic_id);
        continue;
      }
      out.write(&path, &set).await?;
      info!(topic = %topic_id, path = %path.display(), questions = set.len(), "nugget file written");
      summary.written.push(topic_id);
    }
  }
  Ok(summary)
}
