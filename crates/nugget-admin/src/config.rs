//! Task configuration.
//!
//! A task is one annotation campaign: who works on which topics, where the
//! content universe lives, and how nuggets are shared between annotators.
//! Loaded from a TOML or JSON file layered with `NUGGET_`-prefixed
//! environment variables (`NUGGET_OUTPUT_DIR`, `NUGGET_USE_REVISED_NUGGET_ONLY`,
//! ...).

use std::{
  collections::{BTreeMap, BTreeSet},
  path::{Path, PathBuf},
};

use nugget_store_sqlite::{NuggetSource, SnapshotDir};
use serde::Deserialize;

use crate::Result;

fn default_true() -> bool { true }

/// `NUGGET_<FIELD>` overrides a top-level field; `__` separates nested keys.
fn environment() -> config::Environment {
  config::Environment::with_prefix("NUGGET")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

fn default_citation_options() -> Vec<String> {
  ["not supported", "supported"].map(String::from).to_vec()
}

fn default_independence_options() -> Vec<String> {
  ["no need citations", "need citation"].map(String::from).to_vec()
}

fn default_additional_nugget_options() -> Vec<String> {
  [
    "Other crucial nugget to the request",
    "Topical nugget",
    "Irrelevant nugget",
    "No nugget found",
  ]
  .map(String::from)
  .to_vec()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
  pub name:       String,
  /// Holds both databases and every nugget file.
  pub output_dir: PathBuf,

  /// username → assigned topic ids.
  #[serde(default)]
  pub job_assignment: BTreeMap<String, Vec<String>>,

  /// `{topic_id: [doc_id, ...]}`
  #[serde(default)]
  pub doc_pools_path:       Option<PathBuf>,
  /// `{topic_id: {doc_id: {run_id: {sent_id: text}}}}`
  #[serde(default)]
  pub cited_sentences_path: Option<PathBuf>,
  /// `{topic_id: {run_id: {sent_id: text}}}`
  #[serde(default)]
  pub report_runs_path:     Option<PathBuf>,

  #[serde(default)]
  pub load_nugget_from:                    NuggetSource,
  #[serde(default)]
  pub combine_nuggets_from_multiple_users: bool,
  #[serde(default = "default_true")]
  pub use_revised_nugget_only:             bool,
  #[serde(default)]
  pub sentence_allow_multiple_nuggets:     bool,
  #[serde(default = "default_true")]
  pub force_citation_assessment_before_report: bool,

  #[serde(default = "default_citation_options")]
  pub sentence_to_document_options: Vec<String>,
  #[serde(default = "default_independence_options")]
  pub sentence_independent_options: Vec<String>,
  /// Pseudo-nuggets offered next to the real ones when aligning sentences.
  #[serde(default = "default_additional_nugget_options")]
  pub additional_nugget_options:    Vec<String>,
}

impl TaskConfig {
  /// Read `path` (format chosen by extension) and apply environment
  /// overrides.
  pub fn load(path: &Path) -> Result<Self> { Self::load_with(path, environment()) }

  fn load_with(path: &Path, env: config::Environment) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()))
      .add_source(env)
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn annotation_db_path(&self) -> PathBuf { self.output_dir.join("annotation.db") }

  pub fn log_db_path(&self) -> PathBuf { self.output_dir.join("log.db") }

  pub fn snapshot_dir(&self) -> SnapshotDir { SnapshotDir::new(&self.output_dir) }

  /// Topics assigned to `username`, in configured order.
  pub fn topics_for(&self, username: &str) -> &[String] {
    self.job_assignment.get(username).map(Vec::as_slice).unwrap_or_default()
  }

  /// Every assigned topic, sorted and deduplicated.
  pub fn all_topics(&self) -> Vec<&str> {
    let topics: BTreeSet<&str> = self
      .job_assignment
      .values()
      .flatten()
      .map(String::as_str)
      .collect();
    topics.into_iter().collect()
  }

  /// The loader source for the nugget picker used during alignment.
  pub fn alignment_source(&self) -> NuggetSource {
    if self.use_revised_nugget_only {
      NuggetSource::Revised
    } else {
      self.load_nugget_from
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loads_json_with_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("task.json");
    std::fs::write(
      &path,
      r#"{
        "name": "pilot",
        "output_dir": "/data/pilot",
        "job_assignment": { "alice": ["t2", "t1"], "bob": ["t1"] },
        "load_nugget_from": "db"
      }"#,
    )
    .unwrap();

    let cfg = TaskConfig::load(&path).unwrap();
    assert_eq!(cfg.name, "pilot");
    assert_eq!(cfg.load_nugget_from, NuggetSource::Db);
    assert!(cfg.use_revised_nugget_only);
    assert!(cfg.force_citation_assessment_before_report);
    assert!(!cfg.sentence_allow_multiple_nuggets);
    assert_eq!(cfg.additional_nugget_options.len(), 4);
    assert_eq!(cfg.topics_for("alice"), ["t2", "t1"]);
    assert!(cfg.topics_for("carol").is_empty());
    assert_eq!(cfg.all_topics(), vec!["t1", "t2"]);
    assert_eq!(cfg.annotation_db_path(), PathBuf::from("/data/pilot/annotation.db"));
    assert_eq!(cfg.alignment_source(), NuggetSource::Revised);
  }

  #[test]
  fn loads_toml() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("task.toml");
    std::fs::write(
      &path,
      r#"
name = "pilot"
output_dir = "out"
use_revised_nugget_only = false
load_nugget_from = "json"

[job_assignment]
alice = ["t1"]
"#,
    )
    .unwrap();

    let cfg = TaskConfig::load(&path).unwrap();
    assert_eq!(cfg.alignment_source(), NuggetSource::Json);
    assert_eq!(cfg.log_db_path(), PathBuf::from("out/log.db"));
  }

  #[test]
  fn environment_overrides_file_values() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("task.toml");
    std::fs::write(&path, "name = \"pilot\"\noutput_dir = \"/a\"\n").unwrap();

    let vars = [
      ("NUGGET_OUTPUT_DIR", "/from_env"),
      ("NUGGET_USE_REVISED_NUGGET_ONLY", "false"),
      ("OTHER_OUTPUT_DIR", "/ignored"),
    ];
    let env = environment().source(Some(
      vars.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
    ));

    let cfg = TaskConfig::load_with(&path, env).unwrap();
    assert_eq!(cfg.output_dir, PathBuf::from("/from_env"));
    assert!(!cfg.use_revised_nugget_only);
    assert_eq!(cfg.name, "pilot");
  }

  #[test]
  fn missing_file_is_an_error() {
    assert!(TaskConfig::load(Path::new("/nonexistent/task.toml")).is_err());
  }
}
