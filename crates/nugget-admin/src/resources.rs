//! The content universe a task annotates, and the open [`Task`] handle.

use std::path::Path;

use nugget_store_sqlite::{Database, NuggetLoader};
use serde_json::{Map, Value};
use tracing::info;

use crate::{Error, Result, config::TaskConfig};

/// Nested mappings consumed by the annotation stores. Document and report
/// text retrieval is not part of this crate; only the structure and the
/// sentence text shipped in these files are.
#[derive(Debug, Clone, Default)]
pub struct ContentUniverse {
  pub doc_pools:       Value,
  pub cited_sentences: Value,
  pub report_runs:     Value,
}

async fn read_json(path: Option<&Path>) -> Result<Value> {
  let Some(path) = path else {
    return Ok(Value::Object(Map::new()));
  };
  let raw = tokio::fs::read_to_string(path).await.map_err(Error::io(path))?;
  serde_json::from_str(&raw).map_err(|source| Error::MalformedJson { path: path.to_owned(), source })
}

impl ContentUniverse {
  /// Read the three resource files named by `config`; an unset path is an
  /// empty universe for that stage.
  pub async fn load(config: &TaskConfig) -> Result<Self> {
    Ok(Self {
      doc_pools:       read_json(config.doc_pools_path.as_deref()).await?,
      cited_sentences: read_json(config.cited_sentences_path.as_deref()).await?,
      report_runs:     read_json(config.report_runs_path.as_deref()).await?,
    })
  }

  /// Topic ids present in `value`'s top level, sorted.
  pub fn topics(value: &Value) -> Vec<&str> {
    let mut topics: Vec<&str> = value
      .as_object()
      .map(|map| map.keys().map(String::as_str).collect())
      .unwrap_or_default();
    topics.sort_unstable();
    topics
  }
}

/// An open task: configuration, content and the two databases.
#[derive(Clone)]
pub struct Task {
  pub config:        TaskConfig,
  pub content:       ContentUniverse,
  /// Annotation tables and the `nuggets` table.
  pub annotation_db: Database,
  /// The audit trail.
  pub log_db:        Database,
}

impl Task {
  pub async fn open(config: TaskConfig) -> Result<Self> {
    tokio::fs::create_dir_all(&config.output_dir)
      .await
      .map_err(Error::io(&config.output_dir))?;
    let content = ContentUniverse::load(&config).await?;
    let annotation_db = Database::open(config.annotation_db_path()).await?;
    let log_db = Database::open(config.log_db_path()).await?;
    info!(task = %config.name, output_dir = %config.output_dir.display(), "task opened");
    Ok(Self { config, content, annotation_db, log_db })
  }

  /// A task whose databases live in memory; nugget files still go to
  /// `output_dir`.
  pub async fn open_in_memory(config: TaskConfig, content: ContentUniverse) -> Result<Self> {
    Ok(Self {
      config,
      content,
      annotation_db: Database::open_in_memory().await?,
      log_db: Database::open_in_memory().await?,
    })
  }

  pub fn name(&self) -> &str { &self.config.name }

  /// A loader for `username` honouring the task's source and sharing
  /// settings.
  pub fn loader(&self, username: &str) -> NuggetLoader {
    NuggetLoader::new(self.annotation_db.clone(), self.config.snapshot_dir(), username)
      .with_source(self.config.load_nugget_from)
      .combine_users(self.config.combine_nuggets_from_multiple_users)
  }
}
