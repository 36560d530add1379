//! `nugget-admin`: command-line administration of a nugget annotation task.
//!
//! # Usage
//!
//! ```text
//! nugget-admin --config task.toml status
//! nugget-admin --config task.toml export --dest out/
//! nugget-admin convert-rubric rubric.jsonl more.jsonl.gz --out data/
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use nugget_admin::{SessionCache, Task, TaskConfig, Workbench, export, rubric};
use nugget_store_sqlite::SnapshotDir;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Nugget annotation task administration")]
struct Cli {
  /// Path to the task configuration file (TOML or JSON).
  #[arg(short, long, global = true, default_value = "task.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Print per-user, per-topic progress.
  Status,

  /// Write the task's annotations and nuggets into a directory.
  Export {
    /// Destination directory.
    #[arg(long)]
    dest: PathBuf,

    /// User whose view supplies the raw log dumps.
    #[arg(long, default_value = "admin")]
    user: String,
  },

  /// Turn JSON-lines rubric files (optionally `.gz`) into preload (or revised)
  /// nugget files.
  ConvertRubric {
    inputs: Vec<PathBuf>,

    /// Directory receiving the nugget files.
    #[arg(long)]
    out: PathBuf,

    /// Write revised files instead of preload files.
    #[arg(long)]
    already_revised: bool,
  },
}

async fn open_task(path: &Path) -> anyhow::Result<Task> {
  let config = TaskConfig::load(path)
    .with_context(|| format!("failed to load task config {}", path.display()))?;
  Task::open(config).await.context("failed to open task")
}

async fn status(task: &Task) -> anyhow::Result<()> {
  let mut cache = SessionCache::new();
  println!("task {}", task.name());
  for (username, topics) in &task.config.job_assignment {
    let mut bench = Workbench::new(task, &mut cache, username.as_str());
    for topic_id in topics {
      let progress = bench
        .progress(topic_id)
        .await
        .with_context(|| format!("failed to compute progress of {username}/{topic_id}"))?;
      println!(
        "{username}\t{topic_id}\tnuggets {}/{}\tcitations {}/{}\talignment {}/{}\t{}",
        progress.relevance.done,
        progress.relevance.job,
        progress.citation.done,
        progress.citation.job,
        progress.alignment.done,
        progress.alignment.job,
        progress.gate,
      );
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command {
    Command::Status => {
      let task = open_task(&cli.config).await?;
      status(&task).await?;
    }
    Command::Export { dest, user } => {
      let task = open_task(&cli.config).await?;
      let summary = export::export(&task, &user, &dest)
        .await
        .with_context(|| format!("failed to export into {}", dest.display()))?;
      for file in &summary.files {
        println!("{}", file.display());
      }
    }
    Command::ConvertRubric { inputs, out, already_revised } => {
      let summary = rubric::convert_rubric(&inputs, &SnapshotDir::new(&out), already_revised)
        .await
        .context("rubric conversion failed")?;
      println!(
        "{} written, {} skipped",
        summary.written.len(),
        summary.skipped.len()
      );
    }
  }

  Ok(())
}
