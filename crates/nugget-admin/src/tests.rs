//! Workflow, curation and export tests against in-memory databases.

use nugget_core::{ErrorKind, nugget::NuggetSet};
use nugget_store_sqlite::NuggetSource;
use serde_json::json;
use tempfile::TempDir;

use crate::{
  ContentUniverse, Error, SessionCache, Task, TaskConfig, Workbench,
  curation::CurationSession,
  export::export,
  session::{ManagerKind, NO_NUGGET_FOUND, NUGGET_SLOT},
  workflow::{AlignmentGate, OTHER_ANSWER},
};

fn content() -> ContentUniverse {
  ContentUniverse {
    doc_pools:       json!({ "t1": ["d1", "d2"], "t2": ["d9"] }),
    cited_sentences: json!({
      "t1": {
        "d1": { "runA": { "0": "First." } },
        "d2": { "runA": { "1": "Second." } }
      }
    }),
    report_runs:     json!({
      "t1": {
        "runA": { "0": "First.", "1": "Second." },
        "runB": { "0": "Only." }
      }
    }),
  }
}

pub(crate) async fn task_with(configure: impl FnOnce(&mut TaskConfig)) -> (Task, TempDir) {
  let tmp = tempfile::tempdir().expect("tempdir");
  let mut config: TaskConfig = serde_json::from_value(json!({
    "name": "pilot",
    "output_dir": tmp.path(),
    "job_assignment": { "alice": ["t1"], "bob": ["t1", "t2"] }
  }))
  .expect("task config");
  configure(&mut config);
  let task = Task::open_in_memory(config, content()).await.expect("open task");
  (task, tmp)
}

pub(crate) async fn task() -> (Task, TempDir) { task_with(|_| {}).await }

async fn publish_revised(task: &Task, cache: &mut SessionCache) {
  let mut revised = NuggetSet::new();
  revised.add("Q1", [("d1", "a"), ("d2", "b")]).unwrap();
  cache
    .saver(task, "admin")
    .await
    .unwrap()
    .save_revised_nugget("t1", &revised)
    .await
    .unwrap();
}

// ─── Nugget creation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn adding_a_nugget_clears_the_no_nugget_flag() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  assert!(bench.mark_no_nugget("t1", "d1", true).await.unwrap());
  bench.add_nugget("t1", "d1", "Who?", &["Ann", "Bo"]).await.unwrap();
  assert!(bench.doc_has_nugget("t1", "d1").await.unwrap());

  let err = bench.mark_no_nugget("t1", "d1", true).await.unwrap_err();
  assert!(matches!(err, Error::DocumentHasNugget { .. }), "{err}");
  assert_eq!(err.kind(), ErrorKind::InvalidOperation);

  let store = cache.store(&task, "alice", ManagerKind::Relevance).await.unwrap();
  assert_eq!(store.entry(&["t1", "d1"]).unwrap().text(NO_NUGGET_FOUND), Some("0"));
}

#[tokio::test]
async fn failed_nugget_write_leaves_the_flag_cleared() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  assert!(bench.mark_no_nugget("t1", "d1", true).await.unwrap());
  let err = bench.add_nugget("t1", "d1", "  ", &["Ann"]).await.unwrap_err();
  assert!(
    matches!(
      err,
      Error::Store(nugget_store_sqlite::Error::Core(nugget_core::Error::EmptyQuestion))
    ),
    "{err}"
  );
  assert!(!bench.doc_has_nugget("t1", "d1").await.unwrap());
  assert!(task.annotation_db.nugget_records().await.unwrap().is_empty());

  let store = cache.store(&task, "alice", ManagerKind::Relevance).await.unwrap();
  assert_eq!(store.entry(&["t1", "d1"]).unwrap().text(NO_NUGGET_FOUND), Some("0"));
}

#[tokio::test]
async fn flag_can_be_raised_once_evidence_is_withdrawn() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  bench.add_nugget("t1", "d2", "Who?", &["Ann"]).await.unwrap();
  bench.remove_nugget("t1", "d2", "Who?", &["Ann"]).await.unwrap();
  assert!(!bench.doc_has_nugget("t1", "d2").await.unwrap());
  assert!(bench.mark_no_nugget("t1", "d2", true).await.unwrap());

  // The answer survives without evidence.
  let nuggets = bench.nuggets("t1").await.unwrap();
  assert!(nuggets.get("Who?").unwrap()["Ann"].is_empty());
}

#[tokio::test]
async fn nugget_for_unknown_document_is_rejected_before_saving() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  let err = bench.add_nugget("t1", "d404", "Who?", &["Ann"]).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidOperation);
  assert!(bench.nuggets("t1").await.unwrap().is_empty());
  assert!(task.annotation_db.nugget_records().await.unwrap().is_empty());
}

// ─── Citation and alignment ──────────────────────────────────────────────────

#[tokio::test]
async fn labels_must_be_configured_options() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  let err = bench.judge_citation("t1", "d1", "runA", "0", "maybe").await.unwrap_err();
  assert!(matches!(err, Error::UnknownOption { field: "sentence_to_document", .. }));
  assert!(bench.judge_citation("t1", "d1", "runA", "0", "supported").await.unwrap());
  assert!(!bench.judge_citation("t1", "d1", "runA", "0", "supported").await.unwrap());

  assert!(bench.set_sentence_independence("t1", "runA", "0", "need citation").await.unwrap());
  assert!(bench.set_sentence_independence("t1", "runA", "0", "always").await.is_err());
}

#[tokio::test]
async fn nugget_options_include_pseudo_nuggets() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  publish_revised(&task, &mut cache).await;
  let bench = Workbench::new(&task, &mut cache, "alice");

  let options = bench.nugget_options("t1").await.unwrap();
  assert_eq!(options["Q1"], ["a", "b", OTHER_ANSWER]);
  assert_eq!(options["Topical nugget"], ["Topical nugget"]);
  assert_eq!(options.len(), 1 + task.config.additional_nugget_options.len());
}

#[tokio::test]
async fn single_nugget_selection_replaces_the_previous_one() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  publish_revised(&task, &mut cache).await;
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  assert!(bench.select_sentence_nugget("t1", "runA", "0", "Q1", "a").await.unwrap());
  assert!(bench.select_sentence_nugget("t1", "runA", "0", "Q1", "b").await.unwrap());

  let err = bench.select_sentence_nugget("t1", "runA", "0", "Q9", "x").await.unwrap_err();
  assert!(matches!(err, Error::UnknownNugget { .. }), "{err}");

  let store = cache.store(&task, "alice", ManagerKind::Alignment).await.unwrap();
  let selection = store.entry(&["t1", "runA", "0"]).unwrap().selection(NUGGET_SLOT).unwrap();
  assert_eq!(selection.iter().collect::<Vec<_>>(), [("Q1", "b")]);
}

#[tokio::test]
async fn multiple_nugget_selection_accumulates() {
  let (task, _tmp) = task_with(|c| c.sentence_allow_multiple_nuggets = true).await;
  let mut cache = SessionCache::new();
  publish_revised(&task, &mut cache).await;
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  bench.select_sentence_nugget("t1", "runA", "0", "Q1", "a").await.unwrap();
  bench.select_sentence_nugget("t1", "runA", "0", "Q1", OTHER_ANSWER).await.unwrap();
  bench
    .select_sentence_nugget("t1", "runA", "0", "Irrelevant nugget", "Irrelevant nugget")
    .await
    .unwrap();

  assert!(bench.unselect_sentence_nugget("t1", "runA", "0", "Q1", "a").await.unwrap());
  assert!(!bench.unselect_sentence_nugget("t1", "runA", "0", "Q1", "a").await.unwrap());
  assert!(!bench.unselect_sentence_nugget("t1", "runB", "0", "Q1", "a").await.unwrap());

  let store = cache.store(&task, "alice", ManagerKind::Alignment).await.unwrap();
  let selection = store.entry(&["t1", "runA", "0"]).unwrap().selection(NUGGET_SLOT).unwrap();
  assert_eq!(selection.len(), 2);
  assert!(selection.contains("Q1", OTHER_ANSWER));
  assert!(selection.contains("Irrelevant nugget", "Irrelevant nugget"));
}

// ─── Progress ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn alignment_opens_after_citations_and_revision() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "alice");

  let progress = bench.progress("t1").await.unwrap();
  assert_eq!(progress.relevance.job, 2);
  assert_eq!(progress.citation.job, 2);
  assert_eq!(progress.alignment.job, 2);
  assert_eq!(progress.gate, AlignmentGate::CitationPending);

  bench.judge_citation("t1", "d1", "runA", "0", "supported").await.unwrap();
  bench.judge_citation("t1", "d2", "runA", "1", "not supported").await.unwrap();
  let progress = bench.progress("t1").await.unwrap();
  // Citation progress never runs ahead of document judgments.
  assert_eq!(progress.citation.done, 0);
  assert!(progress.citation.all_done);
  assert_eq!(progress.gate, AlignmentGate::NoRevisedNuggets);

  bench.mark_no_nugget("t1", "d1", true).await.unwrap();
  bench.add_nugget("t1", "d2", "Q1", &["b"]).await.unwrap();
  publish_revised(&task, &mut cache).await;

  let mut bench = Workbench::new(&task, &mut cache, "alice");
  let progress = bench.progress("t1").await.unwrap();
  assert_eq!(progress.relevance.done, 2);
  assert!(progress.relevance.all_done);
  assert_eq!(progress.citation.done, 2);
  assert_eq!(progress.gate, AlignmentGate::Open);
  assert_eq!(progress.gate.to_string(), "open");
}

#[tokio::test]
async fn gates_can_be_disabled() {
  let (task, _tmp) = task_with(|c| {
    c.force_citation_assessment_before_report = false;
    c.use_revised_nugget_only = false;
  })
  .await;
  let mut cache = SessionCache::new();
  let mut bench = Workbench::new(&task, &mut cache, "bob");
  assert_eq!(bench.alignment_gate("t1").await.unwrap(), AlignmentGate::Open);
  assert_eq!(bench.progress("t2").await.unwrap().citation.job, 0);
}

// ─── Curation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn curation_combines_annotators_and_saves_revision() {
  let (task, _tmp) = task().await;
  let mut cache = SessionCache::new();
  // Both savers load before either writes, so each keeps its own set.
  cache.saver(&task, "alice").await.unwrap();
  cache.saver(&task, "bob").await.unwrap();
  Workbench::new(&task, &mut cache, "alice")
    .add_nugget("t1", "d1", "Who?", &["Ann"])
    .await
    .unwrap();
  Workbench::new(&task, &mut cache, "bob")
    .add_nugget("t1", "d2", "Who?", &["Bo"])
    .await
    .unwrap();

  let mut session = CurationSession::open(&task, "admin", "t1", NuggetSource::Json).await.unwrap();
  assert_eq!(session.source(), NuggetSource::Json);
  let who = session.working().get("Who?").unwrap();
  assert_eq!(who.keys().collect::<Vec<_>>(), ["Ann", "Bo"]);

  session.rewrite_answer("Who?", "Bo", "Ann").unwrap();
  session.set_group("Who?", "people").unwrap();
  assert!(session.undo().moved());
  assert!(session.redo().moved());
  assert!(!session.redo().moved());

  let saver = cache.saver(&task, "admin").await.unwrap();
  session.save(saver).await.unwrap();

  session.reload(NuggetSource::Revised).await.unwrap();
  assert_eq!(session.len(), 1);
  assert_eq!(session.working().group_of("Who?"), "people");
  assert_eq!(session.working().get("Who?").unwrap()["Ann"].len(), 2);
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_writes_every_table() {
  let (task, tmp) = task().await;
  let mut cache = SessionCache::new();
  Workbench::new(&task, &mut cache, "alice")
    .add_nugget("t1", "d1", "Who?", &["Ann"])
    .await
    .unwrap();
  Workbench::new(&task, &mut cache, "bob")
    .judge_citation("t1", "d1", "runA", "0", "supported")
    .await
    .unwrap();
  publish_revised(&task, &mut cache).await;

  let dest = tmp.path().join("export");
  let summary = export(&task, "admin", &dest).await.unwrap();
  assert_eq!(summary.revised_topics, 1);
  assert_eq!(summary.nugget_records, 1);
  assert_eq!(summary.files.len(), 3 * 2 + 2);

  let state = std::fs::read_to_string(dest.join("doc_relevance.tsv")).unwrap();
  let mut lines = state.lines();
  assert_eq!(lines.next(), Some("username\ttopic_id\tdoc_id\tno_nugget_found"));
  // Two users, three documents each.
  assert_eq!(lines.clone().count(), 6);
  assert!(lines.any(|l| l == "alice\tt1\td1\t0"));

  let log = std::fs::read_to_string(dest.join("sent2doc.log.tsv")).unwrap();
  assert_eq!(log.lines().count(), 2);
  assert!(log.lines().nth(1).unwrap().starts_with("bob\tt1\td1\trunA\t0\tannot\tsupported\t"));

  assert!(dest.join("nuggets_t1.revised.json").exists());
  let annotator = std::fs::read_to_string(dest.join("annotator_nuggets.tsv")).unwrap();
  assert!(annotator.lines().nth(1).unwrap().starts_with("alice\tt1\t"));
}
