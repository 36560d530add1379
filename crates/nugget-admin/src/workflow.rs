//! Annotation workflow operations for one user of a task.
//!
//! A [`Workbench`] ties the task's stores and the user's nugget saver
//! together so that related writes stay consistent: adding a nugget for a
//! document clears that document's "no nugget found" flag, and the flag can
//! only be raised while the document is evidence for nothing.

use std::collections::BTreeMap;

use nugget_core::{nugget::NuggetSet, selection::NuggetSelection};
use serde::Serialize;
use strum::Display;
use tracing::info;

use crate::{
  Error, Result,
  resources::Task,
  session::{
    CITATION_SLOT, INDEPENDENCE_SLOT, ManagerKind, NO_NUGGET_FOUND, NUGGET_SLOT, SessionCache,
  },
};

/// Extra answer offered under every real question in the nugget picker.
pub const OTHER_ANSWER: &str = "Other acceptable answer";

const FLAG_SET: &str = "1";
const FLAG_CLEAR: &str = "0";

// ─── Progress ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProgress {
  pub done:     usize,
  pub job:      usize,
  pub all_done: bool,
}

/// Whether the alignment stage may start for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlignmentGate {
  Open,
  /// Citation assessment of the topic must be finished first.
  CitationPending,
  /// Only revised nuggets may be aligned, and the topic has none yet.
  NoRevisedNuggets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicProgress {
  /// Documents judged during nugget creation.
  pub relevance: StageProgress,
  /// Documents whose cited sentences are all assessed.
  pub citation:  StageProgress,
  /// Report runs whose sentences are all aligned.
  pub alignment: StageProgress,
  pub gate:      AlignmentGate,
}

// ─── Workbench ───────────────────────────────────────────────────────────────

pub struct Workbench<'a> {
  task:     &'a Task,
  cache:    &'a mut SessionCache,
  username: String,
}

impl<'a> Workbench<'a> {
  pub fn new(task: &'a Task, cache: &'a mut SessionCache, username: impl Into<String>) -> Self {
    Self { task, cache, username: username.into() }
  }

  pub fn username(&self) -> &str { &self.username }

  fn check_option(&self, field: &'static str, options: &[String], option: &str) -> Result<()> {
    if options.iter().any(|o| o == option) {
      Ok(())
    } else {
      Err(Error::UnknownOption { field, option: option.to_owned() })
    }
  }

  // ── Nugget creation ─────────────────────────────────────────────────────

  /// This user's nugget set for `topic_id`.
  pub async fn nuggets(&mut self, topic_id: &str) -> Result<&NuggetSet> {
    Ok(self.cache.saver(self.task, &self.username).await?.topic(topic_id))
  }

  pub async fn doc_has_nugget(&mut self, topic_id: &str, doc_id: &str) -> Result<bool> {
    Ok(self.nuggets(topic_id).await?.doc_has_nugget(doc_id))
  }

  /// Clear the document's "no nugget found" flag, then record `answers` to
  /// `question` with `doc_id` as evidence. If the nugget write fails the flag
  /// stays cleared, so a document never holds evidence and a raised flag.
  pub async fn add_nugget(
    &mut self,
    topic_id: &str,
    doc_id: &str,
    question: &str,
    answers: &[&str],
  ) -> Result<()> {
    let key = [topic_id, doc_id];
    let relevance = self.cache.store(self.task, &self.username, ManagerKind::Relevance).await?;
    if !relevance.index().contains_key(&key) {
      return Err(nugget_core::Error::UnknownKey(key.map(String::from).to_vec()).into());
    }
    relevance.annotate(&key, NO_NUGGET_FOUND, FLAG_CLEAR).await?;

    self
      .cache
      .saver(self.task, &self.username)
      .await?
      .edit(topic_id, |set| set.add(question, answers.iter().map(|answer| (doc_id, *answer))))
      .await?;
    info!(topic = %topic_id, doc = %doc_id, username = %self.username, "nugget added");
    Ok(())
  }

  /// Withdraw `doc_id` as evidence for `answers`.
  pub async fn remove_nugget(
    &mut self,
    topic_id: &str,
    doc_id: &str,
    question: &str,
    answers: &[&str],
  ) -> Result<()> {
    self
      .cache
      .saver(self.task, &self.username)
      .await?
      .edit(topic_id, |set| set.remove(question, doc_id, answers))
      .await?;
    Ok(())
  }

  /// Set or clear the document's "no nugget found" flag. Setting it is
  /// refused while the document is evidence for any answer.
  pub async fn mark_no_nugget(&mut self, topic_id: &str, doc_id: &str, no_nugget: bool) -> Result<bool> {
    if no_nugget && self.doc_has_nugget(topic_id, doc_id).await? {
      return Err(Error::DocumentHasNugget {
        topic_id: topic_id.to_owned(),
        doc_id:   doc_id.to_owned(),
      });
    }
    let flag = if no_nugget { FLAG_SET } else { FLAG_CLEAR };
    Ok(
      self
        .cache
        .store(self.task, &self.username, ManagerKind::Relevance)
        .await?
        .annotate(&[topic_id, doc_id], NO_NUGGET_FOUND, flag)
        .await?,
    )
  }

  // ── Citation assessment ─────────────────────────────────────────────────

  pub async fn judge_citation(
    &mut self,
    topic_id: &str,
    doc_id: &str,
    run_id: &str,
    sent_id: &str,
    label: &str,
  ) -> Result<bool> {
    self.check_option(
      "sentence_to_document",
      &self.task.config.sentence_to_document_options,
      label,
    )?;
    Ok(
      self
        .cache
        .store(self.task, &self.username, ManagerKind::Citation)
        .await?
        .annotate(&[topic_id, doc_id, run_id, sent_id], CITATION_SLOT, label)
        .await?,
    )
  }

  // ── Report sentences ────────────────────────────────────────────────────

  pub async fn set_sentence_independence(
    &mut self,
    topic_id: &str,
    run_id: &str,
    sent_id: &str,
    label: &str,
  ) -> Result<bool> {
    self.check_option(
      "sentence_independent",
      &self.task.config.sentence_independent_options,
      label,
    )?;
    Ok(
      self
        .cache
        .store(self.task, &self.username, ManagerKind::Alignment)
        .await?
        .annotate(&[topic_id, run_id, sent_id], INDEPENDENCE_SLOT, label)
        .await?,
    )
  }

  /// Question → selectable answers for aligning sentences of `topic_id`.
  ///
  /// Real questions come from the task's alignment source and also offer
  /// [`OTHER_ANSWER`]; each configured pseudo-nugget is its own answer.
  pub async fn nugget_options(&self, topic_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let set = self
      .task
      .loader(&self.username)
      .load_from(topic_id, self.task.config.alignment_source())
      .await?;

    let mut options: BTreeMap<String, Vec<String>> = set
      .answers_only()
      .into_iter()
      .map(|(question, answers)| {
        let mut answers: Vec<String> = answers.into_iter().map(String::from).collect();
        answers.push(OTHER_ANSWER.to_owned());
        (question.to_owned(), answers)
      })
      .collect();
    for pseudo in &self.task.config.additional_nugget_options {
      options.insert(pseudo.clone(), vec![pseudo.clone()]);
    }
    Ok(options)
  }

  /// Align `(question, answer)` to a report sentence. Unless the task allows
  /// several nuggets per sentence, the pair replaces the current selection.
  pub async fn select_sentence_nugget(
    &mut self,
    topic_id: &str,
    run_id: &str,
    sent_id: &str,
    question: &str,
    answer: &str,
  ) -> Result<bool> {
    let options = self.nugget_options(topic_id).await?;
    if !options.get(question).is_some_and(|answers| answers.iter().any(|a| a == answer)) {
      return Err(Error::UnknownNugget {
        topic_id: topic_id.to_owned(),
        question: question.to_owned(),
        answer:   answer.to_owned(),
      });
    }

    let allow_multiple = self.task.config.sentence_allow_multiple_nuggets;
    let key = [topic_id, run_id, sent_id];
    let store = self.cache.store(self.task, &self.username, ManagerKind::Alignment).await?;
    let mut selection = match store.entry(&key).and_then(|e| e.selection(NUGGET_SLOT)) {
      Some(current) if allow_multiple => current.clone(),
      _ => NuggetSelection::new(),
    };
    selection.insert(question, answer);
    Ok(store.annotate(&key, NUGGET_SLOT, selection).await?)
  }

  /// Remove `(question, answer)` from a sentence's selection. Returns
  /// `false` if it was not selected.
  pub async fn unselect_sentence_nugget(
    &mut self,
    topic_id: &str,
    run_id: &str,
    sent_id: &str,
    question: &str,
    answer: &str,
  ) -> Result<bool> {
    let key = [topic_id, run_id, sent_id];
    let store = self.cache.store(self.task, &self.username, ManagerKind::Alignment).await?;
    let Some(mut selection) = store.entry(&key).and_then(|e| e.selection(NUGGET_SLOT)).cloned()
    else {
      return Ok(false);
    };
    if !selection.remove(question, answer) {
      return Ok(false);
    }
    Ok(store.annotate(&key, NUGGET_SLOT, selection).await?)
  }

  // ── Progress ────────────────────────────────────────────────────────────

  pub async fn alignment_gate(&mut self, topic_id: &str) -> Result<AlignmentGate> {
    let config = &self.task.config;
    if config.force_citation_assessment_before_report {
      let citation = self.cache.store(self.task, &self.username, ManagerKind::Citation).await?;
      if !citation.is_all_done(&[topic_id]) {
        return Ok(AlignmentGate::CitationPending);
      }
    }
    if config.use_revised_nugget_only {
      let revised = self
        .task
        .loader(&self.username)
        .load_from(topic_id, nugget_store_sqlite::NuggetSource::Revised)
        .await?;
      if revised.is_empty() {
        return Ok(AlignmentGate::NoRevisedNuggets);
      }
    }
    Ok(AlignmentGate::Open)
  }

  pub async fn progress(&mut self, topic_id: &str) -> Result<TopicProgress> {
    let prefix = [topic_id];

    let store = self.cache.store(self.task, &self.username, ManagerKind::Relevance).await?;
    let relevance = StageProgress {
      done:     store.count_done(&prefix, Some("doc_id"))?,
      job:      store.count_job(&prefix, Some("doc_id"))?,
      all_done: store.is_all_done(&prefix),
    };

    let store = self.cache.store(self.task, &self.username, ManagerKind::Citation).await?;
    let citation = StageProgress {
      done:     store.count_done(&prefix, Some("doc_id"))?.min(relevance.done),
      job:      store.count_job(&prefix, Some("doc_id"))?,
      all_done: store.is_all_done(&prefix),
    };

    let store = self.cache.store(self.task, &self.username, ManagerKind::Alignment).await?;
    let alignment = StageProgress {
      done:     store.count_done(&prefix, Some("run_id"))?,
      job:      store.count_job(&prefix, Some("run_id"))?,
      all_done: store.is_all_done(&prefix),
    };

    let gate = self.alignment_gate(topic_id).await?;
    Ok(TopicProgress { relevance, citation, alignment, gate })
  }
}
