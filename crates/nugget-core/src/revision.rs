//! Linear undo/redo history for curating a topic's nugget set.
//!
//! The [`RevisionController`] keeps whole-set snapshots rather than deltas.
//! Each curation edit is applied to a private working copy and the resulting
//! state is pushed as a fresh clone, so buffer entries never alias the
//! working set.

use std::{fmt, future::Future};

use crate::{Result, nugget::NuggetSet};

// ─── Persistence seam ────────────────────────────────────────────────────────

/// Destination for a topic's curated ("revised") nugget set.
///
/// Implemented by storage backends; the controller only needs to hand over
/// the snapshot under its pointer.
pub trait RevisedNuggetSink: Send + Sync {
  type Error: std::error::Error;

  /// Replace the authoritative revised set for `topic_id`.
  fn save_revised(
    &self,
    topic_id: &str,
    nuggets: &NuggetSet,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

// ─── Navigation outcome ──────────────────────────────────────────────────────

/// Outcome of moving the history pointer. Hitting either end of the buffer
/// is not an error; callers surface it as a transient notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Moved,
  NothingToUndo,
  NothingToRedo,
}

impl Step {
  pub fn moved(self) -> bool { self == Self::Moved }
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Moved => f.write_str("moved"),
      Self::NothingToUndo => f.write_str("nothing to undo"),
      Self::NothingToRedo => f.write_str("nothing to redo"),
    }
  }
}

// ─── Controller ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RevisionController {
  topic_id: String,
  /// Oldest snapshot first; never empty.
  buffer:   Vec<NuggetSet>,
  /// Index of the current snapshot in `buffer`.
  cursor:   usize,
  working:  NuggetSet,
}

impl RevisionController {
  /// Start a history whose only snapshot is `initial`.
  pub fn new(topic_id: impl Into<String>, initial: NuggetSet) -> Self {
    Self {
      topic_id: topic_id.into(),
      buffer:   vec![initial.clone()],
      cursor:   0,
      working:  initial,
    }
  }

  pub fn topic_id(&self) -> &str { &self.topic_id }

  /// The set being edited. Always equal to [`current`](Self::current).
  pub fn working(&self) -> &NuggetSet { &self.working }

  /// The snapshot under the pointer.
  pub fn current(&self) -> &NuggetSet { &self.buffer[self.cursor] }

  /// Number of snapshots held.
  pub fn len(&self) -> usize { self.buffer.len() }

  pub fn is_empty(&self) -> bool { false }

  /// The pointer as a non-positive offset from the newest snapshot: `0` at
  /// the tail, `-1` one step back, and so on.
  pub fn pointer(&self) -> isize { self.cursor as isize - (self.buffer.len() as isize - 1) }

  pub fn can_undo(&self) -> bool { self.cursor > 0 }

  pub fn can_redo(&self) -> bool { self.cursor + 1 < self.buffer.len() }

  /// Record `snapshot` as the newest state, discarding any snapshots ahead
  /// of the pointer.
  pub fn push_action(&mut self, snapshot: NuggetSet) {
    self.buffer.truncate(self.cursor + 1);
    self.working = snapshot.clone();
    self.buffer.push(snapshot);
    self.cursor = self.buffer.len() - 1;
  }

  /// Apply `edit` to a copy of the working set and, if it succeeds, record
  /// the result. A failed edit leaves the history untouched.
  pub fn edit<F>(&mut self, edit: F) -> Result<()>
  where
    F: FnOnce(&mut NuggetSet) -> Result<()>,
  {
    let mut next = self.working.clone();
    edit(&mut next)?;
    self.push_action(next);
    Ok(())
  }

  pub fn rewrite_answer(&mut self, question: &str, old: &str, new: &str) -> Result<()> {
    self.edit(|set| set.rewrite_answer(question, old, new))
  }

  pub fn remove_answer(&mut self, question: &str, answer: &str) -> Result<()> {
    self.edit(|set| set.remove_answer(question, answer))
  }

  pub fn set_group(&mut self, question: &str, group: &str) -> Result<()> {
    self.edit(|set| set.set_group(question, group))
  }

  pub fn rename_group(&mut self, old: &str, new: &str) -> Result<()> {
    self.edit(|set| set.rename_group(old, new))
  }

  pub fn rewrite_question(&mut self, old: &str, new: &str) -> Result<()> {
    self.edit(|set| set.rewrite_question(old, new))
  }

  fn move_to(&mut self, cursor: usize) {
    self.cursor = cursor;
    self.working = self.buffer[cursor].clone();
  }

  pub fn undo(&mut self) -> Step {
    if !self.can_undo() {
      return Step::NothingToUndo;
    }
    self.move_to(self.cursor - 1);
    Step::Moved
  }

  pub fn redo(&mut self) -> Step {
    if !self.can_redo() {
      return Step::NothingToRedo;
    }
    self.move_to(self.cursor + 1);
    Step::Moved
  }

  /// Return to the snapshot the history started from and drop everything
  /// recorded since.
  pub fn to_head(&mut self) {
    self.buffer.truncate(1);
    self.move_to(0);
  }

  /// Discard all history and start again from `snapshot`.
  pub fn restart(&mut self, snapshot: NuggetSet) {
    self.buffer = vec![snapshot.clone()];
    self.cursor = 0;
    self.working = snapshot;
  }

  /// Persist the snapshot under the pointer. The buffer is not modified.
  pub async fn save<S: RevisedNuggetSink>(&self, sink: &S) -> Result<(), S::Error> {
    sink.save_revised(&self.topic_id, self.current()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{Error, nugget::DEFAULT_GROUP};

  fn seed() -> NuggetSet {
    let mut set = NuggetSet::new();
    set.add("Q1", [("d1", "a"), ("d2", "b")]).unwrap();
    set.add("Q2", [("d3", "c")]).unwrap();
    set
  }

  #[test]
  fn undo_then_redo_restores_snapshot() {
    let mut ctl = RevisionController::new("t1", seed());
    ctl.rewrite_answer("Q1", "a", "b").unwrap();
    ctl.set_group("Q2", "g").unwrap();
    let latest = ctl.working().clone();

    assert_eq!(ctl.undo(), Step::Moved);
    assert_eq!(ctl.working().group_of("Q2"), DEFAULT_GROUP);
    assert_eq!(ctl.pointer(), -1);

    assert_eq!(ctl.redo(), Step::Moved);
    assert_eq!(ctl.working(), &latest);
    assert_eq!(ctl.current(), &latest);
    assert_eq!(ctl.pointer(), 0);
  }

  #[test]
  fn edit_after_undo_discards_redo_branch() {
    let mut ctl = RevisionController::new("t1", seed());
    ctl.remove_answer("Q1", "b").unwrap();
    ctl.rewrite_question("Q2", "Q3").unwrap();
    assert_eq!(ctl.len(), 3);

    assert!(ctl.undo().moved());
    ctl.rename_group("x", "y").unwrap();

    assert_eq!(ctl.len(), 3);
    assert_eq!(ctl.redo(), Step::NothingToRedo);
    assert!(ctl.working().contains("Q2"));
    assert!(ctl.undo().moved());
    assert!(!ctl.working().get("Q1").unwrap().contains_key("b"));
  }

  #[test]
  fn boundaries_are_reported_not_raised() {
    let mut ctl = RevisionController::new("t1", seed());
    assert_eq!(ctl.undo(), Step::NothingToUndo);
    assert_eq!(ctl.redo(), Step::NothingToRedo);
    assert_eq!(ctl.undo().to_string(), "nothing to undo");
    assert_eq!(ctl.working(), &seed());
    assert_eq!(ctl.len(), 1);
  }

  #[test]
  fn failed_edit_leaves_history_untouched() {
    let mut ctl = RevisionController::new("t1", seed());
    let err = ctl.rewrite_answer("Q9", "a", "b").unwrap_err();
    assert!(matches!(err, Error::QuestionNotFound(_)));
    assert!(ctl.rename_group(DEFAULT_GROUP, "x").is_err());
    assert_eq!(ctl.len(), 1);
    assert_eq!(ctl.working(), &seed());
  }

  #[test]
  fn snapshots_do_not_alias_the_working_copy() {
    let mut ctl = RevisionController::new("t1", seed());
    ctl.set_group("Q1", "g").unwrap();
    ctl.set_group("Q1", "h").unwrap();
    ctl.undo();
    assert_eq!(ctl.working().group_of("Q1"), "g");
    ctl.undo();
    assert_eq!(ctl.working().group_of("Q1"), DEFAULT_GROUP);
  }

  #[test]
  fn to_head_and_restart() {
    let mut ctl = RevisionController::new("t1", seed());
    ctl.remove_answer("Q1", "a").unwrap();
    ctl.remove_answer("Q1", "b").unwrap();

    ctl.to_head();
    assert_eq!(ctl.working(), &seed());
    assert_eq!(ctl.len(), 1);
    assert!(!ctl.can_redo());

    let mut other = NuggetSet::new();
    other.add("Fresh?", [("d9", "yes")]).unwrap();
    ctl.restart(other.clone());
    assert_eq!(ctl.len(), 1);
    assert_eq!(ctl.working(), &other);
    assert_eq!(ctl.undo(), Step::NothingToUndo);
    assert_eq!(ctl.redo(), Step::NothingToRedo);
  }
}
