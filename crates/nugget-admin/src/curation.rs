//! Admin curation of a topic's nugget set with undo and redo.

use std::ops::{Deref, DerefMut};

use nugget_core::revision::{RevisionController, Step};
use nugget_store_sqlite::{NuggetLoader, NuggetSaver, NuggetSource};
use tracing::info;

use crate::{Result, resources::Task};

/// A [`RevisionController`] bound to a topic and the loader it was seeded
/// from. Curation always starts from every annotator's nuggets combined, or
/// from the revised set saved by an earlier session.
pub struct CurationSession {
  loader:     NuggetLoader,
  source:     NuggetSource,
  controller: RevisionController,
}

impl CurationSession {
  pub async fn open(task: &Task, username: &str, topic_id: &str, source: NuggetSource) -> Result<Self> {
    let loader = task.loader(username).combine_users(true);
    let initial = loader.load_from(topic_id, source).await?;
    info!(topic = %topic_id, %source, questions = initial.len(), "curation started");
    Ok(Self { loader, source, controller: RevisionController::new(topic_id, initial) })
  }

  pub fn source(&self) -> NuggetSource { self.source }

  /// Discard the history and start again from `source`.
  pub async fn reload(&mut self, source: NuggetSource) -> Result<()> {
    let snapshot = self.loader.load_from(self.controller.topic_id(), source).await?;
    info!(topic = %self.controller.topic_id(), %source, "curation reloaded");
    self.source = source;
    self.controller.restart(snapshot);
    Ok(())
  }

  pub fn undo(&mut self) -> Step {
    let step = self.controller.undo();
    info!(topic = %self.controller.topic_id(), pointer = self.controller.pointer(), %step, "undo");
    step
  }

  pub fn redo(&mut self) -> Step {
    let step = self.controller.redo();
    info!(topic = %self.controller.topic_id(), pointer = self.controller.pointer(), %step, "redo");
    step
  }

  /// Write the snapshot under the pointer as the topic's revised set.
  pub async fn save(&self, saver: &NuggetSaver) -> Result<()> {
    self.controller.save(saver).await?;
    Ok(())
  }
}

impl Deref for CurationSession {
  type Target = RevisionController;

  fn deref(&self) -> &Self::Target { &self.controller }
}

impl DerefMut for CurationSession {
  fn deref_mut(&mut self) -> &mut Self::Target { &mut self.controller }
}
