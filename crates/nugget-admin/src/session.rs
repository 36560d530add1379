//! Session-scoped cache of annotation stores and nugget savers.
//!
//! Each user session owns one [`SessionCache`]. Stores are opened (and their
//! logs replayed) on first use and kept until the session evicts them; nothing
//! is shared between sessions.

use std::collections::{HashMap, hash_map::Entry};

use nugget_core::content::SlotDef;
use nugget_store_sqlite::{ActivityLog, AnnotationSchema, AnnotationStore, NuggetSaver};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use tracing::debug;

use crate::{Result, resources::Task};

pub const NO_NUGGET_FOUND: &str = "no_nugget_found";
pub const CITATION_SLOT: &str = "annot";
pub const INDEPENDENCE_SLOT: &str = "sent_indep";
pub const NUGGET_SLOT: &str = "nugget";

/// The three annotation stores of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ManagerKind {
  /// Per-document "no nugget found" flags recorded during nugget creation.
  Relevance,
  /// Whether a cited document supports a report sentence.
  Citation,
  /// Per-sentence citation need and aligned nuggets.
  Alignment,
}

impl ManagerKind {
  pub fn schema(self) -> AnnotationSchema {
    match self {
      Self::Relevance => AnnotationSchema::new("doc_relevance")
        .level("topic_id")
        .level("doc_id")
        .slot(SlotDef::text(NO_NUGGET_FOUND)),
      Self::Citation => AnnotationSchema::new("sent2doc")
        .level("topic_id")
        .level("doc_id")
        .level("run_id")
        .level("sent_id")
        .slot(SlotDef::text(CITATION_SLOT)),
      Self::Alignment => AnnotationSchema::new("sent2nugget")
        .level("topic_id")
        .level("run_id")
        .level("sent_id")
        .slot(SlotDef::text(INDEPENDENCE_SLOT))
        .slot(SlotDef::selection(NUGGET_SLOT)),
    }
  }

  /// The part of the task's content universe this store is keyed over.
  pub fn content(self, task: &Task) -> &Value {
    match self {
      Self::Relevance => &task.content.doc_pools,
      Self::Citation => &task.content.cited_sentences,
      Self::Alignment => &task.content.report_runs,
    }
  }
}

type StoreKey = (String, String, ManagerKind);

#[derive(Default)]
pub struct SessionCache {
  stores: HashMap<StoreKey, AnnotationStore>,
  savers: HashMap<(String, String), NuggetSaver>,
}

impl SessionCache {
  pub fn new() -> Self { Self::default() }

  /// The `kind` store of `task` for `username`, opened on first access.
  pub async fn store(
    &mut self,
    task: &Task,
    username: &str,
    kind: ManagerKind,
  ) -> Result<&mut AnnotationStore> {
    match self.stores.entry((task.name().to_owned(), username.to_owned(), kind)) {
      Entry::Occupied(e) => Ok(e.into_mut()),
      Entry::Vacant(e) => {
        debug!(task = %task.name(), username, %kind, "opening annotation store");
        let store = AnnotationStore::open(
          task.annotation_db.clone(),
          ActivityLog::new(task.log_db.clone(), username),
          kind.schema(),
          kind.content(task),
        )
        .await?;
        Ok(e.insert(store))
      }
    }
  }

  /// The nugget saver of `task` for `username`, opened on first access.
  pub async fn saver(&mut self, task: &Task, username: &str) -> Result<&mut NuggetSaver> {
    match self.savers.entry((task.name().to_owned(), username.to_owned())) {
      Entry::Occupied(e) => Ok(e.into_mut()),
      Entry::Vacant(e) => {
        debug!(task = %task.name(), username, "opening nugget saver");
        let saver = NuggetSaver::open(
          task.annotation_db.clone(),
          ActivityLog::new(task.log_db.clone(), username),
          task.config.snapshot_dir(),
        )
        .await?;
        Ok(e.insert(saver))
      }
    }
  }

  /// Drop everything cached for `username`, e.g. on logout.
  pub fn evict(&mut self, username: &str) {
    self.stores.retain(|(_, user, _), _| user != username);
    self.savers.retain(|(_, user), _| user != username);
  }

  /// Number of open stores and savers.
  pub fn len(&self) -> usize { self.stores.len() + self.savers.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use strum::IntoEnumIterator as _;

  use super::*;
  use crate::tests::task;

  #[tokio::test]
  async fn stores_are_cached_per_user_and_kind() {
    let (task, _tmp) = task().await;
    let mut cache = SessionCache::new();

    cache
      .store(&task, "alice", ManagerKind::Relevance)
      .await
      .unwrap()
      .annotate(&["t1", "d1"], NO_NUGGET_FOUND, "1")
      .await
      .unwrap();
    // The second lookup returns the same in-memory store.
    let store = cache.store(&task, "alice", ManagerKind::Relevance).await.unwrap();
    assert_eq!(store.entry(&["t1", "d1"]).unwrap().text(NO_NUGGET_FOUND), Some("1"));

    let bob = cache.store(&task, "bob", ManagerKind::Relevance).await.unwrap();
    assert_eq!(bob.entry(&["t1", "d1"]).unwrap().get(NO_NUGGET_FOUND), None);

    cache.saver(&task, "alice").await.unwrap();
    assert_eq!(cache.len(), 3);
    cache.evict("alice");
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn every_kind_opens_over_its_content() {
    let (task, _tmp) = task().await;
    let mut cache = SessionCache::new();
    for kind in ManagerKind::iter() {
      let store = cache.store(&task, "alice", kind).await.unwrap();
      assert!(!store.index().is_empty(), "{kind}");
      assert_eq!(store.table(), kind.schema().table());
    }
    assert_eq!(ManagerKind::Alignment.to_string(), "alignment");
    assert_eq!(json!(ManagerKind::Citation.schema().levels()), json!([
      "topic_id", "doc_id", "run_id", "sent_id"
    ]));
  }
}
