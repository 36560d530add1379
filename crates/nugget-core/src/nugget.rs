//! Nugget sets: the question/answer facts extracted for one topic.
//!
//! A [`NuggetSet`] is an ordered list of questions, each mapping answers to
//! the set of documents that serve as evidence for that answer. Questions may
//! additionally be assigned to a named group; unassigned questions live in the
//! implicit [`DEFAULT_GROUP`].
//!
//! Sets are plain values: every mutation happens in place on an owned set, and
//! snapshots are taken with `clone()`.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  iter::Sum,
  ops,
};

use serde::{
  Deserialize, Deserializer, Serialize, Serializer,
  de::{self, MapAccess, Visitor},
  ser::SerializeMap,
};

use crate::{Error, Result};

/// The implicit group of every question without an explicit assignment.
pub const DEFAULT_GROUP: &str = "default";

/// Documents supporting one answer.
pub type Evidence = BTreeSet<String>;

/// Answers to one question, each with its evidence set.
pub type Answers = BTreeMap<String, Evidence>;

/// One member of a group, as yielded by [`NuggetSet::iter_grouped`]:
/// `(entry index, question, answers)`.
pub type GroupMember<'a> = (usize, &'a str, &'a Answers);

// ─── NuggetSet ───────────────────────────────────────────────────────────────

fn check_question(question: &str) -> Result<()> {
  if question.trim().is_empty() {
    return Err(Error::EmptyQuestion);
  }
  Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NuggetSet {
  /// Questions in first-seen order.
  entries:  Vec<(String, Answers)>,
  /// Explicit group assignments; never contains [`DEFAULT_GROUP`].
  group_of: BTreeMap<String, String>,
}

impl NuggetSet {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  fn position(&self, question: &str) -> Option<usize> {
    let question = question.trim();
    self.entries.iter().position(|(q, _)| q == question)
  }

  fn answers_mut(&mut self, question: &str) -> Result<&mut Answers> {
    let idx = self
      .position(question)
      .ok_or_else(|| Error::QuestionNotFound(question.trim().to_owned()))?;
    Ok(&mut self.entries[idx].1)
  }

  /// Answers for `question` (whitespace-insensitive at the ends).
  pub fn get(&self, question: &str) -> Option<&Answers> {
    self.position(question).map(|idx| &self.entries[idx].1)
  }

  pub fn contains(&self, question: &str) -> bool {
    self.position(question).is_some()
  }

  /// The entry at `idx` in insertion order.
  pub fn entry(&self, idx: usize) -> Option<(&str, &Answers)> {
    self.entries.get(idx).map(|(q, a)| (q.as_str(), a))
  }

  /// Iterate questions in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Answers)> {
    self.entries.iter().map(|(q, a)| (q.as_str(), a))
  }

  // ── Evidence edits ──────────────────────────────────────────────────────

  /// Union each `(doc_id, answer)` pair into the set, creating the question
  /// and answers as needed. Repeating a call has no further effect.
  ///
  /// The question must not be blank and every document id must be
  /// non-empty; nothing is added otherwise.
  pub fn add<D, A>(
    &mut self,
    question: &str,
    doc_answer_pairs: impl IntoIterator<Item = (D, A)>,
  ) -> Result<()>
  where
    D: Into<String>,
    A: Into<String>,
  {
    check_question(question)?;
    let pairs: Vec<(String, String)> = doc_answer_pairs
      .into_iter()
      .map(|(doc_id, answer)| (doc_id.into(), answer.into()))
      .collect();
    if let Some((_, answer)) = pairs.iter().find(|(doc_id, _)| doc_id.is_empty()) {
      return Err(Error::EmptyDocId {
        question: question.trim().to_owned(),
        answer:   answer.clone(),
      });
    }

    let answers = self.answers_or_insert(question);
    for (doc_id, answer) in pairs {
      answers.entry(answer).or_default().insert(doc_id);
    }
    Ok(())
  }

  /// Ensure `answer` exists under `question` without attaching evidence.
  /// Used when seeding baseline sets whose answers have no documents yet.
  pub fn add_answer(&mut self, question: &str, answer: impl Into<String>) -> Result<()> {
    check_question(question)?;
    self.answers_or_insert(question).entry(answer.into()).or_default();
    Ok(())
  }

  fn answers_or_insert(&mut self, question: &str) -> &mut Answers {
    let idx = match self.position(question) {
      Some(idx) => idx,
      None => {
        self.entries.push((question.trim().to_owned(), Answers::new()));
        self.entries.len() - 1
      }
    };
    &mut self.entries[idx].1
  }

  /// Withdraw `doc_id` as evidence for each of `answers`.
  ///
  /// Every answer must exist and currently list `doc_id`; nothing is changed
  /// unless all preconditions hold. Answers left without evidence are kept.
  pub fn remove<A: AsRef<str>>(
    &mut self,
    question: &str,
    doc_id: &str,
    answers: &[A],
  ) -> Result<()> {
    let entry = self.answers_mut(question)?;
    for answer in answers {
      let answer = answer.as_ref();
      let evidence = entry.get(answer).ok_or_else(|| Error::AnswerNotFound {
        question: question.trim().to_owned(),
        answer:   answer.to_owned(),
      })?;
      if !evidence.contains(doc_id) {
        return Err(Error::EvidenceNotFound {
          question: question.trim().to_owned(),
          answer:   answer.to_owned(),
          doc_id:   doc_id.to_owned(),
        });
      }
    }
    for answer in answers {
      if let Some(evidence) = entry.get_mut(answer.as_ref()) {
        evidence.remove(doc_id);
      }
    }
    Ok(())
  }

  pub fn remove_answer(&mut self, question: &str, answer: &str) -> Result<()> {
    let entry = self.answers_mut(question)?;
    entry.remove(answer).ok_or_else(|| Error::AnswerNotFound {
      question: question.trim().to_owned(),
      answer:   answer.to_owned(),
    })?;
    Ok(())
  }

  /// Rename an answer. If `new` already exists the evidence sets are merged.
  pub fn rewrite_answer(
    &mut self,
    question: &str,
    old: &str,
    new: &str,
  ) -> Result<()> {
    let entry = self.answers_mut(question)?;
    if !entry.contains_key(old) {
      return Err(Error::AnswerNotFound {
        question: question.trim().to_owned(),
        answer:   old.to_owned(),
      });
    }
    if old == new {
      return Ok(());
    }
    let evidence = entry.remove(old).unwrap_or_default();
    entry.entry(new.to_owned()).or_default().extend(evidence);
    Ok(())
  }

  /// Rename a question. If `new` already exists the two entries are merged
  /// into `new`'s position; `old`'s group assignment wins when both have one.
  pub fn rewrite_question(&mut self, old: &str, new: &str) -> Result<()> {
    let old_idx = self
      .position(old)
      .ok_or_else(|| Error::QuestionNotFound(old.trim().to_owned()))?;
    let old_q = self.entries[old_idx].0.clone();
    let new_q = new.trim().to_owned();
    if old_q == new_q {
      return Ok(());
    }

    let moved_group = self.group_of.remove(&old_q);
    match self.position(&new_q) {
      Some(new_idx) => {
        let (_, answers) = self.entries.remove(old_idx);
        let new_idx = if new_idx > old_idx { new_idx - 1 } else { new_idx };
        let target = &mut self.entries[new_idx].1;
        for (answer, evidence) in answers {
          target.entry(answer).or_default().extend(evidence);
        }
      }
      None => self.entries[old_idx].0 = new_q.clone(),
    }
    if let Some(group) = moved_group {
      self.group_of.insert(new_q, group);
    }
    Ok(())
  }

  pub fn remove_question(&mut self, question: &str) -> Result<()> {
    let idx = self
      .position(question)
      .ok_or_else(|| Error::QuestionNotFound(question.trim().to_owned()))?;
    let (q, _) = self.entries.remove(idx);
    self.group_of.remove(&q);
    Ok(())
  }

  // ── Groups ──────────────────────────────────────────────────────────────

  /// The group `question` belongs to; [`DEFAULT_GROUP`] if unassigned.
  pub fn group_of(&self, question: &str) -> &str {
    self
      .group_of
      .get(question.trim())
      .map_or(DEFAULT_GROUP, String::as_str)
  }

  /// Assign `question` to `group`. Assigning [`DEFAULT_GROUP`] clears the
  /// assignment.
  pub fn set_group(&mut self, question: &str, group: &str) -> Result<()> {
    let idx = self
      .position(question)
      .ok_or_else(|| Error::QuestionNotFound(question.trim().to_owned()))?;
    if group.is_empty() {
      return Err(Error::EmptyGroupName);
    }
    let question = self.entries[idx].0.clone();
    if group == DEFAULT_GROUP {
      self.group_of.remove(&question);
    } else {
      self.group_of.insert(question, group.to_owned());
    }
    Ok(())
  }

  /// Move every question in group `old` to group `new`.
  pub fn rename_group(&mut self, old: &str, new: &str) -> Result<()> {
    for name in [old, new] {
      if name == DEFAULT_GROUP {
        return Err(Error::ReservedGroup(name.to_owned()));
      }
      if name.is_empty() {
        return Err(Error::EmptyGroupName);
      }
    }
    for group in self.group_of.values_mut().filter(|g| g.as_str() == old) {
      *group = new.to_owned();
    }
    Ok(())
  }

  /// Distinct group names in use, sorted, followed by [`DEFAULT_GROUP`].
  pub fn groups(&self) -> Vec<String> {
    let named: BTreeSet<&String> = self.group_of.values().collect();
    named
      .into_iter()
      .cloned()
      .chain(std::iter::once(DEFAULT_GROUP.to_owned()))
      .collect()
  }

  /// Yield each group of [`groups`](Self::groups) in order together with its
  /// members sorted by question text.
  pub fn iter_grouped(
    &self,
  ) -> impl Iterator<Item = (String, Vec<GroupMember<'_>>)> + '_ {
    self.groups().into_iter().map(move |group| {
      let mut members: Vec<GroupMember<'_>> = self
        .entries
        .iter()
        .enumerate()
        .filter(|(_, (q, _))| self.group_of(q) == group)
        .map(|(idx, (q, a))| (idx, q.as_str(), a))
        .collect();
      members.sort_by(|a, b| a.1.cmp(b.1));
      (group, members)
    })
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  /// True iff any answer lists `doc_id` as evidence.
  pub fn doc_has_nugget(&self, doc_id: &str) -> bool {
    self
      .entries
      .iter()
      .flat_map(|(_, answers)| answers.values())
      .any(|evidence| evidence.contains(doc_id))
  }

  /// Answers under `question` that list `doc_id` as evidence.
  pub fn selected_answers(&self, question: &str, doc_id: &str) -> BTreeSet<&str> {
    self
      .get(question)
      .into_iter()
      .flatten()
      .filter(|(_, evidence)| evidence.contains(doc_id))
      .map(|(answer, _)| answer.as_str())
      .collect()
  }

  /// Question → sorted answer texts, dropping evidence.
  pub fn answers_only(&self) -> BTreeMap<&str, Vec<&str>> {
    self
      .entries
      .iter()
      .map(|(q, a)| (q.as_str(), a.keys().map(String::as_str).collect()))
      .collect()
  }

  /// Question → answers, ignoring insertion order and groups. Two sets with
  /// equal evidence views hold the same facts.
  pub fn evidence_view(&self) -> BTreeMap<&str, &Answers> {
    self.entries.iter().map(|(q, a)| (q.as_str(), a)).collect()
  }

  // ── Merge ───────────────────────────────────────────────────────────────

  /// Union of two sets.
  ///
  /// Evidence for shared `(question, answer)` pairs is unioned; questions
  /// only in `other` are appended in `other`'s order. Group assignments from
  /// `other` win on conflict. Evidence is associative and commutative; entry
  /// order follows first appearance and therefore depends on operand order.
  pub fn merge(&self, other: &NuggetSet) -> NuggetSet {
    let mut merged = self.clone();
    merged.absorb(other);
    merged
  }

  fn absorb(&mut self, other: &NuggetSet) {
    for (question, answers) in &other.entries {
      let target = self.answers_or_insert(question);
      for (answer, evidence) in answers {
        target
          .entry(answer.clone())
          .or_default()
          .extend(evidence.iter().cloned());
      }
    }
    self
      .group_of
      .extend(other.group_of.iter().map(|(q, g)| (q.clone(), g.clone())));
  }

  // ── JSON ────────────────────────────────────────────────────────────────

  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  /// Decode any of the accepted layouts: the wrapped
  /// `{"nugget_dict", "group_assignment"}` object, the legacy bare
  /// `{question: {answer: [doc, ...]}}` object, or the `{"nugget_list": ...}`
  /// form written by rubric conversion.
  pub fn from_json(json: &str) -> Result<Self> { Ok(serde_json::from_str(json)?) }
}

impl ops::Add for NuggetSet {
  type Output = NuggetSet;

  fn add(mut self, rhs: NuggetSet) -> NuggetSet {
    self.absorb(&rhs);
    self
  }
}

impl ops::Add<&NuggetSet> for &NuggetSet {
  type Output = NuggetSet;

  fn add(self, rhs: &NuggetSet) -> NuggetSet { self.merge(rhs) }
}

impl ops::AddAssign<&NuggetSet> for NuggetSet {
  fn add_assign(&mut self, rhs: &NuggetSet) { self.absorb(rhs); }
}

impl Sum for NuggetSet {
  fn sum<I: Iterator<Item = NuggetSet>>(iter: I) -> Self {
    iter.fold(NuggetSet::new(), |acc, set| acc + set)
  }
}

// ─── Serde ───────────────────────────────────────────────────────────────────

struct EntriesRef<'a>(&'a [(String, Answers)]);

impl Serialize for EntriesRef<'_> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.0.len()))?;
    for (question, answers) in self.0 {
      map.serialize_entry(question, answers)?;
    }
    map.end()
  }
}

impl Serialize for NuggetSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(2))?;
    map.serialize_entry("nugget_dict", &EntriesRef(&self.entries))?;
    map.serialize_entry("group_assignment", &self.group_of)?;
    map.end()
  }
}

/// A JSON object of questions decoded without losing key order.
struct OrderedEntries(Vec<(String, Answers)>);

impl<'de> Deserialize<'de> for OrderedEntries {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
      type Value = OrderedEntries;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of question to answers")
      }

      fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let mut entries = Vec::new();
        while let Some((question, answers)) = map.next_entry::<String, Answers>()? {
          entries.push((question, answers));
        }
        Ok(OrderedEntries(entries))
      }
    }

    deserializer.deserialize_map(EntriesVisitor)
  }
}

impl<'de> Deserialize<'de> for NuggetSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_map(NuggetSetVisitor)
  }
}

struct NuggetSetVisitor;

impl<'de> Visitor<'de> for NuggetSetVisitor {
  type Value = NuggetSet;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a nugget set object")
  }

  fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<NuggetSet, M::Error> {
    let mut wrapped: Option<Vec<(String, Answers)>> = None;
    let mut bare: Vec<(String, Answers)> = Vec::new();
    let mut groups: BTreeMap<String, String> = BTreeMap::new();

    while let Some(key) = map.next_key::<String>()? {
      match key.as_str() {
        "nugget_dict" => wrapped = Some(map.next_value::<OrderedEntries>()?.0),
        "nugget_list" => wrapped = Some(map.next_value()?),
        "group_assignment" => groups = map.next_value()?,
        _ => bare.push((key, map.next_value()?)),
      }
    }

    let entries = match wrapped {
      Some(_) if !bare.is_empty() => {
        return Err(de::Error::custom(format!(
          "unexpected field {:?} next to nugget_dict",
          bare[0].0
        )));
      }
      Some(entries) => entries,
      None => bare,
    };

    let mut set = NuggetSet::new();
    for (question, answers) in entries {
      let target = set.answers_or_insert(&question);
      for (answer, evidence) in answers {
        target.entry(answer).or_default().extend(evidence);
      }
    }
    for (question, group) in groups {
      if !set.contains(&question) {
        return Err(de::Error::custom(format!(
          "group assignment for unknown question {question:?}"
        )));
      }
      if group != DEFAULT_GROUP {
        set
          .set_group(&question, &group)
          .map_err(de::Error::custom)?;
      }
    }
    Ok(set)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ErrorKind;

  fn capital() -> NuggetSet {
    let mut set = NuggetSet::new();
    set
      .add("What is the capital?", [("doc1", "Paris"), ("doc2", "Paris"), ("doc1", "Lyon")])
      .unwrap();
    set
  }

  fn evidence(docs: &[&str]) -> Evidence {
    docs.iter().map(|d| d.to_string()).collect()
  }

  #[test]
  fn add_unions_evidence_per_answer() {
    let set = capital();
    let answers = set.get("What is the capital?").unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers["Paris"], evidence(&["doc1", "doc2"]));
    assert_eq!(answers["Lyon"], evidence(&["doc1"]));
  }

  #[test]
  fn add_trims_question_and_is_idempotent() {
    let mut set = capital();
    let before = set.clone();
    set.add("  What is the capital?\n", [("doc2", "Paris")]).unwrap();
    assert_eq!(set, before);
    assert_eq!(set.len(), 1);
  }

  #[test]
  fn add_rejects_blank_question_and_empty_doc_id() {
    let mut set = capital();

    let err = set.add("  ", [("doc1", "Paris")]).unwrap_err();
    assert!(matches!(err, Error::EmptyQuestion));
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert!(matches!(set.add_answer("", "Paris"), Err(Error::EmptyQuestion)));

    let err = set
      .add("What is the capital?", [("doc3", "Paris"), ("", "Nice")])
      .unwrap_err();
    assert!(matches!(err, Error::EmptyDocId { ref answer, .. } if answer == "Nice"));
    // The valid pair in the rejected call was not applied either.
    assert_eq!(set, capital());
  }

  #[test]
  fn inherent_add_and_merge_operators_share_scope() {
    let mut left = capital();
    left.add("Who founded it?", [("doc4", "Clovis")]).unwrap();
    let right = capital();

    let by_ref = &left + &right;
    let by_value = left.clone() + right.clone();
    let mut assigned = left.clone();
    assigned += &right;
    assert_eq!(by_ref, by_value);
    assert_eq!(by_ref, assigned);
    assert_eq!(by_ref.len(), 2);
  }

  #[test]
  fn remove_requires_existing_evidence() {
    let mut set = capital();

    let err = set.remove("Unknown?", "doc1", &["Paris"]).unwrap_err();
    assert!(matches!(err, Error::QuestionNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = set
      .remove("What is the capital?", "doc2", &["Paris", "Lyon"])
      .unwrap_err();
    assert!(matches!(err, Error::EvidenceNotFound { .. }));
    // Nothing was removed by the failed call.
    assert_eq!(set, capital());

    set.remove("What is the capital?", "doc1", &["Lyon"]).unwrap();
    let answers = set.get("What is the capital?").unwrap();
    assert!(answers["Lyon"].is_empty(), "empty answers are retained");
  }

  #[test]
  fn rewrite_answer_merges_into_existing() {
    let mut set = capital();
    set.add("What is the capital?", [("doc3", "Lyon")]).unwrap();
    set.rewrite_answer("What is the capital?", "Lyon", "Paris").unwrap();

    let answers = set.get("What is the capital?").unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers["Paris"], evidence(&["doc1", "doc2", "doc3"]));

    let unchanged = set.clone();
    set.rewrite_answer("What is the capital?", "Paris", "Paris").unwrap();
    assert_eq!(set, unchanged);

    assert!(matches!(
      set.rewrite_answer("What is the capital?", "Lyon", "Nice"),
      Err(Error::AnswerNotFound { .. })
    ));
  }

  #[test]
  fn rewrite_question_merges_and_transfers_group() {
    let mut set = NuggetSet::new();
    set.add("Q1", [("d1", "a"), ("d2", "b")]).unwrap();
    set.add("Q2", [("d3", "a")]).unwrap();
    set.set_group("Q1", "geo").unwrap();

    set.rewrite_question("Q1", "Q2").unwrap();

    assert!(!set.contains("Q1"));
    assert_eq!(set.len(), 1);
    let answers = set.get("Q2").unwrap();
    assert_eq!(answers["a"], evidence(&["d1", "d3"]));
    assert_eq!(answers["b"], evidence(&["d2"]));
    assert_eq!(set.group_of("Q2"), "geo");
  }

  #[test]
  fn rewrite_question_keeps_target_group_when_source_has_none() {
    let mut set = NuggetSet::new();
    set.add("Q1", [("d1", "a")]).unwrap();
    set.add("Q2", [("d2", "a")]).unwrap();
    set.set_group("Q2", "people").unwrap();

    set.rewrite_question("Q1", "Q2").unwrap();
    assert_eq!(set.group_of("Q2"), "people");
  }

  #[test]
  fn rewrite_question_renames_in_place() {
    let mut set = NuggetSet::new();
    set.add("Q1", [("d1", "a")]).unwrap();
    set.add("Q2", [("d2", "b")]).unwrap();
    set.set_group("Q1", "g").unwrap();

    set.rewrite_question("Q1", " Q0 ").unwrap();
    assert_eq!(set.entry(0).unwrap().0, "Q0");
    assert_eq!(set.group_of("Q0"), "g");
    assert_eq!(set.group_of("Q1"), DEFAULT_GROUP);
  }

  #[test]
  fn remove_question_drops_group() {
    let mut set = capital();
    set.set_group("What is the capital?", "geo").unwrap();
    set.remove_question("What is the capital?").unwrap();
    assert!(set.is_empty());
    assert_eq!(set.groups(), vec![DEFAULT_GROUP.to_string()]);
  }

  #[test]
  fn set_group_default_clears_assignment() {
    let mut set = capital();
    set.set_group("What is the capital?", "geo").unwrap();
    assert_eq!(set.group_of("What is the capital?"), "geo");

    set.set_group("What is the capital?", DEFAULT_GROUP).unwrap();
    assert_eq!(set.group_of("What is the capital?"), DEFAULT_GROUP);
    assert!(matches!(
      set.set_group("Missing?", "geo"),
      Err(Error::QuestionNotFound(_))
    ));
  }

  #[test]
  fn rename_group_rejects_reserved_name() {
    let mut set = capital();
    set.set_group("What is the capital?", "geo").unwrap();

    assert!(matches!(
      set.rename_group("geo", DEFAULT_GROUP),
      Err(Error::ReservedGroup(_))
    ));
    assert!(matches!(
      set.rename_group(DEFAULT_GROUP, "geo"),
      Err(Error::ReservedGroup(_))
    ));

    set.rename_group("geo", "places").unwrap();
    assert_eq!(set.group_of("What is the capital?"), "places");
  }

  #[test]
  fn groups_are_sorted_with_default_last() {
    let mut set = NuggetSet::new();
    set.add("b?", [("d", "x")]).unwrap();
    set.add("a?", [("d", "x")]).unwrap();
    set.add("c?", [("d", "x")]).unwrap();
    set.add("z?", [("d", "x")]).unwrap();
    set.set_group("b?", "zeta").unwrap();
    set.set_group("c?", "alpha").unwrap();
    set.set_group("z?", "alpha").unwrap();

    assert_eq!(set.groups(), vec!["alpha", "zeta", DEFAULT_GROUP]);

    let grouped: Vec<(String, Vec<(usize, &str)>)> = set
      .iter_grouped()
      .map(|(g, members)| (g, members.into_iter().map(|(i, q, _)| (i, q)).collect()))
      .collect();
    assert_eq!(grouped, vec![
      ("alpha".to_string(), vec![(2, "c?"), (3, "z?")]),
      ("zeta".to_string(), vec![(0, "b?")]),
      (DEFAULT_GROUP.to_string(), vec![(1, "a?")]),
    ]);
  }

  #[test]
  fn merge_is_associative_on_evidence() {
    let mut a = NuggetSet::new();
    a.add("Q1", [("d1", "x")]).unwrap();
    a.add("Q2", [("d1", "y")]).unwrap();
    let mut b = NuggetSet::new();
    b.add("Q2", [("d2", "y"), ("d2", "w")]).unwrap();
    b.add("Q3", [("d2", "z")]).unwrap();
    let mut c = NuggetSet::new();
    c.add("Q1", [("d3", "x")]).unwrap();
    c.add("Q3", [("d3", "z")]).unwrap();

    let left = a.merge(&b).merge(&c);
    let right = a.merge(&b.merge(&c));
    assert_eq!(left.evidence_view(), right.evidence_view());

    let reversed = c.merge(&b).merge(&a);
    assert_eq!(left.evidence_view(), reversed.evidence_view());

    let summed: NuggetSet = vec![a.clone(), b.clone(), c.clone()].into_iter().sum();
    assert_eq!(summed, left);
  }

  #[test]
  fn merge_prefers_right_hand_groups() {
    let mut a = NuggetSet::new();
    a.add("Q", [("d1", "x")]).unwrap();
    a.set_group("Q", "left").unwrap();
    let mut b = NuggetSet::new();
    b.add("Q", [("d2", "x")]).unwrap();
    b.set_group("Q", "right").unwrap();

    assert_eq!((&a + &b).group_of("Q"), "right");
    assert_eq!((&b + &a).group_of("Q"), "left");
  }

  #[test]
  fn merge_appends_new_questions_in_order() {
    let mut a = NuggetSet::new();
    a.add("Q1", [("d1", "x")]).unwrap();
    let mut b = NuggetSet::new();
    b.add("Q2", [("d2", "x")]).unwrap();
    b.add("Q1", [("d2", "x")]).unwrap();

    let merged = a + b;
    let questions: Vec<&str> = merged.iter().map(|(q, _)| q).collect();
    assert_eq!(questions, vec!["Q1", "Q2"]);
  }

  #[test]
  fn doc_has_nugget_scans_all_evidence() {
    let set = capital();
    assert!(set.doc_has_nugget("doc2"));
    assert!(!set.doc_has_nugget("doc9"));
    assert_eq!(
      set.selected_answers("What is the capital?", "doc1"),
      BTreeSet::from(["Lyon", "Paris"])
    );
  }

  #[test]
  fn json_roundtrip_preserves_order_and_groups() {
    let mut set = NuggetSet::new();
    set.add("Zebra?", [("d1", "stripes")]).unwrap();
    set.add("Apple?", [("d2", "red"), ("d3", "green")]).unwrap();
    set.add_answer("Apple?", "yellow").unwrap();
    set.set_group("Apple?", "fruit").unwrap();

    let json = set.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["group_assignment"], serde_json::json!({ "Apple?": "fruit" }));

    let decoded = NuggetSet::from_json(&json).unwrap();
    assert_eq!(decoded, set);
    assert_eq!(decoded.entry(0).unwrap().0, "Zebra?");
  }

  #[test]
  fn legacy_bare_dict_deserializes() {
    let legacy = r#"{"Q2": {"b": ["d2"]}, "Q1": {"a": ["d1", "d1"]}}"#;
    let set = NuggetSet::from_json(legacy).unwrap();
    assert_eq!(set.entry(0).unwrap().0, "Q2");
    assert_eq!(set.get("Q1").unwrap()["a"], evidence(&["d1"]));
    assert_eq!(set.groups(), vec![DEFAULT_GROUP.to_string()]);

    let again = NuggetSet::from_json(&set.to_json().unwrap()).unwrap();
    assert_eq!(again, set);
  }

  #[test]
  fn nugget_list_layout_deserializes() {
    let json = r#"{"nugget_list": [["Q1", {"a": [], "b": []}], ["Q2", {"c": []}]]}"#;
    let set = NuggetSet::from_json(json).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.get("Q1").unwrap()["a"].is_empty());
    assert!(!set.doc_has_nugget("anything"));
  }

  #[test]
  fn malformed_json_is_data_corruption() {
    for bad in [
      "not json",
      "[1, 2]",
      r#"{"Q": {"a": "d1"}}"#,
      r#"{"nugget_dict": {}, "group_assignment": {"ghost": "g"}}"#,
      r#"{"nugget_dict": {}, "Q": {"a": []}}"#,
    ] {
      let err = NuggetSet::from_json(bad).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::DataCorruption, "input: {bad}");
    }
  }
}
