//! Nugget selections: the `(question, answer)` pairs aligned to a sentence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Result;

/// A deduplicated set of `(question, answer)` pairs.
///
/// Serialises as a sorted JSON list of two-element arrays, so equal
/// selections always encode to the same string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NuggetSelection(BTreeSet<(String, String)>);

impl NuggetSelection {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Returns `true` if the pair was not already selected.
  pub fn insert(&mut self, question: impl Into<String>, answer: impl Into<String>) -> bool {
    self.0.insert((question.into(), answer.into()))
  }

  /// Returns `true` if the pair was selected.
  pub fn remove(&mut self, question: &str, answer: &str) -> bool {
    self.0.remove(&(question.to_owned(), answer.to_owned()))
  }

  pub fn contains(&self, question: &str, answer: &str) -> bool {
    self.0.contains(&(question.to_owned(), answer.to_owned()))
  }

  /// Pairs in sorted order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(q, a)| (q.as_str(), a.as_str()))
  }

  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  /// Decode a stored selection; a missing value is the empty selection.
  pub fn from_json(json: Option<&str>) -> Result<Self> {
    match json {
      None => Ok(Self::new()),
      Some(json) => Ok(serde_json::from_str(json)?),
    }
  }
}

impl<Q: Into<String>, A: Into<String>> FromIterator<(Q, A)> for NuggetSelection {
  fn from_iter<I: IntoIterator<Item = (Q, A)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(q, a)| (q.into(), a.into())).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encodes_sorted_regardless_of_insertion_order() {
    let mut a = NuggetSelection::new();
    a.insert("Q2", "b");
    a.insert("Q1", "a");
    let b: NuggetSelection = [("Q1", "a"), ("Q2", "b"), ("Q1", "a")].into_iter().collect();

    assert_eq!(a, b);
    assert_eq!(b.len(), 2);
    assert_eq!(a.to_json().unwrap(), r#"[["Q1","a"],["Q2","b"]]"#);
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
  }

  #[test]
  fn decodes_stored_lists() {
    let sel = NuggetSelection::from_json(Some(r#"[["Q", "x"], ["Q", "y"]]"#)).unwrap();
    assert!(sel.contains("Q", "x"));
    assert!(sel.contains("Q", "y"));
    assert!(NuggetSelection::from_json(None).unwrap().is_empty());
    assert!(NuggetSelection::from_json(Some(r#"[["Q"]]"#)).is_err());
  }

  #[test]
  fn remove_reports_membership() {
    let mut sel: NuggetSelection = [("Q", "x")].into_iter().collect();
    assert!(!sel.insert("Q", "x"));
    assert!(sel.remove("Q", "x"));
    assert!(!sel.remove("Q", "x"));
    assert!(sel.is_empty());
  }
}
