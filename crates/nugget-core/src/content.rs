//! The content index: a closed universe of annotation keys.
//!
//! A [`ContentIndex`] is built once from a nested JSON mapping whose depth
//! equals the number of declared levels (e.g. `topic_id → doc_id → run_id →
//! sent_id`). Every leaf path becomes a composite [`Key`] carrying immutable
//! content text and one cell per declared slot. The key set never changes
//! after construction; only slot cells do.

use std::{
  collections::{BTreeMap, BTreeSet, btree_map},
  ops::Bound,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::{Error, Result, selection::NuggetSelection};

/// One value per level, outermost first.
pub type Key = Vec<String>;

// ─── Slots ───────────────────────────────────────────────────────────────────

/// How the values of a slot are stored and decoded.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotKind {
  /// Free text such as a label chosen from an option list.
  #[default]
  Text,
  /// A [`NuggetSelection`], stored as its JSON encoding.
  Selection,
}

/// A named annotation slot attached to every key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
  pub name: String,
  #[serde(default)]
  pub kind: SlotKind,
}

impl SlotDef {
  pub fn text(name: impl Into<String>) -> Self {
    Self { name: name.into(), kind: SlotKind::Text }
  }

  pub fn selection(name: impl Into<String>) -> Self {
    Self { name: name.into(), kind: SlotKind::Selection }
  }
}

/// A decoded slot value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
  Text(String),
  Selection(NuggetSelection),
}

impl Annotation {
  pub fn kind(&self) -> SlotKind {
    match self {
      Self::Text(_) => SlotKind::Text,
      Self::Selection(_) => SlotKind::Selection,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      Self::Selection(_) => None,
    }
  }

  pub fn as_selection(&self) -> Option<&NuggetSelection> {
    match self {
      Self::Selection(s) => Some(s),
      Self::Text(_) => None,
    }
  }

  /// The string written to the `annotation` column.
  pub fn encode(&self) -> Result<String> {
    match self {
      Self::Text(s) => Ok(s.clone()),
      Self::Selection(s) => s.to_json(),
    }
  }

  pub fn decode(kind: SlotKind, raw: &str) -> Result<Self> {
    match kind {
      SlotKind::Text => Ok(Self::Text(raw.to_owned())),
      SlotKind::Selection => Ok(Self::Selection(NuggetSelection::from_json(Some(raw))?)),
    }
  }
}

impl From<&str> for Annotation {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Annotation {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<NuggetSelection> for Annotation {
  fn from(s: NuggetSelection) -> Self { Self::Selection(s) }
}

// ─── Rows and views ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Row {
  content: String,
  /// One cell per declared slot; `None` means unset.
  cells:   Vec<Option<Annotation>>,
}

/// A read-only view of one key's content and slot values.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
  content: &'a str,
  slots:   &'a [SlotDef],
  cells:   &'a [Option<Annotation>],
}

impl<'a> Entry<'a> {
  pub fn content(&self) -> &'a str { self.content }

  /// The value of `slot`, or `None` if unset or undeclared.
  pub fn get(&self, slot: &str) -> Option<&'a Annotation> {
    let pos = self.slots.iter().position(|s| s.name == slot)?;
    self.cells[pos].as_ref()
  }

  pub fn text(&self, slot: &str) -> Option<&'a str> {
    self.get(slot).and_then(Annotation::as_text)
  }

  pub fn selection(&self, slot: &str) -> Option<&'a NuggetSelection> {
    self.get(slot).and_then(Annotation::as_selection)
  }

  /// `(slot name, value)` in declaration order.
  pub fn slots(self) -> impl Iterator<Item = (&'a str, Option<&'a Annotation>)> + 'a {
    self
      .slots
      .iter()
      .zip(self.cells)
      .map(|(def, cell)| (def.name.as_str(), cell.as_ref()))
  }

  /// True iff every slot is set.
  pub fn is_done(&self) -> bool { self.cells.iter().all(Option::is_some) }
}

/// Entries under a prefix in key order, yielding `(suffix, entry)` where
/// `suffix` is the key with the prefix levels removed.
pub struct Scan<'a> {
  range:  btree_map::Range<'a, Key, Row>,
  prefix: Key,
  slots:  &'a [SlotDef],
  done:   bool,
}

impl<'a> Iterator for Scan<'a> {
  type Item = (&'a [String], Entry<'a>);

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match self.range.next() {
      Some((key, row)) if key.starts_with(&self.prefix) => Some((
        &key[self.prefix.len()..],
        Entry { content: &row.content, slots: self.slots, cells: &row.cells },
      )),
      _ => {
        self.done = true;
        None
      }
    }
  }
}

/// Result of [`ContentIndex::get`]: a single entry for a full existing key,
/// otherwise the (possibly empty) sequence of entries under the prefix.
pub enum Lookup<'a> {
  Entry(Entry<'a>),
  Entries(Scan<'a>),
}

impl<'a> Lookup<'a> {
  pub fn entry(self) -> Option<Entry<'a>> {
    match self {
      Self::Entry(e) => Some(e),
      Self::Entries(_) => None,
    }
  }
}

// ─── ContentIndex ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContentIndex {
  levels: Vec<String>,
  slots:  Vec<SlotDef>,
  rows:   BTreeMap<Key, Row>,
}

fn owned_key<S: AsRef<str>>(key: &[S]) -> Key {
  key.iter().map(|s| s.as_ref().to_owned()).collect()
}

fn leaf_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Null => Some(String::new()),
    Value::Array(_) | Value::Object(_) => None,
  }
}

fn flatten(
  levels: &[String],
  value: &Value,
  path: &mut Key,
  rows: &mut BTreeMap<Key, Row>,
  width: usize,
) -> Result<()> {
  let depth = path.len();
  if depth == levels.len() {
    let content = leaf_text(value).ok_or_else(|| {
      Error::ContentShape(format!("expected text content at {path:?}, found nesting"))
    })?;
    rows.insert(path.clone(), Row { content, cells: vec![None; width] });
    return Ok(());
  }

  match value {
    Value::Object(map) => {
      for (key, child) in map {
        path.push(key.clone());
        flatten(levels, child, path, rows, width)?;
        path.pop();
      }
      Ok(())
    }
    // A list at the last level is a set of unit leaves without content.
    Value::Array(items) if depth + 1 == levels.len() => {
      for item in items {
        let unit = leaf_text(item).ok_or_else(|| {
          Error::ContentShape(format!("expected scalar list items at {path:?}"))
        })?;
        let mut key = path.clone();
        key.push(unit);
        rows.insert(key, Row { content: String::new(), cells: vec![None; width] });
      }
      Ok(())
    }
    _ => Err(Error::ContentShape(format!(
      "expected a mapping for level {:?} at {path:?}",
      levels[depth]
    ))),
  }
}

impl ContentIndex {
  /// Flatten `content` into the fixed key set, with every slot unset.
  pub fn build(levels: Vec<String>, slots: Vec<SlotDef>, content: &Value) -> Result<Self> {
    if levels.is_empty() {
      return Err(Error::ContentShape("at least one level is required".into()));
    }
    if slots.is_empty() {
      return Err(Error::ContentShape("at least one slot is required".into()));
    }
    if levels.iter().collect::<BTreeSet<_>>().len() != levels.len() {
      return Err(Error::ContentShape(format!("duplicate level names in {levels:?}")));
    }
    if slots.iter().map(|s| &s.name).collect::<BTreeSet<_>>().len() != slots.len() {
      return Err(Error::ContentShape("duplicate slot names".into()));
    }

    let mut rows = BTreeMap::new();
    flatten(&levels, content, &mut Vec::new(), &mut rows, slots.len())?;
    Ok(Self { levels, slots, rows })
  }

  pub fn levels(&self) -> &[String] { &self.levels }

  pub fn slots(&self) -> &[SlotDef] { &self.slots }

  /// Number of keys.
  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn contains_key<S: AsRef<str>>(&self, key: &[S]) -> bool {
    self.rows.contains_key(&owned_key(key))
  }

  pub fn slot_position(&self, slot: &str) -> Result<usize> {
    self
      .slots
      .iter()
      .position(|s| s.name == slot)
      .ok_or_else(|| Error::UnknownSlot(slot.to_owned()))
  }

  pub fn level_position(&self, level: &str) -> Result<usize> {
    self
      .levels
      .iter()
      .position(|l| l == level)
      .ok_or_else(|| Error::UnknownLevel(level.to_owned()))
  }

  fn matching(&self, prefix: Key) -> impl Iterator<Item = (&Key, &Row)> + '_ {
    self
      .rows
      .range((Bound::Included(prefix.clone()), Bound::Unbounded))
      .take_while(move |(key, _)| key.starts_with(&prefix))
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  /// The entry for a full-length key.
  pub fn entry<S: AsRef<str>>(&self, key: &[S]) -> Option<Entry<'_>> {
    self.rows.get(&owned_key(key)).map(|row| Entry {
      content: &row.content,
      slots:   &self.slots,
      cells:   &row.cells,
    })
  }

  /// Entries whose key starts with `prefix`, ordered by key. An unknown
  /// prefix yields nothing.
  pub fn scan<S: AsRef<str>>(&self, prefix: &[S]) -> Scan<'_> {
    let prefix = owned_key(prefix);
    Scan {
      range: self.rows.range((Bound::Included(prefix.clone()), Bound::Unbounded)),
      prefix,
      slots: &self.slots,
      done: false,
    }
  }

  /// Every entry with its full key.
  pub fn iter(&self) -> Scan<'_> { self.scan::<&str>(&[]) }

  /// Resolve a full key to its entry, or a partial key to its entries.
  pub fn get<S: AsRef<str>>(&self, key: &[S]) -> Lookup<'_> {
    if key.len() == self.levels.len() {
      if let Some(entry) = self.entry(key) {
        return Lookup::Entry(entry);
      }
    }
    Lookup::Entries(self.scan(key))
  }

  /// True iff no slot under `prefix` is unset; vacuously true for an
  /// unknown prefix.
  pub fn is_all_done<S: AsRef<str>>(&self, prefix: &[S]) -> bool {
    self
      .matching(owned_key(prefix))
      .all(|(_, row)| row.cells.iter().all(Option::is_some))
  }

  /// Without `level`, the number of set cells under `prefix`. With `level`,
  /// the number of distinct values at that level whose rows are all done.
  pub fn count_done<S: AsRef<str>>(&self, prefix: &[S], level: Option<&str>) -> Result<usize> {
    let rows = self.matching(owned_key(prefix));
    let Some(level) = level else {
      return Ok(rows.map(|(_, row)| row.cells.iter().flatten().count()).sum());
    };

    let pos = self.level_position(level)?;
    let mut groups: BTreeMap<&str, bool> = BTreeMap::new();
    for (key, row) in rows {
      let done = row.cells.iter().all(Option::is_some);
      groups
        .entry(key[pos].as_str())
        .and_modify(|all| *all &= done)
        .or_insert(done);
    }
    Ok(groups.values().filter(|done| **done).count())
  }

  /// Without `level`, the number of `(key, slot)` cells under `prefix`. With
  /// `level`, the number of distinct values at that level.
  pub fn count_job<S: AsRef<str>>(&self, prefix: &[S], level: Option<&str>) -> Result<usize> {
    let rows = self.matching(owned_key(prefix));
    match level {
      None => Ok(rows.count() * self.slots.len()),
      Some(level) => {
        let pos = self.level_position(level)?;
        Ok(rows.map(|(key, _)| key[pos].as_str()).collect::<BTreeSet<_>>().len())
      }
    }
  }

  // ── Writes ──────────────────────────────────────────────────────────────

  fn locate<S: AsRef<str>>(
    &self,
    key: &[S],
    slot: &str,
    value: &Annotation,
  ) -> Result<(Key, usize)> {
    let pos = self.slot_position(slot)?;
    let expected = self.slots[pos].kind;
    if expected != value.kind() {
      return Err(Error::SlotKindMismatch {
        slot:     slot.to_owned(),
        expected: expected.to_string(),
      });
    }
    let key = owned_key(key);
    if !self.rows.contains_key(&key) {
      return Err(Error::UnknownKey(key));
    }
    Ok((key, pos))
  }

  /// Validate a prospective write and report whether it would leave the cell
  /// as it is.
  pub fn unchanged<S: AsRef<str>>(
    &self,
    key: &[S],
    slot: &str,
    value: &Annotation,
  ) -> Result<bool> {
    let (key, pos) = self.locate(key, slot, value)?;
    Ok(self.rows[&key].cells[pos].as_ref() == Some(value))
  }

  /// Store `value`; returns whether the cell changed.
  pub fn set<S: AsRef<str>>(&mut self, key: &[S], slot: &str, value: Annotation) -> Result<bool> {
    let (key, pos) = self.locate(key, slot, &value)?;
    let Some(row) = self.rows.get_mut(&key) else {
      return Err(Error::UnknownKey(key));
    };
    if row.cells[pos].as_ref() == Some(&value) {
      return Ok(false);
    }
    row.cells[pos] = Some(value);
    Ok(true)
  }

  /// Apply a persisted raw value. Returns `false` when the key or slot is no
  /// longer part of this index; undecodable values are an error.
  pub fn replay<S: AsRef<str>>(&mut self, key: &[S], slot: &str, raw: &str) -> Result<bool> {
    let Ok(pos) = self.slot_position(slot) else {
      return Ok(false);
    };
    let kind = self.slots[pos].kind;
    let Some(row) = self.rows.get_mut(&owned_key(key)) else {
      return Ok(false);
    };
    row.cells[pos] = Some(Annotation::decode(kind, raw)?);
    Ok(true)
  }
}
