//! [`AnnotationStore`]: a [`ContentIndex`] whose slot writes are persisted to
//! an append-only table and replayed on open.

use chrono::Utc;
use nugget_core::content::{Annotation, ContentIndex, Entry, Lookup, Scan, SlotDef};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
  Result,
  database::{ActivityLog, Database},
  encode::{RawAnnotation, encode_dt},
  schema::annotation_table,
  tsv,
};

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Table name, level names and slot declarations for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSchema {
  table:  String,
  levels: Vec<String>,
  slots:  Vec<SlotDef>,
}

impl AnnotationSchema {
  pub fn new(table: impl Into<String>) -> Self {
    Self { table: table.into(), levels: Vec::new(), slots: Vec::new() }
  }

  /// Append a key level, outermost first.
  pub fn level(mut self, name: impl Into<String>) -> Self {
    self.levels.push(name.into());
    self
  }

  pub fn slot(mut self, slot: SlotDef) -> Self {
    self.slots.push(slot);
    self
  }

  pub fn table(&self) -> &str { &self.table }

  pub fn levels(&self) -> &[String] { &self.levels }

  pub fn slots(&self) -> &[SlotDef] { &self.slots }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// One user's view of an annotation table.
///
/// The in-memory index is authoritative for reads. Writes go to the audit log
/// and the table first; the index is only updated once both have committed.
pub struct AnnotationStore {
  db:    Database,
  log:   ActivityLog,
  table: String,
  index: ContentIndex,
}

impl AnnotationStore {
  /// Build the key set from `content`, create the table if needed, and
  /// replay this user's rows in write order.
  ///
  /// Rows whose key or slot is no longer part of the universe are skipped
  /// with a warning. Rows that cannot be decoded fail the open.
  pub async fn open(
    db: Database,
    log: ActivityLog,
    schema: AnnotationSchema,
    content: &Value,
  ) -> Result<Self> {
    let ddl = annotation_table(&schema.table, &schema.levels)?;
    let mut index = ContentIndex::build(schema.levels, schema.slots, content)?;
    let table = schema.table;

    db.conn()
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;

    let rows = Self::select_user_rows(&db, &table, index.levels(), log.username()).await?;
    let (mut applied, mut skipped) = (0usize, 0usize);
    for row in rows {
      if index.replay(&row.key, &row.slot_name, &row.annotation)? {
        applied += 1;
      } else {
        skipped += 1;
        warn!(
          table = %table,
          key = ?row.key,
          slot = %row.slot_name,
          "skipping row outside the content universe"
        );
      }
    }

    info!(
      table = %table,
      username = %log.username(),
      keys = index.len(),
      applied,
      skipped,
      "annotation store opened"
    );
    Ok(Self { db, log, table, index })
  }

  async fn select_user_rows(
    db: &Database,
    table: &str,
    levels: &[String],
    username: &str,
  ) -> Result<Vec<RawAnnotation>> {
    let width = levels.len();
    let sql = format!(
      "SELECT {}, slot_name, annotation FROM {table} WHERE username = ?1 ORDER BY ts, rowid",
      levels.join(", ")
    );
    let username = username.to_owned();

    let rows = db
      .conn()
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![username], |row| {
            let key = (0..width)
              .map(|i| row.get(i))
              .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(RawAnnotation {
              key,
              slot_name: row.get(width)?,
              annotation: row.get(width + 1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  pub fn table(&self) -> &str { &self.table }

  pub fn username(&self) -> &str { self.log.username() }

  pub fn index(&self) -> &ContentIndex { &self.index }

  // ── Reads ───────────────────────────────────────────────────────────────

  pub fn get<S: AsRef<str>>(&self, key: &[S]) -> Lookup<'_> { self.index.get(key) }

  pub fn entry<S: AsRef<str>>(&self, key: &[S]) -> Option<Entry<'_>> { self.index.entry(key) }

  pub fn scan<S: AsRef<str>>(&self, prefix: &[S]) -> Scan<'_> { self.index.scan(prefix) }

  pub fn is_all_done<S: AsRef<str>>(&self, prefix: &[S]) -> bool { self.index.is_all_done(prefix) }

  pub fn count_done<S: AsRef<str>>(&self, prefix: &[S], level: Option<&str>) -> Result<usize> {
    Ok(self.index.count_done(prefix, level)?)
  }

  pub fn count_job<S: AsRef<str>>(&self, prefix: &[S], level: Option<&str>) -> Result<usize> {
    Ok(self.index.count_job(prefix, level)?)
  }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Set `slot` of the full key `key` to `value`.
  ///
  /// Writing the value a cell already holds does nothing and returns `false`.
  /// On a storage failure the in-memory cell keeps its previous value.
  pub async fn annotate<S: AsRef<str>>(
    &mut self,
    key: &[S],
    slot: &str,
    value: impl Into<Annotation>,
  ) -> Result<bool> {
    let value = value.into();
    if self.index.unchanged(key, slot, &value)? {
      debug!(table = %self.table, slot, "unchanged annotation skipped");
      return Ok(false);
    }

    let key: Vec<String> = key.iter().map(|k| k.as_ref().to_owned()).collect();
    let raw = value.encode()?;
    self
      .log
      .log(
        "annotate",
        &json!({ "table": self.table, "key": key, "slot": slot, "annotation": raw }),
      )
      .await?;

    let columns = self.index.levels().join(", ");
    let placeholders: String = (2..key.len() + 2).map(|i| format!(", ?{i}")).collect();
    let next = key.len() + 2;
    let sql = format!(
      "INSERT INTO {table} (username, {columns}, slot_name, annotation, ts)
       VALUES (?1{placeholders}, ?{next}, ?{}, ?{})",
      next + 1,
      next + 2,
      table = self.table,
    );

    let mut params: Vec<String> = Vec::with_capacity(key.len() + 4);
    params.push(self.log.username().to_owned());
    params.extend(key.iter().cloned());
    params.push(slot.to_owned());
    params.push(raw);
    params.push(encode_dt(Utc::now()));

    self
      .db
      .conn()
      .call(move |conn| {
        conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(())
      })
      .await?;

    self.index.set(&key, slot, value)?;
    debug!(table = %self.table, username = %self.username(), key = ?key, slot, "annotated");
    Ok(true)
  }

  // ── Export ──────────────────────────────────────────────────────────────

  /// Tab-separated dump.
  ///
  /// Without `all_data`: one row per key with columns `levels..., slots...`
  /// from this user's current state; unset cells are empty. With `all_data`:
  /// the raw table for every user, most recent first.
  pub async fn to_tsv(&self, all_data: bool) -> Result<String> {
    if all_data {
      return self.log_tsv().await;
    }

    let levels = self.index.levels();
    let slots = self.index.slots().iter().map(|s| s.name.as_str());
    let mut out = tsv::row(levels.iter().map(String::as_str).chain(slots));
    for (key, entry) in self.index.iter() {
      let mut fields: Vec<String> = key.to_vec();
      for (_, value) in entry.slots() {
        fields.push(value.map(Annotation::encode).transpose()?.unwrap_or_default());
      }
      out.push_str(&tsv::row(&fields));
    }
    Ok(out)
  }

  async fn log_tsv(&self) -> Result<String> {
    let mut columns = vec!["username".to_owned()];
    columns.extend(self.index.levels().iter().cloned());
    columns.extend(["slot_name", "annotation", "ts"].map(String::from));

    let sql = format!(
      "SELECT {} FROM {} ORDER BY ts DESC, rowid DESC",
      columns.join(", "),
      self.table
    );
    let width = columns.len();
    let rows: Vec<Vec<String>> = self
      .db
      .conn()
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            (0..width).map(|i| row.get(i)).collect::<rusqlite::Result<Vec<String>>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut out = tsv::row(&columns);
    for row in rows {
      out.push_str(&tsv::row(&row));
    }
    Ok(out)
  }
}
