//! Tab-separated export rows.
//!
//! Tabs, newlines and backslashes inside a field are escaped as `\t`, `\n`,
//! `\r` and `\\` so every record stays on one line.

/// Escape a single field.
pub fn escape(field: &str) -> String {
  let mut out = String::with_capacity(field.len());
  for c in field.chars() {
    match c {
      '\t' => out.push_str("\\t"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\\' => out.push_str("\\\\"),
      c => out.push(c),
    }
  }
  out
}

/// Join `fields` into one newline-terminated record.
pub fn row<I, S>(fields: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut line = fields
    .into_iter()
    .map(|f| escape(f.as_ref()))
    .collect::<Vec<_>>()
    .join("\t");
  line.push('\n');
  line
}
