//! # Query Fragments
//!
//! The basic unit passed between the query builder and the executor: an
//! immutable pair of SQL text (with `:name` placeholders) and a named
//! parameter map.
//!
//! ## Placeholder Dialect
//! ```text
//! SELECT * FROM titles WHERE kind = :kind AND rating >= :min_rating
//!                                   │
//!                                   └── named placeholder, bound in params
//!
//! SELECT id::text FROM titles
//!           │
//!           └── cast, NOT a placeholder (double colon is skipped)
//! ```
//!
//! The executor renders fragments to PostgreSQL positional form
//! (`$1 .. $n`) just before binding; `DbValue::Typed` parameters render with
//! an explicit `::type` cast appended to the positional marker.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, CoreResult};
use crate::value::DbValue;

/// An immutable (SQL text, named parameter map) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFragment {
    sql: String,
    params: BTreeMap<String, DbValue>,
}

impl QueryFragment {
    /// Creates a fragment with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        QueryFragment {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Creates a fragment with an explicit parameter map.
    pub fn with_params(sql: impl Into<String>, params: BTreeMap<String, DbValue>) -> Self {
        QueryFragment {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &BTreeMap<String, DbValue> {
        &self.params
    }

    /// Returns a copy with one more binding.
    ///
    /// Rebinding a name to a different value is an error; rebinding the same
    /// value is a no-op.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> CoreResult<Self> {
        let name = name.into();
        let value = value.into();
        match self.params.get(&name) {
            Some(existing) if *existing != value => {
                return Err(CoreError::DuplicateParameter { name });
            }
            _ => {
                self.params.insert(name, value);
            }
        }
        Ok(self)
    }

    /// Concatenates two fragments with a separator, merging parameter maps.
    ///
    /// Parameter names shared by both sides must be bound to equal values.
    pub fn join(self, other: QueryFragment, separator: &str) -> CoreResult<Self> {
        let mut sql = self.sql;
        if !sql.is_empty() && !other.sql.is_empty() {
            sql.push_str(separator);
        }
        sql.push_str(&other.sql);

        let mut params = self.params;
        merge_params(&mut params, other.params)?;

        Ok(QueryFragment { sql, params })
    }

    /// Verifies that every placeholder in the SQL text has a binding.
    pub fn check_bindings(&self) -> CoreResult<()> {
        for name in placeholders(&self.sql) {
            if !self.params.contains_key(&name) {
                return Err(CoreError::MissingParameter {
                    name,
                    sql: self.sql.clone(),
                });
            }
        }
        Ok(())
    }

    /// Renders to PostgreSQL positional form.
    ///
    /// Each distinct placeholder gets one `$n` slot (repeated occurrences
    /// reuse it); `Typed` values render as `$n::type` and contribute their
    /// inner value to the bind list. A placeholder with no binding is a
    /// `MissingParameter` error.
    pub fn to_positional(&self) -> CoreResult<(String, Vec<DbValue>)> {
        let mut out = String::with_capacity(self.sql.len());
        let mut slots: BTreeMap<String, usize> = BTreeMap::new();
        let mut values: Vec<DbValue> = Vec::new();
        let mut error: Option<CoreError> = None;

        scan_sql(&self.sql, |segment| match segment {
            SqlSegment::Text(text) => out.push_str(text),
            SqlSegment::Placeholder(name) => {
                if error.is_some() {
                    return;
                }
                let Some(value) = self.params.get(name) else {
                    error = Some(CoreError::MissingParameter {
                        name: name.to_string(),
                        sql: self.sql.clone(),
                    });
                    return;
                };
                let index = *slots.entry(name.to_string()).or_insert_with(|| {
                    values.push(match value {
                        DbValue::Typed { value, .. } => (**value).clone(),
                        other => other.clone(),
                    });
                    values.len()
                });
                match value {
                    DbValue::Typed { pg_type, .. } => {
                        out.push_str(&format!("${index}::{pg_type}"));
                    }
                    _ => out.push_str(&format!("${index}")),
                }
            }
        });

        match error {
            Some(err) => Err(err),
            None => Ok((out, values)),
        }
    }
}

/// Merges `src` into `dst`; shared names must carry equal values.
pub(crate) fn merge_params(
    dst: &mut BTreeMap<String, DbValue>,
    src: BTreeMap<String, DbValue>,
) -> CoreResult<()> {
    for (name, value) in src {
        match dst.get(&name) {
            Some(existing) if *existing != value => {
                return Err(CoreError::DuplicateParameter { name });
            }
            _ => {
                dst.insert(name, value);
            }
        }
    }
    Ok(())
}

/// Collects the distinct `:name` placeholders in a piece of SQL.
///
/// `::type` casts, quoted string literals, quoted identifiers, and `--`
/// line comments are skipped.
pub fn placeholders(sql: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    scan_sql(sql, |segment| {
        if let SqlSegment::Placeholder(name) = segment {
            names.insert(name.to_string());
        }
    });
    names
}

enum SqlSegment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Walks SQL text, emitting plain text runs and placeholder names.
///
/// The scanner tracks three quoting states (single-quoted literal,
/// double-quoted identifier, line comment) and treats `::` as a cast.
fn scan_sql<'a>(sql: &'a str, mut emit: impl FnMut(SqlSegment<'a>)) {
    let bytes = sql.as_bytes();
    let mut chars = sql.char_indices().peekable();
    let mut text_start = 0;

    #[derive(PartialEq)]
    enum State {
        Normal,
        SingleQuote,
        DoubleQuote,
        LineComment,
    }
    let mut state = State::Normal;

    while let Some((i, c)) = chars.next() {
        match state {
            State::SingleQuote => {
                if c == '\'' {
                    state = State::Normal;
                }
            }
            State::DoubleQuote => {
                if c == '"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::Normal => match c {
                '\'' => state = State::SingleQuote,
                '"' => state = State::DoubleQuote,
                '-' if matches!(chars.peek(), Some((_, '-'))) => {
                    chars.next();
                    state = State::LineComment;
                }
                ':' => {
                    if matches!(chars.peek(), Some((_, ':'))) {
                        // Cast: consume the second colon, keep scanning.
                        chars.next();
                        continue;
                    }
                    let Some(&(name_start, first)) = chars.peek() else {
                        continue;
                    };
                    if !is_ident_start(first) {
                        continue;
                    }
                    // Flush the text run preceding the placeholder.
                    if text_start < i {
                        emit(SqlSegment::Text(&sql[text_start..i]));
                    }
                    let mut name_end = bytes.len();
                    while let Some(&(j, nc)) = chars.peek() {
                        if is_ident_char(nc) {
                            chars.next();
                        } else {
                            name_end = j;
                            break;
                        }
                    }
                    emit(SqlSegment::Placeholder(&sql[name_start..name_end]));
                    text_start = name_end;
                }
                _ => {}
            },
        }
    }

    if text_start < sql.len() {
        emit(SqlSegment::Text(&sql[text_start..]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_placeholders() {
        let names = placeholders("SELECT * FROM t WHERE a = :a AND b >= :b_min OR a = :a");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b_min".to_string()]
        );
    }

    #[test]
    fn skips_casts_and_literals() {
        let names = placeholders(
            "SELECT id::text FROM t WHERE note = ':not_me' AND \"we:ird\" = :real -- :comment",
        );
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["real".to_string()]);
    }

    #[test]
    fn renders_positional_in_first_use_order() {
        let frag = QueryFragment::new("UPDATE t SET b = :b WHERE a = :a AND b <> :b")
            .bind("a", 1i64)
            .unwrap()
            .bind("b", "x")
            .unwrap();
        let (sql, values) = frag.to_positional().unwrap();
        assert_eq!(sql, "UPDATE t SET b = $1 WHERE a = $2 AND b <> $1");
        assert_eq!(values, vec![DbValue::Text("x".to_string()), DbValue::Int(1)]);
    }

    #[test]
    fn typed_value_renders_cast() {
        let frag = QueryFragment::new("SELECT * FROM t WHERE tags && :tags")
            .bind("tags", DbValue::empty_array("text"))
            .unwrap();
        let (sql, values) = frag.to_positional().unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE tags && $1::text[]");
        assert_eq!(values, vec![DbValue::Array(vec![])]);
    }

    #[test]
    fn missing_binding_is_an_error() {
        let frag = QueryFragment::new("SELECT * FROM t WHERE a = :a");
        let err = frag.to_positional().unwrap_err();
        assert!(matches!(err, CoreError::MissingParameter { name, .. } if name == "a"));
    }

    #[test]
    fn join_merges_params() {
        let left = QueryFragment::new("a = :a").bind("a", 1i64).unwrap();
        let right = QueryFragment::new("b = :b").bind("b", 2i64).unwrap();
        let joined = left.join(right, " AND ").unwrap();
        assert_eq!(joined.sql(), "a = :a AND b = :b");
        assert_eq!(joined.params().len(), 2);
    }

    #[test]
    fn join_rejects_conflicting_params() {
        let left = QueryFragment::new("a = :a").bind("a", 1i64).unwrap();
        let right = QueryFragment::new("a < :a").bind("a", 2i64).unwrap();
        let err = left.join(right, " AND ").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateParameter { name } if name == "a"));
    }

    #[test]
    fn rebinding_same_value_is_noop() {
        let frag = QueryFragment::new("a = :a")
            .bind("a", 1i64)
            .unwrap()
            .bind("a", 1i64)
            .unwrap();
        assert_eq!(frag.params().len(), 1);
    }
}
