//! # Database Values
//!
//! The tagged value union passed between the query builder, the transaction
//! planner, and the executor.
//!
//! ## Value Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Record (serde)  ──►  RowMap (column → DbValue)  ──►  SQL bind  │
//! │                                                                 │
//! │  PgRow (driver)  ──►  RowMap (column → DbValue)  ──►  Record    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DbValue::Typed` pairs a value with an explicit column type name. The
//! executor renders it as `$n::type`, which disambiguates conversions the
//! server cannot infer on its own (the classic case: an empty array).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A row as a map from column key to value.
pub type RowMap = BTreeMap<String, DbValue>;

/// A single database-bindable (or decoded) value.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
    Array(Vec<DbValue>),
    /// A value paired with an explicit target column type name.
    Typed { value: Box<DbValue>, pg_type: String },
}

impl DbValue {
    /// Wraps a value with an explicit column type name (rendered as a
    /// `::type` cast by the executor).
    pub fn typed(value: impl Into<DbValue>, pg_type: impl Into<String>) -> Self {
        DbValue::Typed {
            value: Box::new(value.into()),
            pg_type: pg_type.into(),
        }
    }

    /// An empty array with an explicit element type, e.g. `empty_array("text")`.
    pub fn empty_array(element_type: &str) -> Self {
        DbValue::typed(DbValue::Array(Vec::new()), format!("{element_type}[]"))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Short name of the variant, used in conversion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "bool",
            DbValue::Int(_) => "int",
            DbValue::Float(_) => "float",
            DbValue::Text(_) => "text",
            DbValue::Uuid(_) => "uuid",
            DbValue::Timestamp(_) => "timestamp",
            DbValue::Json(_) => "json",
            DbValue::Array(_) => "array",
            DbValue::Typed { .. } => "typed",
        }
    }

    /// Converts to a JSON value for record mapping and payload storage.
    ///
    /// Timestamps render as RFC 3339 strings, UUIDs as their canonical
    /// hyphenated form. Non-finite floats become JSON null.
    pub fn to_json(&self) -> JsonValue {
        match self {
            DbValue::Null => JsonValue::Null,
            DbValue::Bool(b) => JsonValue::Bool(*b),
            DbValue::Int(i) => JsonValue::from(*i),
            DbValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DbValue::Text(s) => JsonValue::String(s.clone()),
            DbValue::Uuid(u) => JsonValue::String(u.to_string()),
            DbValue::Timestamp(ts) => {
                JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            DbValue::Json(v) => v.clone(),
            DbValue::Array(items) => {
                JsonValue::Array(items.iter().map(DbValue::to_json).collect())
            }
            DbValue::Typed { value, .. } => value.to_json(),
        }
    }

    /// Converts from a JSON value.
    ///
    /// Numbers become `Int` when integral, `Float` otherwise; objects stay
    /// `Json` (there is no narrower relational shape to pick).
    pub fn from_json(value: &JsonValue) -> DbValue {
        match value {
            JsonValue::Null => DbValue::Null,
            JsonValue::Bool(b) => DbValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DbValue::Int(i)
                } else {
                    DbValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => DbValue::Text(s.clone()),
            JsonValue::Array(items) => {
                DbValue::Array(items.iter().map(DbValue::from_json).collect())
            }
            JsonValue::Object(_) => DbValue::Json(value.clone()),
        }
    }
}

impl std::fmt::Display for DbValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbValue::Null => write!(f, "NULL"),
            DbValue::Bool(b) => write!(f, "{b}"),
            DbValue::Int(i) => write!(f, "{i}"),
            DbValue::Float(x) => write!(f, "{x}"),
            DbValue::Text(s) => write!(f, "'{s}'"),
            DbValue::Uuid(u) => write!(f, "{u}"),
            DbValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            DbValue::Json(v) => write!(f, "{v}"),
            DbValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            DbValue::Typed { value, pg_type } => write!(f, "{value}::{pg_type}"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<i16> for DbValue {
    fn from(v: i16) -> Self {
        DbValue::Int(i64::from(v))
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(i64::from(v))
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        DbValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        DbValue::Timestamp(v)
    }
}

impl From<JsonValue> for DbValue {
    fn from(v: JsonValue) -> Self {
        DbValue::Json(v)
    }
}

impl From<Vec<DbValue>> for DbValue {
    fn from(v: Vec<DbValue>) -> Self {
        DbValue::Array(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => DbValue::Null,
        }
    }
}
