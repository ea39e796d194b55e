//! # Fragment Executor
//!
//! Runs [`QueryFragment`]s against PostgreSQL: renders `:name` SQL to
//! positional form, binds [`DbValue`]s, and decodes result rows back into
//! [`RowMap`]s.
//!
//! ## Execution Path
//! ```text
//! QueryFragment ──► to_positional() ──► sqlx::query(sql).bind(..)
//!                                            │
//!                                            ▼
//!                  RowMap per row  ◄── typed decode per column
//! ```
//!
//! Decoding is driven by the column's declared type; a column this module
//! does not know is read as text when possible and null otherwise.

use chrono::{DateTime, NaiveDateTime, Utc};
use medialog_core::{from_row_map, CoreError, DbValue, QueryFragment, RowMap};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, Postgres, Row, TypeInfo};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

// =============================================================================
// Binding
// =============================================================================

/// Binds one value onto a query.
pub(crate) fn bind_value(query: PgQuery<'_>, value: DbValue) -> DbResult<PgQuery<'_>> {
    Ok(match value {
        DbValue::Null => query.bind(Option::<String>::None),
        DbValue::Bool(b) => query.bind(b),
        DbValue::Int(i) => query.bind(i),
        DbValue::Float(f) => query.bind(f),
        DbValue::Text(s) => query.bind(s),
        DbValue::Uuid(u) => query.bind(u),
        DbValue::Timestamp(ts) => query.bind(ts),
        DbValue::Json(v) => query.bind(v),
        DbValue::Array(items) => bind_array(query, items)?,
        // The cast was rendered into the SQL; only the inner value binds.
        DbValue::Typed { value, .. } => bind_value(query, *value)?,
    })
}

/// Binds an array parameter as a homogeneous PostgreSQL array.
///
/// Element type is taken from the first non-null element; an empty array
/// binds as `text[]` (use [`DbValue::empty_array`] for an explicit cast).
fn bind_array(query: PgQuery<'_>, items: Vec<DbValue>) -> DbResult<PgQuery<'_>> {
    fn collect<T, F>(items: &[DbValue], extract: F) -> DbResult<Vec<Option<T>>>
    where
        F: Fn(&DbValue) -> Option<T>,
    {
        items
            .iter()
            .map(|item| {
                if item.is_null() {
                    return Ok(None);
                }
                extract(item).map(Some).ok_or_else(|| {
                    DbError::Core(CoreError::value_conversion(
                        item,
                        "homogeneous array element",
                    ))
                })
            })
            .collect()
    }

    let kind = items
        .iter()
        .find(|item| !item.is_null())
        .map(DbValue::kind)
        .unwrap_or("text");

    Ok(match kind {
        "bool" => query.bind(collect(&items, |v| match v {
            DbValue::Bool(b) => Some(*b),
            _ => None,
        })?),
        "int" => query.bind(collect(&items, |v| match v {
            DbValue::Int(i) => Some(*i),
            _ => None,
        })?),
        "float" => query.bind(collect(&items, |v| match v {
            DbValue::Float(f) => Some(*f),
            _ => None,
        })?),
        "text" => query.bind(collect(&items, |v| match v {
            DbValue::Text(s) => Some(s.clone()),
            _ => None,
        })?),
        "uuid" => query.bind(collect(&items, |v| match v {
            DbValue::Uuid(u) => Some(*u),
            _ => None,
        })?),
        "timestamp" => query.bind(collect(&items, |v| match v {
            DbValue::Timestamp(ts) => Some(*ts),
            _ => None,
        })?),
        "json" => query.bind(collect(&items, |v| match v {
            DbValue::Json(j) => Some(j.clone()),
            _ => None,
        })?),
        other => {
            return Err(DbError::Core(CoreError::value_conversion(
                format!("array of {other}"),
                "homogeneous array",
            )))
        }
    })
}

// =============================================================================
// Decoding
// =============================================================================

fn get_as<'r, T>(row: &'r PgRow, index: usize) -> Option<Option<T>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok()
}

/// Decodes one column by its declared type.
pub(crate) fn decode_column(row: &PgRow, index: usize, type_name: &str) -> DbValue {
    fn flat<T>(value: Option<Option<T>>, wrap: impl Fn(T) -> DbValue) -> Option<DbValue> {
        value.map(|inner| inner.map_or(DbValue::Null, wrap))
    }

    let decoded = match type_name {
        "INT2" => flat(get_as::<i16>(row, index), |v| DbValue::Int(v.into())),
        "INT4" => flat(get_as::<i32>(row, index), |v| DbValue::Int(v.into())),
        "INT8" => flat(get_as::<i64>(row, index), DbValue::Int),
        "FLOAT4" => flat(get_as::<f32>(row, index), |v| DbValue::Float(v.into())),
        "FLOAT8" => flat(get_as::<f64>(row, index), DbValue::Float),
        "BOOL" => flat(get_as::<bool>(row, index), DbValue::Bool),
        "UUID" => flat(get_as::<Uuid>(row, index), DbValue::Uuid),
        "TIMESTAMPTZ" => flat(get_as::<DateTime<Utc>>(row, index), DbValue::Timestamp),
        "TIMESTAMP" => flat(get_as::<NaiveDateTime>(row, index), |v| {
            DbValue::Timestamp(v.and_utc())
        }),
        "JSON" | "JSONB" => flat(get_as::<JsonValue>(row, index), DbValue::Json),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" | "CHAR" => {
            flat(get_as::<String>(row, index), DbValue::Text)
        }
        array if array.ends_with("[]") => decode_array_column(row, index, array),
        _ => None,
    };

    decoded
        .or_else(|| flat(get_as::<String>(row, index), DbValue::Text))
        .unwrap_or(DbValue::Null)
}

fn decode_array_column(row: &PgRow, index: usize, type_name: &str) -> Option<DbValue> {
    fn arr<T>(
        value: Option<Option<Vec<Option<T>>>>,
        wrap: impl Fn(T) -> DbValue,
    ) -> Option<DbValue> {
        value.map(|inner| match inner {
            None => DbValue::Null,
            Some(items) => DbValue::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(DbValue::Null, |v| wrap(v)))
                    .collect(),
            ),
        })
    }

    match type_name {
        "TEXT[]" | "VARCHAR[]" => arr(get_as::<Vec<Option<String>>>(row, index), DbValue::Text),
        "INT2[]" => arr(get_as::<Vec<Option<i16>>>(row, index), |v| {
            DbValue::Int(v.into())
        }),
        "INT4[]" => arr(get_as::<Vec<Option<i32>>>(row, index), |v| {
            DbValue::Int(v.into())
        }),
        "INT8[]" => arr(get_as::<Vec<Option<i64>>>(row, index), DbValue::Int),
        "FLOAT8[]" => arr(get_as::<Vec<Option<f64>>>(row, index), DbValue::Float),
        "BOOL[]" => arr(get_as::<Vec<Option<bool>>>(row, index), DbValue::Bool),
        "UUID[]" => arr(get_as::<Vec<Option<Uuid>>>(row, index), DbValue::Uuid),
        "JSONB[]" | "JSON[]" => arr(get_as::<Vec<Option<JsonValue>>>(row, index), DbValue::Json),
        _ => None,
    }
}

/// Decodes a whole row into a column → value map.
pub(crate) fn decode_row(row: &PgRow) -> RowMap {
    let mut map = RowMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

/// Decodes the first column of a row (positionally, for scalar results).
pub(crate) fn decode_scalar(row: &PgRow) -> DbValue {
    match row.columns().first() {
        Some(column) => decode_column(row, 0, column.type_info().name()),
        None => DbValue::Null,
    }
}

// =============================================================================
// Positional Execution
// =============================================================================

pub(crate) async fn fetch_positional<'c, E>(
    executor: E,
    sql: &str,
    values: Vec<DbValue>,
) -> DbResult<Vec<PgRow>>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    debug!(sql = %sql, params = values.len(), "Executing query");
    let mut query = sqlx::query(sql);
    for value in values.clone() {
        query = bind_value(query, value)?;
    }
    query
        .fetch_all(executor)
        .await
        .map_err(|e| DbError::query_failed(sql, &values, e))
}

pub(crate) async fn execute_positional<'c, E>(
    executor: E,
    sql: &str,
    values: Vec<DbValue>,
) -> DbResult<u64>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    debug!(sql = %sql, params = values.len(), "Executing statement");
    let mut query = sqlx::query(sql);
    for value in values.clone() {
        query = bind_value(query, value)?;
    }
    let result = query
        .execute(executor)
        .await
        .map_err(|e| DbError::query_failed(sql, &values, e))?;
    Ok(result.rows_affected())
}

// =============================================================================
// Fragment Execution
// =============================================================================

pub(crate) async fn fetch_rows<'c, E>(executor: E, fragment: &QueryFragment) -> DbResult<Vec<RowMap>>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let (sql, values) = fragment.to_positional().map_err(DbError::Core)?;
    let rows = fetch_positional(executor, &sql, values).await?;
    Ok(rows.iter().map(decode_row).collect())
}

pub(crate) async fn execute_fragment<'c, E>(executor: E, fragment: &QueryFragment) -> DbResult<u64>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let (sql, values) = fragment.to_positional().map_err(DbError::Core)?;
    execute_positional(executor, &sql, values).await
}

// =============================================================================
// Terminal Operations
// =============================================================================

/// A fragment paired with a pool, exposing the terminal operations the
/// UI layer calls: `to_list`, `to_single`, `to_field`, `execute`.
pub struct QueryExecution<'a> {
    pool: &'a sqlx::PgPool,
    fragment: QueryFragment,
}

impl<'a> QueryExecution<'a> {
    pub(crate) fn new(pool: &'a sqlx::PgPool, fragment: QueryFragment) -> Self {
        QueryExecution { pool, fragment }
    }

    /// All result rows as raw row maps.
    pub async fn to_rows(self) -> DbResult<Vec<RowMap>> {
        fetch_rows(self.pool, &self.fragment).await
    }

    /// All result rows decoded into records.
    pub async fn to_list<T: DeserializeOwned>(self) -> DbResult<Vec<T>> {
        let rows = fetch_rows(self.pool, &self.fragment).await?;
        rows.iter()
            .map(|row| from_row_map::<T>(row).map_err(DbError::Core))
            .collect()
    }

    /// Exactly one record; zero rows is an error.
    pub async fn to_single<T: DeserializeOwned>(self) -> DbResult<T> {
        let sql = self.fragment.sql().to_string();
        self.to_single_opt()
            .await?
            .ok_or(DbError::EmptyResult { sql })
    }

    /// Zero or one record.
    pub async fn to_single_opt<T: DeserializeOwned>(self) -> DbResult<Option<T>> {
        let rows = fetch_rows(self.pool, &self.fragment).await?;
        match rows.first() {
            Some(row) => Ok(Some(from_row_map::<T>(row).map_err(DbError::Core)?)),
            None => Ok(None),
        }
    }

    /// The first column of the first row; zero rows is an error.
    pub async fn to_field(self) -> DbResult<DbValue> {
        let (sql, values) = self.fragment.to_positional().map_err(DbError::Core)?;
        let rows = fetch_positional(self.pool, &sql, values).await?;
        match rows.first() {
            Some(row) => Ok(decode_scalar(row)),
            None => Err(DbError::EmptyResult { sql }),
        }
    }

    /// Runs the statement, returning the affected-row count.
    pub async fn execute(self) -> DbResult<u64> {
        execute_fragment(self.pool, &self.fragment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bind validation is offline: sqlx queries are constructible without a
    // connection.

    #[test]
    fn mixed_array_is_rejected() {
        let query = sqlx::query("SELECT $1");
        let err = bind_array(
            query,
            vec![DbValue::Int(1), DbValue::Text("two".to_string())],
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            DbError::Core(CoreError::ValueConversion { .. })
        ));
    }

    #[test]
    fn null_elements_are_allowed_in_arrays() {
        let query = sqlx::query("SELECT $1");
        assert!(bind_array(query, vec![DbValue::Null, DbValue::Int(2)]).is_ok());
    }

    #[test]
    fn empty_array_binds_as_text() {
        let query = sqlx::query("SELECT $1");
        assert!(bind_array(query, Vec::new()).is_ok());
    }
}
