//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                            │
//! │                                                                 │
//! │  PostgreSQL error (sqlx::Error)                                 │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  DbError (this module) ← Adds SQL text, params, step index      │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  Caller renders a diagnostic dialog without re-querying         │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation in this crate returns `DbResult`; expected failures
//! never cross the crate boundary as panics.

use medialog_core::{CoreError, DbValue};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A build/conversion/resolution failure from the engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity not found.
    ///
    /// ## When This Occurs
    /// - A lookup by id matches nothing
    /// - An UPDATE/DELETE affected zero rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("duplicate {constraint}: value already exists")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed; SQL and parameters are preserved for
    /// diagnostics.
    #[error("query failed: {source}; sql: {sql}; params: {params}")]
    QueryFailed {
        sql: String,
        params: String,
        #[source]
        source: sqlx::Error,
    },

    /// A query expected at least one row and got none.
    #[error("query returned no rows; sql: {sql}")]
    EmptyResult { sql: String },

    /// A transaction plan step failed; the whole plan was rolled back.
    #[error("step {index} failed: {source}")]
    StepFailed {
        index: usize,
        #[source]
        source: Box<DbError>,
    },

    /// BEGIN/COMMIT/ROLLBACK itself failed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Connection pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Wraps a driver error, preserving SQL text and bind values.
    pub fn query_failed(sql: &str, values: &[DbValue], source: sqlx::Error) -> Self {
        // Constraint violations get their own variants so callers can react
        // (e.g. duplicate ISBN) without parsing messages.
        if let sqlx::Error::Database(db_err) = &source {
            if db_err.is_unique_violation() {
                return DbError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unique constraint").to_string(),
                };
            }
            if db_err.is_foreign_key_violation() {
                return DbError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                };
            }
        }
        let params = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        DbError::QueryFailed {
            sql: sql.to_string(),
            params: format!("[{params}]"),
            source,
        }
    }
}

/// Convert pool-level sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failed_identifies_index_and_cause() {
        let cause = DbError::EmptyResult {
            sql: "SELECT id FROM titles".to_string(),
        };
        let err = DbError::StepFailed {
            index: 1,
            source: Box::new(cause),
        };
        assert_eq!(
            err.to_string(),
            "step 1 failed: query returned no rows; sql: SELECT id FROM titles"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn core_errors_pass_through() {
        let err: DbError = CoreError::MissingWhereClause {
            statement: "DELETE",
            table: "titles".to_string(),
        }
        .into();
        assert!(err.to_string().contains("WHERE"));
    }
}
