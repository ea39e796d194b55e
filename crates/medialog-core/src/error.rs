//! # Error Types
//!
//! Error taxonomy for the data-access engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Error Types                             │
//! │                                                                 │
//! │  medialog-core errors (this file)                               │
//! │  ├── CoreError   - Build/conversion/resolution failures         │
//! │                                                                 │
//! │  medialog-db errors (separate crate)                            │
//! │  └── DbError     - Pool, query and plan execution failures      │
//! │                                                                 │
//! │  Flow: CoreError → DbError → caller's error dialog              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in every variant (SQL text, parameter names, type
//!    names, offending payloads)
//! 3. Errors are enum variants, never bare strings

use thiserror::Error;

/// Errors produced while building queries, resolving transaction plans, or
/// converting between records and row maps.
///
/// Every variant carries enough context to render a useful diagnostic
/// without re-running the failing operation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No decoder is registered under the given dynamic type name.
    ///
    /// ## When This Occurs
    /// - Reading a polymorphic list written by a newer schema revision
    /// - Forgetting to register a detail type at startup
    #[error("no dynamic type registered under '{type_name}'")]
    UnknownDynamicType { type_name: String },

    /// A dynamic type name was registered twice.
    ///
    /// The registry refuses ambiguous names rather than guessing which
    /// decoder wins.
    #[error("dynamic type '{type_name}' is already registered")]
    DuplicateDynamicType { type_name: String },

    /// A value could not be converted to the requested target type.
    ///
    /// The original value is preserved (display form) for diagnostics.
    #[error("cannot convert {value} to {target}")]
    ValueConversion { value: String, target: String },

    /// A row map could not be turned into the target record type.
    ///
    /// The offending row payload is preserved for diagnostics.
    #[error("failed to map row to {target}: {reason}; row: {row}")]
    RowMapping {
        target: String,
        reason: String,
        row: String,
    },

    /// UPDATE or DELETE was finalized without a WHERE clause.
    ///
    /// ## When This Occurs
    /// - `update(table).set_value(..).build()` with no `where_clause(..)`
    ///
    /// This is a safety rail against accidental full-table mutation; the
    /// statement never reaches the database.
    #[error("{statement} statement on '{table}' requires a WHERE clause")]
    MissingWhereClause {
        statement: &'static str,
        table: String,
    },

    /// ON CONFLICT was configured with both a column target and a
    /// constraint target.
    #[error("ON CONFLICT cannot target both columns and a constraint")]
    ConflictingConflictTarget,

    /// ON CONFLICT was configured without an action.
    #[error("ON CONFLICT requires an action (DO NOTHING or DO UPDATE)")]
    MissingConflictAction,

    /// ON CONFLICT DO UPDATE was configured without a conflict target.
    #[error("ON CONFLICT DO UPDATE requires a column or constraint target")]
    MissingConflictTarget,

    /// INSERT was finalized with no values.
    #[error("INSERT INTO '{table}' has no values")]
    EmptyInsert { table: String },

    /// The same parameter name was bound twice with different values.
    #[error("parameter '{name}' is bound twice with different values")]
    DuplicateParameter { name: String },

    /// A named placeholder in the SQL text has no binding.
    #[error("no binding for placeholder ':{name}' in: {sql}")]
    MissingParameter { name: String, sql: String },

    /// A deferred step reference could not be resolved.
    ///
    /// ## When This Occurs
    /// - A handle from another plan (or a later step) was used
    /// - The referenced result is missing the requested row or column
    ///
    /// This is always a programming error in plan construction, never a
    /// silent null.
    #[error("step {step} dependency cannot be resolved: {reason}")]
    StepDependency { step: usize, reason: String },
}

impl CoreError {
    /// Creates a ValueConversion error, capturing the value's display form.
    pub fn value_conversion(value: impl std::fmt::Display, target: impl Into<String>) -> Self {
        CoreError::ValueConversion {
            value: value.to_string(),
            target: target.into(),
        }
    }

    /// Creates a RowMapping error for a target type and offending row.
    pub fn row_mapping(
        target: impl Into<String>,
        reason: impl Into<String>,
        row: impl std::fmt::Display,
    ) -> Self {
        CoreError::RowMapping {
            target: target.into(),
            reason: reason.into(),
            row: row.to_string(),
        }
    }

    /// Creates a StepDependency error for the step being prepared.
    pub fn step_dependency(step: usize, reason: impl Into<String>) -> Self {
        CoreError::StepDependency {
            step,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_where_names_the_clause() {
        let err = CoreError::MissingWhereClause {
            statement: "UPDATE",
            table: "titles".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "UPDATE statement on 'titles' requires a WHERE clause"
        );
    }

    #[test]
    fn value_conversion_preserves_original_value() {
        let err = CoreError::value_conversion("banana", "i64");
        assert_eq!(err.to_string(), "cannot convert banana to i64");
    }

    #[test]
    fn step_dependency_carries_step_index() {
        let err = CoreError::step_dependency(3, "no captured result for handle 7");
        assert_eq!(
            err.to_string(),
            "step 3 dependency cannot be resolved: no captured result for handle 7"
        );
    }
}
