//! # Transaction Plan Driver
//!
//! Runs a [`TransactionPlan`] inside one database transaction.
//!
//! ## Failure Semantics
//! ```text
//! BEGIN
//!   step 0  ──ok──►  capture outcome
//!   step 1  ──ok──►  capture outcome
//!   step 2  ──ERR──► ROLLBACK, return StepFailed { index: 2, cause }
//! COMMIT              (only when every step succeeded)
//! ```
//!
//! No partial commits are possible: either the whole plan lands or none
//! of it does. The pure resolution logic lives in
//! [`medialog_core::plan::PlanExecution`]; this module only drives it
//! against a connection.

use medialog_core::{PlanExecution, PlanResults, PreparedStep, StepOutcome, StepShape,
    TransactionPlan};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::executor::{decode_row, decode_scalar, execute_positional, fetch_positional};

/// Executes every step of a plan, in append order, inside one transaction.
///
/// On any failure the transaction is rolled back and the error identifies
/// the failing step and wraps the original cause.
pub async fn execute_plan(pool: &PgPool, plan: TransactionPlan) -> DbResult<PlanResults> {
    let step_count = plan.len();
    debug!(steps = step_count, "Executing transaction plan");

    let mut tx = pool.begin().await?;
    let mut execution = PlanExecution::new(plan);

    loop {
        let prepared = match execution.next_step() {
            Ok(Some(prepared)) => prepared,
            Ok(None) => break,
            Err(core_err) => {
                rollback(tx, "dependency resolution failed").await;
                return Err(DbError::Core(core_err));
            }
        };

        let index = prepared.index;
        match run_step(&mut tx, &prepared).await {
            Ok(outcome) => {
                if let Err(core_err) = execution.complete_step(outcome) {
                    rollback(tx, "outcome capture failed").await;
                    return Err(DbError::Core(core_err));
                }
            }
            Err(cause) => {
                rollback(tx, "step failed").await;
                return Err(DbError::StepFailed {
                    index,
                    source: Box::new(cause),
                });
            }
        }
    }

    tx.commit()
        .await
        .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
    debug!(steps = step_count, "Transaction plan committed");

    Ok(execution.into_results())
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Postgres>, reason: &str) {
    warn!(reason = %reason, "Rolling back transaction plan");
    // A failed rollback leaves the connection to be reaped by the pool.
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

async fn run_step(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    prepared: &PreparedStep,
) -> DbResult<StepOutcome> {
    let conn: &mut PgConnection = &mut *tx;
    debug!(step = prepared.index, shape = ?prepared.shape, "Running plan step");

    match prepared.shape {
        StepShape::Rows => {
            let rows = fetch_positional(conn, &prepared.sql, prepared.values.clone()).await?;
            Ok(StepOutcome::Rows(rows.iter().map(decode_row).collect()))
        }
        StepShape::Row => {
            let rows = fetch_positional(conn, &prepared.sql, prepared.values.clone()).await?;
            let row = rows.first().ok_or_else(|| DbError::EmptyResult {
                sql: prepared.sql.clone(),
            })?;
            Ok(StepOutcome::Rows(vec![decode_row(row)]))
        }
        StepShape::Scalar => {
            let rows = fetch_positional(conn, &prepared.sql, prepared.values.clone()).await?;
            let row = rows.first().ok_or_else(|| DbError::EmptyResult {
                sql: prepared.sql.clone(),
            })?;
            Ok(StepOutcome::Scalar(decode_scalar(row)))
        }
        StepShape::RowCount => {
            let count = execute_positional(conn, &prepared.sql, prepared.values.clone()).await?;
            Ok(StepOutcome::RowCount(count))
        }
    }
}
