//! # Transaction Plans
//!
//! An ordered list of dependent steps executed inside one database
//! transaction, where a later step can consume a value produced by an
//! earlier step without the caller knowing the value ahead of time.
//!
//! ## The Canonical Two-Step Plan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  let mut plan = TransactionPlan::new();                         │
//! │                                                                 │
//! │  step 0: INSERT INTO titles (...) RETURNING id                  │
//! │     └── let title = plan.add(step0)   → StepHandle              │
//! │                                                                 │
//! │  step 1: INSERT INTO publications (title_id, ...)               │
//! │     └── .param("title_id", title.field())                       │
//! │                └── deferred: "the id step 0 will produce"       │
//! │                                                                 │
//! │  execute: BEGIN → step 0 → capture id → substitute into         │
//! │           step 1 params → step 1 → COMMIT                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`PlanExecution`] is the pure state machine behind execution: it hands
//! out prepared steps strictly in append order, resolving deferred values
//! against the outcomes captured so far. The database driver lives in
//! `medialog-db`; nothing here touches a connection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CoreError, CoreResult};
use crate::fragment::QueryFragment;
use crate::value::{DbValue, RowMap};

/// Handle ids are process-unique so a handle can never resolve against
/// a different plan's results, even by accident.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Step Handle
// =============================================================================

/// An opaque token for "the future result of a step".
///
/// Minted by [`TransactionPlan::add`]; valid only for values consumed by
/// steps added to the same plan afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepHandle {
    id: u64,
}

impl StepHandle {
    fn mint() -> Self {
        StepHandle {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The sole field of the step's result (row 0, single column or scalar).
    pub fn field(self) -> TxValue {
        TxValue::Field {
            handle: self,
            row: 0,
            column: None,
        }
    }

    /// A named field of the step's first result row.
    pub fn field_named(self, column: impl Into<String>) -> TxValue {
        TxValue::Field {
            handle: self,
            row: 0,
            column: Some(column.into()),
        }
    }

    /// A named field at an explicit row index.
    pub fn field_at(self, row: usize, column: impl Into<String>) -> TxValue {
        TxValue::Field {
            handle: self,
            row,
            column: Some(column.into()),
        }
    }

    /// The sole column of the step's result, materialized as an array.
    pub fn column(self) -> TxValue {
        TxValue::Column {
            handle: self,
            column: None,
        }
    }

    /// A named column of the step's result, materialized as an array.
    pub fn column_named(self, column: impl Into<String>) -> TxValue {
        TxValue::Column {
            handle: self,
            column: Some(column.into()),
        }
    }

    /// A whole result row; when resolved it is spliced into the consuming
    /// step's parameter map.
    pub fn row(self, index: usize) -> TxValue {
        TxValue::Row {
            handle: self,
            index,
        }
    }
}

// =============================================================================
// Transaction Values
// =============================================================================

/// A step parameter: either a literal value or a deferred reference to an
/// earlier step's result, resolved just-in-time at execution.
#[derive(Debug, Clone)]
pub enum TxValue {
    Literal(DbValue),
    Field {
        handle: StepHandle,
        row: usize,
        column: Option<String>,
    },
    Column {
        handle: StepHandle,
        column: Option<String>,
    },
    Row {
        handle: StepHandle,
        index: usize,
    },
}

impl TxValue {
    pub fn literal(value: impl Into<DbValue>) -> Self {
        TxValue::Literal(value.into())
    }
}

impl From<DbValue> for TxValue {
    fn from(value: DbValue) -> Self {
        TxValue::Literal(value)
    }
}

// =============================================================================
// Steps
// =============================================================================

/// The declared result shape of a step, checked at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepShape {
    /// All result rows.
    Rows,
    /// Exactly one row (zero rows is a step failure).
    Row,
    /// A single scalar (first column of the first row).
    Scalar,
    /// The affected-row count of a write.
    RowCount,
}

/// One read or write operation inside a plan.
///
/// Owns its SQL text, its parameter map (literals and deferred values),
/// and its declared result shape.
#[derive(Debug, Clone)]
pub struct TransactionStep {
    sql: String,
    params: BTreeMap<String, TxValue>,
    shape: StepShape,
}

impl TransactionStep {
    fn from_fragment(fragment: QueryFragment, shape: StepShape) -> Self {
        let sql = fragment.sql().to_string();
        let params = fragment
            .params()
            .iter()
            .map(|(name, value)| (name.clone(), TxValue::Literal(value.clone())))
            .collect();
        TransactionStep { sql, params, shape }
    }

    /// A step producing all result rows.
    pub fn query(fragment: QueryFragment) -> Self {
        Self::from_fragment(fragment, StepShape::Rows)
    }

    /// A step producing exactly one row.
    pub fn query_row(fragment: QueryFragment) -> Self {
        Self::from_fragment(fragment, StepShape::Row)
    }

    /// A step producing a single scalar (e.g. `INSERT .. RETURNING id`).
    pub fn query_field(fragment: QueryFragment) -> Self {
        Self::from_fragment(fragment, StepShape::Scalar)
    }

    /// A step producing an affected-row count.
    pub fn execute(fragment: QueryFragment) -> Self {
        Self::from_fragment(fragment, StepShape::RowCount)
    }

    /// Sets one parameter, replacing any literal the fragment carried.
    ///
    /// This is how deferred values enter a step:
    /// `.param("title_id", handle.field())`.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<TxValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn shape(&self) -> StepShape {
        self.shape
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

// =============================================================================
// Plan
// =============================================================================

/// An ordered, append-only list of transaction steps.
#[derive(Debug, Default)]
pub struct TransactionPlan {
    steps: Vec<(StepHandle, TransactionStep)>,
}

impl TransactionPlan {
    pub fn new() -> Self {
        TransactionPlan { steps: Vec::new() }
    }

    /// Appends a step and mints its handle.
    ///
    /// Nothing executes until the plan is handed to the executor; the
    /// handle is only useful for steps added after this one.
    pub fn add(&mut self, step: TransactionStep) -> StepHandle {
        let handle = StepHandle::mint();
        self.steps.push((handle, step));
        handle
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// =============================================================================
// Step Outcomes
// =============================================================================

/// The captured raw result of an executed step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Rows(Vec<RowMap>),
    Scalar(DbValue),
    RowCount(u64),
}

// =============================================================================
// Execution State Machine
// =============================================================================

/// A step with every deferred value resolved, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedStep {
    pub index: usize,
    pub handle: StepHandle,
    pub shape: StepShape,
    /// Positional (`$n`) SQL.
    pub sql: String,
    /// Bind values in positional order.
    pub values: Vec<DbValue>,
}

/// Pure execution state machine for one plan.
///
/// The driver loop in `medialog-db` is:
/// ```text
/// while let Some(prepared) = exec.next_step()? {
///     let outcome = run(prepared)?;        // driver work
///     exec.complete_step(outcome)?;
/// }
/// let results = exec.into_results();
/// ```
/// Steps are handed out strictly in append order; `next_step` resolves the
/// current step's deferred values against outcomes captured so far and
/// fails with a step-indexed dependency error if a reference cannot be
/// satisfied.
#[derive(Debug)]
pub struct PlanExecution {
    steps: Vec<(StepHandle, TransactionStep)>,
    cursor: usize,
    outcomes: HashMap<StepHandle, StepOutcome>,
}

impl PlanExecution {
    pub fn new(plan: TransactionPlan) -> Self {
        PlanExecution {
            steps: plan.steps,
            cursor: 0,
            outcomes: HashMap::new(),
        }
    }

    /// Prepares the next step, or `None` when the plan is exhausted.
    ///
    /// Calling this again before [`PlanExecution::complete_step`] prepares
    /// the same step again.
    pub fn next_step(&mut self) -> CoreResult<Option<PreparedStep>> {
        let Some((handle, step)) = self.steps.get(self.cursor) else {
            return Ok(None);
        };

        let resolved = self.resolve_params(self.cursor, &step.params)?;
        let fragment = QueryFragment::with_params(step.sql.clone(), resolved);
        let (sql, values) = fragment.to_positional()?;

        Ok(Some(PreparedStep {
            index: self.cursor,
            handle: *handle,
            shape: step.shape,
            sql,
            values,
        }))
    }

    /// Captures the outcome of the current step and advances.
    pub fn complete_step(&mut self, outcome: StepOutcome) -> CoreResult<()> {
        let Some((handle, _)) = self.steps.get(self.cursor) else {
            return Err(CoreError::step_dependency(
                self.cursor,
                "complete_step called with no step in flight",
            ));
        };
        self.outcomes.insert(*handle, outcome);
        self.cursor += 1;
        Ok(())
    }

    /// True once every step has completed.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Consumes the execution, keeping the captured outcomes.
    pub fn into_results(self) -> PlanResults {
        PlanResults {
            outcomes: self.outcomes,
        }
    }

    /// Resolves a step's parameter map: literals pass through, deferred
    /// values are looked up in captured outcomes, and row references are
    /// spliced wholesale into the map.
    fn resolve_params(
        &self,
        step_index: usize,
        params: &BTreeMap<String, TxValue>,
    ) -> CoreResult<RowMap> {
        let mut resolved = RowMap::new();

        fn insert_checked(map: &mut RowMap, name: String, value: DbValue) -> CoreResult<()> {
            match map.get(&name) {
                Some(existing) if *existing != value => {
                    Err(CoreError::DuplicateParameter { name })
                }
                _ => {
                    map.insert(name, value);
                    Ok(())
                }
            }
        }

        for (name, value) in params {
            match value {
                TxValue::Literal(v) => {
                    insert_checked(&mut resolved, name.clone(), v.clone())?;
                }
                TxValue::Field {
                    handle,
                    row,
                    column,
                } => {
                    let outcome = self.outcome_for(step_index, *handle)?;
                    let v = resolve_field(step_index, outcome, *row, column.as_deref())?;
                    insert_checked(&mut resolved, name.clone(), v)?;
                }
                TxValue::Column { handle, column } => {
                    let outcome = self.outcome_for(step_index, *handle)?;
                    let v = resolve_column(step_index, outcome, column.as_deref())?;
                    insert_checked(&mut resolved, name.clone(), v)?;
                }
                TxValue::Row { handle, index } => {
                    let outcome = self.outcome_for(step_index, *handle)?;
                    let row = resolve_row(step_index, outcome, *index)?;
                    for (column, v) in row {
                        insert_checked(&mut resolved, column, v)?;
                    }
                }
            }
        }

        Ok(resolved)
    }

    fn outcome_for(&self, step_index: usize, handle: StepHandle) -> CoreResult<&StepOutcome> {
        self.outcomes.get(&handle).ok_or_else(|| {
            CoreError::step_dependency(
                step_index,
                format!("no captured result for handle {}", handle.id),
            )
        })
    }
}

fn resolve_field(
    step_index: usize,
    outcome: &StepOutcome,
    row: usize,
    column: Option<&str>,
) -> CoreResult<DbValue> {
    match outcome {
        StepOutcome::Scalar(v) => {
            if row == 0 && column.is_none() {
                Ok(v.clone())
            } else {
                Err(CoreError::step_dependency(
                    step_index,
                    "referenced step produced a scalar; row/column addressing does not apply",
                ))
            }
        }
        StepOutcome::RowCount(n) => {
            if row == 0 && column.is_none() {
                Ok(DbValue::Int(*n as i64))
            } else {
                Err(CoreError::step_dependency(
                    step_index,
                    "referenced step produced a row count; row/column addressing does not apply",
                ))
            }
        }
        StepOutcome::Rows(rows) => {
            let row_map = rows.get(row).ok_or_else(|| {
                CoreError::step_dependency(
                    step_index,
                    format!("referenced step has no row {row} ({} rows)", rows.len()),
                )
            })?;
            match column {
                Some(column) => row_map.get(column).cloned().ok_or_else(|| {
                    CoreError::step_dependency(
                        step_index,
                        format!("referenced row has no column '{column}'"),
                    )
                }),
                None => single_column_value(step_index, row_map),
            }
        }
    }
}

fn resolve_column(
    step_index: usize,
    outcome: &StepOutcome,
    column: Option<&str>,
) -> CoreResult<DbValue> {
    let StepOutcome::Rows(rows) = outcome else {
        return Err(CoreError::step_dependency(
            step_index,
            "column reference requires a row-producing step",
        ));
    };
    let mut values = Vec::with_capacity(rows.len());
    for row_map in rows {
        let v = match column {
            Some(column) => row_map.get(column).cloned().ok_or_else(|| {
                CoreError::step_dependency(
                    step_index,
                    format!("referenced rows have no column '{column}'"),
                )
            })?,
            None => single_column_value(step_index, row_map)?,
        };
        values.push(v);
    }
    Ok(DbValue::Array(values))
}

fn resolve_row(step_index: usize, outcome: &StepOutcome, index: usize) -> CoreResult<RowMap> {
    let StepOutcome::Rows(rows) = outcome else {
        return Err(CoreError::step_dependency(
            step_index,
            "row reference requires a row-producing step",
        ));
    };
    rows.get(index).cloned().ok_or_else(|| {
        CoreError::step_dependency(
            step_index,
            format!("referenced step has no row {index} ({} rows)", rows.len()),
        )
    })
}

fn single_column_value(step_index: usize, row_map: &RowMap) -> CoreResult<DbValue> {
    let mut iter = row_map.values();
    match (iter.next(), iter.next()) {
        (Some(v), None) => Ok(v.clone()),
        _ => Err(CoreError::step_dependency(
            step_index,
            format!(
                "column name required: referenced row has {} columns",
                row_map.len()
            ),
        )),
    }
}

// =============================================================================
// Results
// =============================================================================

/// Captured step outcomes, addressable by handle after execution.
#[derive(Debug)]
pub struct PlanResults {
    outcomes: HashMap<StepHandle, StepOutcome>,
}

impl PlanResults {
    pub fn outcome(&self, handle: StepHandle) -> Option<&StepOutcome> {
        self.outcomes.get(&handle)
    }

    /// The rows captured for a row-producing step.
    pub fn rows(&self, handle: StepHandle) -> Option<&[RowMap]> {
        match self.outcomes.get(&handle) {
            Some(StepOutcome::Rows(rows)) => Some(rows),
            _ => None,
        }
    }

    /// The scalar captured for a field-producing step.
    pub fn scalar(&self, handle: StepHandle) -> Option<&DbValue> {
        match self.outcomes.get(&handle) {
            Some(StepOutcome::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// The affected-row count captured for a write step.
    pub fn row_count(&self, handle: StepHandle) -> Option<u64> {
        match self.outcomes.get(&handle) {
            Some(StepOutcome::RowCount(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{insert_into, select};
    use uuid::Uuid;

    fn drive(
        mut exec: PlanExecution,
        mut runner: impl FnMut(&PreparedStep) -> StepOutcome,
    ) -> (Vec<PreparedStep>, PlanResults) {
        let mut prepared_steps = Vec::new();
        while let Some(prepared) = exec.next_step().unwrap() {
            let outcome = runner(&prepared);
            prepared_steps.push(prepared);
            exec.complete_step(outcome).unwrap();
        }
        (prepared_steps, exec.into_results())
    }

    #[test]
    fn handles_are_unique_across_plans() {
        let mut a = TransactionPlan::new();
        let mut b = TransactionPlan::new();
        let step = || {
            TransactionStep::execute(
                insert_into("titles").value("name", "x").build().unwrap(),
            )
        };
        let ha = a.add(step());
        let hb = b.add(step());
        assert_ne!(ha, hb);
    }

    #[test]
    fn later_step_consumes_earlier_generated_id() {
        let title_id = Uuid::new_v4();

        let mut plan = TransactionPlan::new();
        let title = plan.add(TransactionStep::query_field(
            insert_into("titles")
                .value("name", "Dune")
                .returning(["id"])
                .build()
                .unwrap(),
        ));
        plan.add(
            TransactionStep::execute(
                insert_into("publications")
                    .value("publisher", "Ace")
                    .value("title_id", DbValue::Null)
                    .build()
                    .unwrap(),
            )
            .param("title_id", title.field()),
        );

        let (steps, _) = drive(PlanExecution::new(plan), |prepared| match prepared.index {
            0 => StepOutcome::Scalar(DbValue::Uuid(title_id)),
            _ => StepOutcome::RowCount(1),
        });

        // Step 1's positional values must contain the id produced by step 0.
        assert_eq!(steps.len(), 2);
        assert!(steps[1].values.contains(&DbValue::Uuid(title_id)));
    }

    #[test]
    fn foreign_handle_is_a_dependency_error() {
        let mut other = TransactionPlan::new();
        let foreign = other.add(TransactionStep::query_field(
            insert_into("titles").value("name", "x").returning(["id"]).build().unwrap(),
        ));

        let mut plan = TransactionPlan::new();
        plan.add(
            TransactionStep::execute(
                insert_into("publications")
                    .value("title_id", DbValue::Null)
                    .build()
                    .unwrap(),
            )
            .param("title_id", foreign.field()),
        );

        let mut exec = PlanExecution::new(plan);
        let err = exec.next_step().unwrap_err();
        assert!(matches!(err, CoreError::StepDependency { step: 0, .. }));
    }

    #[test]
    fn column_reference_materializes_array() {
        let mut plan = TransactionPlan::new();
        let ids = plan.add(TransactionStep::query(
            select(["id"]).from("publications").build().unwrap(),
        ));
        plan.add(
            TransactionStep::execute(
                QueryFragment::new("DELETE FROM activity_log WHERE publication_id = ANY(:ids)")
                    .bind("ids", DbValue::Null)
                    .unwrap(),
            )
            .param("ids", ids.column()),
        );

        let (steps, _) = drive(PlanExecution::new(plan), |prepared| match prepared.index {
            0 => StepOutcome::Rows(vec![
                RowMap::from([("id".to_string(), DbValue::Int(1))]),
                RowMap::from([("id".to_string(), DbValue::Int(2))]),
            ]),
            _ => StepOutcome::RowCount(2),
        });

        assert_eq!(
            steps[1].values,
            vec![DbValue::Array(vec![DbValue::Int(1), DbValue::Int(2)])]
        );
    }

    #[test]
    fn row_reference_splices_into_params() {
        let mut plan = TransactionPlan::new();
        let original = plan.add(TransactionStep::query(
            select(["name", "kind"])
                .from("titles")
                .where_clause("id = :id")
                .bind("id", 7i64)
                .build()
                .unwrap(),
        ));
        plan.add(
            TransactionStep::execute(
                QueryFragment::new(
                    "INSERT INTO titles (name, kind) VALUES (:name, :kind)",
                ),
            )
            .param("copy", original.row(0)),
        );

        let (steps, _) = drive(PlanExecution::new(plan), |prepared| match prepared.index {
            0 => StepOutcome::Rows(vec![RowMap::from([
                ("name".to_string(), DbValue::Text("Dune".to_string())),
                ("kind".to_string(), DbValue::Text("book".to_string())),
            ])]),
            _ => StepOutcome::RowCount(1),
        });

        // Spliced row covered both placeholders.
        assert_eq!(steps[1].values.len(), 2);
        assert!(steps[1].values.contains(&DbValue::Text("Dune".to_string())));
    }

    #[test]
    fn missing_column_in_reference_is_a_dependency_error() {
        let mut plan = TransactionPlan::new();
        let first = plan.add(TransactionStep::query(
            select(["id"]).from("titles").build().unwrap(),
        ));
        plan.add(
            TransactionStep::execute(QueryFragment::new(
                "UPDATE titles SET rating = :rating WHERE id = 1",
            ))
            .param("rating", first.field_named("rating")),
        );

        let mut exec = PlanExecution::new(plan);
        let step0 = exec.next_step().unwrap().unwrap();
        assert_eq!(step0.index, 0);
        exec.complete_step(StepOutcome::Rows(vec![RowMap::from([(
            "id".to_string(),
            DbValue::Int(1),
        )])]))
        .unwrap();

        let err = exec.next_step().unwrap_err();
        assert!(matches!(err, CoreError::StepDependency { step: 1, .. }));
    }

    #[test]
    fn results_are_addressable_by_handle() {
        let mut plan = TransactionPlan::new();
        let counted = plan.add(TransactionStep::execute(
            QueryFragment::new("DELETE FROM activity_log WHERE id = 1"),
        ));
        let (_, results) = drive(PlanExecution::new(plan), |_| StepOutcome::RowCount(3));
        assert_eq!(results.row_count(counted), Some(3));
        assert!(results.rows(counted).is_none());
    }
}
