//! # Query Builder
//!
//! Fluent construction of the four DML shapes, producing [`QueryFragment`]s
//! with `:name` placeholders.
//!
//! ## Clause Order
//! ```text
//! SELECT:  WITH → SELECT → FROM → JOIN → WHERE → GROUP BY → HAVING
//!          → ORDER BY → LIMIT/OFFSET
//! INSERT:  INSERT INTO → VALUES → ON CONFLICT → RETURNING
//! UPDATE:  UPDATE → SET → WHERE → RETURNING
//! DELETE:  DELETE FROM → USING → WHERE → RETURNING
//! ```
//!
//! ## Safety Rails
//! `build()` fails fast, before any SQL reaches the database, when:
//! - an UPDATE or DELETE has no WHERE clause,
//! - an ON CONFLICT configuration is contradictory or incomplete,
//! - an INSERT has no values,
//! - a `:name` placeholder has no binding.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::fragment::{merge_params, QueryFragment};
use crate::value::{DbValue, RowMap};

// =============================================================================
// Entry Points
// =============================================================================

/// Starts a SELECT over the given column expressions.
pub fn select<I, S>(columns: I) -> SelectBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SelectBuilder {
        with: Vec::new(),
        columns: columns.into_iter().map(Into::into).collect(),
        from: Vec::new(),
        joins: Vec::new(),
        conditions: Vec::new(),
        group_by: Vec::new(),
        having: Vec::new(),
        order_by: Vec::new(),
        limit: None,
        offset: None,
        params: BTreeMap::new(),
    }
}

/// Starts an INSERT into the given table.
pub fn insert_into(table: impl Into<String>) -> InsertBuilder {
    InsertBuilder {
        table: table.into(),
        values: BTreeMap::new(),
        on_conflict: None,
        returning: Vec::new(),
    }
}

/// Starts an UPDATE of the given table.
pub fn update(table: impl Into<String>) -> UpdateBuilder {
    UpdateBuilder {
        table: table.into(),
        assignments: Vec::new(),
        conditions: Vec::new(),
        returning: Vec::new(),
        params: BTreeMap::new(),
    }
}

/// Starts a DELETE from the given table.
pub fn delete_from(table: impl Into<String>) -> DeleteBuilder {
    DeleteBuilder {
        table: table.into(),
        using: Vec::new(),
        conditions: Vec::new(),
        returning: Vec::new(),
        params: BTreeMap::new(),
    }
}

// =============================================================================
// SELECT
// =============================================================================

/// Builder for SELECT statements.
///
/// Methods consume and return the builder; conditions passed to
/// [`SelectBuilder::where_clause`] are ANDed together.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    with: Vec<(String, QueryFragment)>,
    columns: Vec<String>,
    from: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: BTreeMap<String, DbValue>,
}

impl SelectBuilder {
    /// Adds a CTE: `WITH name AS (fragment)`.
    pub fn with(mut self, name: impl Into<String>, fragment: QueryFragment) -> Self {
        self.with.push((name.into(), fragment));
        self
    }

    /// Adds a FROM source (several calls produce a comma list).
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from.push(table.into());
        self
    }

    /// Adds `JOIN table ON condition`.
    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins
            .push(format!("JOIN {} ON {}", table.into(), on.into()));
        self
    }

    /// Adds `LEFT JOIN table ON condition`.
    pub fn left_join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins
            .push(format!("LEFT JOIN {} ON {}", table.into(), on.into()));
        self
    }

    /// Adds a WHERE condition (ANDed with previous conditions).
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having.push(condition.into());
        self
    }

    /// Adds an ORDER BY term, e.g. `order_by("created_at DESC")`.
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Pagination shorthand: 1-based page number and page size.
    pub fn page(self, page: u64, size: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(size);
        self.limit(size).offset(offset)
    }

    /// Binds a named placeholder used by a condition or column expression.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Finalizes the statement.
    pub fn build(self) -> CoreResult<QueryFragment> {
        let mut sql = String::new();
        let mut params = BTreeMap::new();

        if !self.with.is_empty() {
            let ctes: Vec<String> = self
                .with
                .iter()
                .map(|(name, frag)| format!("{name} AS ({})", frag.sql()))
                .collect();
            sql.push_str(&format!("WITH {} ", ctes.join(", ")));
            for (_, frag) in self.with {
                merge_params(&mut params, frag.params().clone())?;
            }
        }

        sql.push_str("SELECT ");
        sql.push_str(&self.columns.join(", "));
        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.join(", "));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        merge_params(&mut params, self.params)?;
        let fragment = QueryFragment::with_params(sql, params);
        fragment.check_bindings()?;
        Ok(fragment)
    }
}

// =============================================================================
// INSERT
// =============================================================================

/// Builder for INSERT statements.
///
/// Column values become `:column` placeholders; the parameter map is derived
/// from the value map, so every placeholder is always bound.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: BTreeMap<String, DbValue>,
    on_conflict: Option<OnConflict>,
    returning: Vec<String>,
}

impl InsertBuilder {
    /// Sets one column value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Merges a whole row map of column values.
    pub fn values(mut self, row: RowMap) -> Self {
        self.values.extend(row);
        self
    }

    /// Configures conflict resolution.
    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    /// Adds RETURNING columns.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Finalizes the statement.
    pub fn build(self) -> CoreResult<QueryFragment> {
        if self.values.is_empty() {
            return Err(CoreError::EmptyInsert { table: self.table });
        }

        let columns: Vec<&str> = self.values.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );

        if let Some(on_conflict) = &self.on_conflict {
            sql.push(' ');
            sql.push_str(&on_conflict.render()?);
        }

        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }

        let fragment = QueryFragment::with_params(sql, self.values);
        fragment.check_bindings()?;
        Ok(fragment)
    }
}

// =============================================================================
// ON CONFLICT
// =============================================================================

/// PostgreSQL `ON CONFLICT` configuration.
///
/// A target (columns or a named constraint) plus an action. `do_nothing`
/// works without a target; `do_update` requires one.
#[derive(Debug, Clone)]
pub struct OnConflict {
    columns: Vec<String>,
    constraint: Option<String>,
    action: Option<ConflictAction>,
}

#[derive(Debug, Clone)]
enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<(String, String)>),
}

impl OnConflict {
    /// Targets one or more conflict columns.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OnConflict {
            columns: columns.into_iter().map(Into::into).collect(),
            constraint: None,
            action: None,
        }
    }

    /// Targets a named constraint.
    pub fn constraint(name: impl Into<String>) -> Self {
        OnConflict {
            columns: Vec::new(),
            constraint: Some(name.into()),
            action: None,
        }
    }

    /// A bare `ON CONFLICT DO NOTHING` with no explicit target.
    pub fn any() -> Self {
        OnConflict {
            columns: Vec::new(),
            constraint: None,
            action: None,
        }
    }

    pub fn do_nothing(mut self) -> Self {
        self.action = Some(ConflictAction::DoNothing);
        self
    }

    /// Adds one `SET column = expr` assignment to a DO UPDATE action.
    ///
    /// The expression is raw SQL; use `excluded.column` to reference the
    /// proposed row.
    pub fn do_update_set(mut self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        let assignment = (column.into(), expr.into());
        match &mut self.action {
            Some(ConflictAction::DoUpdate(assignments)) => assignments.push(assignment),
            _ => self.action = Some(ConflictAction::DoUpdate(vec![assignment])),
        }
        self
    }

    fn render(&self) -> CoreResult<String> {
        if !self.columns.is_empty() && self.constraint.is_some() {
            return Err(CoreError::ConflictingConflictTarget);
        }

        let target = if let Some(constraint) = &self.constraint {
            format!(" ON CONSTRAINT {constraint}")
        } else if !self.columns.is_empty() {
            format!(" ({})", self.columns.join(", "))
        } else {
            String::new()
        };

        match &self.action {
            None => Err(CoreError::MissingConflictAction),
            Some(ConflictAction::DoNothing) => Ok(format!("ON CONFLICT{target} DO NOTHING")),
            Some(ConflictAction::DoUpdate(assignments)) => {
                if target.is_empty() {
                    return Err(CoreError::MissingConflictTarget);
                }
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(col, expr)| format!("{col} = {expr}"))
                    .collect();
                Ok(format!(
                    "ON CONFLICT{target} DO UPDATE SET {}",
                    sets.join(", ")
                ))
            }
        }
    }
}

// =============================================================================
// UPDATE
// =============================================================================

/// Builder for UPDATE statements.
///
/// `build()` refuses to produce an UPDATE without a WHERE clause.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    assignments: Vec<(String, Assignment)>,
    conditions: Vec<String>,
    returning: Vec<String>,
    params: BTreeMap<String, DbValue>,
}

#[derive(Debug, Clone)]
enum Assignment {
    /// `column = :column`, value in the parameter map.
    Value,
    /// `column = <raw expression>`.
    Expr(String),
}

impl UpdateBuilder {
    /// Sets `column = :column` with the given value.
    pub fn set_value(mut self, column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        let column = column.into();
        self.params.insert(column.clone(), value.into());
        self.assignments.push((column, Assignment::Value));
        self
    }

    /// Sets every column in the row map.
    pub fn set_values(mut self, row: RowMap) -> Self {
        for (column, value) in row {
            self = self.set_value(column, value);
        }
        self
    }

    /// Sets `column = expr` with a raw SQL expression, e.g.
    /// `set_expr("revision", "revision + 1")`.
    pub fn set_expr(mut self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.assignments
            .push((column.into(), Assignment::Expr(expr.into())));
        self
    }

    /// Adds a WHERE condition (ANDed with previous conditions).
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Binds a named placeholder used by a condition.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Adds RETURNING columns.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Finalizes the statement. Fails if no WHERE clause was supplied.
    pub fn build(self) -> CoreResult<QueryFragment> {
        if self.conditions.is_empty() {
            return Err(CoreError::MissingWhereClause {
                statement: "UPDATE",
                table: self.table,
            });
        }

        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, assignment)| match assignment {
                Assignment::Value => format!("{column} = :{column}"),
                Assignment::Expr(expr) => format!("{column} = {expr}"),
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        sql.push_str(" WHERE ");
        sql.push_str(&self.conditions.join(" AND "));

        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }

        let fragment = QueryFragment::with_params(sql, self.params);
        fragment.check_bindings()?;
        Ok(fragment)
    }
}

// =============================================================================
// DELETE
// =============================================================================

/// Builder for DELETE statements.
///
/// `build()` refuses to produce a DELETE without a WHERE clause.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    using: Vec<String>,
    conditions: Vec<String>,
    returning: Vec<String>,
    params: BTreeMap<String, DbValue>,
}

impl DeleteBuilder {
    /// Adds a USING source.
    pub fn using(mut self, table: impl Into<String>) -> Self {
        self.using.push(table.into());
        self
    }

    /// Adds a WHERE condition (ANDed with previous conditions).
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Binds a named placeholder used by a condition.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Adds RETURNING columns.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Finalizes the statement. Fails if no WHERE clause was supplied.
    pub fn build(self) -> CoreResult<QueryFragment> {
        if self.conditions.is_empty() {
            return Err(CoreError::MissingWhereClause {
                statement: "DELETE",
                table: self.table,
            });
        }

        let mut sql = format!("DELETE FROM {}", self.table);
        if !self.using.is_empty() {
            sql.push_str(" USING ");
            sql.push_str(&self.using.join(", "));
        }
        sql.push_str(" WHERE ");
        sql.push_str(&self.conditions.join(" AND "));

        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }

        let fragment = QueryFragment::with_params(sql, self.params);
        fragment.check_bindings()?;
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn select_clause_order() {
        let frag = select(["kind", "count(*) AS total"])
            .from("titles")
            .where_clause("status = :status")
            .group_by("kind")
            .having("count(*) > :min")
            .order_by("total DESC")
            .limit(10)
            .offset(20)
            .bind("status", "active")
            .bind("min", 2i64)
            .build()
            .unwrap();

        assert_eq!(
            norm(frag.sql()),
            "SELECT kind, count(*) AS total FROM titles \
             WHERE status = :status GROUP BY kind HAVING count(*) > :min \
             ORDER BY total DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn select_with_cte_and_join() {
        let recent = select(["id"])
            .from("activity_log")
            .where_clause("occurred_at > :cutoff")
            .bind("cutoff", "2026-01-01")
            .build()
            .unwrap();

        let frag = select(["t.id", "t.name"])
            .with("recent", recent)
            .from("titles t")
            .join("publications p", "p.title_id = t.id")
            .where_clause("t.id IN (SELECT id FROM recent)")
            .build()
            .unwrap();

        assert_eq!(
            norm(frag.sql()),
            "WITH recent AS (SELECT id FROM activity_log WHERE occurred_at > :cutoff) \
             SELECT t.id, t.name FROM titles t JOIN publications p ON p.title_id = t.id \
             WHERE t.id IN (SELECT id FROM recent)"
        );
        assert!(frag.params().contains_key("cutoff"));
    }

    #[test]
    fn page_is_one_based() {
        let frag = select(["id"]).from("titles").page(3, 25).build().unwrap();
        assert!(frag.sql().ends_with("LIMIT 25 OFFSET 50"));

        let first = select(["id"]).from("titles").page(1, 25).build().unwrap();
        assert!(first.sql().ends_with("LIMIT 25 OFFSET 0"));
    }

    #[test]
    fn select_with_unbound_placeholder_fails() {
        let err = select(["id"])
            .from("titles")
            .where_clause("kind = :kind")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingParameter { name, .. } if name == "kind"));
    }

    #[test]
    fn insert_generates_placeholders_per_column() {
        let frag = insert_into("titles")
            .value("id", "abc")
            .value("name", "Dune")
            .returning(["id"])
            .build()
            .unwrap();
        assert_eq!(
            norm(frag.sql()),
            "INSERT INTO titles (id, name) VALUES (:id, :name) RETURNING id"
        );
        assert_eq!(frag.params().len(), 2);
    }

    #[test]
    fn empty_insert_fails() {
        let err = insert_into("titles").build().unwrap_err();
        assert!(matches!(err, CoreError::EmptyInsert { table } if table == "titles"));
    }

    #[test]
    fn insert_on_conflict_do_update() {
        let frag = insert_into("titles")
            .value("id", "abc")
            .value("name", "Dune")
            .on_conflict(
                OnConflict::columns(["id"])
                    .do_update_set("name", "excluded.name")
                    .do_update_set("updated_at", "now()"),
            )
            .build()
            .unwrap();
        assert_eq!(
            norm(frag.sql()),
            "INSERT INTO titles (id, name) VALUES (:id, :name) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, updated_at = now()"
        );
    }

    #[test]
    fn insert_on_conflict_constraint_do_nothing() {
        let frag = insert_into("publications")
            .value("isbn", "978-0441013593")
            .on_conflict(OnConflict::constraint("publications_isbn_key").do_nothing())
            .build()
            .unwrap();
        assert!(frag
            .sql()
            .contains("ON CONFLICT ON CONSTRAINT publications_isbn_key DO NOTHING"));
    }

    #[test]
    fn on_conflict_rejects_double_target() {
        let err = insert_into("titles")
            .value("id", "abc")
            .on_conflict(OnConflict {
                columns: vec!["id".to_string()],
                constraint: Some("titles_pkey".to_string()),
                action: Some(ConflictAction::DoNothing),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictingConflictTarget));
    }

    #[test]
    fn on_conflict_requires_action() {
        let err = insert_into("titles")
            .value("id", "abc")
            .on_conflict(OnConflict::columns(["id"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingConflictAction));
    }

    #[test]
    fn on_conflict_do_update_requires_target() {
        let err = insert_into("titles")
            .value("id", "abc")
            .on_conflict(OnConflict::any().do_update_set("name", "excluded.name"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingConflictTarget));
    }

    #[test]
    fn update_without_where_fails_fast() {
        let err = update("titles")
            .set_value("status", "completed")
            .build()
            .unwrap_err();
        assert!(matches!(
            &err,
            CoreError::MissingWhereClause { statement: "UPDATE", table } if table == "titles"
        ));
        assert!(err.to_string().contains("WHERE"));
    }

    #[test]
    fn update_renders_set_and_where() {
        let frag = update("titles")
            .set_value("status", "completed")
            .set_expr("updated_at", "now()")
            .where_clause("id = :id")
            .bind("id", "abc")
            .returning(["id", "status"])
            .build()
            .unwrap();
        assert_eq!(
            norm(frag.sql()),
            "UPDATE titles SET status = :status, updated_at = now() \
             WHERE id = :id RETURNING id, status"
        );
    }

    #[test]
    fn delete_without_where_fails_fast() {
        let err = delete_from("titles").build().unwrap_err();
        assert!(matches!(
            &err,
            CoreError::MissingWhereClause { statement: "DELETE", table } if table == "titles"
        ));
    }

    #[test]
    fn delete_with_using() {
        let frag = delete_from("publications")
            .using("titles")
            .where_clause("publications.title_id = titles.id")
            .where_clause("titles.kind = :kind")
            .bind("kind", "manga")
            .build()
            .unwrap();
        assert_eq!(
            norm(frag.sql()),
            "DELETE FROM publications USING titles \
             WHERE publications.title_id = titles.id AND titles.kind = :kind"
        );
    }
}
