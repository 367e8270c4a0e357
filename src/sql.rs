//! Statement rendering for a planned query.
//!
//! Renders a [`QueryPlan`] into one parameterized statement plus its bound
//! parameters, in text order. Every participating entity's columns are
//! selected namespaced as `"<entity>__<field>"` so the materializer can slice
//! the flat row stream back apart. Placeholders are emitted with a running
//! index, so no renumbering pass is needed for numbered-placeholder dialects.

use std::fmt::Write;

use crate::dialect::{Dialect, RANK_COLUMN};
use crate::plan::{BoundCondition, BoundValue, PlannedJoin, QueryPlan};
use crate::value::SqlValue;

/// Separator between the entity namespace and the field in output columns.
pub const COLUMN_SEPARATOR: &str = "__";

/// Renders the plan into `(statement, parameters)`.
pub fn render(plan: &QueryPlan<'_>) -> (String, Vec<SqlValue>) {
    let mut sql = String::with_capacity(256);
    let mut params: Vec<SqlValue> = Vec::new();
    let dialect = plan.dialect;

    // SELECT: primary columns first, then each join branch in resolution order.
    sql.push_str("SELECT ");
    write_entity_columns(&mut sql, &plan.primary_alias, &plan.primary.key(), plan.primary.fields.keys(), true);
    for join in &plan.joins {
        write_entity_columns(&mut sql, &join.alias, &join.schema.key(), join.schema.fields.keys(), false);
    }

    // FROM
    sql.push_str(" FROM \"");
    sql.push_str(&plan.primary.table_name);
    sql.push_str("\" AS \"");
    sql.push_str(&plan.primary_alias);
    sql.push('"');

    // Join branches
    for join in &plan.joins {
        write_join(&mut sql, &mut params, dialect, join);
    }

    // WHERE: primary conditions only, implicit AND.
    if !plan.primary_conditions.is_empty() {
        sql.push_str(" WHERE ");
        write_conditions(
            &mut sql,
            &mut params,
            0,
            dialect,
            &plan.primary_alias,
            &plan.primary_conditions,
        );
    }

    // Stable row order so streaming deduplication is deterministic.
    sql.push_str(" ORDER BY ");
    write_qualified_column(&mut sql, &plan.primary_alias, &plan.primary.identifier_field);
    for join in &plan.joins {
        sql.push_str(", ");
        write_qualified_column(&mut sql, &join.alias, &join.schema.identifier_field);
    }

    let sql = dialect.cap_rows(sql, plan.row_cap);
    (sql, params)
}

/// Writes one join branch: a plain outer join, or a ranked derived table when
/// the branch carries a per-entity cap.
fn write_join(sql: &mut String, params: &mut Vec<SqlValue>, dialect: Dialect, join: &PlannedJoin<'_>) {
    let ranked = join.cap.and_then(|_| {
        // Conditions are rendered into the subquery's own buffer; the base
        // offset keeps numbered placeholders aligned with the full statement.
        let mut where_sql = String::new();
        let mut where_params = Vec::new();
        if !join.conditions.is_empty() {
            write_conditions(
                &mut where_sql,
                &mut where_params,
                params.len(),
                dialect,
                &join.alias,
                &join.conditions,
            );
        }
        dialect
            .ranked_subquery(
                &join.schema.table_name,
                &join.alias,
                &join.child_key,
                join.schema.default_order_by.as_deref(),
                &where_sql,
            )
            .map(|subquery| (subquery, where_params))
    });

    match (join.cap, ranked) {
        (Some(cap), Some((subquery, where_params))) => {
            sql.push_str(" LEFT JOIN (");
            sql.push_str(&subquery);
            params.extend(where_params);
            sql.push_str(") AS \"");
            sql.push_str(&join.alias);
            sql.push_str("\" ON ");
            write_join_key(sql, join);
            let _ = write!(sql, " AND \"{}\".\"{RANK_COLUMN}\" <= {cap}", join.alias);
        }
        _ => {
            // Conditions belong in the join predicate, not WHERE: putting them
            // in WHERE would turn the outer join into an inner join and drop
            // primary rows with zero matches.
            sql.push_str(" LEFT JOIN \"");
            sql.push_str(&join.schema.table_name);
            sql.push_str("\" AS \"");
            sql.push_str(&join.alias);
            sql.push_str("\" ON ");
            write_join_key(sql, join);
            if !join.conditions.is_empty() {
                sql.push_str(" AND ");
                write_conditions(sql, params, 0, dialect, &join.alias, &join.conditions);
            }
        }
    }
}

fn write_join_key(sql: &mut String, join: &PlannedJoin<'_>) {
    write_qualified_column(sql, &join.alias, &join.child_key);
    sql.push_str(" = ");
    write_qualified_column(sql, &join.parent_alias, &join.parent_key);
}

/// Writes `"alias"."field" AS "entity__field"` for every declared field.
fn write_entity_columns<'a>(
    sql: &mut String,
    alias: &str,
    entity_key: &str,
    fields: impl Iterator<Item = &'a String>,
    first: bool,
) {
    let mut first = first;
    for field in fields {
        if !first {
            sql.push_str(", ");
        }
        first = false;
        write_qualified_column(sql, alias, field);
        sql.push_str(" AS \"");
        sql.push_str(entity_key);
        sql.push_str(COLUMN_SEPARATOR);
        sql.push_str(field);
        sql.push('"');
    }
}

/// Writes AND-joined conditions, pushing parameters in text order. `base` is
/// the count of parameters already bound ahead of this buffer in the full
/// statement, so numbered placeholders stay aligned.
fn write_conditions(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    base: usize,
    dialect: Dialect,
    alias: &str,
    conditions: &[BoundCondition],
) {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        match &condition.value {
            BoundValue::One(value) => {
                write_qualified_column(sql, alias, &condition.field);
                sql.push(' ');
                sql.push_str(condition.op.as_sql());
                sql.push(' ');
                write_placeholder(sql, params, base, dialect, value.clone());
            }
            BoundValue::Many(values) if values.is_empty() => {
                // IN () matches nothing; NOT IN () excludes nothing.
                sql.push_str(match condition.op {
                    crate::filter::CompareOp::NotIn => "1 = 1",
                    _ => "1 = 0",
                });
            }
            BoundValue::Many(values) => {
                write_qualified_column(sql, alias, &condition.field);
                sql.push(' ');
                sql.push_str(condition.op.as_sql());
                sql.push_str(" (");
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        sql.push_str(", ");
                    }
                    write_placeholder(sql, params, base, dialect, value.clone());
                }
                sql.push(')');
            }
        }
    }
}

fn write_placeholder(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    base: usize,
    dialect: Dialect,
    value: SqlValue,
) {
    params.push(value);
    sql.push_str(&dialect.placeholder(base + params.len()));
}

fn write_qualified_column(sql: &mut String, alias: &str, column: &str) {
    sql.push('"');
    sql.push_str(alias);
    sql.push_str("\".\"");
    sql.push_str(column);
    sql.push('"');
}
