//! SQL dialect hooks the planner depends on.
//!
//! The concrete dialect differences — placeholder style, row capping, and
//! whether/how a ranking-window subquery is expressed — are confined here.

use std::borrow::Cow;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    SQLite,
    PostgreSQL,
}

/// Rank column emitted by [`Dialect::ranked_subquery`].
pub const RANK_COLUMN: &str = "__rank";

impl Dialect {
    /// Renders a placeholder with the given 1-based index.
    ///
    /// Returns `Cow::Borrowed("?")` for SQLite (zero allocation),
    /// `Cow::Owned` for PostgreSQL numbered placeholders.
    pub fn placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::SQLite => Cow::Borrowed("?"),
            Dialect::PostgreSQL => Cow::Owned(format!("${index}")),
        }
    }

    /// Caps the total joined row count of a finished statement.
    pub fn cap_rows(&self, mut sql: String, n: u32) -> String {
        match self {
            Dialect::SQLite | Dialect::PostgreSQL => {
                let _ = write!(sql, " LIMIT {n}");
                sql
            }
        }
    }

    /// Whether this dialect can express a ranking-window subquery at all.
    pub fn supports_ranking(&self) -> bool {
        match self {
            Dialect::SQLite | Dialect::PostgreSQL => true,
        }
    }

    /// Derived table ranking each row of `table` within partitions of
    /// `partition_key`, as a `__rank` column. `where_sql` is applied before
    /// ranking. Returns `None` when the dialect cannot express a ranking
    /// window; the planner then degrades to an unbounded join.
    ///
    /// Without an order expression the rank is database-default and
    /// non-deterministic.
    pub fn ranked_subquery(
        &self,
        table: &str,
        alias: &str,
        partition_key: &str,
        order_by: Option<&str>,
        where_sql: &str,
    ) -> Option<String> {
        match self {
            Dialect::SQLite | Dialect::PostgreSQL => {
                let mut sql = String::with_capacity(128);
                let _ = write!(
                    sql,
                    "SELECT \"{alias}\".*, ROW_NUMBER() OVER (PARTITION BY \"{alias}\".\"{partition_key}\""
                );
                if let Some(order) = order_by {
                    let _ = write!(sql, " ORDER BY {order}");
                }
                let _ = write!(sql, ") AS \"{RANK_COLUMN}\" FROM \"{table}\" AS \"{alias}\"");
                if !where_sql.is_empty() {
                    let _ = write!(sql, " WHERE {where_sql}");
                }
                Some(sql)
            }
        }
    }
}
