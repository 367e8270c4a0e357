//! Reconstruction of the flat row stream into per-entity collections.
//!
//! A query with related entities legitimately repeats the primary entity's
//! columns across fan-out rows; only one copy is kept. Each related entity
//! keeps an ordered, identifier-keyed seen set so fan-out never duplicates
//! records, and an all-null column slice (an outer-join branch with no match)
//! is skipped without being marked seen.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::Error;
use crate::plan::QueryPlan;
use crate::sql::COLUMN_SEPARATOR;
use crate::value::SqlValue;

/// The flat, ordered row stream produced by executing the statement.
#[derive(Debug, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The result document. All failures cross the engine boundary through this
/// shape rather than an error type; callers must check `success`.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: JsonMap,
    pub counts: BTreeMap<String, usize>,
}

impl QueryResult {
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: JsonMap::new(),
            counts: BTreeMap::new(),
        }
    }
}

/// Column slice of one entity inside the flat row: pairs of (field, index).
struct EntitySlice {
    key: String,
    identifier: String,
    columns: Vec<(String, usize)>,
}

impl EntitySlice {
    fn new(entity_key: String, identifier: &str, fields: impl Iterator<Item = String>, columns: &[String]) -> Self {
        let prefix = format!("{entity_key}{COLUMN_SEPARATOR}");
        let slice = fields
            .filter_map(|field| {
                let name = format!("{prefix}{field}");
                columns.iter().position(|c| *c == name).map(|idx| (field, idx))
            })
            .collect();
        Self {
            key: entity_key,
            identifier: identifier.to_string(),
            columns: slice,
        }
    }

    fn extract(&self, row: &[SqlValue]) -> JsonMap {
        let mut record = JsonMap::new();
        for (field, idx) in &self.columns {
            record.insert(field.clone(), row[*idx].to_json());
        }
        record
    }

    fn is_unmatched(&self, row: &[SqlValue]) -> bool {
        self.columns.iter().all(|(_, idx)| row[*idx].is_null())
    }

    fn identifier_of(&self, row: &[SqlValue]) -> String {
        self.columns
            .iter()
            .find(|(field, _)| *field == self.identifier)
            .map(|(_, idx)| row[*idx].to_json().to_string())
            .unwrap_or_default()
    }
}

/// Reshapes the row stream into the result document and applies the plan's
/// output projection. Counts are post-dedup, pre-field-projection.
pub fn materialize(plan: &QueryPlan<'_>, rows: &RowSet) -> QueryResult {
    let mut data = JsonMap::new();
    let mut counts = BTreeMap::new();

    let primary = EntitySlice::new(
        plan.primary.key(),
        &plan.primary.identifier_field,
        plan.primary.fields.keys().cloned(),
        &rows.columns,
    );

    // First row's primary columns anchor the single primary record.
    match rows.rows.first() {
        Some(first) => {
            data.insert(
                primary.key.clone(),
                serde_json::Value::Object(primary.extract(first)),
            );
            counts.insert(primary.key.clone(), 1);
        }
        None => {
            counts.insert(primary.key.clone(), 0);
        }
    }

    for join in &plan.joins {
        let slice = EntitySlice::new(
            join.schema.key(),
            &join.schema.identifier_field,
            join.schema.fields.keys().cloned(),
            &rows.columns,
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut records: Vec<serde_json::Value> = Vec::new();
        for row in &rows.rows {
            if slice.is_unmatched(row) {
                continue;
            }
            let id = slice.identifier_of(row);
            if seen.insert(id) {
                records.push(serde_json::Value::Object(slice.extract(row)));
            }
        }

        counts.insert(slice.key.clone(), records.len());
        data.insert(slice.key, serde_json::Value::Array(records));
    }

    apply_projection(plan, &mut data, &mut counts);

    QueryResult {
        success: true,
        error: None,
        data,
        counts,
    }
}

fn apply_projection(plan: &QueryPlan<'_>, data: &mut JsonMap, counts: &mut BTreeMap<String, usize>) {
    if let Some(keep) = &plan.projection.entities {
        data.retain(|key, _| keep.iter().any(|k| k == key));
        counts.retain(|key, _| keep.iter().any(|k| k == key));
    }

    for (entity, fields) in &plan.projection.fields {
        let Some(value) = data.get_mut(entity) else {
            continue;
        };
        match value {
            serde_json::Value::Object(record) => {
                record.retain(|field, _| fields.iter().any(|f| f == field));
            }
            serde_json::Value::Array(records) => {
                for record in records {
                    if let serde_json::Value::Object(record) = record {
                        record.retain(|field, _| fields.iter().any(|f| f == field));
                    }
                }
            }
            _ => {}
        }
    }
}
