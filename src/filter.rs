//! Filter document parsing.
//!
//! Turns a per-entity filter document into an ordered condition list plus an
//! optional per-entity result cap. This layer classifies syntax only; type
//! coercion against the schema happens at parameter-binding time.

use serde_json::{Map, Value};
use tracing::warn;

use crate::schema::EntitySchema;
use crate::value::FilterValue;

/// Reserved key carrying the per-entity result cap.
pub const LIMIT_KEY: &str = "$limit";

/// A per-entity filter document, as received from the caller.
pub type FilterDocument = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
}

impl CompareOp {
    /// SQL comparator text for this operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::In => "IN",
            CompareOp::NotIn => "NOT IN",
            CompareOp::Like => "LIKE",
        }
    }

    /// IN / NOT IN take a sequence value.
    pub fn array_semantics(self) -> bool {
        matches!(self, CompareOp::In | CompareOp::NotIn)
    }

    /// Maps an operator key to a comparator. `$regex` is approximated as a
    /// pattern match. Unrecognized keys map to `None` and are ignored.
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "$eq" => Some(CompareOp::Eq),
            "$ne" => Some(CompareOp::Ne),
            "$gt" => Some(CompareOp::Gt),
            "$gte" => Some(CompareOp::Gte),
            "$lt" => Some(CompareOp::Lt),
            "$lte" => Some(CompareOp::Lte),
            "$in" => Some(CompareOp::In),
            "$nin" => Some(CompareOp::NotIn),
            "$like" | "$regex" => Some(CompareOp::Like),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub field: String,
    pub op: CompareOp,
    pub value: FilterValue,
    pub array_semantics: bool,
}

/// Parses a filter document against an entity's filter allowlist.
///
/// Fields outside `allowed_filter_fields` are dropped, never surfaced as an
/// error; the drop is logged so a typo'd field name is at least observable.
pub fn parse_filter(
    doc: &FilterDocument,
    schema: &EntitySchema,
) -> (Vec<FilterCondition>, Option<u32>) {
    let mut conditions = Vec::new();
    let mut cap = None;

    for (key, value) in doc {
        if key == LIMIT_KEY {
            cap = value.as_u64().and_then(|n| u32::try_from(n).ok());
            continue;
        }

        if !schema.allows_filter_on(key) {
            warn!(entity = %schema.name, field = %key, "filter field not in allowlist, dropped");
            continue;
        }

        match value {
            Value::Object(ops) => {
                for (op_key, op_value) in ops {
                    let Some(op) = CompareOp::from_key(op_key) else {
                        continue;
                    };
                    conditions.push(FilterCondition {
                        field: key.clone(),
                        op,
                        value: FilterValue::from(op_value),
                        array_semantics: op.array_semantics(),
                    });
                }
            }
            scalar => conditions.push(FilterCondition {
                field: key.clone(),
                op: CompareOp::Eq,
                value: FilterValue::from(scalar),
                array_semantics: false,
            }),
        }
    }

    (conditions, cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn schema() -> EntitySchema {
        let registry = SchemaRegistry::from_json(
            r#"{
                "defaultLimit": 100,
                "maxLimit": 500,
                "entities": {
                    "Order": {
                        "tableName": "orders",
                        "identifierField": "id",
                        "fields": {
                            "id": { "type": "integer" },
                            "status": { "type": "string" },
                            "total": { "type": "decimal" }
                        },
                        "allowedFilterFields": ["id", "status", "total"]
                    }
                }
            }"#,
        )
        .unwrap();
        registry.lookup("order").unwrap().clone()
    }

    fn doc(json: &str) -> FilterDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn scalar_value_becomes_equality() {
        let (conditions, cap) = parse_filter(&doc(r#"{ "status": "paid" }"#), &schema());
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].op, CompareOp::Eq);
        assert_eq!(conditions[0].value, FilterValue::Str("paid".into()));
        assert!(cap.is_none());
    }

    #[test]
    fn operator_object_emits_one_condition_per_recognized_key() {
        let (conditions, _) = parse_filter(
            &doc(r#"{ "total": { "$gte": 10, "$lt": 100, "$frobnicate": 1 } }"#),
            &schema(),
        );
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().any(|c| c.op == CompareOp::Gte));
        assert!(conditions.iter().any(|c| c.op == CompareOp::Lt));
    }

    #[test]
    fn disallowed_field_is_dropped_without_error() {
        let (conditions, _) = parse_filter(
            &doc(r#"{ "secret": "x", "status": "paid" }"#),
            &schema(),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "status");
    }

    #[test]
    fn limit_key_is_extracted_not_a_condition() {
        let (conditions, cap) = parse_filter(&doc(r#"{ "$limit": 5 }"#), &schema());
        assert!(conditions.is_empty());
        assert_eq!(cap, Some(5));
    }

    #[test]
    fn in_operator_carries_array_semantics() {
        let (conditions, _) = parse_filter(&doc(r#"{ "status": { "$in": ["a", "b"] } }"#), &schema());
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].array_semantics);
        assert!(matches!(conditions[0].value, FilterValue::Array(_)));
    }

    #[test]
    fn regex_is_approximated_as_pattern_match() {
        let (conditions, _) = parse_filter(&doc(r#"{ "status": { "$regex": "pa%" } }"#), &schema());
        assert_eq!(conditions[0].op, CompareOp::Like);
    }
}
