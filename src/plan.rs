//! Query planning: dependency ordering, join key resolution, and parameter
//! binding for a fully specified fetch request.
//!
//! A request is assembled once through pure `with_*` steps and planned into an
//! immutable [`QueryPlan`]; nothing here is shared across queries.

use std::collections::BTreeMap;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::filter::{CompareOp, FilterCondition, FilterDocument, parse_filter};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::value::{FilterValue, SqlValue, coerce};

/// A related entity to join beneath the primary (or another related) entity.
#[derive(Debug, Clone)]
pub struct RelatedRequest {
    pub entity: String,
    pub filter: Option<FilterDocument>,
    /// Entity this request joins against. Defaults to the primary entity.
    pub parent: Option<String>,
}

/// Output projection: which entities to keep, and which fields per entity.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    /// Lower-cased entity keys to keep. `None` keeps everything.
    pub entities: Option<Vec<String>>,
    /// Per-entity field selection, keyed by lower-cased entity name.
    pub fields: BTreeMap<String, Vec<String>>,
}

/// A fully specified fetch request: primary entity + filter, related-entity
/// requests, projection, and an overall row cap.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub entity: String,
    pub filter: FilterDocument,
    pub related: Vec<RelatedRequest>,
    pub projection: Projection,
    pub limit: Option<u32>,
}

impl QueryRequest {
    pub fn new(entity: impl Into<String>, filter: FilterDocument) -> Self {
        Self {
            entity: entity.into(),
            filter,
            related: Vec::new(),
            projection: Projection::default(),
            limit: None,
        }
    }

    /// Adds a related entity joined against the primary entity.
    pub fn with_related(mut self, entity: impl Into<String>, filter: Option<FilterDocument>) -> Self {
        self.related.push(RelatedRequest {
            entity: entity.into(),
            filter,
            parent: None,
        });
        self
    }

    /// Adds a related entity joined against an explicit parent entity.
    pub fn with_related_under(
        mut self,
        entity: impl Into<String>,
        parent: impl Into<String>,
        filter: Option<FilterDocument>,
    ) -> Self {
        self.related.push(RelatedRequest {
            entity: entity.into(),
            filter,
            parent: Some(parent.into()),
        });
        self
    }

    /// Restricts the result document to the named entities.
    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.projection.entities = Some(
            entities
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Restricts one entity's records to the named fields.
    pub fn with_fields<I, S>(mut self, entity: impl AsRef<str>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.fields.insert(
            entity.as_ref().to_ascii_lowercase(),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Caps total flattened rows fetched, before deduplication.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Non-fatal planning degradations, logged by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanWarning {
    /// A related request's parent never resolved (cycle or dangling name);
    /// the request was re-parented onto the primary entity.
    UnresolvedParent { entity: String, parent: String },
    /// The dialect cannot express a ranking window; the per-entity cap was
    /// dropped and the branch joins unbounded.
    RankingUnavailable { entity: String },
}

impl core::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlanWarning::UnresolvedParent { entity, parent } => write!(
                f,
                "parent '{parent}' of related entity '{entity}' never resolved, re-parented onto the primary entity"
            ),
            PlanWarning::RankingUnavailable { entity } => write!(
                f,
                "dialect cannot rank rows, per-entity cap on '{entity}' dropped"
            ),
        }
    }
}

/// A condition with its value already coerced to the field's declared type.
#[derive(Debug, Clone)]
pub struct BoundCondition {
    pub field: String,
    pub op: CompareOp,
    pub value: BoundValue,
}

#[derive(Debug, Clone)]
pub enum BoundValue {
    One(SqlValue),
    Many(Vec<SqlValue>),
}

/// One planned join branch, in resolution order.
#[derive(Debug)]
pub struct PlannedJoin<'s> {
    pub schema: &'s EntitySchema,
    pub alias: String,
    pub parent_alias: String,
    /// Join key read on the parent side.
    pub parent_key: String,
    /// Join key read on the child side.
    pub child_key: String,
    pub conditions: Vec<BoundCondition>,
    /// Per-branch "top-N per parent" cap, realized via a ranking subquery.
    pub cap: Option<u32>,
}

/// The immutable output of planning: everything SQL rendering needs.
#[derive(Debug)]
pub struct QueryPlan<'s> {
    pub dialect: Dialect,
    pub primary: &'s EntitySchema,
    pub primary_alias: String,
    pub primary_conditions: Vec<BoundCondition>,
    pub joins: Vec<PlannedJoin<'s>>,
    /// min(requested-or-default, configured maximum), applied pre-dedup.
    pub row_cap: u32,
    pub projection: Projection,
    pub warnings: Vec<PlanWarning>,
}

/// Plans a request against the registry. Fails before any SQL is built on a
/// missing/unknown entity or an empty primary filter.
pub fn plan<'s>(
    registry: &'s SchemaRegistry,
    dialect: Dialect,
    request: &QueryRequest,
) -> Result<QueryPlan<'s>> {
    if request.entity.trim().is_empty() {
        return Err(Error::Validation("no primary entity given".into()));
    }
    if request.filter.is_empty() {
        return Err(Error::Validation(format!(
            "empty filter for primary entity '{}'",
            request.entity
        )));
    }

    let primary = registry.lookup(&request.entity)?;
    let (primary_conditions, primary_cap) = parse_filter(&request.filter, primary);
    let primary_conditions = bind_conditions(primary, primary_conditions)?;

    let mut warnings = Vec::new();
    let primary_alias = "t0".to_string();

    // Layered resolution over the parent relation, primary as the only root.
    let mut resolved: Vec<(&'s EntitySchema, String)> = vec![(primary, primary_alias.clone())];
    let mut joins: Vec<PlannedJoin<'s>> = Vec::new();
    let mut pending: Vec<&RelatedRequest> = request.related.iter().collect();

    loop {
        let mut next: Vec<&RelatedRequest> = Vec::new();
        let mut progressed = false;

        for req in pending {
            let parent_name = req.parent.as_deref().unwrap_or(&request.entity);
            let Some((parent_schema, parent_alias)) = resolved
                .iter()
                .find(|(schema, _)| schema.name.eq_ignore_ascii_case(parent_name))
                .map(|(schema, alias)| (*schema, alias.clone()))
            else {
                next.push(req);
                continue;
            };

            let join = plan_join(
                registry,
                dialect,
                req,
                parent_schema,
                parent_alias,
                joins.len() + 1,
                &mut warnings,
            )?;
            resolved.push((join.schema, join.alias.clone()));
            joins.push(join);
            progressed = true;
        }

        if next.is_empty() || !progressed {
            pending = next;
            break;
        }
        pending = next;
    }

    // Best-effort fallback for cycles and dangling parents: re-parent the
    // stragglers onto the primary entity in submission order.
    for req in pending {
        let parent_name = req.parent.as_deref().unwrap_or(&request.entity);
        warnings.push(PlanWarning::UnresolvedParent {
            entity: req.entity.clone(),
            parent: parent_name.to_string(),
        });
        let join = plan_join(
            registry,
            dialect,
            req,
            primary,
            primary_alias.clone(),
            joins.len() + 1,
            &mut warnings,
        )?;
        joins.push(join);
    }

    let requested = request.limit.or(primary_cap).unwrap_or(registry.default_limit());
    let row_cap = requested.min(registry.max_limit());

    Ok(QueryPlan {
        dialect,
        primary,
        primary_alias,
        primary_conditions,
        joins,
        row_cap,
        projection: request.projection.clone(),
        warnings,
    })
}

fn plan_join<'s>(
    registry: &'s SchemaRegistry,
    dialect: Dialect,
    req: &RelatedRequest,
    parent: &'s EntitySchema,
    parent_alias: String,
    index: usize,
    warnings: &mut Vec<PlanWarning>,
) -> Result<PlannedJoin<'s>> {
    let child = registry.lookup(&req.entity)?;
    let (parent_key, child_key) = resolve_join_keys(parent, child);

    let (conditions, mut cap) = match &req.filter {
        Some(doc) => parse_filter(doc, child),
        None => (Vec::new(), None),
    };
    let conditions = bind_conditions(child, conditions)?;

    if cap.is_some() && !dialect.supports_ranking() {
        warnings.push(PlanWarning::RankingUnavailable {
            entity: child.name.clone(),
        });
        cap = None;
    }

    Ok(PlannedJoin {
        schema: child,
        alias: format!("t{index}"),
        parent_alias,
        parent_key,
        child_key,
        conditions,
        cap,
    })
}

/// Join key resolution, ascending priority: parent-declared relationship,
/// child-declared relationship, identifier = identifier. Either side of a
/// relationship may declare it.
fn resolve_join_keys(parent: &EntitySchema, child: &EntitySchema) -> (String, String) {
    if let Some(rel) = parent.relationship_to(&child.name) {
        let child_key = rel.local_key.clone().unwrap_or_else(|| rel.foreign_key.clone());
        return (rel.foreign_key.clone(), child_key);
    }
    if let Some(rel) = child.relationship_to(&parent.name) {
        return (parent.identifier_field.clone(), rel.foreign_key.clone());
    }
    (
        parent.identifier_field.clone(),
        child.identifier_field.clone(),
    )
}

/// Coerces every condition value to the field's declared type. A value that
/// cannot be coerced aborts the whole query.
fn bind_conditions(
    schema: &EntitySchema,
    conditions: Vec<FilterCondition>,
) -> Result<Vec<BoundCondition>> {
    let mut bound = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let field_type = schema.field_type(&condition.field).ok_or_else(|| {
            Error::Validation(format!(
                "field '{}' is not declared on entity '{}'",
                condition.field, schema.name
            ))
        })?;

        let value = if condition.array_semantics {
            let items = match &condition.value {
                FilterValue::Array(items) => items
                    .iter()
                    .map(|item| coerce(&condition.field, field_type, item))
                    .collect::<Result<Vec<_>>>()?,
                single => vec![coerce(&condition.field, field_type, single)?],
            };
            BoundValue::Many(items)
        } else {
            match &condition.value {
                FilterValue::Array(_) => {
                    return Err(Error::Conversion {
                        field: condition.field.clone(),
                        expected: field_type,
                        value: condition.value.to_string(),
                    });
                }
                single => BoundValue::One(coerce(&condition.field, field_type, single)?),
            }
        };

        bound.push(BoundCondition {
            field: condition.field,
            op: condition.op,
            value,
        });
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_json(
            r#"{
                "defaultLimit": 100,
                "maxLimit": 500,
                "entities": {
                    "Customer": {
                        "tableName": "customers",
                        "identifierField": "id",
                        "fields": {
                            "id": { "type": "integer" },
                            "email": { "type": "string" }
                        },
                        "allowedFilterFields": ["id", "email"],
                        "relationships": {
                            "Subscription": { "foreignKey": "id", "localKey": "customer_id", "type": "one-to-many" }
                        }
                    },
                    "Subscription": {
                        "tableName": "subscriptions",
                        "identifierField": "id",
                        "fields": {
                            "id": { "type": "integer" },
                            "customer_id": { "type": "integer" },
                            "status": { "type": "string" }
                        },
                        "allowedFilterFields": ["status"],
                        "defaultOrderBy": "created_at DESC"
                    },
                    "Invoice": {
                        "tableName": "invoices",
                        "identifierField": "id",
                        "fields": {
                            "id": { "type": "integer" },
                            "subscription_id": { "type": "integer" }
                        },
                        "allowedFilterFields": ["id"],
                        "relationships": {
                            "Subscription": { "foreignKey": "subscription_id", "localKey": "id", "type": "many-to-one" }
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    fn filter(json: &str) -> FilterDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn empty_primary_filter_fails_validation() {
        let registry = registry();
        let request = QueryRequest::new("customer", FilterDocument::new());
        assert!(matches!(
            plan(&registry, Dialect::SQLite, &request),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn unknown_related_entity_fails_validation() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related("widget", None);
        assert!(matches!(
            plan(&registry, Dialect::SQLite, &request),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn layered_resolution_orders_grandchild_after_child() {
        let registry = registry();
        // Submitted out of order: invoice's parent (subscription) comes second.
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related_under("invoice", "subscription", None)
            .with_related("subscription", None);
        let plan = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.joins.len(), 2);
        assert_eq!(plan.joins[0].schema.name, "Subscription");
        assert_eq!(plan.joins[1].schema.name, "Invoice");
        assert_eq!(plan.joins[1].parent_alias, plan.joins[0].alias);
    }

    #[test]
    fn parent_declared_relationship_wins() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related("subscription", None);
        let plan = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert_eq!(plan.joins[0].parent_key, "id");
        assert_eq!(plan.joins[0].child_key, "customer_id");
    }

    #[test]
    fn child_declared_relationship_uses_parent_identifier() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related("subscription", None)
            .with_related_under("invoice", "subscription", None);
        let plan = plan(&registry, Dialect::SQLite, &request).unwrap();
        let invoice = &plan.joins[1];
        assert_eq!(invoice.parent_key, "id");
        assert_eq!(invoice.child_key, "subscription_id");
    }

    #[test]
    fn dangling_parent_is_reparented_with_warning() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related_under("invoice", "order", None);
        let plan = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].parent_alias, "t0");
        assert!(matches!(
            plan.warnings[0],
            PlanWarning::UnresolvedParent { .. }
        ));
    }

    #[test]
    fn row_cap_respects_configured_maximum() {
        let registry = registry();
        let request =
            QueryRequest::new("customer", filter(r#"{ "id": 1 }"#)).with_limit(10_000);
        let capped = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert_eq!(capped.row_cap, 500);

        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#));
        let defaulted = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert_eq!(defaulted.row_cap, 100);
    }

    #[test]
    fn conversion_failure_aborts_planning() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": "not-a-number" }"#));
        assert!(matches!(
            plan(&registry, Dialect::SQLite, &request),
            Err(Error::Conversion { .. })
        ));
    }

    #[test]
    fn per_entity_cap_survives_planning() {
        let registry = registry();
        let request = QueryRequest::new("customer", filter(r#"{ "id": 1 }"#))
            .with_related("subscription", Some(filter(r#"{ "$limit": 3 }"#)));
        let plan = plan(&registry, Dialect::SQLite, &request).unwrap();
        assert_eq!(plan.joins[0].cap, Some(3));
    }
}
