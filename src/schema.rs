//! Entity schema definitions and the process-wide registry.
//!
//! The registry is loaded once from a JSON schema document and is read-only
//! afterwards. All entity-specific behavior downstream (filter allowlists,
//! join keys, ordering, type coercion) is data looked up here, not code.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Declared semantic type of an entity field, driving parameter coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Datetime,
}

impl core::fmt::Display for FieldType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
}

/// Relationship cardinality. Documentation only — never enforced at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "one-to-many")]
    OneToMany,
    #[serde(rename = "many-to-one")]
    ManyToOne,
    #[serde(rename = "one-to-one")]
    OneToOne,
}

/// A relationship declared on one side, keyed by the other entity's name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    /// Field on the declaring side of the relationship.
    pub foreign_key: String,
    /// Field on the other side. Defaults to `foreign_key`'s name.
    #[serde(default)]
    pub local_key: Option<String>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    #[serde(skip)]
    pub name: String,
    pub table_name: String,
    pub identifier_field: String,
    pub fields: BTreeMap<String, FieldDef>,
    pub allowed_filter_fields: Vec<String>,
    #[serde(default)]
    pub default_order_by: Option<String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipSpec>,
}

impl EntitySchema {
    /// Lower-cased entity name, used as result-document key and column namespace.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).map(|f| f.field_type)
    }

    pub fn allows_filter_on(&self, field: &str) -> bool {
        self.allowed_filter_fields.iter().any(|f| f == field)
    }

    /// Relationship declared on this entity toward `other`, case-insensitive.
    pub fn relationship_to(&self, other: &str) -> Option<&RelationshipSpec> {
        self.relationships
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(other))
            .map(|(_, spec)| spec)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDocument {
    default_limit: u32,
    max_limit: u32,
    entities: BTreeMap<String, EntitySchema>,
}

/// Immutable, process-wide table of entity definitions.
#[derive(Debug)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
    default_limit: u32,
    max_limit: u32,
}

impl SchemaRegistry {
    /// Loads and validates a schema document.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SchemaDocument =
            serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))?;

        let mut entities = BTreeMap::new();
        for (name, mut schema) in doc.entities {
            schema.name = name.clone();
            validate_entity(&schema)?;
            entities.insert(name.to_ascii_lowercase(), schema);
        }

        if doc.max_limit == 0 || doc.default_limit == 0 {
            return Err(Error::Schema(
                "defaultLimit and maxLimit must be positive".into(),
            ));
        }

        Ok(Self {
            entities,
            default_limit: doc.default_limit,
            max_limit: doc.max_limit,
        })
    }

    /// Case-insensitive entity lookup. Unknown names fail the current query.
    pub fn lookup(&self, name: &str) -> Result<&EntitySchema> {
        self.entities
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::Validation(format!("unknown entity '{name}'")))
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }
}

fn validate_entity(schema: &EntitySchema) -> Result<()> {
    if !schema.fields.contains_key(&schema.identifier_field) {
        return Err(Error::Schema(format!(
            "entity '{}': identifier field '{}' is not a declared field",
            schema.name, schema.identifier_field
        )));
    }
    for field in &schema.allowed_filter_fields {
        if !schema.fields.contains_key(field) {
            return Err(Error::Schema(format!(
                "entity '{}': allowed filter field '{}' is not a declared field",
                schema.name, field
            )));
        }
    }
    Ok(())
}
