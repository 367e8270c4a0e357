//! graphfetch — schema-driven relational fetch.
//!
//! One request retrieves a primary record together with a schema-declared set
//! of related records in a single bounded round trip: the planner turns a
//! static entity/relationship schema, per-entity filter documents, and an
//! output projection into one parameterized JOIN statement, executes it once,
//! and reconstructs the flat row stream into deduplicated per-entity
//! collections.
//!
//! ```no_run
//! use std::sync::Arc;
//! use graphfetch::{Engine, QueryRequest, RusqliteExecutor, SchemaRegistry};
//!
//! # fn main() -> graphfetch::Result<()> {
//! let registry = Arc::new(SchemaRegistry::from_json(include_str!("../demos/schema.json"))?);
//! let engine = Engine::new(registry, RusqliteExecutor::open("app.db")?);
//!
//! let filter = serde_json::from_str(r#"{ "email": "a@x.com" }"#).unwrap();
//! let related = serde_json::from_str(r#"{ "status": "active", "$limit": 3 }"#).unwrap();
//! let request = QueryRequest::new("customer", filter)
//!     .with_related("subscription", Some(related));
//!
//! let result = engine.fetch(&request);
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod dialect;
pub mod driver;
pub mod engine;
pub mod error;
pub mod filter;
pub mod materialize;
pub mod plan;
pub mod schema;
pub mod sql;
pub mod value;

// Re-export key types
pub use dialect::Dialect;
pub use engine::{CancelToken, Engine, Executor};
pub use error::{Error, Result};
pub use filter::{CompareOp, FilterCondition, FilterDocument, parse_filter};
pub use materialize::{QueryResult, RowSet, materialize};
pub use plan::{PlanWarning, Projection, QueryPlan, QueryRequest, RelatedRequest, plan};
pub use schema::{Cardinality, EntitySchema, FieldType, RelationshipSpec, SchemaRegistry};
pub use sql::render;
pub use value::{FilterValue, SqlValue};

#[cfg(feature = "rusqlite")]
pub use driver::RusqliteExecutor;
