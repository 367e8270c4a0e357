//! Shared fixture: a small CRM-ish schema (customer → subscription → invoice,
//! customer → note), seeded into an in-memory SQLite database when the
//! rusqlite driver is enabled.

#[cfg(feature = "rusqlite")]
use std::sync::Arc;

use graphfetch::FilterDocument;
#[cfg(feature = "rusqlite")]
use graphfetch::{Engine, RusqliteExecutor, SchemaRegistry};

pub const SCHEMA_JSON: &str = r#"{
    "defaultLimit": 100,
    "maxLimit": 500,
    "entities": {
        "Customer": {
            "tableName": "customers",
            "identifierField": "id",
            "fields": {
                "id": { "type": "integer" },
                "email": { "type": "string" },
                "name": { "type": "string" },
                "created_at": { "type": "datetime" }
            },
            "allowedFilterFields": ["id", "email", "name", "created_at"],
            "relationships": {
                "Subscription": { "foreignKey": "id", "localKey": "customer_id", "type": "one-to-many" },
                "Note": { "foreignKey": "id", "localKey": "customer_id", "type": "one-to-many" }
            }
        },
        "Subscription": {
            "tableName": "subscriptions",
            "identifierField": "id",
            "fields": {
                "id": { "type": "integer" },
                "customer_id": { "type": "integer" },
                "status": { "type": "string" },
                "started_at": { "type": "datetime" }
            },
            "allowedFilterFields": ["status", "started_at"],
            "defaultOrderBy": "started_at DESC"
        },
        "Invoice": {
            "tableName": "invoices",
            "identifierField": "id",
            "fields": {
                "id": { "type": "integer" },
                "subscription_id": { "type": "integer" },
                "amount": { "type": "decimal" },
                "paid": { "type": "boolean" }
            },
            "allowedFilterFields": ["amount", "paid"],
            "relationships": {
                "Subscription": { "foreignKey": "subscription_id", "localKey": "id", "type": "many-to-one" }
            }
        },
        "Note": {
            "tableName": "notes",
            "identifierField": "id",
            "fields": {
                "id": { "type": "integer" },
                "customer_id": { "type": "integer" },
                "body": { "type": "string" }
            },
            "allowedFilterFields": ["body"]
        }
    }
}"#;

#[cfg(feature = "rusqlite")]
const SEED_SQL: &str = r#"
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE subscriptions (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL
    );
    CREATE TABLE invoices (
        id INTEGER PRIMARY KEY,
        subscription_id INTEGER NOT NULL,
        amount REAL NOT NULL,
        paid INTEGER NOT NULL
    );
    CREATE TABLE notes (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL,
        body TEXT NOT NULL
    );

    INSERT INTO customers VALUES
        (1, 'a@x.com', 'alice', '2024-01-10T00:00:00+00:00'),
        (2, 'b@x.com', 'bob',   '2024-02-20T00:00:00+00:00');

    INSERT INTO subscriptions VALUES
        (1, 1, 'active',    '2024-03-01T00:00:00+00:00'),
        (2, 1, 'active',    '2024-05-01T00:00:00+00:00'),
        (3, 1, 'cancelled', '2024-01-15T00:00:00+00:00');

    INSERT INTO invoices VALUES
        (1, 1, 120.5, 1),
        (2, 2, 80.0,  0),
        (3, 2, 15.25, 1);

    INSERT INTO notes VALUES
        (1, 1, 'called about renewal'),
        (2, 1, 'upgraded plan');
"#;

#[cfg(feature = "rusqlite")]
pub fn engine() -> Engine<RusqliteExecutor> {
    let registry = Arc::new(SchemaRegistry::from_json(SCHEMA_JSON).unwrap());
    let executor = RusqliteExecutor::open_in_memory().unwrap();
    executor.batch(SEED_SQL).unwrap();
    Engine::new(registry, executor)
}

pub fn filter(json: &str) -> FilterDocument {
    serde_json::from_str(json).unwrap()
}
