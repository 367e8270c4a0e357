use thiserror::Error;

use crate::schema::FieldType;

#[derive(Debug, Error)]
pub enum Error {
    /// Request is structurally invalid (unknown entity, empty primary filter, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A filter value could not be coerced to the field's declared type
    #[error("Conversion error: cannot convert {value} to {expected} for field '{field}'")]
    Conversion {
        field: String,
        expected: FieldType,
        value: String,
    },

    /// Error loading or validating the schema document
    #[error("Schema error: {0}")]
    Schema(String),

    /// Error executing the generated statement
    #[error("Execution error: {0}")]
    Execution(String),

    /// The caller raised the cancellation signal while the statement was in flight
    #[error("Query cancelled")]
    Cancelled,

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, Error>;
