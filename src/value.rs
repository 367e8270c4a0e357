//! Filter values and bound statement parameters.
//!
//! `FilterValue` models the JSON scalar/array subset a filter document may
//! carry. `SqlValue` is the typed parameter actually bound to the statement,
//! produced by coercing a `FilterValue` to the field's declared [`FieldType`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::schema::FieldType;

/// A loosely-typed value out of a filter document.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<FilterValue>),
}

impl From<&serde_json::Value> for FilterValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FilterValue::Null,
            serde_json::Value::Bool(b) => FilterValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FilterValue::Int(i)
                } else {
                    FilterValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FilterValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                FilterValue::Array(items.iter().map(FilterValue::from).collect())
            }
            // Nested objects are operator documents, handled by the filter
            // parser before values reach this conversion.
            serde_json::Value::Object(_) => FilterValue::Null,
        }
    }
}

impl core::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FilterValue::Null => f.write_str("null"),
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Float(x) => write!(f, "{x}"),
            FilterValue::Str(s) => write!(f, "'{s}'"),
            FilterValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A typed value bound to (or read back from) the statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Decimal(Decimal),
    Datetime(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// JSON rendering for the result document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Int(i) => serde_json::Value::from(*i),
            SqlValue::Float(x) => serde_json::Value::from(*x),
            SqlValue::Text(s) => serde_json::Value::from(s.clone()),
            SqlValue::Bool(b) => serde_json::Value::from(*b),
            SqlValue::Decimal(d) => serde_json::Value::from(d.to_string()),
            SqlValue::Datetime(dt) => serde_json::Value::from(dt.to_rfc3339()),
        }
    }
}

/// Coerces one scalar filter value to the field's declared type.
///
/// The filter parser classifies syntax only; this is the single place where
/// loosely-typed input meets the schema. A value that cannot be coerced fails
/// the whole query.
pub fn coerce(field: &str, expected: FieldType, value: &FilterValue) -> Result<SqlValue> {
    let fail = || Error::Conversion {
        field: field.to_string(),
        expected,
        value: value.to_string(),
    };

    match expected {
        FieldType::String => match value {
            FilterValue::Str(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(fail()),
        },
        FieldType::Integer => match value {
            FilterValue::Int(i) => Ok(SqlValue::Int(*i)),
            FilterValue::Float(x) if x.fract() == 0.0 => Ok(SqlValue::Int(*x as i64)),
            FilterValue::Str(s) => s.trim().parse().map(SqlValue::Int).map_err(|_| fail()),
            FilterValue::Bool(b) => Ok(SqlValue::Int(i64::from(*b))),
            _ => Err(fail()),
        },
        FieldType::Decimal => match value {
            FilterValue::Int(i) => Ok(SqlValue::Decimal(Decimal::from(*i))),
            FilterValue::Float(x) => Decimal::try_from(*x).map(SqlValue::Decimal).map_err(|_| fail()),
            FilterValue::Str(s) => s.trim().parse().map(SqlValue::Decimal).map_err(|_| fail()),
            _ => Err(fail()),
        },
        FieldType::Boolean => match value {
            FilterValue::Bool(b) => Ok(SqlValue::Bool(*b)),
            FilterValue::Int(0) => Ok(SqlValue::Bool(false)),
            FilterValue::Int(1) => Ok(SqlValue::Bool(true)),
            FilterValue::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        FieldType::Datetime => match value {
            FilterValue::Str(s) => parse_datetime(s).ok_or_else(fail).map(SqlValue::Datetime),
            FilterValue::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .ok_or_else(fail)
                .map(SqlValue::Datetime),
            FilterValue::Float(secs) => DateTime::from_timestamp_millis((secs * 1000.0) as i64)
                .ok_or_else(fail)
                .map(SqlValue::Datetime),
            _ => Err(fail()),
        },
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare `YYYY-MM-DD` forms.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercion_accepts_all_input_forms() {
        assert_eq!(
            coerce("n", FieldType::Integer, &FilterValue::Int(7)).unwrap(),
            SqlValue::Int(7)
        );
        assert_eq!(
            coerce("n", FieldType::Integer, &FilterValue::Str("42".into())).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            coerce("n", FieldType::Integer, &FilterValue::Float(3.0)).unwrap(),
            SqlValue::Int(3)
        );
        assert_eq!(
            coerce("n", FieldType::Integer, &FilterValue::Bool(true)).unwrap(),
            SqlValue::Int(1)
        );
    }

    #[test]
    fn conversion_error_names_field_type_and_value() {
        let err = coerce("age", FieldType::Integer, &FilterValue::Str("abc".into())).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("age"));
        assert!(message.contains("integer"));
        assert!(message.contains("abc"));
    }

    #[test]
    fn fractional_float_is_not_an_integer() {
        assert!(coerce("n", FieldType::Integer, &FilterValue::Float(3.5)).is_err());
    }

    #[test]
    fn datetime_coercion_accepts_common_forms() {
        for input in ["2024-01-15T10:30:00Z", "2024-01-15 10:30:00", "2024-01-15"] {
            let coerced = coerce("at", FieldType::Datetime, &FilterValue::Str(input.into()));
            assert!(coerced.is_ok(), "failed to parse {input}");
        }
        assert!(coerce("at", FieldType::Datetime, &FilterValue::Int(1_700_000_000)).is_ok());
    }

    #[test]
    fn string_field_rejects_non_string_input() {
        assert!(coerce("name", FieldType::String, &FilterValue::Int(5)).is_err());
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(
            coerce("b", FieldType::Boolean, &FilterValue::Str("TRUE".into())).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            coerce("b", FieldType::Boolean, &FilterValue::Int(0)).unwrap(),
            SqlValue::Bool(false)
        );
        assert!(coerce("b", FieldType::Boolean, &FilterValue::Int(2)).is_err());
    }
}
