//! `Value` and `ValueKind`
//!
//! `Value` is serialized with an explicit `type` tag:
//!
//! ```rust
//! use seawall::Value;
//!
//! let json = serde_json::to_string(&Value::Int(42)).unwrap();
//! assert_eq!(json, r#"{"type":"int","value":42}"#);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A typed scalar (or list of scalars) used as an operand or cursor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Operand of an `In` clause
    List(Vec<Value>),
}

/// Type tag of a [`Value`], also used by entity metadata to describe scalar properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Decimal,
    Uuid,
    Timestamp,
    Date,
}

impl Value {
    /// Type tag of this value, `None` for `Null` and `List`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null | Value::List(_) => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Decimal(_) => Some(ValueKind::Decimal),
            Value::Uuid(_) => Some(ValueKind::Uuid),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Date(_) => Some(ValueKind::Date),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Lower-cased copy for case-insensitive comparison; non-text values are returned as-is.
    pub fn folded(&self) -> Value {
        match self {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            Value::List(items) => Value::List(items.iter().map(Value::folded).collect()),
            other => other.clone(),
        }
    }

    /// Convert to a `sea_query::Value` for the SQL rendering backend.
    ///
    /// Lists have no single-value representation and are expanded by the renderer.
    pub fn to_sea_value(&self) -> Option<sea_query::Value> {
        let value = match self {
            Value::Null => sea_query::Value::from(Option::<String>::None),
            Value::Bool(b) => sea_query::Value::from(*b),
            Value::Int(i) => sea_query::Value::from(*i),
            Value::Float(f) => sea_query::Value::from(*f),
            Value::Text(s) => sea_query::Value::from(s.clone()),
            Value::Decimal(d) => sea_query::Value::from(*d),
            Value::Uuid(u) => sea_query::Value::from(*u),
            Value::Timestamp(ts) => sea_query::Value::from(*ts),
            Value::Date(d) => sea_query::Value::from(*d),
            Value::List(_) => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Date(d) => write!(f, "{d}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Decimal => "decimal",
            ValueKind::Uuid => "uuid",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Date => "date",
        };
        f.write_str(name)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_serde_keeps_type_tags() {
        let values = vec![
            Value::Null,
            Value::Int(7),
            Value::Float(2.5),
            Value::Text("7".to_string()),
            Value::Decimal(Decimal::from_str("2.50").unwrap()),
            Value::Uuid(Uuid::nil()),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
        // "7" the string and 7 the integer stay distinct
        assert_ne!(back[1], back[3]);
    }

    #[test]
    fn test_kind_and_folding() {
        assert_eq!(Value::from("Ab").kind(), Some(ValueKind::Text));
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::from("AbC").folded(), Value::from("abc"));
        assert_eq!(Value::from(3).folded(), Value::Int(3));
    }

    #[test]
    fn test_option_and_vec_conversions() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1i64, 2]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_lists_have_no_sea_value() {
        assert!(Value::from(vec![1i64]).to_sea_value().is_none());
        assert!(Value::Int(1).to_sea_value().is_some());
    }
}
