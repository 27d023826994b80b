//! Dynamically typed field values and records.
//!
//! Engines exchange rows as [`Record`]s (`field -> Value`). [`Value::same`] is the
//! type-aware equality used by column-change detection; the derived `PartialEq`
//! is plain structural equality.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One row: field name to value.
pub type Record = BTreeMap<String, Value>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Decimal(Decimal),
    Uuid(Uuid),
    List(Vec<Value>),
    Object(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null`, `false`, `0`, `0.0`, `NaN` and `""`.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0 || f.is_nan(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Type-aware equality.
    ///
    /// - timestamps compare by epoch milliseconds
    /// - decimals compare by their normalized string form (`1.50` equals `1.5`)
    /// - lists and objects compare element-wise with the same rules
    /// - ints and floats compare numerically
    /// - everything else compares strictly
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::DateTime(a), Value::DateTime(b)) => {
                a.timestamp_millis() == b.timestamp_millis()
            }
            (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
                match (self.decimal_string(), other.decimal_string()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.same(y)))
            }
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }

    fn decimal_string(&self) -> Option<String> {
        match self {
            Value::Decimal(d) => Some(d.normalize().to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Decimal::try_from(*f)
                .ok()
                .map(|d| d.normalize().to_string()),
            Value::String(s) => Some(
                s.parse::<Decimal>()
                    .map(|d| d.normalize().to_string())
                    .unwrap_or_else(|_| s.clone()),
            ),
            _ => None,
        }
    }

    /// Ordering between comparable values; `None` when the kinds don't compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
            ) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Stable string key for identity lookups (ids are ints, strings or uuids in practice).
    pub(crate) fn identity_key(&self) -> String {
        match self {
            Value::Int(n) => format!("n:{n}"),
            // 2^63 is exact as f64; beyond it the cast would saturate.
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9_223_372_036_854_775_808.0 => {
                format!("n:{}", *f as i64)
            }
            Value::Float(f) => format!("f:{f}"),
            Value::Decimal(d) => {
                let d = d.normalize();
                match d.to_i64().filter(|_| d.scale() == 0) {
                    Some(n) => format!("n:{n}"),
                    None => format!("f:{d}"),
                }
            }
            Value::String(s) => format!("s:{s}"),
            Value::Uuid(u) => format!("u:{u}"),
            other => format!("v:{other}"),
        }
    }

    /// Convert into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::List(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
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

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build a [`Record`] from `key => value` pairs.
///
/// ```ignore
/// let user = record! { "name" => "alice", "age" => 30 };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        record
    }};
}
