//! Typed field values shared by source records, formulas, templates and
//! postings.
//!
//! Numbers are always `rust_decimal::Decimal`: billing amounts never pass
//! through binary floating point.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value (SQL NULL)
    Null,
    /// Boolean
    Bool(bool),
    /// Fixed-precision decimal number
    Number(Decimal),
    /// UTF-8 text
    Text(String),
    /// Point in time, always UTC
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Returns true for `Value::Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view, if this is a number
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text view, if this is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects have no counterpart.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
                    .map(Value::Number)
            }
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Canonical textual rendering.
    ///
    /// Numbers keep their scale (`11.0` stays `11.0`), timestamps are
    /// RFC 3339 in UTC with second precision. Null renders as the empty
    /// string; callers that must reject null check `is_null` first.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// Numbers serialize as decimal strings so amounts survive JSON exactly.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            other => serializer.serialize_str(&other.render()),
        }
    }
}

/// Read-only name → value lookup used by formulas and templates
pub trait Bindings {
    /// Look up a value by name
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Bindings for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Bindings for std::collections::HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Two binding layers searched front to back.
///
/// The transformer layers derived fields over the record's own fields.
pub struct Layered<'a, A: Bindings + ?Sized, B: Bindings + ?Sized> {
    front: &'a A,
    back: &'a B,
}

impl<'a, A: Bindings + ?Sized, B: Bindings + ?Sized> Layered<'a, A, B> {
    /// Layer `front` over `back`
    pub fn new(front: &'a A, back: &'a B) -> Self {
        Self { front, back }
    }
}

impl<A: Bindings + ?Sized, B: Bindings + ?Sized> Bindings for Layered<'_, A, B> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.front.lookup(name).or_else(|| self.back.lookup(name))
    }
}
