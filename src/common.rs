//! Shared value types used by the query executor and cache.
//!
//! A query result is a `Vec<Row>` where `Row` is `Vec<Value>`; this is the
//! "stable form" row materialization the query executor produces, and the
//! "opaque payload" a cache entry stores.

use serde::{Deserialize, Serialize};

/// A single column value in a materialized query result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value the way it is substituted into a key pattern
    /// placeholder — plain, unquoted, human-readable text.
    pub fn as_key_fragment(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Json(j) => j.to_string(),
        }
    }

    /// Converts a plain JSON value (as received over HTTP, or as decoded
    /// from a cached payload) into a `Value`. Numbers that fit in `i64`
    /// become `Integer`; everything else numeric becomes `Float`.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(0.0))),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(j) => j.clone(),
        }
    }
}

/// A single materialized result row.
pub type Row = Vec<Value>;
