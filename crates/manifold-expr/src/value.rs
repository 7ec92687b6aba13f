//! Evaluated-value type and the omit sentinel.
//!
//! Expressions evaluate to a [`Value`]: the plain-tree scalars plus ordered
//! lists, insertion-ordered maps, and the distinguished [`Value::Omit`]
//! sentinel. The sentinel flows through evaluation like any other value and
//! is erased afterwards by [`prune`].

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::{ExprError, ExprResult};

/// A value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map preserving insertion order.
    Map(IndexMap<String, Value>),
    /// The omit sentinel: "delete the enclosing key or element".
    Omit,
}

impl Value {
    /// Convert a JSON tree into a value. Numbers become `Int` when they fit
    /// in `i64`, `Float` otherwise.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON tree. The omit sentinel cannot be represented;
    /// callers must [`prune`] first. A sentinel surviving at the root (the
    /// whole tree was omitted) becomes JSON null.
    pub fn into_json(self) -> JsonValue {
        match self {
            Value::Null | Value::Omit => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(b),
            Value::Int(i) => JsonValue::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s),
            Value::List(items) => {
                JsonValue::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Map(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
        }
    }

    /// The name of this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Omit => "omit",
        }
    }

    /// Expect a boolean, with a type error otherwise.
    pub fn as_bool(&self) -> ExprResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ExprError::Type {
                message: format!("expected bool, got {}", other.type_name()),
            }),
        }
    }

    /// Expect a string, with a type error otherwise.
    pub fn as_str(&self) -> ExprResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(ExprError::Type {
                message: format!("expected string, got {}", other.type_name()),
            }),
        }
    }

    /// Textual form used when an expression is embedded in a larger string
    /// literal. Containers render as compact JSON; null renders empty.
    ///
    /// Returns `None` for the omit sentinel: the caller decides what an
    /// omitted fragment does to the surrounding string.
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::Omit => None,
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::String(s) => Some(s.clone()),
            Value::List(_) | Value::Map(_) => {
                Some(serde_json::to_string(&self.clone().into_json()).unwrap_or_default())
            }
        }
    }
}

/// Render a float the way serde_json would, so embedded and whole-string
/// interpolation agree.
fn format_float(f: f64) -> String {
    serde_json::Number::from_f64(f)
        .map(|n| n.to_string())
        .unwrap_or_else(|| f.to_string())
}

/// Remove omit sentinels from an evaluated tree.
///
/// Map entries whose value is the sentinel lose their key; list elements
/// equal to the sentinel are dropped and successors shift down. A container
/// left with nothing but sentinels becomes empty but is kept; whether an
/// empty container is acceptable is the caller's call. Pruning is
/// idempotent.
pub fn prune(value: Value) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .into_iter()
                .filter(|v| !matches!(v, Value::Omit))
                .map(prune)
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .filter(|(_, v)| !matches!(v, Value::Omit))
                .map(|(k, v)| (k, prune(v)))
                .collect(),
        ),
        other => other,
    }
}
