//! Short-hand schema notation.
//!
//! Component and addon authors declare parameter schemas in a compact
//! notation that this module elaborates into the JSON Schema subset consumed
//! by [`crate::structural`]:
//!
//! ```yaml
//! name: string
//! replicas: 'integer | default=1'
//! level: 'string | enum=debug,info,warn | default=info'
//! tags: '[]map<string> | default=[]'
//! resources: Resources          # named custom type
//! ```
//!
//! Fields are required by default; a field becomes optional by declaring a
//! `default=` or `required=false`. `[]T` and `array<T>` are equivalent;
//! `map<T>` produces an additional-properties object.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{SchemaError, SchemaResult};

/// Converts short-hand schema documents into JSON Schema.
#[derive(Debug, Default)]
pub struct Converter {
    /// Named custom types, each a short-hand object body.
    types: JsonMap<String, JsonValue>,
}

impl Converter {
    /// Create a converter with an optional custom-type registry.
    pub fn new(types: Option<JsonMap<String, JsonValue>>) -> Self {
        Converter {
            types: types.unwrap_or_default(),
        }
    }

    /// Convert a short-hand object body into a JSON Schema object.
    pub fn convert(&self, root: &JsonMap<String, JsonValue>) -> SchemaResult<JsonValue> {
        self.convert_object(root)
    }

    fn convert_object(&self, fields: &JsonMap<String, JsonValue>) -> SchemaResult<JsonValue> {
        let mut properties = JsonMap::new();
        let mut required = Vec::new();

        for (name, spec) in fields {
            let (schema, is_required) = match spec {
                JsonValue::String(spec) => self.convert_field(name, spec)?,
                JsonValue::Object(inline) => (self.convert_object(inline)?, true),
                other => {
                    return Err(SchemaError::InvalidStructure {
                        message: format!(
                            "field '{}' must be a type string or nested object, got {}",
                            name,
                            type_of(other)
                        ),
                    });
                }
            };
            if is_required {
                required.push(JsonValue::String(name.clone()));
            }
            properties.insert(name.clone(), schema);
        }

        let mut out = JsonMap::new();
        out.insert("type".to_string(), JsonValue::String("object".to_string()));
        if !required.is_empty() {
            out.insert("required".to_string(), JsonValue::Array(required));
        }
        out.insert("properties".to_string(), JsonValue::Object(properties));
        Ok(JsonValue::Object(out))
    }

    /// Convert one `type | constraint | constraint` field spec. Returns the
    /// schema and whether the field is required.
    fn convert_field(&self, name: &str, spec: &str) -> SchemaResult<(JsonValue, bool)> {
        let mut segments = spec.split('|').map(str::trim);
        let type_expr = segments.next().unwrap_or_default();
        let mut schema = self.parse_type(type_expr)?;

        let mut required = true;
        let mut default_literal: Option<String> = None;
        let mut enum_literal: Option<String> = None;
        let mut pattern: Option<String> = None;

        for segment in segments {
            // Constraints may also be packed into one segment separated by
            // whitespace: `string | required=false default=foo`.
            for token in segment.split_whitespace() {
                let Some((key, value)) = token.split_once('=') else {
                    return Err(SchemaError::InvalidStructure {
                        message: format!("field '{}': malformed constraint '{}'", name, token),
                    });
                };
                match key {
                    "default" => default_literal = Some(value.to_string()),
                    "required" => required = value != "false",
                    "enum" => enum_literal = Some(value.to_string()),
                    "pattern" => pattern = Some(value.to_string()),
                    other => {
                        return Err(SchemaError::InvalidStructure {
                            message: format!("field '{}': unknown constraint '{}'", name, other),
                        });
                    }
                }
            }
        }

        let schema_map = schema
            .as_object_mut()
            .expect("parse_type always yields an object");
        let declared_type = schema_map
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or("object")
            .to_string();

        if let Some(literal) = default_literal {
            let default = coerce_literal(name, &declared_type, &literal)?;
            insert_after(schema_map, "type", "default", default);
            required = false;
        }
        if let Some(literal) = enum_literal {
            let values = literal
                .split(',')
                .map(|v| coerce_literal(name, &declared_type, v.trim()))
                .collect::<SchemaResult<Vec<JsonValue>>>()?;
            schema_map.insert("enum".to_string(), JsonValue::Array(values));
        }
        if let Some(pattern) = pattern {
            schema_map.insert("pattern".to_string(), JsonValue::String(pattern));
        }

        Ok((schema, required))
    }

    /// Parse a type expression into a bare schema.
    fn parse_type(&self, expr: &str) -> SchemaResult<JsonValue> {
        let expr = expr.trim();
        if let Some(item) = expr.strip_prefix("[]") {
            if item.starts_with('(') {
                return Err(SchemaError::InvalidStructure {
                    message: format!("unsupported array syntax '{}'", expr),
                });
            }
            let items = self.parse_type(item)?;
            let mut out = JsonMap::new();
            out.insert("type".to_string(), JsonValue::String("array".to_string()));
            out.insert("items".to_string(), items);
            return Ok(JsonValue::Object(out));
        }
        if let Some(inner) = strip_generic(expr, "array") {
            let items = self.parse_type(inner)?;
            let mut out = JsonMap::new();
            out.insert("type".to_string(), JsonValue::String("array".to_string()));
            out.insert("items".to_string(), items);
            return Ok(JsonValue::Object(out));
        }
        if let Some(inner) = strip_generic(expr, "map") {
            let values = self.parse_type(inner)?;
            let mut out = JsonMap::new();
            out.insert("type".to_string(), JsonValue::String("object".to_string()));
            out.insert("additionalProperties".to_string(), values);
            return Ok(JsonValue::Object(out));
        }

        match expr {
            "string" | "integer" | "boolean" | "number" | "object" => {
                let mut out = JsonMap::new();
                out.insert("type".to_string(), JsonValue::String(expr.to_string()));
                Ok(JsonValue::Object(out))
            }
            "float" => {
                let mut out = JsonMap::new();
                out.insert("type".to_string(), JsonValue::String("number".to_string()));
                Ok(JsonValue::Object(out))
            }
            custom => match self.types.get(custom) {
                Some(JsonValue::Object(body)) => self.convert_object(body),
                Some(other) => Err(SchemaError::InvalidStructure {
                    message: format!(
                        "custom type '{}' must be an object, got {}",
                        custom,
                        type_of(other)
                    ),
                }),
                None => Err(SchemaError::UnknownType(custom.to_string())),
            },
        }
    }
}

/// `array<T>` / `map<T>` → `T`, or None when `expr` is not that generic.
fn strip_generic<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    expr.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('<'))
        .and_then(|rest| rest.strip_suffix('>'))
}

/// Coerce a constraint literal to the declared type. Array and object
/// literals are JSON.
fn coerce_literal(field: &str, declared_type: &str, literal: &str) -> SchemaResult<JsonValue> {
    let malformed = |message: String| SchemaError::MalformedDefault {
        field: field.to_string(),
        message,
    };
    match declared_type {
        "integer" => literal
            .parse::<i64>()
            .map(|i| JsonValue::Number(i.into()))
            .map_err(|_| malformed(format!("'{}' is not an integer", literal))),
        "number" => literal
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| malformed(format!("'{}' is not a number", literal))),
        "boolean" => match literal {
            "true" => Ok(JsonValue::Bool(true)),
            "false" => Ok(JsonValue::Bool(false)),
            _ => Err(malformed(format!("'{}' is not a boolean", literal))),
        },
        "array" | "object" => serde_json::from_str(literal)
            .map_err(|e| malformed(format!("'{}' is not valid JSON: {}", literal, e))),
        _ => Ok(JsonValue::String(literal.to_string())),
    }
}

/// Insert `key` immediately after `anchor`, keeping the emitted schema in a
/// stable, readable order.
fn insert_after(map: &mut JsonMap<String, JsonValue>, anchor: &str, key: &str, value: JsonValue) {
    let mut out = JsonMap::with_capacity(map.len() + 1);
    for (k, v) in map.iter() {
        out.insert(k.clone(), v.clone());
        if k == anchor {
            out.insert(key.to_string(), value.clone());
        }
    }
    if !out.contains_key(key) {
        out.insert(key.to_string(), value);
    }
    *map = out;
}

fn type_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
