//! Structural schema representation.
//!
//! A [`Structural`] is the fully elaborated form of a declared JSON Schema
//! subset: every field's type, optional default, enum values, child
//! properties, array item schema, and additional-property schema. The
//! renderer consumes structural schemas; the short-hand notation in
//! [`crate::shorthand`] emits the JSON they are parsed from.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::{SchemaError, SchemaResult};

/// The type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    Object,
    Array,
}

impl SchemaKind {
    fn from_name(name: &str) -> SchemaResult<Self> {
        match name {
            "string" => Ok(SchemaKind::String),
            "integer" => Ok(SchemaKind::Integer),
            "number" => Ok(SchemaKind::Number),
            "boolean" => Ok(SchemaKind::Boolean),
            "null" => Ok(SchemaKind::Null),
            "object" => Ok(SchemaKind::Object),
            "array" => Ok(SchemaKind::Array),
            other => Err(SchemaError::InvalidType(other.to_string())),
        }
    }
}

/// A fully elaborated schema node.
#[derive(Debug, Clone, PartialEq)]
pub struct Structural {
    pub kind: SchemaKind,
    /// Default applied when the field is absent (or null).
    pub default: Option<JsonValue>,
    /// Permitted values, when declared.
    pub enum_values: Option<Vec<JsonValue>>,
    /// Names of required child properties (object schemas).
    pub required: Vec<String>,
    /// Child property schemas (object schemas).
    pub properties: IndexMap<String, Structural>,
    /// Item schema (array schemas).
    pub items: Option<Box<Structural>>,
    /// Schema for properties not named in `properties` (map-style objects).
    pub additional_properties: Option<Box<Structural>>,
}

impl Structural {
    fn empty(kind: SchemaKind) -> Self {
        Structural {
            kind,
            default: None,
            enum_values: None,
            required: Vec::new(),
            properties: IndexMap::new(),
            items: None,
            additional_properties: None,
        }
    }

    /// Parse a JSON Schema document into structural form.
    pub fn from_schema(schema: &JsonValue) -> SchemaResult<Self> {
        let map = schema
            .as_object()
            .ok_or_else(|| SchemaError::InvalidStructure {
                message: format!("schema must be an object, got {}", json_type_name(schema)),
            })?;

        let type_name = map
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| SchemaError::InvalidStructure {
                message: "schema is missing a 'type' string".to_string(),
            })?;
        let mut out = Structural::empty(SchemaKind::from_name(type_name)?);

        if let Some(default) = map.get("default") {
            check_default_matches(out.kind, default)?;
            out.default = Some(default.clone());
        }

        if let Some(enum_values) = map.get("enum") {
            let values = enum_values
                .as_array()
                .ok_or_else(|| SchemaError::InvalidStructure {
                    message: "'enum' must be an array".to_string(),
                })?;
            out.enum_values = Some(values.clone());
        }

        if let Some(required) = map.get("required") {
            let names = required
                .as_array()
                .ok_or_else(|| SchemaError::InvalidStructure {
                    message: "'required' must be an array of strings".to_string(),
                })?;
            for name in names {
                match name.as_str() {
                    Some(name) => out.required.push(name.to_string()),
                    None => {
                        return Err(SchemaError::InvalidStructure {
                            message: "'required' must be an array of strings".to_string(),
                        });
                    }
                }
            }
        }

        if let Some(properties) = map.get("properties") {
            let props = properties
                .as_object()
                .ok_or_else(|| SchemaError::InvalidStructure {
                    message: "'properties' must be an object".to_string(),
                })?;
            for (name, child) in props {
                out.properties
                    .insert(name.clone(), Structural::from_schema(child)?);
            }
        }

        if let Some(items) = map.get("items") {
            out.items = Some(Box::new(Structural::from_schema(items)?));
        }

        if let Some(additional) = map.get("additionalProperties") {
            // `additionalProperties: true/false` carries no defaulting
            // information; only a schema object matters here.
            if additional.is_object() {
                out.additional_properties = Some(Box::new(Structural::from_schema(additional)?));
            }
        }

        Ok(out)
    }

    /// Parse several schema documents and union their top-level property
    /// sets into one object schema.
    ///
    /// The same property declared in more than one schema is allowed only
    /// when the declarations are structurally identical; anything else is a
    /// configuration error.
    pub fn merged(schemas: &[&JsonValue]) -> SchemaResult<Self> {
        let mut out = Structural::empty(SchemaKind::Object);
        for schema in schemas {
            let parsed = Structural::from_schema(schema)?;
            if parsed.kind != SchemaKind::Object {
                return Err(SchemaError::InvalidStructure {
                    message: "merged schemas must be object schemas".to_string(),
                });
            }
            for (name, child) in parsed.properties {
                match out.properties.get(&name) {
                    None => {
                        out.properties.insert(name, child);
                    }
                    Some(existing) if *existing == child => {}
                    Some(_) => {
                        return Err(SchemaError::ConflictingProperty { property: name });
                    }
                }
            }
            for name in parsed.required {
                if !out.required.contains(&name) {
                    out.required.push(name);
                }
            }
            if let Some(additional) = parsed.additional_properties {
                out.additional_properties = Some(additional);
            }
        }
        Ok(out)
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Reject defaults whose JSON type contradicts the declared type.
fn check_default_matches(kind: SchemaKind, default: &JsonValue) -> SchemaResult<()> {
    let ok = match kind {
        SchemaKind::String => default.is_string(),
        SchemaKind::Integer => default.is_i64() || default.is_u64(),
        SchemaKind::Number => default.is_number(),
        SchemaKind::Boolean => default.is_boolean(),
        SchemaKind::Null => default.is_null(),
        SchemaKind::Object => default.is_object(),
        SchemaKind::Array => default.is_array(),
    };
    // A null default is an explicit "fill with null" and is allowed anywhere.
    if ok || default.is_null() {
        Ok(())
    } else {
        Err(SchemaError::MalformedDefault {
            field: String::new(),
            message: format!(
                "default {} does not match declared type",
                json_type_name(default)
            ),
        })
    }
}
