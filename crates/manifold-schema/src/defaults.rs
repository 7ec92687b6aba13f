//! Schema-driven defaulting.
//!
//! Fills absent (or null) declared fields with their schema defaults,
//! recursively through nested objects, per-item through arrays, and through
//! additional-property maps. Defaults are deep copies (JSON clones) and
//! are never shared between instances. Defaulting is idempotent.
//!
//! Required-ness is not enforced here; that belongs to a validator.

use serde_json::Value as JsonValue;

use crate::structural::Structural;

/// Apply schema defaults to a value tree in place.
pub fn apply_defaults(value: &mut JsonValue, schema: &Structural) {
    if let Some(map) = value.as_object_mut() {
        for (name, child_schema) in &schema.properties {
            let absent = match map.get(name) {
                None => true,
                Some(JsonValue::Null) => true,
                Some(_) => false,
            };
            if absent {
                if let Some(default) = &child_schema.default {
                    map.insert(name.clone(), default.clone());
                }
            }
            if let Some(child) = map.get_mut(name) {
                apply_defaults(child, child_schema);
            }
        }
        if let Some(additional) = &schema.additional_properties {
            for (name, child) in map.iter_mut() {
                if !schema.properties.contains_key(name) {
                    apply_defaults(child, additional);
                }
            }
        }
    } else if let Some(items) = value.as_array_mut() {
        if let Some(item_schema) = &schema.items {
            for item in items {
                apply_defaults(item, item_schema);
            }
        }
    }
}
