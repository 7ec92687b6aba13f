//! Context assembly for component and addon rendering.
//!
//! A context is the set of named bindings the expression language sees
//! during one render: `parameters` (merged and defaulted), `workload`,
//! `component`, `environment`, `metadata`, and (for addon contexts)
//! `addon`.
//!
//! Parameter precedence, highest to lowest: environment-specific overrides,
//! instance/component-declared parameters, schema defaults.

use manifold_expr::Context;
use manifold_schema::{apply_defaults, Structural};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::error::{RenderError, RenderResult};
use crate::types::{
    AddonDefinition, AddonInstance, Component, EnvOverrides, NameMetadata, SchemaDefinition,
    Workload,
};

/// Build the evaluation context for rendering a component's base resources.
pub fn build_component_context(
    component: &Component,
    schema: &SchemaDefinition,
    workload: Option<&Workload>,
    environment: &str,
    overrides: Option<&EnvOverrides>,
    metadata: &NameMetadata,
) -> RenderResult<Context> {
    if component.name.is_empty() {
        return Err(RenderError::InvalidInput(
            "component name is empty".to_string(),
        ));
    }

    let structural = build_structural(schema)?;
    let mut parameters = deep_merge(
        component.parameters.clone(),
        overrides.map(|o| &o.parameters),
    );
    apply_defaults_to_map(&mut parameters, &structural);

    let mut ctx = Context::new();
    ctx.insert(
        "parameters",
        manifold_expr::Value::from_json(&JsonValue::Object(parameters)),
    );
    if let Some(workload) = workload {
        ctx.insert(
            "workload",
            manifold_expr::Value::from_json(&workload_tree(workload)),
        );
    }
    ctx.insert(
        "component",
        manifold_expr::Value::from_json(&component_tree(component)),
    );
    ctx.insert(
        "environment",
        manifold_expr::Value::String(environment.to_string()),
    );
    ctx.insert(
        "metadata",
        manifold_expr::Value::from_json(&metadata_tree(metadata)),
    );
    Ok(ctx)
}

/// Build the evaluation context for one addon instance.
pub fn build_addon_context(
    addon: &AddonDefinition,
    instance: &AddonInstance,
    component: &Component,
    environment: &str,
    overrides: Option<&EnvOverrides>,
    metadata: &NameMetadata,
) -> RenderResult<Context> {
    let structural = build_structural(&addon.schema)?;

    let instance_overrides = overrides.and_then(|o| {
        o.addon_overrides
            .get(&addon.name)
            .and_then(|per_instance| per_instance.get(&instance.instance_id))
    });
    let mut parameters = deep_merge(instance.config.clone(), instance_overrides);
    apply_defaults_to_map(&mut parameters, &structural);

    let mut ctx = Context::new();
    ctx.insert(
        "parameters",
        manifold_expr::Value::from_json(&JsonValue::Object(parameters)),
    );
    ctx.insert(
        "addon",
        manifold_expr::Value::from_json(&json!({
            "name": addon.name,
            "instanceId": instance.instance_id,
        })),
    );
    ctx.insert(
        "component",
        manifold_expr::Value::from_json(&component_tree(component)),
    );
    ctx.insert(
        "environment",
        manifold_expr::Value::String(environment.to_string()),
    );
    ctx.insert(
        "metadata",
        manifold_expr::Value::from_json(&metadata_tree(metadata)),
    );
    Ok(ctx)
}

/// Union the parameters and env-overrides schemas into one structural
/// schema. Either may be absent.
fn build_structural(schema: &SchemaDefinition) -> RenderResult<Structural> {
    let mut declared = Vec::new();
    if let Some(parameters) = &schema.parameters {
        declared.push(parameters);
    }
    if let Some(env_overrides) = &schema.env_overrides {
        declared.push(env_overrides);
    }
    Ok(Structural::merged(&declared)?)
}

fn apply_defaults_to_map(map: &mut JsonMap<String, JsonValue>, schema: &Structural) {
    let mut value = JsonValue::Object(std::mem::take(map));
    apply_defaults(&mut value, schema);
    if let JsonValue::Object(out) = value {
        *map = out;
    }
}

/// Recursive merge of two parameter trees. Mappings merge key-wise;
/// sequences and scalars from the override replace the base outright. The
/// result shares no structure with either input.
pub fn deep_merge(
    base: JsonMap<String, JsonValue>,
    overrides: Option<&JsonMap<String, JsonValue>>,
) -> JsonMap<String, JsonValue> {
    let mut result = base;
    let Some(overrides) = overrides else {
        return result;
    };
    for (key, value) in overrides {
        match (result.get_mut(key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                let merged = deep_merge(std::mem::take(existing), Some(incoming));
                *existing = merged;
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

fn component_tree(component: &Component) -> JsonValue {
    let mut tree = JsonMap::new();
    tree.insert("name".to_string(), json!(component.name));
    if let Some(namespace) = &component.namespace {
        tree.insert("namespace".to_string(), json!(namespace));
    }
    JsonValue::Object(tree)
}

fn workload_tree(workload: &Workload) -> JsonValue {
    let mut tree = JsonMap::new();
    if !workload.name.is_empty() {
        tree.insert("name".to_string(), json!(workload.name));
    }
    if !workload.containers.is_empty() {
        let mut containers = JsonMap::new();
        for (name, container) in &workload.containers {
            let mut entry = JsonMap::new();
            entry.insert("image".to_string(), json!(container.image));
            if !container.command.is_empty() {
                entry.insert("command".to_string(), json!(container.command));
            }
            if !container.args.is_empty() {
                entry.insert("args".to_string(), json!(container.args));
            }
            containers.insert(name.clone(), JsonValue::Object(entry));
        }
        tree.insert("containers".to_string(), JsonValue::Object(containers));
    }
    if let Some(endpoints) = &workload.endpoints {
        tree.insert("endpoints".to_string(), endpoints.clone());
    }
    if let Some(connections) = &workload.connections {
        tree.insert("connections".to_string(), connections.clone());
    }
    JsonValue::Object(tree)
}

fn metadata_tree(metadata: &NameMetadata) -> JsonValue {
    json!({
        "name": metadata.name,
        "namespace": metadata.namespace,
        "labels": metadata.labels,
        "annotations": metadata.annotations,
        "podSelectors": metadata.pod_selectors,
    })
}
