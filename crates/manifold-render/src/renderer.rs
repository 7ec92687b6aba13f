//! Resource rendering.
//!
//! Applies the template engine to each resource template of a component
//! type (or an addon's creates): evaluates `includeWhen` gates, expands
//! `forEach` iterations, interpolates the template body, prunes omit
//! sentinels, validates resource identity, and overlays render-option
//! labels and annotations.

use manifold_expr::{is_missing_data, Context, Engine, Value};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::types::{RenderOptions, Resource, ResourceTemplate};

/// Default binding name for `forEach` loop variables.
pub const DEFAULT_LOOP_VAR: &str = "item";

/// Render a list of resource templates under a context.
///
/// Emitted resources follow template declaration order; a `forEach`
/// expansion preserves the order of its iteration sequence. The caller's
/// context is never mutated: iterations bind their loop variable in a
/// cloned context.
pub fn render_resources(
    engine: &Engine,
    templates: &[ResourceTemplate],
    ctx: &Context,
    options: &RenderOptions,
) -> RenderResult<Vec<Resource>> {
    let mut resources = Vec::new();
    for (index, template) in templates.iter().enumerate() {
        let id = template_id(template, index);

        match &template.for_each {
            None => {
                let mut scope = ctx.clone();
                if include(engine, template, &mut scope, &id)? {
                    resources.push(render_one(engine, template, &mut scope, options, &id)?);
                }
            }
            Some(for_each) => {
                let items = eval_for_each(engine, for_each, &mut ctx.clone(), &id)?;
                let var = template.var.as_deref().unwrap_or(DEFAULT_LOOP_VAR);
                debug!(template = %id, items = items.len(), "expanding forEach");
                for item in items {
                    let mut scope = ctx.clone();
                    scope.insert(var, item);
                    if include(engine, template, &mut scope, &id)? {
                        resources.push(render_one(engine, template, &mut scope, options, &id)?);
                    }
                }
            }
        }
    }
    Ok(resources)
}

/// Evaluate a template's `includeWhen` gate. Missing data skips the
/// template; a non-boolean result is an error.
fn include(
    engine: &Engine,
    template: &ResourceTemplate,
    ctx: &mut Context,
    id: &str,
) -> RenderResult<bool> {
    let Some(include_when) = &template.include_when else {
        return Ok(true);
    };
    let value = match engine.render_string(include_when, ctx) {
        Ok(value) => value,
        Err(err) if is_missing_data(&err) => {
            debug!(template = %id, "includeWhen references missing data, skipping");
            return Ok(false);
        }
        Err(err) => {
            return Err(RenderError::Template {
                context: format!("{} includeWhen", id),
                source: err,
            });
        }
    };
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RenderError::Validation {
            resource: id.to_string(),
            message: format!(
                "includeWhen must evaluate to a boolean, got {}",
                other.type_name()
            ),
        }),
    }
}

fn eval_for_each(
    engine: &Engine,
    for_each: &str,
    ctx: &mut Context,
    id: &str,
) -> RenderResult<Vec<Value>> {
    let value = engine
        .render_string(for_each, ctx)
        .map_err(|err| RenderError::Template {
            context: format!("{} forEach", id),
            source: err,
        })?;
    match value {
        Value::List(items) => Ok(items),
        other => Err(RenderError::Validation {
            resource: id.to_string(),
            message: format!(
                "forEach must evaluate to a list, got {}",
                other.type_name()
            ),
        }),
    }
}

/// Interpolate one template body, prune, validate, and overlay labels and
/// annotations.
fn render_one(
    engine: &Engine,
    template: &ResourceTemplate,
    ctx: &mut Context,
    options: &RenderOptions,
    id: &str,
) -> RenderResult<Resource> {
    let body = JsonValue::Object(template.body.clone());
    let rendered = engine
        .render_pruned(&body, ctx)
        .map_err(|err| RenderError::Template {
            context: id.to_string(),
            source: err,
        })?;

    let mut resource = match rendered.into_json() {
        JsonValue::Object(map) => map,
        other => {
            return Err(RenderError::Validation {
                resource: id.to_string(),
                message: format!("template must render to an object, got {}", json_kind(&other)),
            });
        }
    };

    if options.enable_validation {
        validate_identity(&resource, id)?;
    }
    overlay_metadata(&mut resource, options);
    Ok(resource)
}

/// Minimum validation: `apiVersion`, `kind` and `metadata.name` must be
/// present and non-empty.
fn validate_identity(resource: &Resource, id: &str) -> RenderResult<()> {
    let missing = |field: &str| RenderError::Validation {
        resource: id.to_string(),
        message: format!("rendered resource is missing {}", field),
    };
    let non_empty = |field: &str| {
        resource
            .get(field)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
    };
    if non_empty("apiVersion").is_none() {
        return Err(missing("apiVersion"));
    }
    if non_empty("kind").is_none() {
        return Err(missing("kind"));
    }
    let name = resource
        .get("metadata")
        .and_then(JsonValue::as_object)
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty());
    if name.is_none() {
        return Err(missing("metadata.name"));
    }
    Ok(())
}

/// Overlay render-option labels and annotations onto `metadata`, creating
/// the containers as needed. Option-supplied entries win over rendered ones.
fn overlay_metadata(resource: &mut Resource, options: &RenderOptions) {
    if options.resource_labels.is_empty() && options.resource_annotations.is_empty() {
        return;
    }
    let metadata = resource
        .entry("metadata".to_string())
        .or_insert_with(|| JsonValue::Object(Default::default()));
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    for (target, entries) in [
        ("labels", &options.resource_labels),
        ("annotations", &options.resource_annotations),
    ] {
        if entries.is_empty() {
            continue;
        }
        let container = metadata
            .entry(target.to_string())
            .or_insert_with(|| JsonValue::Object(Default::default()));
        if let Some(container) = container.as_object_mut() {
            for (key, value) in entries {
                container.insert(key.clone(), JsonValue::String(value.clone()));
            }
        }
    }
}

/// Identify a template for error messages: its kind plus position.
fn template_id(template: &ResourceTemplate, index: usize) -> String {
    let kind = template
        .body
        .get("kind")
        .and_then(JsonValue::as_str)
        .unwrap_or("resource");
    format!("{}[{}]", kind, index)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(value: serde_json::Value) -> ResourceTemplate {
        serde_json::from_value(value).expect("valid template")
    }

    fn ctx(json: serde_json::Value) -> Context {
        Context::from_json(json.as_object().expect("object context"))
    }

    fn render(
        templates: &[ResourceTemplate],
        context: serde_json::Value,
        options: &RenderOptions,
    ) -> RenderResult<Vec<Resource>> {
        let engine = Engine::new();
        render_resources(&engine, templates, &ctx(context), options)
    }

    fn deployment_template() -> ResourceTemplate {
        template(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "${metadata.name}"},
            "spec": {"replicas": "${parameters.replicas}"}
        }))
    }

    fn base_context() -> serde_json::Value {
        json!({
            "metadata": {"name": "web"},
            "parameters": {"replicas": 3}
        })
    }

    #[test]
    fn renders_with_native_types() {
        let resources = render(
            &[deployment_template()],
            base_context(),
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["spec"]["replicas"], json!(3));
    }

    #[test]
    fn empty_template_list_renders_nothing() {
        let resources = render(&[], base_context(), &RenderOptions::default()).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn include_when_false_skips() {
        let mut t = deployment_template();
        t.include_when = Some("${parameters.replicas > 5}".to_string());
        let resources = render(&[t], base_context(), &RenderOptions::default()).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn include_when_missing_data_skips() {
        let mut t = deployment_template();
        t.include_when = Some("${parameters.enabled}".to_string());
        let resources = render(&[t], base_context(), &RenderOptions::default()).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn include_when_non_boolean_is_an_error() {
        let mut t = deployment_template();
        t.include_when = Some("${parameters.replicas}".to_string());
        let err = render(&[t], base_context(), &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, RenderError::Validation { .. }));
    }

    #[test]
    fn for_each_produces_one_resource_per_element_in_order() {
        let t = template(json!({
            "forEach": "${parameters.queues}",
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "${metadata.name}-${item.name}"},
            "data": {"queue": "${item.name}"}
        }));
        let resources = render(
            &[t],
            json!({
                "metadata": {"name": "worker"},
                "parameters": {"queues": [{"name": "high"}, {"name": "low"}]}
            }),
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0]["metadata"]["name"], json!("worker-high"));
        assert_eq!(resources[1]["metadata"]["name"], json!("worker-low"));
    }

    #[test]
    fn for_each_over_empty_list_renders_nothing() {
        let t = template(json!({
            "forEach": "${parameters.queues}",
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "${item}"}
        }));
        let resources = render(
            &[t],
            json!({"parameters": {"queues": []}}),
            &RenderOptions::default(),
        )
        .unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn for_each_supports_custom_variable_and_per_iteration_include_when() {
        let t = template(json!({
            "forEach": "${parameters.queues}",
            "var": "queue",
            "includeWhen": "${queue.enabled}",
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "${queue.name}"}
        }));
        let resources = render(
            &[t],
            json!({"parameters": {"queues": [
                {"name": "high", "enabled": true},
                {"name": "low", "enabled": false}
            ]}}),
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["metadata"]["name"], json!("high"));
    }

    #[test]
    fn for_each_non_list_is_an_error() {
        let t = template(json!({
            "forEach": "${parameters.replicas}",
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "x"}
        }));
        let err = render(&[t], base_context(), &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, RenderError::Validation { .. }));
    }

    #[test]
    fn omitted_fields_are_pruned_from_output() {
        let t = template(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "annotations": "${has(parameters.notes) ? parameters.notes : omit()}"
            }
        }));
        let resources = render(
            &[t],
            json!({"parameters": {}}),
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(resources[0]["metadata"], json!({"name": "web"}));
    }

    #[test]
    fn validation_catches_missing_identity() {
        let t = template(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {}
        }));
        let err = render(&[t], json!({}), &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, RenderError::Validation { .. }));

        // With validation disabled the same template renders.
        let t = template(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {}
        }));
        let options = RenderOptions {
            enable_validation: false,
            ..Default::default()
        };
        assert!(render(&[t], json!({}), &options).is_ok());
    }

    #[test]
    fn overlay_labels_and_annotations() {
        let mut options = RenderOptions::default();
        options
            .resource_labels
            .insert("managed-by".to_string(), "manifold".to_string());
        options
            .resource_annotations
            .insert("rendered".to_string(), "true".to_string());

        let t = template(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"app": "web"}}
        }));
        let resources = render(&[t], json!({}), &options).unwrap();
        assert_eq!(
            resources[0]["metadata"]["labels"],
            json!({"app": "web", "managed-by": "manifold"})
        );
        assert_eq!(
            resources[0]["metadata"]["annotations"],
            json!({"rendered": "true"})
        );
    }

    #[test]
    fn outer_context_is_not_mutated_by_for_each() {
        let engine = Engine::new();
        let context = ctx(json!({"parameters": {"queues": [{"name": "a"}]}}));
        let t = template(json!({
            "forEach": "${parameters.queues}",
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "${item.name}"}
        }));
        render_resources(&engine, &[t], &context, &RenderOptions::default()).unwrap();
        assert!(context.get(DEFAULT_LOOP_VAR).is_none());
    }
}
