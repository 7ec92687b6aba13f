//! Pipeline orchestration.
//!
//! Sequences one complete render: component context → base resources →
//! per-addon (context → creates → patches) → duplicate-name warnings →
//! strict-mode upgrade → deterministic sort → output metadata.

use std::collections::HashSet;

use manifold_expr::Engine;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::context::{build_addon_context, build_component_context};
use crate::error::{RenderError, RenderResult};
use crate::patch::apply_spec;
use crate::renderer::render_resources;
use crate::types::{
    AddonDefinition, RenderInput, RenderMetadata, RenderOptions, RenderOutput, Resource,
};

/// Renders component snapshots into resource manifests.
///
/// A pipeline owns the compiled-expression cache, so reusing one instance
/// across renders amortizes expression compilation. Rendering is
/// synchronous and touches no I/O; concurrent renders need only their own
/// input trees.
#[derive(Debug, Default)]
pub struct Pipeline {
    engine: Engine,
    options: RenderOptions,
}

impl Pipeline {
    /// Create a pipeline with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline with explicit options.
    pub fn with_options(options: RenderOptions) -> Self {
        Pipeline {
            engine: Engine::new(),
            options,
        }
    }

    /// Render a component snapshot into the full resource list.
    ///
    /// No partial output: any failure aborts the render. Within the output,
    /// resources are sorted by `(apiVersion, kind, namespace, name)` so the
    /// same inputs always produce the same bytes.
    pub fn render(&self, input: &RenderInput) -> RenderResult<RenderOutput> {
        let snapshot = &input.snapshot;
        let component = &snapshot.component;
        let mut warnings = Vec::new();

        let component_ctx = build_component_context(
            component,
            &snapshot.component_type_definition.schema,
            snapshot.workload.as_ref(),
            &snapshot.environment,
            input.overrides.as_ref(),
            &input.metadata,
        )?;

        let mut resources = render_resources(
            &self.engine,
            &snapshot.component_type_definition.resources,
            &component_ctx,
            &self.options,
        )?;
        let base_resource_count = resources.len();
        debug!(count = base_resource_count, "rendered base resources");

        let mut addon_resource_count = 0;
        for instance in &component.addons {
            let addon = find_addon(&snapshot.addons, &instance.name)?;
            let mut addon_ctx = build_addon_context(
                addon,
                instance,
                component,
                &snapshot.environment,
                input.overrides.as_ref(),
                &input.metadata,
            )?;

            let creates =
                render_resources(&self.engine, &addon.creates, &addon_ctx, &self.options)?;
            addon_resource_count += creates.len();
            resources.extend(creates);

            for (index, patch) in addon.patches.iter().enumerate() {
                apply_spec(&mut resources, patch, &self.engine, &mut addon_ctx, true).map_err(
                    |source| RenderError::Patch {
                        patch: format!("{}/{}[{}]", addon.name, instance.instance_id, index),
                        source,
                    },
                )?;
            }
            debug!(
                addon = %addon.name,
                instance = %instance.instance_id,
                "applied addon"
            );
        }

        collect_duplicate_warnings(&resources, &mut warnings);
        for warning in &warnings {
            warn!(%warning, "render warning");
        }
        if self.options.strict_mode && !warnings.is_empty() {
            return Err(RenderError::Validation {
                resource: component.name.clone(),
                message: format!("strict mode: {}", warnings.join("; ")),
            });
        }

        sort_resources(&mut resources);

        let metadata = RenderMetadata {
            resource_count: resources.len(),
            base_resource_count,
            addon_count: component.addons.len(),
            addon_resource_count,
            warnings,
        };
        Ok(RenderOutput {
            resources,
            metadata,
        })
    }
}

/// Look up an addon definition by name. The snapshot is supposed to be a
/// complete closure of the component's dependencies, so a dangling
/// reference is an input error.
fn find_addon<'a>(addons: &'a [AddonDefinition], name: &str) -> RenderResult<&'a AddonDefinition> {
    addons
        .iter()
        .find(|addon| addon.name == name)
        .ok_or_else(|| {
            RenderError::InvalidInput(format!("addon {:?} is not present in the snapshot", name))
        })
}

/// Warn about resources that would collide on apply: same kind, namespace
/// and name.
fn collect_duplicate_warnings(resources: &[Resource], warnings: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for resource in resources {
        let kind = field(resource, &["kind"]);
        let namespace = field(resource, &["metadata", "namespace"]);
        let name = field(resource, &["metadata", "name"]);
        if name.is_empty() {
            continue;
        }
        let key = (kind.to_string(), namespace.to_string(), name.to_string());
        if !seen.insert(key) {
            warnings.push(format!(
                "duplicate resource {}/{} in namespace {:?}",
                kind, name, namespace
            ));
        }
    }
}

/// Deterministic output order: `(apiVersion, kind, namespace, name)`,
/// lexicographically.
fn sort_resources(resources: &mut [Resource]) {
    resources.sort_by(|a, b| {
        let key = |r: &Resource| {
            (
                field(r, &["apiVersion"]).to_string(),
                field(r, &["kind"]).to_string(),
                field(r, &["metadata", "namespace"]).to_string(),
                field(r, &["metadata", "name"]).to_string(),
            )
        };
        key(a).cmp(&key(b))
    });
}

fn field<'a>(resource: &'a Resource, path: &[&str]) -> &'a str {
    let mut current: Option<&JsonValue> = resource.get(path[0]);
    for segment in &path[1..] {
        current = current
            .and_then(JsonValue::as_object)
            .and_then(|map| map.get(*segment));
    }
    current.and_then(JsonValue::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(snapshot: serde_json::Value) -> RenderInput {
        RenderInput {
            snapshot: serde_json::from_value(snapshot).expect("valid snapshot"),
            overrides: None,
            metadata: serde_json::from_value(json!({
                "name": "checkout-prod",
                "namespace": "shop-prod"
            }))
            .unwrap(),
        }
    }

    fn minimal_snapshot() -> serde_json::Value {
        json!({
            "component": {"name": "checkout"},
            "componentTypeDefinition": {
                "resources": [{
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {"name": "${metadata.name}"}
                }]
            },
            "environment": "prod"
        })
    }

    #[test]
    fn renders_base_resources() {
        let output = Pipeline::new().render(&input(minimal_snapshot())).unwrap();
        assert_eq!(output.resources.len(), 1);
        assert_eq!(output.metadata.base_resource_count, 1);
        assert_eq!(output.metadata.addon_count, 0);
        assert_eq!(
            output.resources[0]["metadata"]["name"],
            json!("checkout-prod")
        );
    }

    #[test]
    fn empty_template_list_gives_empty_output() {
        let output = Pipeline::new()
            .render(&input(json!({
                "component": {"name": "checkout"},
                "componentTypeDefinition": {},
                "environment": "prod"
            })))
            .unwrap();
        assert!(output.resources.is_empty());
        assert_eq!(output.metadata.resource_count, 0);
    }

    #[test]
    fn unknown_addon_is_an_input_error() {
        let err = Pipeline::new()
            .render(&input(json!({
                "component": {
                    "name": "checkout",
                    "addons": [{"name": "ghost", "instanceId": "main"}]
                },
                "componentTypeDefinition": {},
                "environment": "prod"
            })))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidInput(_)));
    }

    #[test]
    fn output_is_sorted_deterministically() {
        let output = Pipeline::new()
            .render(&input(json!({
                "component": {"name": "c"},
                "componentTypeDefinition": {
                    "resources": [
                        {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc-b"}},
                        {"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "dep"}},
                        {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc-a"}}
                    ]
                },
                "environment": "dev"
            })))
            .unwrap();
        let names: Vec<_> = output
            .resources
            .iter()
            .map(|r| r["metadata"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["dep", "svc-a", "svc-b"]);
    }

    #[test]
    fn duplicate_names_warn_and_strict_mode_fails() {
        let snapshot = json!({
            "component": {"name": "c"},
            "componentTypeDefinition": {
                "resources": [
                    {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "same"}},
                    {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "same"}}
                ]
            },
            "environment": "dev"
        });

        let output = Pipeline::new().render(&input(snapshot.clone())).unwrap();
        assert_eq!(output.metadata.warnings.len(), 1);
        assert_eq!(output.resources.len(), 2);

        let strict = Pipeline::with_options(RenderOptions {
            strict_mode: true,
            ..Default::default()
        });
        let err = strict.render(&input(snapshot)).unwrap_err();
        assert!(matches!(err, RenderError::Validation { .. }));
    }
}
