//! End-to-end pipeline tests: context precedence, base rendering, addon
//! creates and patches, and output determinism.

use manifold_render::{Pipeline, RenderError, RenderInput, RenderOptions};
use serde_json::json;

fn input(snapshot: serde_json::Value, overrides: Option<serde_json::Value>) -> RenderInput {
    RenderInput {
        snapshot: serde_json::from_value(snapshot).expect("valid snapshot"),
        overrides: overrides.map(|o| serde_json::from_value(o).expect("valid overrides")),
        metadata: serde_json::from_value(json!({
            "name": "checkout-prod",
            "namespace": "shop-prod",
            "labels": {"app": "checkout"},
            "annotations": {},
            "podSelectors": {"app": "checkout"}
        }))
        .unwrap(),
    }
}

fn web_snapshot() -> serde_json::Value {
    json!({
        "component": {
            "name": "checkout",
            "parameters": {"replicas": 5},
            "addons": [{"name": "annotator", "instanceId": "team", "config": {}}]
        },
        "componentTypeDefinition": {
            "schema": {
                "parameters": {
                    "type": "object",
                    "required": ["memory"],
                    "properties": {
                        "replicas": {"type": "integer", "default": 1},
                        "cpu": {"type": "string", "default": "100m"},
                        "memory": {"type": "string"}
                    }
                },
                "envOverrides": {
                    "type": "object",
                    "properties": {
                        "logLevel": {"type": "string", "default": "info"}
                    }
                }
            },
            "resources": [
                {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {"name": "${metadata.name}", "labels": "${metadata.labels}"},
                    "spec": {
                        "replicas": "${parameters.replicas}",
                        "template": {"spec": {"containers": [{
                            "name": "main",
                            "image": "${workload.containers.main.image}",
                            "resources": {"requests": {
                                "cpu": "${parameters.cpu}",
                                "memory": "${has(parameters.memory) ? parameters.memory : omit()}"
                            }}
                        }]}}
                    }
                },
                {
                    "apiVersion": "v1",
                    "kind": "Service",
                    "metadata": {"name": "${metadata.name}-svc"},
                    "spec": {"selector": "${metadata.podSelectors}"}
                }
            ]
        },
        "workload": {
            "name": "checkout",
            "containers": {"main": {"image": "registry.local/checkout:1.4.2"}}
        },
        "addons": [{
            "name": "annotator",
            "schema": {
                "parameters": {
                    "type": "object",
                    "properties": {
                        "entries": {
                            "type": "array",
                            "default": [{"name": "checkout-prod", "key": "team", "value": "payments"}],
                            "items": {"type": "object", "properties": {}}
                        }
                    }
                }
            },
            "creates": [{
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "${generateName(component.name, addon.instanceId)}"},
                "data": {"instance": "${addon.instanceId}"}
            }],
            "patches": [{
                "forEach": "${parameters.entries}",
                "var": "entry",
                "target": {
                    "kind": "Deployment",
                    "where": "${resource.metadata.name == entry.name}"
                },
                "operations": [{
                    "op": "mergeShallow",
                    "path": "/metadata/annotations",
                    "value": "${{entry.key: entry.value}}"
                }]
            }]
        }],
        "environment": "prod"
    })
}

#[test]
fn full_render_with_addon_creates_and_patches() {
    let output = Pipeline::new()
        .render(&input(web_snapshot(), None))
        .unwrap();

    assert_eq!(output.metadata.base_resource_count, 2);
    assert_eq!(output.metadata.addon_count, 1);
    assert_eq!(output.metadata.addon_resource_count, 1);
    assert_eq!(output.metadata.resource_count, 3);
    assert!(output.metadata.warnings.is_empty());

    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == json!("Deployment"))
        .expect("deployment rendered");
    // Component parameter beats the schema default.
    assert_eq!(deployment["spec"]["replicas"], json!(5));
    // Schema default fills the unset parameter before interpolation.
    let requests = &deployment["spec"]["template"]["spec"]["containers"][0]["resources"]["requests"];
    assert_eq!(requests["cpu"], json!("100m"));
    // Required-but-unset parameter was omitted, not rendered as null.
    assert!(requests.as_object().unwrap().get("memory").is_none());
    // Workload image flows through.
    assert_eq!(
        deployment["spec"]["template"]["spec"]["containers"][0]["image"],
        json!("registry.local/checkout:1.4.2")
    );
    // The addon's defaulted forEach patch annotated the deployment.
    assert_eq!(deployment["metadata"]["annotations"]["team"], json!("payments"));

    let configmap = output
        .resources
        .iter()
        .find(|r| r["kind"] == json!("ConfigMap"))
        .expect("addon create rendered");
    let name = configmap["metadata"]["name"].as_str().unwrap();
    assert!(name.starts_with("checkout-team-"));
    assert_eq!(configmap["data"]["instance"], json!("team"));
}

#[test]
fn env_overrides_take_precedence() {
    let output = Pipeline::new()
        .render(&input(
            web_snapshot(),
            Some(json!({"parameters": {"replicas": 2, "memory": "512Mi"}})),
        ))
        .unwrap();
    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == json!("Deployment"))
        .unwrap();
    assert_eq!(deployment["spec"]["replicas"], json!(2));
    assert_eq!(
        deployment["spec"]["template"]["spec"]["containers"][0]["resources"]["requests"]["memory"],
        json!("512Mi")
    );
}

#[test]
fn addon_overrides_reach_the_addon_context() {
    let output = Pipeline::new()
        .render(&input(
            web_snapshot(),
            Some(json!({
                "addonOverrides": {"annotator": {"team": {
                    "entries": [{"name": "checkout-prod", "key": "team", "value": "platform"}]
                }}}
            })),
        ))
        .unwrap();
    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == json!("Deployment"))
        .unwrap();
    assert_eq!(deployment["metadata"]["annotations"]["team"], json!("platform"));
}

#[test]
fn rendering_is_deterministic() {
    let pipeline = Pipeline::new();
    let a = pipeline.render(&input(web_snapshot(), None)).unwrap();
    let b = pipeline.render(&input(web_snapshot(), None)).unwrap();
    assert_eq!(
        serde_json::to_string(&a.resources).unwrap(),
        serde_json::to_string(&b.resources).unwrap()
    );
}

#[test]
fn mutating_one_resource_does_not_affect_inputs_or_siblings() {
    let render_input = input(web_snapshot(), None);
    let mut output = Pipeline::new().render(&render_input).unwrap();
    let before_second = output.resources[1].clone();
    output.resources[0].insert("mutated".to_string(), json!(true));
    assert_eq!(output.resources[1], before_second);
    // The input snapshot is untouched by rendering.
    assert_eq!(
        render_input.snapshot.component.parameters.get("replicas"),
        Some(&json!(5))
    );
}

#[test]
fn resource_labels_and_annotations_are_overlaid_everywhere() {
    let mut options = RenderOptions::default();
    options
        .resource_labels
        .insert("managed-by".to_string(), "manifold".to_string());
    let output = Pipeline::with_options(options)
        .render(&input(web_snapshot(), None))
        .unwrap();
    for resource in &output.resources {
        assert_eq!(
            resource["metadata"]["labels"]["managed-by"],
            json!("manifold"),
            "resource {:?} is missing the overlay label",
            resource["metadata"]["name"]
        );
    }
}

#[test]
fn validation_failure_aborts_with_no_partial_output() {
    let snapshot = json!({
        "component": {"name": "broken"},
        "componentTypeDefinition": {
            "resources": [
                {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "ok"}},
                {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {}}
            ]
        },
        "environment": "dev"
    });
    let err = Pipeline::new().render(&input(snapshot, None)).unwrap_err();
    assert!(matches!(err, RenderError::Validation { .. }));
}

#[test]
fn template_errors_carry_the_resource_identifier() {
    let snapshot = json!({
        "component": {"name": "broken"},
        "componentTypeDefinition": {
            "resources": [{
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "${1 + 'nope'}"}
            }]
        },
        "environment": "dev"
    });
    let err = Pipeline::new().render(&input(snapshot, None)).unwrap_err();
    match err {
        RenderError::Template { context, .. } => assert!(context.contains("ConfigMap")),
        other => panic!("expected template error, got {:?}", other),
    }
}
