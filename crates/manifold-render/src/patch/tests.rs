use super::*;
use manifold_expr::Engine;
use serde_json::json;

fn resource(value: serde_json::Value) -> Resource {
    match value {
        JsonValue::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn operation(value: serde_json::Value) -> PatchOperation {
    serde_json::from_value(value).expect("valid operation")
}

fn spec(value: serde_json::Value) -> PatchSpec {
    serde_json::from_value(value).expect("valid spec")
}

fn apply_ops(initial: serde_json::Value, operations: &[serde_json::Value]) -> Resource {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(initial);
    for op in operations {
        apply_operation(&mut target, &operation(op.clone()), &engine, &mut ctx)
            .expect("operation failed");
    }
    target
}

#[test]
fn add_env_entry_via_array_filter() {
    let result = apply_ops(
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "image": "app:v1", "env": [{"name": "A", "value": "1"}]}
            ]}}}
        }),
        &[json!({
            "op": "add",
            "path": "/spec/template/spec/containers/[?(@.name=='app')]/env/-",
            "value": {"name": "B", "value": "2"}
        })],
    );
    assert_eq!(
        result["spec"]["template"]["spec"]["containers"][0]["env"],
        json!([{"name": "A", "value": "1"}, {"name": "B", "value": "2"}])
    );
}

#[test]
fn replace_image_using_index_path() {
    let result = apply_ops(
        json!({"spec": {"template": {"spec": {"containers": [{"name": "app", "image": "app:v1"}]}}}}),
        &[json!({
            "op": "replace",
            "path": "/spec/template/spec/containers/0/image",
            "value": "app:v2"
        })],
    );
    assert_eq!(
        result["spec"]["template"]["spec"]["containers"][0]["image"],
        json!("app:v2")
    );
}

#[test]
fn remove_first_env_entry() {
    let result = apply_ops(
        json!({"spec": {"template": {"spec": {"containers": [
            {"name": "app", "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}]}
        ]}}}}),
        &[json!({
            "op": "remove",
            "path": "/spec/template/spec/containers/[?(@.name=='app')]/env/0"
        })],
    );
    assert_eq!(
        result["spec"]["template"]["spec"]["containers"][0]["env"],
        json!([{"name": "B", "value": "2"}])
    );
}

#[test]
fn merge_shallow_keeps_siblings() {
    let result = apply_ops(
        json!({"spec": {"template": {"metadata": {"annotations": {"existing": "true"}}}}}),
        &[json!({
            "op": "mergeShallow",
            "path": "/spec/template/metadata/annotations",
            "value": {"platform": "enabled"}
        })],
    );
    assert_eq!(
        result["spec"]["template"]["metadata"]["annotations"],
        json!({"existing": "true", "platform": "enabled"})
    );
}

#[test]
fn merge_shallow_replaces_nested_maps() {
    let result = apply_ops(
        json!({"spec": {"template": {"metadata": {"annotations": {
            "nested": {"keep": "retained"},
            "sibling": "present"
        }}}}}),
        &[json!({
            "op": "mergeShallow",
            "path": "/spec/template/metadata/annotations",
            "value": {"nested": {"added": "new"}}
        })],
    );
    assert_eq!(
        result["spec"]["template"]["metadata"]["annotations"],
        json!({"nested": {"added": "new"}, "sibling": "present"})
    );
}

#[test]
fn merge_shallow_at_root_pointer() {
    let result = apply_ops(
        json!({"a": {"x": 1, "y": 2}, "b": 3}),
        &[json!({"op": "mergeShallow", "path": "", "value": {"a": {"z": 3}}})],
    );
    assert_eq!(JsonValue::Object(result), json!({"a": {"z": 3}, "b": 3}));
}

#[test]
fn merge_shallow_requires_object_value() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(json!({}));
    let err = apply_operation(
        &mut target,
        &operation(json!({"op": "mergeShallow", "path": "/a", "value": [1, 2]})),
        &engine,
        &mut ctx,
    )
    .unwrap_err();
    assert!(matches!(err, PatchError::TypeMismatch { .. }));
}

#[test]
fn merge_shallow_auto_creates_missing_parents() {
    let result = apply_ops(
        json!({}),
        &[json!({
            "op": "mergeShallow",
            "path": "/metadata/annotations",
            "value": {"team": "platform"}
        })],
    );
    assert_eq!(
        JsonValue::Object(result),
        json!({"metadata": {"annotations": {"team": "platform"}}})
    );
}

#[test]
fn test_op_success_then_failure() {
    let result = apply_ops(
        json!({"spec": {"template": {"metadata": {"annotations": {"existing": "true"}}}}}),
        &[
            json!({"op": "test", "path": "/spec/template/metadata/annotations/existing", "value": "true"}),
            json!({"op": "replace", "path": "/spec/template/metadata/annotations/existing", "value": "updated"}),
        ],
    );
    assert_eq!(
        result["spec"]["template"]["metadata"]["annotations"]["existing"],
        json!("updated")
    );

    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(json!({"spec": {"flag": "true"}}));
    let err = apply_operation(
        &mut target,
        &operation(json!({"op": "test", "path": "/spec/flag", "value": "false"})),
        &engine,
        &mut ctx,
    )
    .unwrap_err();
    assert!(matches!(err, PatchError::TestFailed { .. }));
}

#[test]
fn filter_fans_out_to_multiple_containers() {
    let result = apply_ops(
        json!({"spec": {"template": {"spec": {"containers": [
            {"name": "app", "role": "worker", "env": []},
            {"name": "log", "role": "worker", "env": []}
        ]}}}}),
        &[json!({
            "op": "add",
            "path": "/spec/template/spec/containers/[?(@.role=='worker')]/env/-",
            "value": {"name": "S", "value": "1"}
        })],
    );
    let containers = result["spec"]["template"]["spec"]["containers"]
        .as_array()
        .unwrap();
    for container in containers {
        assert_eq!(container["env"], json!([{"name": "S", "value": "1"}]));
    }
}

#[test]
fn filter_matching_nothing_is_a_no_op() {
    let initial = json!({"spec": {"containers": [{"name": "app"}]}});
    let result = apply_ops(
        initial.clone(),
        &[json!({
            "op": "add",
            "path": "/spec/containers/[?(@.name=='ghost')]/env/-",
            "value": {"name": "X"}
        })],
    );
    assert_eq!(JsonValue::Object(result), initial);
}

#[test]
fn add_auto_creates_object_and_array_parents() {
    let result = apply_ops(
        json!({}),
        &[json!({
            "op": "add",
            "path": "/spec/template/metadata/finalizers/-",
            "value": "cleanup"
        })],
    );
    assert_eq!(
        JsonValue::Object(result),
        json!({"spec": {"template": {"metadata": {"finalizers": ["cleanup"]}}}})
    );
}

#[test]
fn add_refuses_to_auto_create_numeric_index() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(json!({}));
    let err = apply_operation(
        &mut target,
        &operation(json!({"op": "add", "path": "/spec/containers/0/env", "value": []})),
        &engine,
        &mut ctx,
    )
    .unwrap_err();
    assert!(matches!(err, PatchError::AutoCreateRefused { .. }));
}

#[test]
fn move_and_copy_operations() {
    let result = apply_ops(
        json!({"spec": {"old": "value", "keep": 1}}),
        &[json!({"op": "move", "from": "/spec/old", "path": "/spec/new"})],
    );
    assert_eq!(result["spec"], json!({"keep": 1, "new": "value"}));

    let result = apply_ops(
        json!({"spec": {"source": {"a": 1}}}),
        &[json!({"op": "copy", "from": "/spec/source", "path": "/spec/duplicate"})],
    );
    assert_eq!(result["spec"]["duplicate"], json!({"a": 1}));
    assert_eq!(result["spec"]["source"], json!({"a": 1}));
}

#[test]
fn move_without_from_is_invalid() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(json!({"a": 1}));
    let err = apply_operation(
        &mut target,
        &operation(json!({"op": "move", "path": "/b"})),
        &engine,
        &mut ctx,
    )
    .unwrap_err();
    assert!(matches!(err, PatchError::InvalidPath { .. }));
}

#[test]
fn unknown_op_is_rejected() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut target = resource(json!({}));
    let err = apply_operation(
        &mut target,
        &operation(json!({"op": "strategicMerge", "path": "/a", "value": {}})),
        &engine,
        &mut ctx,
    )
    .unwrap_err();
    assert!(matches!(err, PatchError::UnknownOp(_)));
}

#[test]
fn path_and_value_are_rendered_before_execution() {
    let engine = Engine::new();
    let mut ctx = Context::from_json(
        json!({"parameters": {"container": "app", "tag": "v2"}})
            .as_object()
            .unwrap(),
    );
    let mut target = resource(json!({"spec": {"containers": [
        {"name": "app", "image": "app:v1"}
    ]}}));
    apply_operation(
        &mut target,
        &operation(json!({
            "op": "replace",
            "path": "/spec/containers/[?(@.name=='${parameters.container}')]/image",
            "value": "app:${parameters.tag}"
        })),
        &engine,
        &mut ctx,
    )
    .unwrap();
    assert_eq!(target["spec"]["containers"][0]["image"], json!("app:v2"));
}

// --- apply_spec ------------------------------------------------------------

fn deployments() -> Vec<Resource> {
    vec![
        resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "api", "annotations": {"owner": "platform"}}
        })),
        resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "worker", "annotations": {"owner": "ops"}}
        })),
    ]
}

#[test]
fn for_each_with_where_patches_each_matching_resource() {
    let engine = Engine::new();
    let mut ctx = Context::from_json(
        json!({"parameters": {"addons": [
            {"name": "api", "key": "team", "value": "platform"},
            {"name": "worker", "key": "team", "value": "ops"}
        ]}})
        .as_object()
        .unwrap(),
    );
    let mut resources = deployments();

    let spec = spec(json!({
        "forEach": "${parameters.addons}",
        "var": "addon",
        "target": {
            "kind": "Deployment",
            "where": "${resource.metadata.name == addon.name}"
        },
        "operations": [{
            "op": "mergeShallow",
            "path": "/metadata/annotations",
            "value": "${{addon.key: addon.value}}"
        }]
    }));

    apply_spec(&mut resources, &spec, &engine, &mut ctx, true).unwrap();

    assert_eq!(
        resources[0]["metadata"]["annotations"],
        json!({"owner": "platform", "team": "platform"})
    );
    assert_eq!(
        resources[1]["metadata"]["annotations"],
        json!({"owner": "ops", "team": "ops"})
    );
    // Iteration bindings are gone afterwards.
    assert!(ctx.get("addon").is_none());
    assert!(ctx.get("resource").is_none());
}

#[test]
fn lenient_mode_skips_resources_with_missing_data() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut resources = vec![
        resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "api", "labels": {"tier": "backend"}}
        })),
        resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "worker"}
        })),
    ];

    // The where clause reads a label the second resource does not have.
    let spec = spec(json!({
        "target": {"where": "${resource.metadata.labels.tier == 'backend'}"},
        "operations": [{
            "op": "add",
            "path": "/metadata/annotations/patched",
            "value": "yes"
        }]
    }));

    apply_spec(&mut resources, &spec, &engine, &mut ctx, true).unwrap();
    assert_eq!(resources[0]["metadata"]["annotations"]["patched"], json!("yes"));
    assert!(resources[1]["metadata"].get("annotations").is_none());

    // Without leniency the same spec fails.
    let mut resources = vec![resource(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "worker"}
    }))];
    let err = apply_spec(&mut resources, &spec, &engine, &mut ctx, false).unwrap_err();
    assert!(err.is_missing_data());
}

#[test]
fn bindings_are_restored_after_failures() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    ctx.insert("item", manifold_expr::Value::String("outer".into()));

    let mut resources = vec![resource(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "cm"}
    }))];

    // Second iteration fails with a hard (non-missing-data) error.
    let spec = spec(json!({
        "forEach": "${[1, 2]}",
        "target": {},
        "operations": [{"op": "test", "path": "/metadata/name", "value": "other"}]
    }));

    let err = apply_spec(&mut resources, &spec, &engine, &mut ctx, true).unwrap_err();
    assert!(matches!(err, PatchError::TestFailed { .. }));
    assert_eq!(
        ctx.get("item"),
        Some(&manifold_expr::Value::String("outer".into()))
    );
    assert!(ctx.get("resource").is_none());
}

#[test]
fn empty_operations_list_is_a_no_op() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    let mut resources = deployments();
    let before = resources.clone();
    let spec = spec(json!({"target": {"kind": "Deployment"}, "operations": []}));
    apply_spec(&mut resources, &spec, &engine, &mut ctx, true).unwrap();
    assert_eq!(resources, before);
}

#[test]
fn target_filters_by_kind_group_version_and_name() {
    let resources = vec![
        resource(json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "api"}})),
        resource(json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "api"}})),
        resource(json!({"apiVersion": "batch/v1", "kind": "Job", "metadata": {"name": "migrate"}})),
    ];

    let target = |value: serde_json::Value| -> TargetSpec {
        serde_json::from_value(value).unwrap()
    };

    assert_eq!(
        find_target_indices(&resources, &target(json!({"kind": "Deployment"}))),
        vec![0]
    );
    assert_eq!(
        find_target_indices(&resources, &target(json!({"version": "v1"}))),
        vec![0, 1, 2]
    );
    assert_eq!(
        find_target_indices(&resources, &target(json!({"name": "api"}))),
        vec![0, 1]
    );
    assert_eq!(
        find_target_indices(&resources, &target(json!({"group": "batch", "name": "migrate"}))),
        vec![2]
    );
    assert_eq!(
        find_target_indices(&resources, &target(json!({}))),
        vec![0, 1, 2]
    );
}

#[test]
fn split_api_version_cases() {
    assert_eq!(split_api_version("apps/v1"), ("apps", "v1"));
    assert_eq!(split_api_version("v1"), ("", "v1"));
    assert_eq!(split_api_version(""), ("", ""));
}
