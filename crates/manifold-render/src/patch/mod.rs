//! Patch engine.
//!
//! Applies addon patch specifications to rendered resources: target
//! filtering by kind/group/version/name, an optional `where` predicate with
//! the candidate bound as `resource`, optional `forEach` iteration, and an
//! ordered list of operations. Operations are RFC 6902 (`add`, `replace`,
//! `remove`, `test`, `move`, `copy`) executed through the `json-patch`
//! crate after path expansion, plus the `mergeShallow` extension and parent
//! auto-creation for `add`, which live here.

mod path;

pub use path::expand_paths;

use manifold_expr::{Context, Engine, Value};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::error::PatchError;
use crate::renderer::DEFAULT_LOOP_VAR;
use crate::types::{PatchOperation, PatchSpec, Resource, TargetSpec};

use path::split_pointer;

/// Apply a single operation to one resource.
///
/// The operation's `path`, `from` and `value` are rendered against the
/// context first, so they may carry `${...}` expressions.
pub fn apply_operation(
    target: &mut Resource,
    operation: &PatchOperation,
    engine: &Engine,
    ctx: &mut Context,
) -> Result<(), PatchError> {
    let path = match engine.render_string(&operation.path, ctx)? {
        Value::String(path) => path,
        other => {
            return Err(PatchError::TypeMismatch {
                message: format!(
                    "patch path must evaluate to a string, got {}",
                    other.type_name()
                ),
            });
        }
    };

    let op = operation.op.to_lowercase();

    let from = match &operation.from {
        Some(from) => match engine.render_string(from, ctx)? {
            Value::String(from) => Some(from),
            other => {
                return Err(PatchError::TypeMismatch {
                    message: format!(
                        "patch from must evaluate to a string, got {}",
                        other.type_name()
                    ),
                });
            }
        },
        None => None,
    };

    let value = if op == "remove" {
        JsonValue::Null
    } else {
        match &operation.value {
            Some(value) => engine.render_pruned(value, ctx)?.into_json(),
            None => JsonValue::Null,
        }
    };

    match op.as_str() {
        "add" | "replace" | "remove" | "test" | "move" | "copy" => {
            apply_rfc6902(target, &op, &path, from.as_deref(), &value)
        }
        "mergeshallow" => apply_merge_shallow(target, &path, &value),
        _ => Err(PatchError::UnknownOp(operation.op.clone())),
    }
}

/// Execute a complete patch specification against a resource list.
///
/// Targets are filtered by the spec's kind/group/version/name; `forEach`
/// iterates its list with the named variable bound; `where` is evaluated
/// per target with `resource` bound. Bindings added to the context are
/// restored on every exit path. When `lenient` is set, missing-data
/// failures during `where` or operation evaluation skip the resource
/// instead of aborting the spec.
pub fn apply_spec(
    resources: &mut [Resource],
    spec: &PatchSpec,
    engine: &Engine,
    ctx: &mut Context,
    lenient: bool,
) -> Result<(), PatchError> {
    if spec.operations.is_empty() {
        return Ok(());
    }
    let targets = find_target_indices(resources, &spec.target);
    debug!(targets = targets.len(), "applying patch spec");

    let Some(for_each) = &spec.for_each else {
        return patch_targets(resources, &targets, spec, engine, ctx, lenient);
    };

    let items = match engine.render_string(for_each, ctx)? {
        Value::List(items) => items,
        other => {
            return Err(PatchError::TypeMismatch {
                message: format!(
                    "forEach must evaluate to a list, got {}",
                    other.type_name()
                ),
            });
        }
    };

    let var = spec.var.as_deref().unwrap_or(DEFAULT_LOOP_VAR);
    for item in items {
        let previous = ctx.bind(var, item);
        let result = patch_targets(resources, &targets, spec, engine, ctx, lenient);
        ctx.restore(var, previous);
        result?;
    }
    Ok(())
}

/// Run the spec's `where` filter and operations over each target resource.
fn patch_targets(
    resources: &mut [Resource],
    targets: &[usize],
    spec: &PatchSpec,
    engine: &Engine,
    ctx: &mut Context,
    lenient: bool,
) -> Result<(), PatchError> {
    'targets: for &index in targets {
        match where_matches(&resources[index], &spec.target, engine, ctx) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) if lenient && err.is_missing_data() => continue,
            Err(err) => return Err(err),
        }

        for operation in &spec.operations {
            // Bind the target's current state so operations can reference it.
            let snapshot = Value::from_json(&JsonValue::Object(resources[index].clone()));
            let previous = ctx.bind("resource", snapshot);
            let result = apply_operation(&mut resources[index], operation, engine, ctx);
            ctx.restore("resource", previous);
            match result {
                Ok(()) => {}
                Err(err) if lenient && err.is_missing_data() => continue 'targets,
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}

/// Evaluate the target's `where` predicate with the candidate bound as
/// `resource`. No predicate means always match.
fn where_matches(
    resource: &Resource,
    target: &TargetSpec,
    engine: &Engine,
    ctx: &mut Context,
) -> Result<bool, PatchError> {
    let Some(where_clause) = &target.where_clause else {
        return Ok(true);
    };
    let snapshot = Value::from_json(&JsonValue::Object(resource.clone()));
    let previous = ctx.bind("resource", snapshot);
    let result = engine.render_string(where_clause, ctx);
    ctx.restore("resource", previous);

    match result? {
        Value::Bool(matched) => Ok(matched),
        other => Err(PatchError::TypeMismatch {
            message: format!(
                "target.where must evaluate to a boolean, got {}",
                other.type_name()
            ),
        }),
    }
}

/// Filter resources by kind, group, version and name. Empty fields match
/// any value. `apiVersion` splits into group and version (`"apps/v1"` →
/// `("apps", "v1")`, `"v1"` → `("", "v1")`).
pub fn find_target_indices(resources: &[Resource], target: &TargetSpec) -> Vec<usize> {
    let mut matches = Vec::new();
    for (index, resource) in resources.iter().enumerate() {
        if !target.kind.is_empty() {
            let kind = resource.get("kind").and_then(JsonValue::as_str);
            if kind != Some(target.kind.as_str()) {
                continue;
            }
        }
        let api_version = resource
            .get("apiVersion")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        let (group, version) = split_api_version(api_version);
        if !target.group.is_empty() && group != target.group {
            continue;
        }
        if !target.version.is_empty() && version != target.version {
            continue;
        }
        if !target.name.is_empty() {
            let name = resource
                .get("metadata")
                .and_then(JsonValue::as_object)
                .and_then(|m| m.get("name"))
                .and_then(JsonValue::as_str);
            if name != Some(target.name.as_str()) {
                continue;
            }
        }
        matches.push(index);
    }
    matches
}

/// Split a Kubernetes apiVersion into group and version. No slash means the
/// core group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

// --- RFC 6902 execution ----------------------------------------------------

/// Execute a standard JSON Patch operation after path expansion.
///
/// Zero expanded pointers (a filter matched nothing) is a no-op. For `add`,
/// missing parent containers are created first.
fn apply_rfc6902(
    target: &mut Resource,
    op: &str,
    raw_path: &str,
    from: Option<&str>,
    value: &JsonValue,
) -> Result<(), PatchError> {
    if matches!(op, "move" | "copy") && from.is_none() {
        return Err(PatchError::InvalidPath {
            path: raw_path.to_string(),
            message: format!("{} requires a 'from' path", op),
        });
    }

    let resolved = expand_paths(target, raw_path)?;
    if resolved.is_empty() {
        return Ok(());
    }

    let from_pointer = match from {
        Some(from) => {
            let mut pointers = expand_paths(target, from)?;
            if pointers.len() != 1 {
                return Err(PatchError::InvalidPath {
                    path: from.to_string(),
                    message: format!("'from' must resolve to exactly one location, got {}", pointers.len()),
                });
            }
            Some(pointers.remove(0))
        }
        None => None,
    };

    for pointer in resolved {
        if op == "add" {
            ensure_parent_exists(target, &pointer)?;
        }
        apply_json_patch(target, op, &pointer, from_pointer.as_deref(), value)?;
    }
    Ok(())
}

/// Delegate one concrete operation to the json-patch crate, round-tripping
/// the resource through a JSON document. The crate's application is atomic,
/// so a failed operation leaves the resource untouched.
fn apply_json_patch(
    target: &mut Resource,
    op: &str,
    pointer: &str,
    from: Option<&str>,
    value: &JsonValue,
) -> Result<(), PatchError> {
    let mut entry = JsonMap::new();
    entry.insert("op".to_string(), json!(op));
    entry.insert("path".to_string(), json!(pointer));
    if let Some(from) = from {
        entry.insert("from".to_string(), json!(from));
    }
    if !matches!(op, "remove" | "move" | "copy") {
        entry.insert("value".to_string(), value.clone());
    }

    let patch: json_patch::Patch =
        serde_json::from_value(JsonValue::Array(vec![JsonValue::Object(entry)])).map_err(|e| {
            PatchError::Rfc6902 {
                message: format!("failed to decode patch: {}", e),
            }
        })?;

    let mut doc = JsonValue::Object(std::mem::take(target));
    let result = json_patch::patch(&mut doc, &patch);
    *target = match doc {
        JsonValue::Object(map) => map,
        _ => JsonMap::new(),
    };

    result.map_err(|e| {
        if op == "test" {
            PatchError::TestFailed {
                pointer: pointer.to_string(),
            }
        } else {
            PatchError::Rfc6902 {
                message: e.to_string(),
            }
        }
    })
}

/// Create missing intermediate containers along an `add` path.
///
/// The container type comes from the next segment: append marker → empty
/// array, key → empty object. A specific numeric index cannot be
/// auto-created; the array must already be long enough.
fn ensure_parent_exists(root: &mut Resource, pointer: &str) -> Result<(), PatchError> {
    let segments = split_pointer(pointer);
    if segments.len() < 2 {
        return Ok(());
    }

    let mut doc = JsonValue::Object(std::mem::take(root));
    let result = ensure_parents_in(&mut doc, &segments);
    *root = match doc {
        JsonValue::Object(map) => map,
        _ => JsonMap::new(),
    };
    result
}

fn ensure_parents_in(doc: &mut JsonValue, segments: &[String]) -> Result<(), PatchError> {
    let mut current = doc;
    for i in 0..segments.len() - 1 {
        let segment = &segments[i];
        match current {
            JsonValue::Object(map) => {
                let absent = match map.get(segment) {
                    None | Some(JsonValue::Null) => true,
                    Some(_) => false,
                };
                if absent {
                    let next = &segments[i + 1];
                    if next == "-" {
                        map.insert(segment.clone(), JsonValue::Array(Vec::new()));
                    } else if next.parse::<i64>().is_ok() {
                        return Err(PatchError::AutoCreateRefused {
                            segment: next.clone(),
                        });
                    } else {
                        map.insert(segment.clone(), JsonValue::Object(JsonMap::new()));
                    }
                }
                current = map.get_mut(segment).expect("inserted above");
            }
            JsonValue::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PatchError::InvalidPath {
                    path: segments.join("/"),
                    message: format!("expected array index at segment {}", segment),
                })?;
                current = items.get_mut(index).ok_or(PatchError::OutOfBounds {
                    index: index as i64,
                    segment: segment.clone(),
                })?;
            }
            other => {
                return Err(PatchError::TypeMismatch {
                    message: format!(
                        "cannot traverse segment {} through {}",
                        segment,
                        kind_of(other)
                    ),
                });
            }
        }
    }
    Ok(())
}

// --- mergeShallow ----------------------------------------------------------

/// Apply the `mergeShallow` extension: overlay the value's top-level keys
/// at every expanded location without recursing into nested maps.
fn apply_merge_shallow(
    target: &mut Resource,
    raw_path: &str,
    value: &JsonValue,
) -> Result<(), PatchError> {
    let JsonValue::Object(overlay) = value else {
        return Err(PatchError::TypeMismatch {
            message: "mergeShallow value must be an object".to_string(),
        });
    };

    let resolved = expand_paths(target, raw_path)?;
    if resolved.is_empty() {
        return Ok(());
    }

    for pointer in resolved {
        merge_shallow_at(target, &pointer, overlay)?;
    }
    Ok(())
}

fn merge_shallow_at(
    root: &mut Resource,
    pointer: &str,
    overlay: &JsonMap<String, JsonValue>,
) -> Result<(), PatchError> {
    let segments = split_pointer(pointer);

    // An empty pointer merges into the resource root.
    if segments.is_empty() {
        merge_shallow_into(root, overlay);
        return Ok(());
    }

    let mut doc = JsonValue::Object(std::mem::take(root));
    let result = merge_shallow_in(&mut doc, &segments, overlay);
    *root = match doc {
        JsonValue::Object(map) => map,
        _ => JsonMap::new(),
    };
    result
}

fn merge_shallow_in(
    doc: &mut JsonValue,
    segments: &[String],
    overlay: &JsonMap<String, JsonValue>,
) -> Result<(), PatchError> {
    // Walk to the parent, creating missing containers the way `add` does.
    ensure_parents_in(doc, segments)?;

    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        current = match current {
            JsonValue::Object(map) => map.get_mut(segment).ok_or(PatchError::InvalidPath {
                path: segments.join("/"),
                message: format!("missing path at segment {}", segment),
            })?,
            JsonValue::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PatchError::InvalidPath {
                    path: segments.join("/"),
                    message: format!("expected array index at segment {}", segment),
                })?;
                items.get_mut(index).ok_or(PatchError::OutOfBounds {
                    index: index as i64,
                    segment: segment.clone(),
                })?
            }
            other => {
                return Err(PatchError::TypeMismatch {
                    message: format!(
                        "cannot traverse segment {} through {}",
                        segment,
                        kind_of(other)
                    ),
                });
            }
        };
    }

    let last = &segments[segments.len() - 1];
    match current {
        JsonValue::Object(map) => {
            if matches!(map.get(last), Some(JsonValue::Object(_))) {
                if let Some(JsonValue::Object(existing)) = map.get_mut(last) {
                    merge_shallow_into(existing, overlay);
                }
            } else {
                // Absent, null, or non-map: the overlay replaces it outright.
                map.insert(last.clone(), JsonValue::Object(overlay.clone()));
            }
        }
        JsonValue::Array(items) => {
            if last == "-" {
                return Err(PatchError::InvalidPath {
                    path: segments.join("/"),
                    message: "mergeShallow cannot target the append position '-'".to_string(),
                });
            }
            let index: usize = last.parse().map_err(|_| PatchError::InvalidPath {
                path: segments.join("/"),
                message: format!("invalid array index {:?} for mergeShallow", last),
            })?;
            let len = items.len();
            let element = items.get_mut(index).ok_or(PatchError::OutOfBounds {
                index: index as i64,
                segment: format!("{} (length {})", last, len),
            })?;
            match element {
                JsonValue::Object(existing) => merge_shallow_into(existing, overlay),
                other => *other = JsonValue::Object(overlay.clone()),
            }
        }
        other => {
            return Err(PatchError::TypeMismatch {
                message: format!(
                    "mergeShallow parent must be an object or array, got {}",
                    kind_of(other)
                ),
            });
        }
    }
    Ok(())
}

/// Overlay top-level keys onto the target. Inserted values are clones, so
/// the overlay and the target never share structure.
fn merge_shallow_into(target: &mut JsonMap<String, JsonValue>, overlay: &JsonMap<String, JsonValue>) {
    for (key, value) in overlay {
        target.insert(key.clone(), value.clone());
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
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
mod tests;
