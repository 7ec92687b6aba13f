//! Wire types for the rendering pipeline.
//!
//! These mirror the declarative inputs: the component-and-dependencies
//! snapshot, environment override bundles, resource templates, patch
//! specifications, and the render options/output surface.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// A rendered (or in-progress) resource manifest.
pub type Resource = JsonMap<String, JsonValue>;

/// Immutable snapshot of a component and everything its render depends on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub component: Component,
    pub component_type_definition: ComponentTypeDefinition,
    #[serde(default)]
    pub workload: Option<Workload>,
    /// Addon definitions referenced by the component's addon instances.
    #[serde(default)]
    pub addons: Vec<AddonDefinition>,
    #[serde(default)]
    pub environment: String,
}

/// A component instance: parameter values plus addon instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
    #[serde(default)]
    pub addons: Vec<AddonInstance>,
}

/// One instance of an addon attached to a component.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstance {
    pub name: String,
    pub instance_id: String,
    #[serde(default)]
    pub config: JsonMap<String, JsonValue>,
}

/// A component type: parameter schemas plus resource templates.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComponentTypeDefinition {
    #[serde(default)]
    pub schema: SchemaDefinition,
    #[serde(default)]
    pub resources: Vec<ResourceTemplate>,
}

/// Declared JSON Schemas for parameters and environment overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(default)]
    pub parameters: Option<JsonValue>,
    #[serde(default)]
    pub env_overrides: Option<JsonValue>,
}

/// A reusable addon: creates additional resources and/or patches existing
/// ones, parameterized per instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddonDefinition {
    pub name: String,
    #[serde(default)]
    pub schema: SchemaDefinition,
    #[serde(default)]
    pub creates: Vec<ResourceTemplate>,
    #[serde(default)]
    pub patches: Vec<PatchSpec>,
}

/// The workload input: built images and runtime wiring.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Workload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub containers: IndexMap<String, WorkloadContainer>,
    #[serde(default)]
    pub endpoints: Option<JsonValue>,
    #[serde(default)]
    pub connections: Option<JsonValue>,
}

/// One container of the workload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadContainer {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A resource template: a Kubernetes-shaped body carrying `${...}`
/// expressions, with optional conditional inclusion and iteration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceTemplate {
    /// Expression gating this template. Missing data counts as false.
    #[serde(default, rename = "includeWhen")]
    pub include_when: Option<String>,
    /// Expression producing the list to iterate; one resource per element.
    #[serde(default, rename = "forEach")]
    pub for_each: Option<String>,
    /// Loop variable name for `forEach`. Defaults to `item`.
    #[serde(default)]
    pub var: Option<String>,
    /// The template body (`apiVersion`, `kind`, `metadata`, `spec`, ...).
    #[serde(flatten)]
    pub body: JsonMap<String, JsonValue>,
}

/// Environment-specific overrides for a component and its addon instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvOverrides {
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
    /// `addonOverrides[addonName][instanceId]` → override tree.
    #[serde(default)]
    pub addon_overrides: IndexMap<String, IndexMap<String, JsonMap<String, JsonValue>>>,
}

/// Pre-computed naming record supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    #[serde(default)]
    pub annotations: IndexMap<String, String>,
    #[serde(default)]
    pub pod_selectors: IndexMap<String, String>,
}

/// A set of patch operations applied to matching resources.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSpec {
    /// Expression producing a list; the full target/operations sequence runs
    /// once per element.
    #[serde(default)]
    pub for_each: Option<String>,
    /// Iteration variable name. Defaults to `item`.
    #[serde(default)]
    pub var: Option<String>,
    #[serde(default)]
    pub target: TargetSpec,
    #[serde(default)]
    pub operations: Vec<PatchOperation>,
}

/// Filters selecting which resources a patch applies to. Empty fields match
/// everything.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetSpec {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    /// Expression evaluated with the candidate bound as `resource`.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

/// One patch operation. `path`, `from` and `value` are rendered against the
/// context before execution; `remove` never evaluates `value`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    /// Source path for `move` and `copy`.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// Options controlling a render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Check `apiVersion`/`kind`/`metadata.name` on every rendered resource.
    pub enable_validation: bool,
    /// Fail the render on warnings.
    pub strict_mode: bool,
    /// Labels overlaid onto every rendered resource.
    pub resource_labels: IndexMap<String, String>,
    /// Annotations overlaid onto every rendered resource.
    pub resource_annotations: IndexMap<String, String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            enable_validation: true,
            strict_mode: false,
            resource_labels: IndexMap::new(),
            resource_annotations: IndexMap::new(),
        }
    }
}

/// Everything a render needs.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub snapshot: ComponentSnapshot,
    /// Environment overrides; `None` applies none.
    pub overrides: Option<EnvOverrides>,
    pub metadata: NameMetadata,
}

/// The result of a render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    pub resources: Vec<Resource>,
    pub metadata: RenderMetadata,
}

/// Information about the rendering process.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub resource_count: usize,
    pub base_resource_count: usize,
    pub addon_count: usize,
    pub addon_resource_count: usize,
    pub warnings: Vec<String>,
}
