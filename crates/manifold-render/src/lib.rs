//! Component-to-manifest rendering pipeline.
//!
//! manifold renders a declarative component description into a deterministic
//! list of fully materialized resource manifests. A render composes three
//! inputs:
//!
//! - a **component type definition**: a parameterized set of resource
//!   templates plus parameter schemas;
//! - a **component instance**: parameter values and a list of addon
//!   instances;
//! - an **environment override bundle**: per-environment parameter and
//!   per-addon-instance overrides.
//!
//! The [`Pipeline`] sequences the work: build the component context (merge
//! parameter sources under schema defaulting), render the base resource
//! templates, then for each addon instance build its context, render its
//! creates, and apply its patches against the evolving resource list.
//! Output is post-processed with label/annotation overlays and a
//! deterministic sort.
//!
//! Rendering is synchronous and performs no I/O; a render either completes
//! or returns a typed [`RenderError`] with no partial output.

pub mod context;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod renderer;
pub mod types;

pub use error::{PatchError, RenderError, RenderResult};
pub use pipeline::Pipeline;
pub use types::{
    AddonDefinition, AddonInstance, Component, ComponentSnapshot, ComponentTypeDefinition,
    EnvOverrides, NameMetadata, PatchOperation, PatchSpec, RenderInput, RenderMetadata,
    RenderOptions, RenderOutput, Resource, ResourceTemplate, SchemaDefinition, TargetSpec,
    Workload, WorkloadContainer,
};
