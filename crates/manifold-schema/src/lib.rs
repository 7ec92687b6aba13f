//! Structural schemas and schema-driven defaulting for manifold.
//!
//! Component types and addons declare parameter schemas; this crate turns
//! those declarations into [`Structural`] schemas and fills parameter trees
//! with declared defaults before template interpolation sees them.
//!
//! The compact authoring notation (`'integer | default=1'`, `[]Item`,
//! `map<string>`, ...) is elaborated by [`shorthand::Converter`] into the
//! JSON Schema subset that [`Structural::from_schema`] consumes.

pub mod defaults;
pub mod error;
pub mod shorthand;
pub mod structural;

pub use defaults::apply_defaults;
pub use error::{SchemaError, SchemaResult};
pub use shorthand::Converter;
pub use structural::{SchemaKind, Structural};
