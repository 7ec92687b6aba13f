//! Expression language and template interpolation engine for manifold.
//!
//! This crate evaluates the sandboxed expression language used inside
//! resource templates. Expressions appear in string values as `${...}`:
//!
//! - when an entire string is a single expression, the expression's native
//!   value replaces the string (`"${spec.replicas}"` stays an integer);
//! - when embedded in a larger literal, results are coerced to text and
//!   concatenated.
//!
//! The language supports member/index access, the usual boolean, comparison
//! and arithmetic operators, `in`, `has(x.y)`, ternaries, list and map
//! literals, comprehensions (`.map`, `.filter`, `.exists`, `.all`), and a
//! library of string/list/math/encoding helpers, plus the template-authoring
//! functions `omit()`, `merge(...)`, `generateName(...)` and `hash(s)`.
//!
//! # Example
//!
//! ```
//! use manifold_expr::{Context, Engine};
//! use serde_json::json;
//!
//! let engine = Engine::new();
//! let mut ctx = Context::from_json(
//!     json!({"metadata": {"name": "web"}, "spec": {"replicas": 3}})
//!         .as_object()
//!         .unwrap(),
//! );
//!
//! let template = json!({"name": "${metadata.name}", "replicas": "${spec.replicas}"});
//! let rendered = engine.render_pruned(&template, &mut ctx).unwrap().into_json();
//! assert_eq!(rendered, json!({"name": "web", "replicas": 3}));
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod names;
pub mod parser;
pub mod value;

pub use engine::{Compiled, Engine};
pub use error::{is_missing_data, ExprError, ExprResult};
pub use eval::Context;
pub use value::{prune, Value};
