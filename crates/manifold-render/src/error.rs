//! Error types for the rendering pipeline.

use manifold_expr::ExprError;
use manifold_schema::SchemaError;
use thiserror::Error;

/// Errors that abort a render.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A required input is missing or structurally unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A declared schema could not be compiled or merged.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An expression failed while rendering a template, wrapped with the
    /// resource or clause it belongs to.
    #[error("template error in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: ExprError,
    },

    /// A rendered resource is missing its identity fields, or strict mode
    /// upgraded warnings.
    #[error("validation failed for {resource}: {message}")]
    Validation { resource: String, message: String },

    /// A patch specification failed, wrapped with the patch identifier.
    #[error("patch {patch} failed: {source}")]
    Patch {
        patch: String,
        #[source]
        source: PatchError,
    },
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised by the patch engine.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The operation name is not one we support.
    #[error("unknown patch operation: {0}")]
    UnknownOp(String),

    /// The path expression could not be parsed or traversed.
    #[error("invalid path {path}: {message}")]
    InvalidPath { path: String, message: String },

    /// A numeric segment points outside the array it indexes.
    #[error("array index {index} out of bounds at segment {segment}")]
    OutOfBounds { index: i64, segment: String },

    /// A `test` operation did not match.
    #[error("test failed at {pointer}")]
    TestFailed { pointer: String },

    /// Auto-creating a container for a specific numeric index is refused;
    /// the array must already be long enough.
    #[error("cannot auto-create array for index segment {segment}")]
    AutoCreateRefused { segment: String },

    /// The value at the target location has the wrong type for the
    /// operation.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// An expression inside the patch (path, value, `where`, `forEach`)
    /// failed. Missing-data failures here may be recovered by the caller.
    #[error("expression failed: {0}")]
    Expr(#[from] ExprError),

    /// The underlying RFC 6902 application failed.
    #[error("json patch failed: {message}")]
    Rfc6902 { message: String },
}

impl PatchError {
    /// Whether this error is a missing-data expression failure, eligible
    /// for the graceful-skip policy.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, PatchError::Expr(e) if manifold_expr::is_missing_data(e))
    }
}
