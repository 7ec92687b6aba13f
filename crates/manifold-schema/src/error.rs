//! Error types for schema handling.

use thiserror::Error;

/// Errors that can occur while parsing, merging, or applying schemas.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A schema declares a type this subset does not know.
    #[error("invalid schema type: {0}")]
    InvalidType(String),

    /// The schema document is structurally malformed.
    #[error("invalid schema structure: {message}")]
    InvalidStructure { message: String },

    /// Two merged schemas declare the same property with different shapes.
    #[error("conflicting declarations for property '{property}'")]
    ConflictingProperty { property: String },

    /// A default literal does not match its declared type.
    #[error("malformed default for '{field}': {message}")]
    MalformedDefault { field: String, message: String },

    /// A short-hand type reference names an unknown custom type.
    #[error("unknown type: {0}")]
    UnknownType(String),
}

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
