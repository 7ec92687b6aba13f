//! Error types for expression compilation and evaluation.

use thiserror::Error;

/// Errors that can occur while compiling or evaluating expressions.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    /// The expression source failed to parse.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The expression references a variable that is not bound in the context.
    ///
    /// Detected before evaluation, over the whole expression tree, so an
    /// undeclared reference fails even inside an untaken ternary branch.
    #[error("undeclared variable: {name}")]
    UnknownVariable { name: String },

    /// The expression calls a function that does not exist.
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    /// A field or map key was absent at evaluation time.
    #[error("no such field: {field}")]
    MissingField { field: String },

    /// An operation was applied to a value of the wrong type.
    #[error("type error: {message}")]
    Type { message: String },

    /// A list index was outside the bounds of the list.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    /// Integer overflow, division by zero, and friends.
    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    /// A function was called with arguments it cannot accept.
    #[error("invalid argument to {function}(): {message}")]
    InvalidArgument { function: String, message: String },
}

/// Result type for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Whether an error represents missing template data rather than a broken
/// expression.
///
/// Callers use this to decide between graceful skipping (e.g. `includeWhen`
/// on a field the environment does not supply) and hard failure. Undeclared
/// variables and absent fields are missing data; parse failures, type errors
/// and arithmetic errors are not.
pub fn is_missing_data(err: &ExprError) -> bool {
    matches!(
        err,
        ExprError::UnknownVariable { .. } | ExprError::MissingField { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_classification() {
        assert!(is_missing_data(&ExprError::UnknownVariable {
            name: "spec".into()
        }));
        assert!(is_missing_data(&ExprError::MissingField {
            field: "replicas".into()
        }));
        assert!(!is_missing_data(&ExprError::Type {
            message: "no".into()
        }));
        assert!(!is_missing_data(&ExprError::Parse {
            message: "no".into()
        }));
        assert!(!is_missing_data(&ExprError::Arithmetic {
            message: "overflow".into()
        }));
    }
}
