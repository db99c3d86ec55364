//! Construction errors for core types.

/// Errors raised while building core values.
///
/// Everything past construction is infallible: parameter sets and
/// evaluators never see optimizer failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Namespace was empty or whitespace only
    #[error("namespace must not be empty")]
    EmptyNamespace,

    /// A parameter name was empty
    #[error("parameter name must not be empty")]
    EmptyParameterName,

    /// A parameter name was declared twice
    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// A declared default was NaN or infinite
    #[error("parameter {name} has a non-finite value")]
    NonFiniteValue {
        /// Offending parameter
        name: String,
    },

    /// Goal threshold that no distance can fall below
    #[error("color threshold must be finite and positive, got {0}")]
    InvalidThreshold(f64),
}

/// Result type for core construction.
pub type Result<T> = std::result::Result<T, CoreError>;
