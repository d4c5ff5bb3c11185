//! Computed-attribute errors
//!
//! Declaration failures are recoverable: the attribute is not added and all
//! other processing continues. Evaluation never returns an error to the
//! record-production path; failures degrade to an unset field.

use thiserror::Error;

/// Result type for computed-attribute operations
pub type ComputedResult<T> = Result<T, ComputedError>;

/// Computed-attribute errors
#[derive(Debug, Clone, Error)]
pub enum ComputedError {
    #[error("A field with the same name '{0}' already exists")]
    NameCollision(String),

    #[error("Cannot open the expression engine store: {0}")]
    EngineOpen(String),

    #[error("Failed to prepare expression: {0}")]
    Prepare(String),

    #[error("Invalid expression handle")]
    InvalidHandle,

    #[error("Bind position {position} out of range (expression has {count} parameters)")]
    BindOutOfRange { position: usize, count: usize },

    #[error("Expression evaluation failed: {0}")]
    Evaluate(String),
}
