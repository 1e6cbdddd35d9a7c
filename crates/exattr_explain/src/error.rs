//! Error types for attribution.

use exattr_core::CoreError;
use thiserror::Error;

/// Result type alias for attribution operations.
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors that can occur while computing attributions.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Malformed arguments, detected before any computation.
    #[error("Configuration error: {0}")]
    Configuration(#[from] CoreError),

    /// An occlusion primitive or wrapped method returned a tensor of the
    /// wrong shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Actual dimensions.
        got: Vec<usize>,
    },

    /// Target does not fit the batch or the model output.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Failure raised by an occlusion primitive or wrapped attribution method.
    #[error("External computation failed: {0}")]
    ExternalComputation(String),
}

impl ExplainError {
    /// Whether this error was raised by argument validation.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(e) if e.is_configuration())
    }
}
