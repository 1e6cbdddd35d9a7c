//! Error types for exattr_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating attribution arguments.
///
/// Every variant except [`CoreError::Serialization`] and [`CoreError::IoError`]
/// is a configuration error: it is detected before any computation starts and
/// is fixed by changing the arguments.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Number of non-batch axes is outside the supported range.
    #[error("Unsupported number of axes: expected 1 to {max} non-batch axes, got {got}")]
    TooManyAxes {
        /// Largest supported number of non-batch axes.
        max: usize,
        /// Actual number of non-batch axes.
        got: usize,
    },

    /// Window length does not match the input rank.
    #[error(
        "Window rank mismatch: input has {axes} non-batch axes but window has {window} values"
    )]
    WindowRankMismatch {
        /// Number of non-batch axes in the input.
        axes: usize,
        /// Number of window values.
        window: usize,
    },

    /// Upscale factor length does not match the window length.
    #[error("Upscale factor rank mismatch: window has {window} values but k has {factor}")]
    FactorRankMismatch {
        /// Number of window values.
        window: usize,
        /// Number of upscale factor values.
        factor: usize,
    },

    /// A window extent is zero.
    #[error("Window extent on axis {axis} must be positive")]
    ZeroWindow {
        /// Offending axis (0 = first non-batch axis).
        axis: usize,
    },

    /// An upscale factor is zero.
    #[error("Upscale factor on axis {axis} must be positive")]
    ZeroFactor {
        /// Offending axis (0 = first non-batch axis).
        axis: usize,
    },

    /// A window extent is not divisible by its upscale factor.
    #[error("Window {window} on axis {axis} is not divisible by upscale factor {factor}")]
    NotDivisible {
        /// Offending axis (0 = first non-batch axis).
        axis: usize,
        /// Window extent on that axis.
        window: usize,
        /// Upscale factor on that axis.
        factor: usize,
    },

    /// An input axis has zero extent.
    #[error("Input axis {axis} has zero extent")]
    ZeroExtent {
        /// Offending axis (0 = batch).
        axis: usize,
    },

    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Invalid noise or sampling parameters.
    #[error("Invalid noise parameters: {0}")]
    InvalidNoise(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error describes malformed arguments.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::IoError(_))
    }
}
