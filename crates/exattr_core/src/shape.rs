//! Shape metadata for attribution inputs.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of an attribution input: a batch axis followed by one or more
/// feature axes (any of channel, time, x, y, z in caller-defined order).
///
/// # Example
///
/// ```rust
/// use exattr_core::InputShape;
///
/// let shape = InputShape::from_dims(&[1, 1, 10, 10]).unwrap();
/// assert_eq!(shape.batch(), 1);
/// assert_eq!(shape.axes(), &[1, 10, 10]);
/// assert_eq!(shape.n_axes(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    batch: usize,
    axes: Vec<usize>,
}

impl InputShape {
    /// Build from full tensor dimensions `[batch, axis_0, ..]`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no feature axis or any extent is zero.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() < 2 {
            return Err(CoreError::InvalidShape {
                expected: "a batch axis followed by at least one feature axis".to_string(),
                got: format!("{dims:?}"),
            });
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(CoreError::ZeroExtent { axis });
        }
        Ok(Self {
            batch: dims[0],
            axes: dims[1..].to_vec(),
        })
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Extents of the feature axes (everything after the batch axis).
    #[must_use]
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Number of feature axes.
    #[must_use]
    pub fn n_axes(&self) -> usize {
        self.axes.len()
    }

    /// Total number of elements, batch included.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.batch * self.axes.iter().product::<usize>()
    }

    /// Full dimensions, batch first.
    #[must_use]
    pub fn dims(&self) -> Vec<usize> {
        std::iter::once(self.batch)
            .chain(self.axes.iter().copied())
            .collect()
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let axes: Vec<String> = self.axes.iter().map(ToString::to_string).collect();
        write!(f, "(B={}, {})", self.batch, axes.join("x"))
    }
}
