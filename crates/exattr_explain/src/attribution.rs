//! Attribution maps and their summaries.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::target::Target;

/// Method that produced an attribution map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributionMethod {
    /// Sliding-window occlusion.
    Occlusion,
    /// Occlusion repeated over phase-shifted tiles.
    TiledOcclusion,
    /// A wrapped method averaged over weight and input noise.
    FusionGrad,
}

/// Attribution values with the same shape as the explained input.
#[derive(Debug, Clone)]
pub struct AttributionMap<B: Backend, const D: usize> {
    /// The attribution values.
    pub values: Tensor<B, D>,
    /// The method used.
    pub method: AttributionMethod,
    /// Explained output.
    pub target: Option<Target>,
}

impl<B: Backend, const D: usize> AttributionMap<B, D> {
    /// Create a new attribution map.
    pub fn new(values: Tensor<B, D>, method: AttributionMethod) -> Self {
        Self {
            values,
            method,
            target: None,
        }
    }

    /// Record the explained output.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Shape of the map, batch axis first.
    pub fn shape(&self) -> [usize; D] {
        self.values.dims()
    }

    /// Rescale the values to [0, 1].
    #[must_use]
    pub fn normalize(&self) -> Self {
        let min_val: f32 = self.values.clone().min().into_scalar().elem();
        let max_val: f32 = self.values.clone().max().into_scalar().elem();
        let range = max_val - min_val;

        // Constant maps are left as is.
        let normalized = if range > 1e-8 {
            (self.values.clone() - min_val) / range
        } else {
            self.values.clone()
        };

        Self {
            values: normalized,
            method: self.method,
            target: self.target.clone(),
        }
    }

    /// Host-side statistics of the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be read back from the device.
    pub fn summary(&self) -> Result<AttributionSummary> {
        let values = self
            .values
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ExplainError::ExternalComputation(format!("{e:?}")))?;

        let (min, max, sum) = values.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + f64::from(v)),
        );
        let count = values.len().max(1) as f64;

        Ok(AttributionSummary {
            method: self.method,
            shape: self.shape().to_vec(),
            min,
            max,
            mean: (sum / count) as f32,
            sum: sum as f32,
        })
    }
}

/// Serializable statistics of an attribution map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSummary {
    /// Method that produced the map.
    pub method: AttributionMethod,
    /// Shape of the map.
    pub shape: Vec<usize>,
    /// Smallest value.
    pub min: f32,
    /// Largest value.
    pub max: f32,
    /// Mean value.
    pub mean: f32,
    /// Sum of all values.
    pub sum: f32,
}
