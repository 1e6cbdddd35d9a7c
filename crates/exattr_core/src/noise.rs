//! Gaussian noise sampling for perturbation-based attribution.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// How sampled noise is combined with the value it perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseMode {
    /// `value + noise`.
    Additive,
    /// `value * noise`.
    Multiplicative,
}

impl NoiseMode {
    /// Additive when `additive` is true, multiplicative otherwise.
    #[must_use]
    pub const fn from_additive(additive: bool) -> Self {
        if additive {
            Self::Additive
        } else {
            Self::Multiplicative
        }
    }
}

/// A normal distribution with validated parameters.
#[derive(Debug, Clone, Copy)]
pub struct GaussianNoise {
    mean: f32,
    std: f32,
    normal: Normal<f32>,
}

impl GaussianNoise {
    /// Create a normal distribution `N(mean, std^2)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidNoise`] if `mean` is not finite or `std`
    /// is negative or not finite. A zero `std` is allowed and always yields
    /// `mean`.
    pub fn new(mean: f32, std: f32) -> Result<Self> {
        if !mean.is_finite() {
            return Err(CoreError::InvalidNoise(format!("mean must be finite, got {mean}")));
        }
        if !std.is_finite() || std < 0.0 {
            return Err(CoreError::InvalidNoise(format!(
                "std must be finite and non-negative, got {std}"
            )));
        }
        let normal = Normal::new(mean, std)
            .map_err(|e| CoreError::InvalidNoise(format!("N({mean}, {std}): {e}")))?;
        Ok(Self { mean, std, normal })
    }

    /// Mean of the distribution.
    #[must_use]
    pub const fn mean(&self) -> f32 {
        self.mean
    }

    /// Standard deviation of the distribution.
    #[must_use]
    pub const fn std(&self) -> f32 {
        self.std
    }

    /// Draw `n` independent samples.
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.normal.sample(rng)).collect()
    }
}
