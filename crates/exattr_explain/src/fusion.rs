//! FusionGrad: attribution averaged over weight and input noise.
//!
//! Wraps any attribution method and evaluates it `n * m` times: `n` copies of
//! the model with Gaussian noise on every float parameter, and for each of
//! them `m` Gaussian perturbations of the input. The result is the mean over
//! all samples.
//!
//! Reference: Bykov et al., "NoiseGrad: Enhancing Explanations by Introducing
//! Stochasticity to Model Weights", AAAI 2022.

use std::path::Path;

use burn::module::{Module, ModuleMapper, ParamId};
use burn::prelude::*;
use exattr_core::{progress_for, GaussianNoise, NoiseMode, ProgressSink, Seed};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::target::Target;

/// Configuration for FusionGrad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionGradConfig {
    /// Mean of the weight noise.
    pub mean: f32,
    /// Standard deviation of the weight noise. Zero leaves the weights alone.
    pub std: f32,
    /// Mean of the input noise.
    pub sg_mean: f32,
    /// Standard deviation of the input noise.
    pub sg_std: f32,
    /// Number of weight noise samples.
    pub n: usize,
    /// Number of input noise samples per weight sample.
    pub m: usize,
    /// Add weight noise (`true`) or multiply by it (`false`).
    pub additive_noise: bool,
    /// Add input noise (`true`) or multiply by it (`false`).
    pub sg_additive_noise: bool,
    /// Show a progress bar over the `n * m` samples.
    pub show_progress: bool,
    /// Seed for the noise streams; drawn from the clock when absent.
    pub seed: Option<u64>,
}

impl Default for FusionGradConfig {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 0.02,
            sg_mean: 0.0,
            sg_std: 0.1,
            n: 10,
            m: 10,
            additive_noise: true,
            sg_additive_noise: false,
            show_progress: true,
            seed: None,
        }
    }
}

impl FusionGradConfig {
    /// Create a config with `n` weight samples and `m` input samples.
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            ..Default::default()
        }
    }

    /// Set the weight noise distribution and how it is applied.
    #[must_use]
    pub fn with_weight_noise(mut self, mean: f32, std: f32, additive: bool) -> Self {
        self.mean = mean;
        self.std = std;
        self.additive_noise = additive;
        self
    }

    /// Set the input noise distribution and how it is applied.
    #[must_use]
    pub fn with_input_noise(mut self, mean: f32, std: f32, additive: bool) -> Self {
        self.sg_mean = mean;
        self.sg_std = std;
        self.sg_additive_noise = additive;
        self
    }

    /// Enable or disable the progress bar.
    #[must_use]
    pub fn with_show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Fix the noise seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> exattr_core::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check sample counts and noise parameters.
    ///
    /// # Errors
    ///
    /// Returns [`exattr_core::CoreError::InvalidNoise`] if `n` or `m` is zero
    /// or a distribution is invalid.
    pub fn validate(&self) -> exattr_core::Result<()> {
        self.noise().map(|_| ())
    }

    fn noise(&self) -> exattr_core::Result<(GaussianNoise, GaussianNoise)> {
        if self.n == 0 || self.m == 0 {
            return Err(exattr_core::CoreError::InvalidNoise(format!(
                "sample counts must be positive, got n={} m={}",
                self.n, self.m
            )));
        }
        Ok((
            GaussianNoise::new(self.mean, self.std)?,
            GaussianNoise::new(self.sg_mean, self.sg_std)?,
        ))
    }
}

/// Noise-averaged attribution around a wrapped method.
///
/// The wrapped method is called as `method(&model, noisy_input, &target)`
/// with the currently perturbed model. The model passed to
/// [`attribute`](Self::attribute) is modified while sampling and restored to
/// its exact original parameters before returning, on success and on error.
///
/// # Example
///
/// ```rust,ignore
/// use exattr_explain::{FusionGrad, FusionGradConfig, Occlusion, Target, TiledOcclusion};
///
/// let config = FusionGradConfig::new(5, 5).with_seed(42);
/// let mut fusion = FusionGrad::new(
///     |model: &MyModel<B>, x, target: &Target| {
///         let mut tiled = TiledOcclusion::new(Occlusion::new(|x| model.forward(x)), tiled_config.clone());
///         tiled.attribute(&x, target)
///     },
///     config,
/// );
/// let attribution = fusion.attribute(&mut model, &input, &Target::Class(1))?;
/// ```
pub struct FusionGrad<A> {
    method: A,
    config: FusionGradConfig,
}

impl<A> FusionGrad<A> {
    /// Wrap an attribution method.
    pub fn new(method: A, config: FusionGradConfig) -> Self {
        Self { method, config }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &FusionGradConfig {
        &self.config
    }

    /// Compute the noise-averaged attribution of `target` for `input`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid sample counts or noise
    /// parameters, before the model is touched. Errors of the wrapped method
    /// are returned unchanged, after the model has been restored.
    pub fn attribute<B, M, const D: usize>(
        &mut self,
        model: &mut M,
        input: &Tensor<B, D>,
        target: &Target,
    ) -> Result<Tensor<B, D>>
    where
        B: Backend,
        M: Module<B>,
        A: FnMut(&M, Tensor<B, D>, &Target) -> Result<Tensor<B, D>>,
    {
        let mut progress = progress_for(self.config.show_progress);
        self.attribute_with_progress(model, input, target, progress.as_mut())
    }

    /// Like [`attribute`](Self::attribute), reporting to the given sink.
    ///
    /// # Errors
    ///
    /// See [`attribute`](Self::attribute).
    pub fn attribute_with_progress<B, M, const D: usize>(
        &mut self,
        model: &mut M,
        input: &Tensor<B, D>,
        target: &Target,
        progress: &mut dyn ProgressSink,
    ) -> Result<Tensor<B, D>>
    where
        B: Backend,
        M: Module<B>,
        A: FnMut(&M, Tensor<B, D>, &Target) -> Result<Tensor<B, D>>,
    {
        let (weight_noise, input_noise) = self.config.noise()?;
        let weight_mode = NoiseMode::from_additive(self.config.additive_noise);
        let input_mode = NoiseMode::from_additive(self.config.sg_additive_noise);
        let (n, m) = (self.config.n, self.config.m);

        let seed = self.config.seed.map_or_else(Seed::from_entropy, Seed::new);
        let mut weight_rng = seed.derive("weights").to_rng();
        let mut input_rng = seed.derive("inputs").to_rng();

        let dims = input.dims();
        let device = input.device();

        tracing::info!(
            "FusionGrad: input {:?}, n={} weight samples N({}, {}) {:?}, m={} input samples N({}, {}) {:?}, seed {}",
            dims,
            n,
            weight_noise.mean(),
            weight_noise.std(),
            weight_mode,
            m,
            input_noise.mean(),
            input_noise.std(),
            input_mode,
            seed.value()
        );

        let mut checkpoint = WeightCheckpoint::new(model);
        let mut total = Tensor::<B, D>::zeros(dims, &device);

        progress.start("FusionGrad", n * m);
        for i in 0..n {
            if weight_noise.std() > 0.0 {
                let mut perturbation = WeightPerturbation {
                    noise: &weight_noise,
                    mode: weight_mode,
                    rng: &mut weight_rng,
                    perturbed: 0,
                };
                checkpoint.install(|clean| clean.map(&mut perturbation));
                tracing::debug!(
                    "FusionGrad: weight sample {}/{} perturbed {} tensors",
                    i + 1,
                    n,
                    perturbation.perturbed
                );
            } else {
                checkpoint.restore();
            }

            for j in 0..m {
                let noise = noise_tensor::<B, D, _>(&input_noise, &mut input_rng, dims, &device);
                let noisy = apply_noise(input.clone(), noise, input_mode);

                let attribution = (self.method)(checkpoint.model(), noisy, target)?;
                if attribution.dims() != dims {
                    return Err(ExplainError::ShapeMismatch {
                        expected: dims.to_vec(),
                        got: attribution.dims().to_vec(),
                    });
                }
                total = total + attribution;

                tracing::trace!("FusionGrad: sample ({}, {}) done", i, j);
                progress.advance();
            }
        }
        progress.finish();

        Ok(total / (n * m) as f32)
    }
}

/// Holds a clean copy of a model and puts it back when dropped.
///
/// Every perturbation is built from the clean copy, so samples never
/// accumulate noise from earlier iterations.
struct WeightCheckpoint<'a, M: Clone> {
    model: &'a mut M,
    clean: M,
}

impl<'a, M: Clone> WeightCheckpoint<'a, M> {
    fn new(model: &'a mut M) -> Self {
        let clean = model.clone();
        Self { model, clean }
    }

    /// Replace the model with a transformed copy of the clean parameters.
    fn install(&mut self, perturb: impl FnOnce(M) -> M) {
        *self.model = perturb(self.clean.clone());
    }

    fn restore(&mut self) {
        *self.model = self.clean.clone();
    }

    fn model(&self) -> &M {
        self.model
    }
}

impl<M: Clone> Drop for WeightCheckpoint<'_, M> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Applies Gaussian noise to every float parameter of a module.
struct WeightPerturbation<'a, R> {
    noise: &'a GaussianNoise,
    mode: NoiseMode,
    rng: &'a mut R,
    perturbed: usize,
}

impl<B: Backend, R: Rng> ModuleMapper<B> for WeightPerturbation<'_, R> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let noise = noise_tensor::<B, D, R>(self.noise, self.rng, tensor.dims(), &tensor.device());
        self.perturbed += 1;
        apply_noise(tensor, noise, self.mode)
    }
}

fn noise_tensor<B: Backend, const D: usize, R: Rng>(
    noise: &GaussianNoise,
    rng: &mut R,
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let values = noise.sample_n(rng, dims.iter().product());
    Tensor::from_data(TensorData::new(values, dims), device)
}

fn apply_noise<B: Backend, const D: usize>(
    value: Tensor<B, D>,
    noise: Tensor<B, D>,
    mode: NoiseMode,
) -> Tensor<B, D> {
    match mode {
        NoiseMode::Additive => value + noise,
        NoiseMode::Multiplicative => value * noise,
    }
}
