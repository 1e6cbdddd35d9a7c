//! Tiled occlusion: sub-window resolution from a handful of occlusion sweeps.
//!
//! A plain occlusion pass with window `w` and stride `w` only resolves
//! features at the granularity of the window. Tiled occlusion runs
//! `k[0] * .. * k[D-1]` such passes over copies of the input shifted by
//! multiples of `w / k` inside a zero-padded buffer and sums their
//! attributions, so windows are effectively placed at stride `w / k` while
//! each pass still evaluates only non-overlapping windows.
//!
//! Contributions of different sweeps that land on the same element are summed,
//! not averaged.

use std::path::Path;

use burn::prelude::*;
use exattr_core::{progress_for, InputShape, ProgressSink, TilingPlan};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::occlusion::{batch_ranges, OcclusionPrimitive, OcclusionRequest};
use crate::target::Target;

/// Configuration for tiled occlusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiledOcclusionConfig {
    /// Upscale factor per feature axis (1 disables sub-window sweeping).
    pub k: Vec<usize>,
    /// Occlusion window per feature axis. Must be divisible by `k`.
    pub window: Vec<usize>,
    /// Replacement value for occluded elements.
    pub baseline: f32,
    /// Show a progress bar over the sweeps.
    pub show_progress: bool,
}

impl Default for TiledOcclusionConfig {
    fn default() -> Self {
        Self {
            k: vec![1, 2, 2],
            window: vec![3, 10, 10],
            baseline: 0.0,
            show_progress: true,
        }
    }
}

impl TiledOcclusionConfig {
    /// Create a config with the given upscale factors and window.
    pub fn new(k: impl Into<Vec<usize>>, window: impl Into<Vec<usize>>) -> Self {
        Self {
            k: k.into(),
            window: window.into(),
            ..Default::default()
        }
    }

    /// Set the baseline value.
    #[must_use]
    pub fn with_baseline(mut self, baseline: f32) -> Self {
        self.baseline = baseline;
        self
    }

    /// Enable or disable the progress bar.
    #[must_use]
    pub fn with_show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
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

    /// Validate the config against the dimensions of an input.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the input has no feature axis or
    /// more than four, or if `window` and `k` do not fit it.
    pub fn plan(&self, dims: &[usize]) -> exattr_core::Result<TilingPlan> {
        let shape = InputShape::from_dims(dims)?;
        TilingPlan::new(shape.axes(), &self.window, &self.k)
    }
}

/// Tiled occlusion over an [`OcclusionPrimitive`].
///
/// # Example
///
/// ```rust,ignore
/// use exattr_explain::{Occlusion, Target, TiledOcclusion, TiledOcclusionConfig};
///
/// // (batch, channel, x, y) image batch
/// let config = TiledOcclusionConfig::new([1, 2, 2], [1, 4, 4]);
/// let mut tiled = TiledOcclusion::new(Occlusion::new(|x| model.forward(x)), config);
/// let attribution = tiled.attribute(&images, &Target::Class(3))?;
/// assert_eq!(attribution.dims(), images.dims());
/// ```
pub struct TiledOcclusion<P> {
    primitive: P,
    config: TiledOcclusionConfig,
}

impl<P> TiledOcclusion<P> {
    /// Create a tiled occlusion runner.
    pub fn new(primitive: P, config: TiledOcclusionConfig) -> Self {
        Self { primitive, config }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &TiledOcclusionConfig {
        &self.config
    }

    /// The wrapped occlusion primitive.
    #[must_use]
    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    /// Consume the runner and return the primitive.
    pub fn into_primitive(self) -> P {
        self.primitive
    }

    /// Compute the attribution of `target` for every element of `input`.
    ///
    /// The result has the dimensions of `input`. Progress is shown according
    /// to [`TiledOcclusionConfig::show_progress`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error, before the primitive is ever called, if
    /// the window or upscale factors do not fit the input. Errors from the
    /// primitive are returned unchanged.
    pub fn attribute<B, const D: usize>(
        &mut self,
        input: &Tensor<B, D>,
        target: &Target,
    ) -> Result<Tensor<B, D>>
    where
        B: Backend,
        P: OcclusionPrimitive<B, D>,
    {
        let mut progress = progress_for(self.config.show_progress);
        self.attribute_with_progress(input, target, progress.as_mut())
    }

    /// Like [`attribute`](Self::attribute), reporting to the given sink.
    ///
    /// # Errors
    ///
    /// See [`attribute`](Self::attribute).
    pub fn attribute_with_progress<B, const D: usize>(
        &mut self,
        input: &Tensor<B, D>,
        target: &Target,
        progress: &mut dyn ProgressSink,
    ) -> Result<Tensor<B, D>>
    where
        B: Backend,
        P: OcclusionPrimitive<B, D>,
    {
        let dims = input.dims();
        let plan = self.config.plan(&dims)?;
        let batch = dims[0];
        let device = input.device();

        tracing::info!(
            "TiledOcclusion: input {:?}, window {:?}, k {:?}, pad {:?}, {} sweeps",
            dims,
            plan.window(),
            plan.factors(),
            plan.pads(),
            plan.sweep_count()
        );

        let padded_dims = batch_dims::<D>(batch, &plan.padded_extents());
        let crop = batch_ranges::<D>(batch, &plan.crop_ranges());
        let padded =
            Tensor::<B, D>::zeros(padded_dims, &device).slice_assign(crop.clone(), input.clone());
        let mut accumulated = Tensor::<B, D>::zeros(padded_dims, &device);

        let request = OcclusionRequest {
            target,
            baseline: self.config.baseline,
            strides: plan.window(),
            sliding_window_shapes: plan.window(),
        };

        progress.start("TiledOcclusion", plan.sweep_count());
        for offset in plan.offsets() {
            if plan.is_empty_view(&offset) {
                tracing::debug!("TiledOcclusion: offset {:?} lies past the padded input", offset);
                progress.advance();
                continue;
            }

            let ranges = batch_ranges::<D>(batch, &plan.view_ranges(&offset));
            let view = padded.clone().slice(ranges.clone());
            let view_dims = view.dims();
            tracing::debug!("TiledOcclusion: offset {:?}, view {:?}", offset, ranges);

            let attribution = self.primitive.occlude(view, &request)?;
            if attribution.dims() != view_dims {
                return Err(ExplainError::ShapeMismatch {
                    expected: view_dims.to_vec(),
                    got: attribution.dims().to_vec(),
                });
            }

            let current = accumulated.clone().slice(ranges.clone());
            accumulated = accumulated.slice_assign(ranges, current + attribution);
            progress.advance();
        }
        progress.finish();

        Ok(accumulated.slice(crop))
    }
}

/// `[batch, extents..]` as a fixed-rank array.
fn batch_dims<const D: usize>(batch: usize, extents: &[usize]) -> [usize; D] {
    debug_assert_eq!(extents.len() + 1, D);
    std::array::from_fn(|i| if i == 0 { batch } else { extents[i - 1] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion::Occlusion;
    use exattr_core::backend::NdArray;
    use exattr_core::{CoreError, LogProgress};

    type TestBackend = NdArray;

    /// Returns ones and records every call.
    #[derive(Default)]
    struct RecordingPrimitive {
        views: Vec<Vec<usize>>,
        strides: Vec<Vec<usize>>,
    }

    impl<B: Backend, const D: usize> OcclusionPrimitive<B, D> for RecordingPrimitive {
        fn occlude(
            &mut self,
            input: Tensor<B, D>,
            request: &OcclusionRequest<'_>,
        ) -> Result<Tensor<B, D>> {
            self.views.push(input.dims().to_vec());
            self.strides.push(request.strides.to_vec());
            Ok(Tensor::ones(input.dims(), &input.device()))
        }
    }

    /// Returns a tensor with one extra element on the last axis.
    struct WrongShapePrimitive;

    impl<B: Backend, const D: usize> OcclusionPrimitive<B, D> for WrongShapePrimitive {
        fn occlude(
            &mut self,
            input: Tensor<B, D>,
            _request: &OcclusionRequest<'_>,
        ) -> Result<Tensor<B, D>> {
            let mut dims = input.dims();
            dims[D - 1] += 1;
            Ok(Tensor::zeros(dims, &input.device()))
        }
    }

    /// Output 0 is a weighted sum that is not linear in the window position.
    fn squared_model<const D: usize>(x: Tensor<TestBackend, D>) -> Tensor<TestBackend, 2> {
        let batch = x.dims()[0];
        x.powf_scalar(2.0).reshape([batch as i32, -1]).sum_dim(1)
    }

    fn sum_model<const D: usize>(x: Tensor<TestBackend, D>) -> Tensor<TestBackend, 2> {
        let batch = x.dims()[0];
        x.reshape([batch as i32, -1]).sum_dim(1)
    }

    fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    fn quiet(k: &[usize], window: &[usize]) -> TiledOcclusionConfig {
        TiledOcclusionConfig::new(k, window).with_show_progress(false)
    }

    #[test]
    fn test_shape_preserved_for_every_rank() {
        let device = Default::default();
        let target = Target::Class(0);

        let x2 = Tensor::<TestBackend, 2>::ones([2, 9], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[3], &[3]));
        assert_eq!(tiled.attribute(&x2, &target).unwrap().dims(), [2, 9]);

        let x3 = Tensor::<TestBackend, 3>::ones([1, 3, 7], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[1, 2], &[3, 4]));
        assert_eq!(tiled.attribute(&x3, &target).unwrap().dims(), [1, 3, 7]);

        let x4 = Tensor::<TestBackend, 4>::ones([2, 1, 5, 6], &device);
        let mut tiled =
            TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[1, 2, 2], &[1, 2, 4]));
        assert_eq!(tiled.attribute(&x4, &target).unwrap().dims(), [2, 1, 5, 6]);

        let x5 = Tensor::<TestBackend, 5>::ones([1, 2, 3, 4, 5], &device);
        let mut tiled =
            TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[2, 1, 2, 1], &[2, 3, 2, 5]));
        assert_eq!(tiled.attribute(&x5, &target).unwrap().dims(), [1, 2, 3, 4, 5]);
        assert_eq!(tiled.primitive().views.len(), 4);
    }

    #[test]
    fn test_image_example_runs_four_sweeps() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([1, 1, 10, 10], &device);
        let mut tiled =
            TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[1, 2, 2], &[1, 4, 4]));

        let attribution = tiled.attribute(&input, &Target::Class(0)).unwrap();

        assert_eq!(attribution.dims(), [1, 1, 10, 10]);
        let primitive = tiled.into_primitive();
        assert_eq!(primitive.views, vec![vec![1, 1, 10, 10]; 4]);
        assert!(primitive.strides.iter().all(|s| s == &[1, 4, 4]));
    }

    #[test]
    fn test_unit_factors_match_direct_occlusion() {
        let device = Default::default();
        let data: Vec<f32> = (0..24).map(|i| (i as f32 * 0.7).cos()).collect();
        let input =
            Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([2, 3, 4]);
        let target = Target::Class(0);

        let mut tiled = TiledOcclusion::new(
            Occlusion::new(squared_model::<3>),
            quiet(&[1, 1], &[1, 2]).with_baseline(0.25),
        );
        let tiled_result = tiled.attribute(&input, &target).unwrap();

        let request = OcclusionRequest {
            target: &target,
            baseline: 0.25,
            strides: &[1, 2],
            sliding_window_shapes: &[1, 2],
        };
        let direct = Occlusion::new(squared_model::<3>)
            .occlude(input, &request)
            .unwrap();

        assert_eq!(values(tiled_result), values(direct));
    }

    #[test]
    fn test_every_element_is_covered() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 3>::ones([1, 7, 10], &device);
        let mut tiled =
            TiledOcclusion::new(Occlusion::new(sum_model::<3>), quiet(&[1, 2], &[3, 4]));

        let attribution = tiled.attribute(&input, &Target::Class(0)).unwrap();

        assert!(values(attribution).iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_overlapping_sweeps_are_summed() {
        // extent 4, window 2, k 2: pad 1, views [0,4) and [1,5) of a length-5
        // buffer. The last input element is only seen by the second view.
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::ones([1, 4], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[2], &[2]));

        let attribution = tiled.attribute(&input, &Target::Class(0)).unwrap();

        assert_eq!(values(attribution), vec![2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_views_past_padding_are_skipped() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::ones([1, 1], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[3], &[6]));
        let mut progress = LogProgress::new();

        let attribution = tiled
            .attribute_with_progress(&input, &Target::Class(0), &mut progress)
            .unwrap();

        assert_eq!(attribution.dims(), [1, 1]);
        assert_eq!(tiled.primitive().views.len(), 2);
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.completed(), 3);
    }

    #[test]
    fn test_not_divisible_fails_before_occlusion() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::ones([1, 12], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[2], &[3]));

        let err = tiled.attribute(&input, &Target::Class(0)).unwrap_err();

        assert!(err.is_configuration());
        assert!(matches!(
            err,
            ExplainError::Configuration(CoreError::NotDivisible { .. })
        ));
        assert!(tiled.primitive().views.is_empty());
    }

    #[test]
    fn test_rank_mismatch_fails() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[2, 2], &[4, 4]));

        let err = tiled.attribute(&input, &Target::Class(0)).unwrap_err();

        assert!(matches!(
            err,
            ExplainError::Configuration(CoreError::WindowRankMismatch { axes: 3, window: 2 })
        ));
        assert!(tiled.primitive().views.is_empty());
    }

    #[test]
    fn test_primitive_shape_mismatch() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::ones([1, 8], &device);
        let mut tiled = TiledOcclusion::new(WrongShapePrimitive, quiet(&[2], &[4]));

        let err = tiled.attribute(&input, &Target::Class(0)).unwrap_err();

        assert!(matches!(err, ExplainError::ShapeMismatch { .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_progress_reports_every_sweep() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 3>::ones([1, 4, 6], &device);
        let mut tiled = TiledOcclusion::new(RecordingPrimitive::default(), quiet(&[2, 3], &[2, 3]));
        let mut progress = LogProgress::new();

        tiled
            .attribute_with_progress(&input, &Target::Class(0), &mut progress)
            .unwrap();

        assert_eq!(progress.total(), 6);
        assert_eq!(progress.completed(), 6);
    }

    #[test]
    fn test_config_defaults_and_serde() {
        let config = TiledOcclusionConfig::default();
        assert_eq!(config.k, vec![1, 2, 2]);
        assert_eq!(config.window, vec![3, 10, 10]);
        assert_eq!(config.baseline, 0.0);
        assert!(config.show_progress);

        let config = TiledOcclusionConfig::new([2], [4]).with_baseline(-1.0);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: TiledOcclusionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);

        let partial: TiledOcclusionConfig = serde_json::from_str(r#"{"k": [1, 4]}"#).unwrap();
        assert_eq!(partial.k, vec![1, 4]);
        assert_eq!(partial.window, vec![3, 10, 10]);
    }

    #[test]
    fn test_config_plan() {
        let plan = TiledOcclusionConfig::new([1, 2, 2], [1, 4, 4])
            .plan(&[1, 1, 10, 10])
            .unwrap();
        assert_eq!(plan.pads(), &[0, 2, 2]);
        assert!(TiledOcclusionConfig::default().plan(&[1, 10, 10]).is_err());
    }
}
