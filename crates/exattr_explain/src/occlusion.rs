//! Sliding-window occlusion.
//!
//! [`OcclusionPrimitive`] is the seam used by tiled occlusion: given a batch
//! it occludes non-overlapping (or strided) windows and returns a per-element
//! attribution of the same shape. [`Occlusion`] is the concrete
//! perturb-and-measure implementation over a model forward function.

use std::ops::Range;

use burn::prelude::*;
use exattr_core::OffsetGrid;

use crate::error::{ExplainError, Result};
use crate::target::Target;

/// Arguments of one occlusion pass.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionRequest<'a> {
    /// Output explained for each sample.
    pub target: &'a Target,
    /// Replacement value for occluded elements.
    pub baseline: f32,
    /// Distance between consecutive window starts, per feature axis.
    pub strides: &'a [usize],
    /// Window extent per feature axis.
    pub sliding_window_shapes: &'a [usize],
}

/// A perturb-and-measure attribution over a batch of rank `D` (batch first).
///
/// Implementations must return a tensor with the same dimensions as `input`.
pub trait OcclusionPrimitive<B: Backend, const D: usize> {
    /// Attribute the target output to every element of `input`.
    fn occlude(&mut self, input: Tensor<B, D>, request: &OcclusionRequest<'_>)
        -> Result<Tensor<B, D>>;
}

/// Occlusion attribution over a forward function returning `(batch, outputs)`.
///
/// Every window position is replaced by the baseline across the whole batch
/// and the drop of the target output, `clean - occluded`, is credited to each
/// element of the window. Elements covered by several windows receive the
/// average of their windows. Along each axis windows start at
/// `0, stride, 2 * stride, ..` and the last one is clipped at the boundary, so
/// the trailing remainder of an axis is occluded too.
///
/// # Example
///
/// ```rust,ignore
/// use exattr_explain::{Occlusion, OcclusionPrimitive, OcclusionRequest, Target};
///
/// let mut occlusion = Occlusion::new(|x| model.forward(x));
/// let target = Target::Class(0);
/// let request = OcclusionRequest {
///     target: &target,
///     baseline: 0.0,
///     strides: &[1, 4, 4],
///     sliding_window_shapes: &[1, 4, 4],
/// };
/// let attribution = occlusion.occlude(input, &request)?;
/// ```
pub struct Occlusion<F> {
    forward: F,
    perturbations_per_eval: usize,
    evaluations: usize,
}

impl<F> Occlusion<F> {
    /// Wrap a forward function.
    pub fn new(forward: F) -> Self {
        Self {
            forward,
            perturbations_per_eval: 1,
            evaluations: 0,
        }
    }

    /// Number of occluded copies of the batch stacked into one forward call.
    #[must_use]
    pub fn with_perturbations_per_eval(mut self, perturbations_per_eval: usize) -> Self {
        self.perturbations_per_eval = perturbations_per_eval.max(1);
        self
    }

    /// Forward calls made so far.
    #[must_use]
    pub const fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Score `copies` stacked copies of a `batch`-sized input for the target.
    ///
    /// Returns one `(batch, 1)` tensor per copy.
    fn score<B: Backend, const D: usize>(
        &mut self,
        input: Tensor<B, D>,
        batch: usize,
        copies: usize,
        target: &Target,
    ) -> Result<Vec<Tensor<B, 2>>>
    where
        F: FnMut(Tensor<B, D>) -> Tensor<B, 2>,
    {
        let device = input.device();
        let output = (self.forward)(input);
        self.evaluations += 1;

        let [rows, n_outputs] = output.dims();
        if rows != batch * copies {
            return Err(ExplainError::ShapeMismatch {
                expected: vec![batch * copies, n_outputs],
                got: vec![rows, n_outputs],
            });
        }
        if let Some(max) = target.max_index() {
            if max >= n_outputs {
                return Err(ExplainError::InvalidTarget(format!(
                    "target index {max} out of range for {n_outputs} outputs"
                )));
            }
        }

        let per_copy = target.rows(batch)?;
        let indices: Vec<i64> = (0..copies)
            .flat_map(|_| per_copy.iter().map(|&class| class as i64))
            .collect();
        let indices =
            Tensor::<B, 2, Int>::from_data(TensorData::new(indices, [batch * copies, 1]), &device);
        let selected = output.gather(1, indices);

        Ok((0..copies)
            .map(|copy| {
                selected
                    .clone()
                    .slice([copy * batch..(copy + 1) * batch, 0..1])
            })
            .collect())
    }
}

impl<B, F, const D: usize> OcclusionPrimitive<B, D> for Occlusion<F>
where
    B: Backend,
    F: FnMut(Tensor<B, D>) -> Tensor<B, 2>,
{
    fn occlude(
        &mut self,
        input: Tensor<B, D>,
        request: &OcclusionRequest<'_>,
    ) -> Result<Tensor<B, D>> {
        let dims = input.dims();
        let batch = dims[0];
        let extents = &dims[1..];
        check_request(extents, request)?;

        let device = input.device();
        let starts: Vec<Vec<usize>> = extents
            .iter()
            .zip(request.sliding_window_shapes)
            .zip(request.strides)
            .map(|((&extent, &window), &stride)| window_starts(extent, window, stride))
            .collect();
        let counts: Vec<usize> = starts.iter().map(Vec::len).collect();
        let regions: Vec<Vec<Range<usize>>> = OffsetGrid::new(&counts)
            .map(|position| {
                position
                    .iter()
                    .enumerate()
                    .map(|(axis, &index)| {
                        let start = starts[axis][index];
                        start..(start + request.sliding_window_shapes[axis]).min(extents[axis])
                    })
                    .collect()
            })
            .collect();

        tracing::debug!(
            "Occlusion: {} windows over {:?}, {} per forward call",
            regions.len(),
            dims,
            self.perturbations_per_eval
        );

        let clean = self
            .score(input.clone(), batch, 1, request.target)?
            .remove(0);
        let unit = unit_dims::<D>(batch);
        let mut total = Tensor::<B, D>::zeros(dims, &device);
        let mut hits = Tensor::<B, D>::zeros(dims, &device);

        for chunk in regions.chunks(self.perturbations_per_eval) {
            let ablated: Vec<Tensor<B, D>> = chunk
                .iter()
                .map(|region| {
                    let ranges = batch_ranges::<D>(batch, region);
                    let fill = Tensor::full(range_dims(&ranges), request.baseline, &device);
                    input.clone().slice_assign(ranges, fill)
                })
                .collect();
            let scores = self.score(Tensor::cat(ablated, 0), batch, chunk.len(), request.target)?;

            for (region, score) in chunk.iter().zip(scores) {
                tracing::trace!("Occlusion: window {:?}", region);
                let ranges = batch_ranges::<D>(batch, region);
                let delta = (clean.clone() - score).reshape(unit);
                let contribution = Tensor::<B, D>::ones(range_dims(&ranges), &device) * delta;

                let current = total.clone().slice(ranges.clone());
                total = total.slice_assign(ranges.clone(), current + contribution);
                let seen = hits.clone().slice(ranges.clone());
                hits = hits.slice_assign(ranges, seen + 1.0);
            }
        }

        Ok(total / hits.clamp_min(1.0))
    }
}

fn check_request(extents: &[usize], request: &OcclusionRequest<'_>) -> Result<()> {
    let n_axes = extents.len();
    if n_axes == 0 {
        return Err(ExplainError::ExternalComputation(
            "occlusion needs at least one feature axis after the batch axis".to_string(),
        ));
    }
    if request.strides.len() != n_axes || request.sliding_window_shapes.len() != n_axes {
        return Err(ExplainError::ExternalComputation(format!(
            "expected {n_axes} strides and window extents, got {} and {}",
            request.strides.len(),
            request.sliding_window_shapes.len()
        )));
    }
    if request.strides.contains(&0) || request.sliding_window_shapes.contains(&0) {
        return Err(ExplainError::ExternalComputation(format!(
            "strides {:?} and window extents {:?} must be positive",
            request.strides, request.sliding_window_shapes
        )));
    }
    Ok(())
}

/// Window starts along one axis: `0, stride, ..` until a window reaches the end.
fn window_starts(extent: usize, window: usize, stride: usize) -> Vec<usize> {
    let mut starts = vec![0];
    let mut start = 0;
    while start + window < extent && start + stride < extent {
        start += stride;
        starts.push(start);
    }
    starts
}

/// Full ranges for a batch: all rows, then the given feature-axis ranges.
pub(crate) fn batch_ranges<const D: usize>(batch: usize, axes: &[Range<usize>]) -> [Range<usize>; D] {
    debug_assert_eq!(axes.len() + 1, D);
    std::array::from_fn(|i| if i == 0 { 0..batch } else { axes[i - 1].clone() })
}

/// Dimensions of the block selected by `ranges`.
pub(crate) fn range_dims<const D: usize>(ranges: &[Range<usize>; D]) -> [usize; D] {
    std::array::from_fn(|i| ranges[i].len())
}

/// `[batch, 1, .., 1]`, for broadcasting one value per sample.
fn unit_dims<const D: usize>(batch: usize) -> [usize; D] {
    std::array::from_fn(|i| if i == 0 { batch } else { 1 })
}
