//! Index arithmetic for tiled occlusion sweeps.
//!
//! The input is embedded in a zero buffer that is left-padded along each
//! feature axis by `window / k` (or nothing when `k == 1`). Each sweep reads a
//! view of the original extent from that buffer, shifted by
//! `offset * window / k`, so that the `k[0] * .. * k[D-1]` sweeps together
//! place occlusion windows at every multiple of `window / k`.
//!
//! With `k > 2` the later offsets run past the end of the padded buffer; their
//! views are truncated at the buffer end, and a view that starts past the end
//! is empty.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::grid::OffsetGrid;

/// Largest number of non-batch axes accepted by [`TilingPlan`].
pub const MAX_AXES: usize = 4;

/// Validated geometry of a tiled occlusion run.
///
/// All vectors are indexed by feature axis (batch excluded).
///
/// # Example
///
/// ```rust
/// use exattr_core::TilingPlan;
///
/// let plan = TilingPlan::new(&[1, 10, 10], &[1, 4, 4], &[1, 2, 2]).unwrap();
/// assert_eq!(plan.pads(), &[0, 2, 2]);
/// assert_eq!(plan.padded_extents(), vec![1, 12, 12]);
/// assert_eq!(plan.sweep_count(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingPlan {
    extents: Vec<usize>,
    window: Vec<usize>,
    factors: Vec<usize>,
    steps: Vec<usize>,
    pads: Vec<usize>,
}

impl TilingPlan {
    /// Validate the arguments and precompute pads and steps.
    ///
    /// # Arguments
    ///
    /// * `extents` - Extents of the feature axes of the input
    /// * `window` - Occlusion window extent per axis
    /// * `factors` - Upscale factor `k` per axis
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the axis count is outside `1..=4`,
    /// lengths disagree, any value is zero, or a window is not divisible by
    /// its factor.
    pub fn new(extents: &[usize], window: &[usize], factors: &[usize]) -> Result<Self> {
        let n_axes = extents.len();
        if n_axes == 0 || n_axes > MAX_AXES {
            return Err(CoreError::TooManyAxes {
                max: MAX_AXES,
                got: n_axes,
            });
        }
        if window.len() != n_axes {
            return Err(CoreError::WindowRankMismatch {
                axes: n_axes,
                window: window.len(),
            });
        }
        if factors.len() != window.len() {
            return Err(CoreError::FactorRankMismatch {
                window: window.len(),
                factor: factors.len(),
            });
        }

        for (axis, ((&extent, &w), &k)) in extents.iter().zip(window).zip(factors).enumerate() {
            if extent == 0 {
                return Err(CoreError::ZeroExtent { axis: axis + 1 });
            }
            if w == 0 {
                return Err(CoreError::ZeroWindow { axis });
            }
            if k == 0 {
                return Err(CoreError::ZeroFactor { axis });
            }
            if w % k != 0 {
                return Err(CoreError::NotDivisible {
                    axis,
                    window: w,
                    factor: k,
                });
            }
        }

        let steps: Vec<usize> = window.iter().zip(factors).map(|(w, k)| w / k).collect();
        let pads = steps
            .iter()
            .zip(factors)
            .map(|(&step, &k)| if k > 1 { step } else { 0 })
            .collect();

        Ok(Self {
            extents: extents.to_vec(),
            window: window.to_vec(),
            factors: factors.to_vec(),
            steps,
            pads,
        })
    }

    /// Number of feature axes.
    #[must_use]
    pub fn n_axes(&self) -> usize {
        self.extents.len()
    }

    /// Extents of the original input.
    #[must_use]
    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    /// Occlusion window per axis.
    #[must_use]
    pub fn window(&self) -> &[usize] {
        &self.window
    }

    /// Upscale factor per axis.
    #[must_use]
    pub fn factors(&self) -> &[usize] {
        &self.factors
    }

    /// Offset between consecutive sweeps per axis (`window / k`).
    #[must_use]
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Left padding per axis.
    #[must_use]
    pub fn pads(&self) -> &[usize] {
        &self.pads
    }

    /// Extents of the padded buffer.
    #[must_use]
    pub fn padded_extents(&self) -> Vec<usize> {
        self.extents
            .iter()
            .zip(&self.pads)
            .map(|(extent, pad)| extent + pad)
            .collect()
    }

    /// Number of sweeps, `k[0] * .. * k[D-1]`. Independent of the input size.
    #[must_use]
    pub fn sweep_count(&self) -> usize {
        self.factors.iter().product()
    }

    /// Every sweep offset, one index per axis in `0..k[i]`.
    #[must_use]
    pub fn offsets(&self) -> OffsetGrid {
        OffsetGrid::new(&self.factors)
    }

    /// Region of the padded buffer read by the sweep at `offset`.
    ///
    /// Each range has the original extent of its axis, truncated at the end
    /// of the padded buffer.
    #[must_use]
    pub fn view_ranges(&self, offset: &[usize]) -> Vec<Range<usize>> {
        debug_assert_eq!(offset.len(), self.n_axes());
        self.extents
            .iter()
            .zip(&self.pads)
            .zip(&self.steps)
            .zip(offset)
            .map(|(((&extent, &pad), &step), &index)| {
                let limit = extent + pad;
                let start = (step * index).min(limit);
                start..(start + extent).min(limit)
            })
            .collect()
    }

    /// Whether the sweep at `offset` reads nothing at all.
    #[must_use]
    pub fn is_empty_view(&self, offset: &[usize]) -> bool {
        self.view_ranges(offset).iter().any(|range| range.is_empty())
    }

    /// Region of the padded buffer that holds the original input.
    #[must_use]
    pub fn crop_ranges(&self) -> Vec<Range<usize>> {
        self.extents
            .iter()
            .zip(&self.pads)
            .map(|(&extent, &pad)| pad..pad + extent)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_image_example() {
        let plan = TilingPlan::new(&[1, 10, 10], &[1, 4, 4], &[1, 2, 2]).unwrap();
        assert_eq!(plan.steps(), &[1, 2, 2]);
        assert_eq!(plan.pads(), &[0, 2, 2]);
        assert_eq!(plan.padded_extents(), vec![1, 12, 12]);
        assert_eq!(plan.sweep_count(), 4);
        assert_eq!(plan.offsets().len(), 4);
        assert_eq!(plan.crop_ranges(), vec![0..1, 2..12, 2..12]);
        assert_eq!(plan.view_ranges(&[0, 1, 0]), vec![0..1, 2..12, 0..10]);
    }

    #[test]
    fn test_views_stay_in_bounds() {
        let plan = TilingPlan::new(&[3, 17], &[3, 6], &[3, 3]).unwrap();
        let padded = plan.padded_extents();
        for offset in plan.offsets() {
            for (range, limit) in plan.view_ranges(&offset).iter().zip(&padded) {
                assert!(range.end <= *limit, "{range:?} exceeds {limit}");
            }
        }
        // Offset 2 on the first axis starts at 2 and is truncated at 4.
        assert_eq!(plan.view_ranges(&[2, 0]), vec![2..4, 0..17]);
        assert!(!plan.is_empty_view(&[2, 2]));
    }

    #[test]
    fn test_view_past_buffer_end_is_empty() {
        // step 2, pad 2, padded extent 3: offset 2 starts at 4.
        let plan = TilingPlan::new(&[1], &[6], &[3]).unwrap();
        assert_eq!(plan.view_ranges(&[2]), vec![3..3]);
        assert!(plan.is_empty_view(&[2]));
        assert!(!plan.is_empty_view(&[1]));
    }

    #[test]
    fn test_unit_factors_need_no_padding() {
        let plan = TilingPlan::new(&[5, 7], &[2, 3], &[1, 1]).unwrap();
        assert_eq!(plan.pads(), &[0, 0]);
        assert_eq!(plan.sweep_count(), 1);
        assert_eq!(plan.view_ranges(&[0, 0]), plan.crop_ranges());
    }

    #[test]
    fn test_not_divisible_is_rejected() {
        let err = TilingPlan::new(&[10], &[3], &[2]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotDivisible {
                axis: 0,
                window: 3,
                factor: 2
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rank_errors() {
        assert!(matches!(
            TilingPlan::new(&[3, 8, 8], &[4, 4], &[2, 2]),
            Err(CoreError::WindowRankMismatch { axes: 3, window: 2 })
        ));
        assert!(matches!(
            TilingPlan::new(&[8, 8], &[4, 4], &[2]),
            Err(CoreError::FactorRankMismatch { window: 2, factor: 1 })
        ));
        assert!(matches!(
            TilingPlan::new(&[2, 2, 2, 2, 2], &[1; 5], &[1; 5]),
            Err(CoreError::TooManyAxes { max: 4, got: 5 })
        ));
        assert!(matches!(
            TilingPlan::new(&[], &[], &[]),
            Err(CoreError::TooManyAxes { got: 0, .. })
        ));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        assert!(matches!(
            TilingPlan::new(&[8], &[0], &[1]),
            Err(CoreError::ZeroWindow { axis: 0 })
        ));
        assert!(matches!(
            TilingPlan::new(&[8], &[4], &[0]),
            Err(CoreError::ZeroFactor { axis: 0 })
        ));
    }

    #[test]
    fn test_sweeps_cover_every_window_phase() {
        // Along one axis the sweep starts, mapped back to input coordinates,
        // must hit every multiple of the step within one window.
        let plan = TilingPlan::new(&[12], &[6], &[3]).unwrap();
        let pad = plan.pads()[0] as isize;
        let mut phases: Vec<isize> = plan
            .offsets()
            .map(|offset| plan.view_ranges(&offset)[0].start as isize - pad)
            .collect();
        phases.sort_unstable();
        assert_eq!(phases, vec![-2, 0, 2]);
    }
}
