//! # exattr_core
//!
//! Core types for exattr perturbation-based attribution.
//!
//! This crate provides:
//! - [`CoreError`] for argument validation
//! - [`Seed`] for reproducible noise streams
//! - [`InputShape`] for batch + feature-axis shape metadata
//! - [`OffsetGrid`] for N-dimensional offset iteration
//! - [`TilingPlan`] for the padding and view arithmetic of tiled occlusion
//! - [`GaussianNoise`] for host-side normal sampling
//! - [`ProgressSink`] for reporting loop progress
//!
//! ## Shape Convention
//!
//! Inputs are `(B, A0, .., A{D-1})`: a batch axis followed by `D` feature
//! axes (channel, time, x, y, z in any order the caller chooses).
//!
//! ## Example
//!
//! ```rust
//! use exattr_core::{InputShape, TilingPlan};
//!
//! let shape = InputShape::from_dims(&[1, 1, 10, 10]).unwrap();
//! let plan = TilingPlan::new(shape.axes(), &[1, 4, 4], &[1, 2, 2]).unwrap();
//! assert_eq!(plan.sweep_count(), 4);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod grid;
mod noise;
mod progress;
mod seed;
mod shape;
mod tiling;

pub use error::{CoreError, Result};
pub use grid::OffsetGrid;
pub use noise::{GaussianNoise, NoiseMode};
pub use progress::{progress_for, BarProgress, LogProgress, NoProgress, ProgressSink};
pub use seed::Seed;
pub use shape::InputShape;
pub use tiling::{TilingPlan, MAX_AXES};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;
}
