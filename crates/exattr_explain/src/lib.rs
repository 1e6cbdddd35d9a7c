//! # exattr_explain
//!
//! Perturbation-based attribution for Burn models.
//!
//! This crate provides:
//! - [`Occlusion`]: sliding-window occlusion over any forward function
//! - [`TiledOcclusion`]: occlusion repeated over `k` phase-shifted tilings per
//!   axis, so every element sits at several positions inside a window
//! - [`FusionGrad`]: any attribution method averaged over Gaussian noise on the
//!   model weights and on the input
//!
//! ## Example
//!
//! ```rust,ignore
//! use exattr_explain::{Occlusion, Target, TiledOcclusion, TiledOcclusionConfig};
//!
//! let config = TiledOcclusionConfig::new([1, 2, 2], [3, 10, 10]);
//! let mut tiled = TiledOcclusion::new(Occlusion::new(|x| model.forward(x)), config);
//! let attribution = tiled.attribute(&image, &Target::Class(3))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod attribution;
mod error;
mod fusion;
mod occlusion;
mod target;
mod tiled;

pub use attribution::{AttributionMap, AttributionMethod, AttributionSummary};
pub use error::{ExplainError, Result};
pub use fusion::{FusionGrad, FusionGradConfig};
pub use occlusion::{Occlusion, OcclusionPrimitive, OcclusionRequest};
pub use target::Target;
pub use tiled::{TiledOcclusion, TiledOcclusionConfig};
