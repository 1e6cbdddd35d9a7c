//! # exattr
//!
//! Extra perturbation-based attribution methods for Burn models.
//!
//! - **Tiled occlusion**: occlusion run over `k` phase-shifted tilings per axis
//!   of a zero-padded input, summing the attributions so that every element
//!   is scored at several positions inside a window
//! - **FusionGrad**: any attribution method averaged over Gaussian noise on the
//!   model weights and on the input, with the model restored afterwards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exattr::prelude::*;
//!
//! // (batch, channel, x, y)
//! let config = TiledOcclusionConfig::new([1, 2, 2], [1, 4, 4]);
//! let mut tiled = TiledOcclusion::new(Occlusion::new(|x| model.forward(x)), config);
//! let attribution = tiled.attribute(&images, &Target::Class(3))?;
//!
//! let fusion_config = FusionGradConfig::new(10, 10).with_seed(42);
//! let mut fusion = FusionGrad::new(
//!     |model: &MyModel<B>, x, target: &Target| {
//!         TiledOcclusion::new(Occlusion::new(|x| model.forward(x)), config.clone())
//!             .attribute(&x, target)
//!     },
//!     fusion_config,
//! );
//! let attribution = fusion.attribute(&mut model, &images, &Target::Class(3))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use exattr_core as core;
pub use exattr_explain as explain;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use exattr::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use exattr_core::{CoreError, InputShape, ProgressSink, Seed, TilingPlan};

    // Attribution
    pub use exattr_explain::{
        AttributionMap, AttributionMethod, AttributionSummary, ExplainError, FusionGrad,
        FusionGradConfig, Occlusion, OcclusionPrimitive, OcclusionRequest, Target,
        TiledOcclusion, TiledOcclusionConfig,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    pub use exattr_core::backend;
    pub use exattr_core::{
        progress_for, BarProgress, GaussianNoise, LogProgress, NoProgress, NoiseMode, OffsetGrid,
        MAX_AXES,
    };
}
