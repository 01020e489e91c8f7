//! Seeded search-range refinement for tiled stereo correlation.
//!
//! Stereo matching cost scales with the area of the disparity search window,
//! so a tight window matters more than a fast matcher. This crate computes a
//! coarse low-resolution disparity seed, filters its outliers, optionally
//! fits per-tile homographies over it, and derives a tight per-tile search
//! range for an external matching engine, then dispatches the engine over a
//! tile grid and assembles the full-resolution field.
//!
//! The matching engine itself is a seam: implement [`CorrelationEngine`] to
//! plug in any block matcher. A reference exhaustive matcher is provided
//! under [`engine::reference`] for tests and small inputs.

pub mod artifact;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod field;
pub mod filter;
pub mod geom;
pub mod homography;
pub mod pipeline;
pub mod raster;
pub mod search;
pub mod seed;
mod trace;
mod util;

pub use artifact::{MatchPoints, Workspace};
pub use config::{CorrConfig, FilterParams, SeedMode};
pub use dispatch::SeededCorrelator;
pub use engine::{
    ApproxRangeEstimator, CorrelationEngine, CostMetric, DemProjector, MatchRequest, Prefilter,
};
pub use field::DisparityField;
pub use geom::{PixelBox, ResolutionScale, SearchRange};
pub use homography::{Homography, HomographyGrid};
pub use pipeline::{Pipeline, PipelineInputs, StageArtifacts};
pub use raster::{downsample_image, downsample_mask, Raster, RasterView};
#[cfg(feature = "image-io")]
pub use raster::io;
pub use search::{RefinedRange, TileRangeRefiner};
pub use util::{SeedResult, StereoSeedError};
