//! Error types for stereoseed.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for stereoseed operations.
pub type SeedResult<T> = std::result::Result<T, StereoSeedError>;

/// Errors that can occur while preparing or dispatching seeded correlation.
///
/// Recoverable conditions (a missing or corrupt cached artifact) are absorbed
/// by the stage that detects them and never reach this enum; everything here
/// terminates the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StereoSeedError {
    /// Width or height is zero, or a dimension product overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer is too small for the requested view.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A sub-region does not fit inside its parent grid.
    #[error("roi ({x}, {y}) {width}x{height} out of bounds for {img_width}x{img_height} image")]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// Two configuration values contradict each other; fails fast before any
    /// output is produced.
    #[error("configuration contradiction: {reason}")]
    ConfigContradiction { reason: String },
    /// A mandatory on-disk artifact is absent (e.g. an externally supplied
    /// seed disparity that was never written).
    #[error("missing required artifact: {path}")]
    MissingArtifact { path: PathBuf },
    /// The global search range could not be established from feature points;
    /// the offending artifact has been deleted before this was returned.
    #[error("no inlier correspondences in {path}")]
    NoInliers { path: PathBuf },
    /// Unrecoverable I/O while reading or writing an artifact.
    #[error("artifact i/o failure for {path}: {reason}")]
    ArtifactIo { path: PathBuf, reason: String },
    /// An external collaborator (matching engine, DEM projector) failed.
    #[error("collaborator failure: {reason}")]
    Engine { reason: String },
}
