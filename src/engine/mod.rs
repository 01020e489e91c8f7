//! External collaborator seams: the matching engine, the DEM projector, and
//! the approximate range estimator.
//!
//! This crate never computes disparity itself at full quality; it computes
//! search windows and invokes a [`CorrelationEngine`] with them. The engine
//! receives full-frame images plus the region to rasterize and a soft
//! per-pixel time budget it is expected to enforce on its own.

use std::time::Instant;

use crate::field::DisparityField;
use crate::geom::{PixelBox, SearchRange};
use crate::raster::RasterView;
use crate::util::SeedResult;

pub mod reference;

/// Cost metric requested for the full-resolution pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostMetric {
    AbsoluteDifference,
    SquaredDifference,
    CrossCorrelation,
    /// Requires semi-global matching.
    CensusTransform,
    /// Requires semi-global matching.
    TernaryCensusTransform,
}

impl CostMetric {
    /// Census variants are only meaningful under SGM.
    pub fn requires_sgm(&self) -> bool {
        matches!(self, CostMetric::CensusTransform | CostMetric::TernaryCensusTransform)
    }
}

/// Image prefilter applied by the engine before cost evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prefilter {
    None,
    SubtractedMean,
    LaplacianOfGaussian,
}

/// One correlation request: full-frame inputs, the region to rasterize, and
/// everything the engine needs to bound its own work.
pub struct MatchRequest<'a> {
    pub left: RasterView<'a, f32>,
    pub right: RasterView<'a, f32>,
    pub left_mask: RasterView<'a, u8>,
    pub right_mask: RasterView<'a, u8>,
    /// Region of the left frame to compute, in absolute pixel coordinates.
    pub region: PixelBox,
    pub prefilter: Prefilter,
    pub prefilter_width: f32,
    pub search_range: SearchRange,
    pub kernel_size: (usize, usize),
    pub cost: CostMetric,
    /// Soft timeout in seconds; zero disables the budget.
    pub timeout_secs: u32,
    /// Estimated seconds per correlation operation, from the one-shot probe.
    pub seconds_per_op: f64,
    pub xcorr_threshold: f32,
    pub max_pyramid_levels: u32,
    pub use_sgm: bool,
    pub collar_size: i64,
    pub blob_filter_area: f64,
}

/// The external stereo matching engine.
///
/// Implementations return a field with exactly the region's dimensions. The
/// time budget is advisory; this crate supplies it but does not enforce
/// cancellation. `Send + Sync` because tiles may be dispatched from worker
/// threads.
pub trait CorrelationEngine: Send + Sync {
    fn correlate(&self, request: &MatchRequest<'_>) -> SeedResult<DisparityField>;
}

/// Opaque producer of a DEM-projected coarse disparity field plus its
/// mandatory per-cell spread.
pub trait DemProjector {
    fn project(&self) -> SeedResult<(DisparityField, DisparityField)>;
}

/// Opaque fallback estimator of a global search range from low-resolution
/// images, used when neither a user range nor feature points exist.
pub trait ApproxRangeEstimator {
    fn approximate_range(
        &self,
        left_low: RasterView<'_, f32>,
        right_low: RasterView<'_, f32>,
        mean_scale: f64,
    ) -> SeedResult<SearchRange>;
}

/// Measures the engine's cost per correlation operation, once per run.
///
/// Times one small correlation and divides by the number of pixel-by-offset
/// operations it implies. The kernel cost is folded into the per-operation
/// figure rather than counted separately.
#[allow(clippy::too_many_arguments)]
pub fn probe_seconds_per_op(
    engine: &dyn CorrelationEngine,
    left: RasterView<'_, f32>,
    right: RasterView<'_, f32>,
    left_mask: RasterView<'_, u8>,
    right_mask: RasterView<'_, u8>,
    search_range: SearchRange,
    kernel_size: (usize, usize),
    cost: CostMetric,
) -> SeedResult<f64> {
    let probe_w = (kernel_size.0 * 3).clamp(1, left.width()) as i64;
    let probe_h = (kernel_size.1 * 3).clamp(1, left.height()) as i64;
    let x0 = (left.width() as i64 - probe_w) / 2;
    let y0 = (left.height() as i64 - probe_h) / 2;
    let region = PixelBox::from_size(x0, y0, probe_w, probe_h);

    let request = MatchRequest {
        left,
        right,
        left_mask,
        right_mask,
        region,
        prefilter: Prefilter::None,
        prefilter_width: 0.0,
        search_range,
        kernel_size,
        cost,
        timeout_secs: 0,
        seconds_per_op: 0.0,
        xcorr_threshold: -1.0,
        max_pyramid_levels: 1,
        use_sgm: false,
        collar_size: 0,
        blob_filter_area: 0.0,
    };

    let start = Instant::now();
    engine.correlate(&request)?;
    let elapsed = start.elapsed().as_secs_f64();

    let rounded = search_range.round_outward();
    let offsets = ((rounded.width() as f64) + 1.0) * ((rounded.height() as f64) + 1.0);
    let ops = (probe_w * probe_h) as f64 * offsets.max(1.0);
    Ok(elapsed / ops)
}
