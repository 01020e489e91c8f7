//! Global search-range estimation.
//!
//! Used when no seed exists, and as the first pass the seed correlation
//! itself starts from. Priority order: a user-specified range verbatim,
//! then the bounding box of matched feature-point offsets, then a delegated
//! approximate estimate from the low-resolution images.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::artifact::{self, MatchPoints, Workspace};
use crate::config::{CorrConfig, SeedMode};
use crate::engine::ApproxRangeEstimator;
use crate::field::DisparityField;
use crate::geom::{ResolutionScale, SearchRange};
use crate::raster::RasterView;
use crate::trace::trace_event;
use crate::util::{SeedResult, StereoSeedError};

/// Bounding box, in disparity space, of matched feature-point offsets.
///
/// Both point sets are pushed through their alignment transforms first.
/// Points whose homogeneous coordinate collapses to zero are skipped (not
/// fatal), as are points mapping outside their image bounds. When nothing
/// survives, the match artifact is deleted and the run fails; there is no
/// automatic retry.
pub fn range_from_match_points(
    points: &MatchPoints,
    align_left: &Matrix3<f64>,
    align_right: &Matrix3<f64>,
    left_size: (usize, usize),
    right_size: (usize, usize),
    match_path: &Path,
) -> SeedResult<SearchRange> {
    let mut range = SearchRange::empty();
    for (lp, rp) in points.left.iter().zip(points.right.iter()) {
        let l = align_left * Vector3::new(lp[0], lp[1], 1.0);
        let r = align_right * Vector3::new(rp[0], rp[1], 1.0);
        // Degenerate normalization: a point at infinity constrains nothing.
        if l.z == 0.0 || r.z == 0.0 {
            continue;
        }
        let l = Vector2::new(l.x / l.z, l.y / l.z);
        let r = Vector2::new(r.x / r.z, r.y / r.z);
        if l.x < 0.0
            || l.y < 0.0
            || r.x < 0.0
            || r.y < 0.0
            || l.x > left_size.0 as f64
            || l.y > left_size.1 as f64
            || r.x > right_size.0 as f64
            || r.y > right_size.1 as f64
        {
            continue;
        }
        range.grow(Vector2::new((r.x - l.x) as f32, (r.y - l.y) as f32));
    }

    if range.is_empty() {
        // Discard the artifact so the next run regenerates matches.
        fs::remove_file(match_path).ok();
        return Err(StereoSeedError::NoInliers {
            path: match_path.to_path_buf(),
        });
    }
    Ok(range.round_outward())
}

/// Resolves the run-wide search range by priority.
pub fn resolve_global_range(
    cfg: &CorrConfig,
    ws: &Workspace,
    left_size: (usize, usize),
    right_size: (usize, usize),
    left_low: RasterView<'_, f32>,
    right_low: RasterView<'_, f32>,
    approx: Option<&dyn ApproxRangeEstimator>,
    scale: ResolutionScale,
) -> SeedResult<SearchRange> {
    if let Some(user) = cfg.user_search_range {
        trace_event!("search_range", source = "user");
        return Ok(user);
    }
    // DEM projection and externally supplied seeds carry their own range; the
    // caller derives it from the seed field afterwards.
    if matches!(cfg.seed_mode, SeedMode::DemProjection | SeedMode::ExternalSupplied) {
        return Ok(SearchRange::empty());
    }

    let match_path = ws.match_points();
    if let Some(points) = artifact::try_load_json::<MatchPoints>(&match_path) {
        let align_left = artifact::load_alignment(&ws.align_left());
        let align_right = artifact::load_alignment(&ws.align_right());
        let range = range_from_match_points(
            &points,
            &align_left,
            &align_right,
            left_size,
            right_size,
            &match_path,
        )?;
        trace_event!("search_range", source = "match_points");
        return Ok(range);
    }

    let approx = approx.ok_or_else(|| StereoSeedError::ConfigContradiction {
        reason: "no user range, no match points, and no approximate range estimator".into(),
    })?;
    let range = approx.approximate_range(left_low, right_low, scale.inverse_mean())?;
    trace_event!("search_range", source = "approximate");
    Ok(range.round_outward())
}

/// Derives the global range from a persisted seed field, scaled back to full
/// resolution. Returns `None` when no seed exists or applies.
pub fn read_search_range(
    ws: &Workspace,
    seed_mode: SeedMode,
    scale: ResolutionScale,
) -> Option<SearchRange> {
    if seed_mode == SeedMode::None {
        return None;
    }
    let seed: DisparityField = artifact::try_load_json(&ws.seed_disparity())?;
    let range = seed.disparity_range()?;
    Some(range.scale_outward(scale.x, scale.y))
}
