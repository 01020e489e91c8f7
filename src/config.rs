//! Immutable run configuration.
//!
//! One `CorrConfig` value is built up front and threaded through every stage;
//! there is no global mutable settings object. Tuning constants (padding
//! fractions, outlier thresholds) are exposed as fields with calibrated
//! defaults rather than hard-coded.

use crate::engine::{CostMetric, Prefilter};
use crate::geom::{PixelBox, SearchRange};
use crate::util::{SeedResult, StereoSeedError};

/// How the coarse seed disparity is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedMode {
    /// No seed; a single global search range is used for every tile.
    None,
    /// Correlate the low-resolution pair with a robust, hard-coded metric.
    LowResCorrelation,
    /// Project an elevation model through both cameras (opaque collaborator);
    /// the spread field is mandatory.
    DemProjection,
    /// The seed field already exists on disk; the spread field is mandatory.
    ExternalSupplied,
}

/// Outlier-filter tuning. The `*_factor` fields keep the calibration of the
/// thresholds adjustable without touching the primary knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterParams {
    /// Neighborhood half-window (x, y) for both filter variants.
    pub half_kernel: (usize, usize),
    /// Absolute-deviation threshold for the threshold variant.
    pub rm_threshold: f32,
    /// Calibration multiplier applied to `rm_threshold`.
    pub rm_threshold_factor: f32,
    /// Minimum percentage of agreeing neighbors for the threshold variant.
    pub rm_min_matches: f32,
    /// Calibration multiplier applied to `rm_min_matches`.
    pub rm_min_matches_factor: f32,
    /// Percentile of the neighborhood deviation distribution, in `[0, 1]`.
    pub quantile_percentile: f32,
    /// Positive selects the quantile variant (and disables blob filtering in
    /// the same pass); non-positive selects the threshold variant.
    pub quantile_multiple: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            half_kernel: (1, 1),
            rm_threshold: 3.0,
            rm_threshold_factor: 2.0 / 3.0,
            rm_min_matches: 50.0,
            rm_min_matches_factor: 0.5 / 0.6,
            quantile_percentile: 0.85,
            quantile_multiple: -1.0,
        }
    }
}

/// Immutable configuration consulted by every stage.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrConfig {
    pub seed_mode: SeedMode,
    /// User-specified global search range; highest priority when set.
    pub user_search_range: Option<SearchRange>,
    /// Fraction of the estimated range to pad the seed search by.
    pub seed_percent_pad: f32,
    /// Cost metric for the full-resolution pass. The seed pass always uses
    /// cross-correlation irrespective of this.
    pub cost: CostMetric,
    pub prefilter: Prefilter,
    pub prefilter_width: f32,
    pub kernel_size: (usize, usize),
    /// Soft per-tile timeout in seconds; zero disables the budget.
    pub corr_timeout: u32,
    /// The seed pass multiplies the timeout by this (low-res correlation is
    /// cheap, so it can try harder).
    pub lowres_timeout_factor: u32,
    pub xcorr_threshold: f32,
    pub max_pyramid_levels: u32,
    pub use_sgm: bool,
    pub use_local_homography: bool,
    /// Output tile edge length; also the homography grid granularity.
    pub corr_tile_size: i64,
    pub collar_size: i64,
    pub blob_filter_area: f64,
    /// Raster writer tile size, used only for the seed-pass collar decision.
    pub raster_tile_size: (usize, usize),
    pub left_crop_win: Option<PixelBox>,
    pub right_crop_win: Option<PixelBox>,
    /// Output crop window; disparity outside it is forced invalid. `None`
    /// computes the full frame.
    pub crop_win: Option<PixelBox>,
    pub filter: FilterParams,
    /// Skip the seed stage when its artifacts already exist (still honored
    /// for seed mode `None`, which needs no artifacts but does need a range).
    pub skip_low_res: bool,
    /// Stop after the seed stage.
    pub compute_low_res_only: bool,
    /// Minimum seed correspondences required to fit a tile homography.
    pub min_homography_samples: usize,
}

impl Default for CorrConfig {
    fn default() -> Self {
        Self {
            seed_mode: SeedMode::LowResCorrelation,
            user_search_range: None,
            seed_percent_pad: 0.25,
            cost: CostMetric::CrossCorrelation,
            prefilter: Prefilter::LaplacianOfGaussian,
            prefilter_width: 1.5,
            kernel_size: (21, 21),
            corr_timeout: 900,
            lowres_timeout_factor: 5,
            xcorr_threshold: 2.0,
            max_pyramid_levels: 5,
            use_sgm: false,
            use_local_homography: false,
            corr_tile_size: 1024,
            collar_size: 512,
            blob_filter_area: 0.0,
            raster_tile_size: (1024, 1024),
            left_crop_win: None,
            right_crop_win: None,
            crop_win: None,
            filter: FilterParams::default(),
            skip_low_res: false,
            compute_low_res_only: false,
            min_homography_samples: 8,
        }
    }
}

impl CorrConfig {
    /// Fails fast on contradictory settings before any output is produced.
    pub fn validate(&self) -> SeedResult<()> {
        if self.cost.requires_sgm() && !self.use_sgm {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!("cost metric {:?} requires SGM", self.cost),
            });
        }
        if self.corr_tile_size <= 0 {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!("corr_tile_size must be positive, got {}", self.corr_tile_size),
            });
        }
        if self.kernel_size.0 == 0 || self.kernel_size.1 == 0 {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!(
                    "kernel size must be positive, got {}x{}",
                    self.kernel_size.0, self.kernel_size.1
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.filter.quantile_percentile) {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!(
                    "quantile percentile must be in [0, 1], got {}",
                    self.filter.quantile_percentile
                ),
            });
        }
        Ok(())
    }

    /// Both crop windows set: caches of low-resolution artifacts must not be
    /// reused across runs.
    pub fn crops_both_images(&self) -> bool {
        self.left_crop_win.is_some() && self.right_crop_win.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::CorrConfig;
    use crate::engine::CostMetric;
    use crate::util::StereoSeedError;

    #[test]
    fn census_without_sgm_is_a_contradiction() {
        let cfg = CorrConfig {
            cost: CostMetric::CensusTransform,
            use_sgm: false,
            ..CorrConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(StereoSeedError::ConfigContradiction { .. })
        ));

        let cfg = CorrConfig {
            cost: CostMetric::CensusTransform,
            use_sgm: true,
            ..CorrConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
