//! Coarse seed-disparity production with on-disk caching.
//!
//! The seed is a low-resolution disparity field computed once per run (or
//! reloaded from a prior run) that every tile's search range is later derived
//! from. The low-resolution pass deliberately uses cross-correlation
//! whatever metric the full-resolution pass was configured with: at seed
//! scale accuracy matters more than speed, and the image is small enough to
//! afford it.

use std::fs;

use crate::artifact::{self, Workspace};
use crate::config::{CorrConfig, SeedMode};
use crate::engine::{
    probe_seconds_per_op, CorrelationEngine, CostMetric, DemProjector, MatchRequest, Prefilter,
};
use crate::field::DisparityField;
use crate::filter::{filter_outliers, FilterVariant};
use crate::geom::{PixelBox, ResolutionScale, SearchRange};
use crate::raster::Raster;
use crate::trace::{trace_event, trace_span};
use crate::util::{SeedResult, StereoSeedError};

/// Low-resolution inputs plus the measured full-resolution extent.
pub struct SeedInputs<'a> {
    pub left_low: &'a Raster<f32>,
    pub right_low: &'a Raster<f32>,
    pub left_mask_low: &'a Raster<u8>,
    pub right_mask_low: &'a Raster<u8>,
    pub full_size: (usize, usize),
}

impl SeedInputs<'_> {
    /// Measured full-over-low resolution ratio.
    pub fn scale(&self) -> SeedResult<ResolutionScale> {
        ResolutionScale::measure(
            self.full_size,
            (self.left_low.width(), self.left_low.height()),
        )
    }
}

/// Produces the seed disparity unless a reusable cached copy exists.
///
/// The cache is reused except when (a) the artifact is missing or corrupt,
/// which silently forces recomputation, or (b) both crop windows are set:
/// cropping changes the geometry, so the seed is rebuilt every run.
pub fn ensure_seed(
    cfg: &CorrConfig,
    ws: &Workspace,
    inputs: &SeedInputs<'_>,
    engine: &dyn CorrelationEngine,
    dem: Option<&dyn DemProjector>,
    global_range: SearchRange,
) -> SeedResult<()> {
    if cfg.seed_mode == SeedMode::None {
        return Ok(());
    }
    let rebuild = cfg.crops_both_images()
        || artifact::try_load_json::<DisparityField>(&ws.seed_disparity()).is_none();
    if !rebuild {
        trace_event!("seed_cache_hit");
        return Ok(());
    }
    produce_seed(cfg, ws, inputs, engine, dem, global_range)
}

/// Produces and persists the seed disparity for the configured mode.
pub fn produce_seed(
    cfg: &CorrConfig,
    ws: &Workspace,
    inputs: &SeedInputs<'_>,
    engine: &dyn CorrelationEngine,
    dem: Option<&dyn DemProjector>,
    global_range: SearchRange,
) -> SeedResult<()> {
    match cfg.seed_mode {
        SeedMode::None => Ok(()),
        SeedMode::LowResCorrelation => produce_lowres_seed(cfg, ws, inputs, engine, global_range),
        SeedMode::DemProjection => {
            let dem = dem.ok_or_else(|| StereoSeedError::ConfigContradiction {
                reason: "seed mode DemProjection requires a DEM projector".into(),
            })?;
            let (disparity, spread) = dem.project()?;
            artifact::save_json(&ws.seed_disparity(), &disparity)?;
            artifact::save_json(&ws.seed_spread(), &spread)?;
            Ok(())
        }
        SeedMode::ExternalSupplied => {
            // The field must already be on disk; validate it is readable.
            let path = ws.seed_disparity();
            if !fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
                return Err(StereoSeedError::MissingArtifact { path });
            }
            artifact::load_json::<DisparityField>(&path).map(|_| ())
        }
    }
}

fn produce_lowres_seed(
    cfg: &CorrConfig,
    ws: &Workspace,
    inputs: &SeedInputs<'_>,
    engine: &dyn CorrelationEngine,
    global_range: SearchRange,
) -> SeedResult<()> {
    let _span = trace_span!("lowres_seed").entered();
    let scale = inputs.scale()?;

    // Bring the global range down to seed resolution, then pad it to tolerate
    // estimation error in the range itself.
    let mut range = global_range.scale_outward(1.0 / scale.x, 1.0 / scale.y);
    range.expand_by_fraction(cfg.seed_percent_pad);

    // The low-resolution pass is cheap, so it can try five times harder.
    let timeout = cfg.corr_timeout.saturating_mul(cfg.lowres_timeout_factor);
    let seconds_per_op = if timeout > 0 {
        probe_seconds_per_op(
            engine,
            inputs.left_low.view(),
            inputs.right_low.view(),
            inputs.left_mask_low.view(),
            inputs.right_mask_low.view(),
            range,
            cfg.kernel_size,
            CostMetric::CrossCorrelation,
        )?
    } else {
        0.0
    };

    let quantile = cfg.filter.quantile_multiple > 0.0;
    // When the whole low-resolution frame fits one raster tile, no collar is
    // needed. Quantile filtering excludes blob filtering in the same pass and
    // writes the frame at once, so it runs collarless too.
    let fits_one_tile = cfg.raster_tile_size.0 > inputs.left_low.width()
        && cfg.raster_tile_size.1 > inputs.left_low.height();
    let collar_size = if quantile || fits_one_tile {
        0
    } else {
        cfg.collar_size
    };
    let blob_filter_area = if quantile {
        0.0
    } else {
        cfg.blob_filter_area * scale.inverse_mean()
    };

    let request = MatchRequest {
        left: inputs.left_low.view(),
        right: inputs.right_low.view(),
        left_mask: inputs.left_mask_low.view(),
        right_mask: inputs.right_mask_low.view(),
        region: PixelBox::from_size(
            0,
            0,
            inputs.left_low.width() as i64,
            inputs.left_low.height() as i64,
        ),
        prefilter: Prefilter::LaplacianOfGaussian,
        prefilter_width: cfg.prefilter_width,
        search_range: range,
        kernel_size: cfg.kernel_size,
        cost: CostMetric::CrossCorrelation,
        timeout_secs: timeout,
        seconds_per_op,
        xcorr_threshold: cfg.xcorr_threshold,
        max_pyramid_levels: cfg.max_pyramid_levels,
        use_sgm: cfg.use_sgm,
        collar_size,
        blob_filter_area,
    };

    let mut field = engine.correlate(&request)?;
    let variant = filter_outliers(&mut field, &cfg.filter);
    debug_assert_eq!(variant == FilterVariant::Quantile, quantile);

    artifact::save_json(&ws.seed_disparity(), &field)?;
    trace_event!("seed_written", valid = field.valid_count());
    Ok(())
}
