//! Stage sequencing for one refinement run.
//!
//! The stages are strictly ordered: validate the configuration, resolve the
//! global search range, produce or reuse the seed, tighten the global range
//! from the seed, fit the homography grid, then hand a tile dispatcher to the
//! caller. Artifacts produced by earlier stages are reloaded from disk rather
//! than passed in memory, so a run can resume after any completed stage.

use crate::artifact::{self, Workspace};
use crate::config::{CorrConfig, SeedMode};
use crate::dispatch::SeededCorrelator;
use crate::engine::{ApproxRangeEstimator, CorrelationEngine, DemProjector};
use crate::field::DisparityField;
use crate::geom::{ResolutionScale, SearchRange};
use crate::homography::HomographyGrid;
use crate::raster::Raster;
use crate::search::{self, TileRangeRefiner};
use crate::seed::{self, SeedInputs};
use crate::trace::{trace_event, trace_span};
use crate::util::{SeedResult, StereoSeedError};

/// Full-resolution pair plus its pre-decimated counterpart. Masks are
/// non-zero where a pixel carries data.
pub struct PipelineInputs<'a> {
    pub left: &'a Raster<f32>,
    pub right: &'a Raster<f32>,
    pub left_mask: &'a Raster<u8>,
    pub right_mask: &'a Raster<u8>,
    pub left_low: &'a Raster<f32>,
    pub right_low: &'a Raster<f32>,
    pub left_mask_low: &'a Raster<u8>,
    pub right_mask_low: &'a Raster<u8>,
}

impl PipelineInputs<'_> {
    pub fn full_size(&self) -> (usize, usize) {
        (self.left.width(), self.left.height())
    }

    pub fn scale(&self) -> SeedResult<ResolutionScale> {
        ResolutionScale::measure(
            self.full_size(),
            (self.left_low.width(), self.left_low.height()),
        )
    }
}

/// Everything the tile dispatcher needs, materialized in memory after the
/// seed stages have run.
pub struct StageArtifacts {
    pub global_range: SearchRange,
    pub seed: Option<DisparityField>,
    pub spread: Option<DisparityField>,
    pub homographies: Option<HomographyGrid>,
}

/// Drives the seeded-correlation stages for one run.
pub struct Pipeline<'a> {
    cfg: &'a CorrConfig,
    ws: Workspace,
    inputs: PipelineInputs<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a CorrConfig,
        ws: Workspace,
        inputs: PipelineInputs<'a>,
    ) -> SeedResult<Self> {
        cfg.validate()?;
        // The scale must be measurable up front; this also rejects empty
        // images before any stage runs.
        inputs.scale()?;
        Ok(Self { cfg, ws, inputs })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    /// Runs the seed stages and loads their artifacts.
    ///
    /// Returns `None` when the configuration stops after the seed stage.
    pub fn prepare(
        &self,
        engine: &dyn CorrelationEngine,
        dem: Option<&dyn DemProjector>,
        approx: Option<&dyn ApproxRangeEstimator>,
    ) -> SeedResult<Option<StageArtifacts>> {
        let _span = trace_span!("prepare").entered();
        let scale = self.inputs.scale()?;
        let full_size = self.inputs.full_size();
        let right_size = (self.inputs.right.width(), self.inputs.right.height());

        let mut global_range = search::resolve_global_range(
            self.cfg,
            &self.ws,
            full_size,
            right_size,
            self.inputs.left_low.view(),
            self.inputs.right_low.view(),
            approx,
            scale,
        )?;

        if !self.cfg.skip_low_res {
            let seed_inputs = SeedInputs {
                left_low: self.inputs.left_low,
                right_low: self.inputs.right_low,
                left_mask_low: self.inputs.left_mask_low,
                right_mask_low: self.inputs.right_mask_low,
                full_size,
            };
            seed::ensure_seed(self.cfg, &self.ws, &seed_inputs, engine, dem, global_range)?;
        }
        if self.cfg.compute_low_res_only {
            trace_event!("stop_after_seed");
            return Ok(None);
        }

        // The seed bounds actual disparity more tightly than feature points
        // or a user guess; prefer it once it exists.
        if let Some(range) = search::read_search_range(&self.ws, self.cfg.seed_mode, scale) {
            global_range = range;
        }
        if global_range.is_empty() {
            return Err(StereoSeedError::ConfigContradiction {
                reason: "no usable search range: no seed disparity survived and no range was supplied"
                    .into(),
            });
        }
        trace_event!(
            "global_range",
            width = global_range.width(),
            height = global_range.height()
        );

        let (seed, spread) = self.load_seed_fields()?;
        let homographies = match (&seed, self.cfg.use_local_homography) {
            (Some(seed), true) => Some(HomographyGrid::load_or_compute(
                &self.ws.local_homographies(),
                seed,
                full_size,
                scale,
                self.cfg.corr_tile_size,
                self.cfg.min_homography_samples,
            )?),
            _ => None,
        };

        Ok(Some(StageArtifacts {
            global_range,
            seed,
            spread,
            homographies,
        }))
    }

    /// Builds the tile dispatcher over prepared artifacts.
    pub fn correlator<'b>(
        &'b self,
        artifacts: &'b StageArtifacts,
        engine: &'b dyn CorrelationEngine,
    ) -> SeedResult<SeededCorrelator<'b>> {
        let scale = self.inputs.scale()?;
        let refiner = TileRangeRefiner::new(
            artifacts.seed.as_ref(),
            artifacts.spread.as_ref(),
            artifacts.homographies.as_ref(),
            scale,
            artifacts.global_range,
        )?;
        SeededCorrelator::new(
            self.cfg,
            self.inputs.left,
            self.inputs.right,
            self.inputs.left_mask,
            self.inputs.right_mask,
            refiner,
            scale,
            engine,
        )
    }

    /// Runs the whole pipeline and persists the full-resolution disparity.
    ///
    /// Returns `None` when the run stops after the seed stage.
    pub fn run(
        &self,
        engine: &dyn CorrelationEngine,
        dem: Option<&dyn DemProjector>,
        approx: Option<&dyn ApproxRangeEstimator>,
    ) -> SeedResult<Option<DisparityField>> {
        let Some(artifacts) = self.prepare(engine, dem, approx)? else {
            return Ok(None);
        };
        let correlator = self.correlator(&artifacts, engine)?;
        let field = correlator.compute_all()?;
        artifact::save_json(&self.ws.full_disparity(), &field)?;
        trace_event!("run_complete", valid = field.valid_count());
        Ok(Some(field))
    }

    /// Seed and spread fields per the configured mode. The spread is
    /// mandatory for modes whose producer emits one, optional for the
    /// low-resolution correlation, absent otherwise.
    fn load_seed_fields(&self) -> SeedResult<(Option<DisparityField>, Option<DisparityField>)> {
        match self.cfg.seed_mode {
            SeedMode::None => Ok((None, None)),
            SeedMode::LowResCorrelation => {
                let seed = artifact::load_json(&self.ws.seed_disparity())?;
                let spread = artifact::try_load_json(&self.ws.seed_spread());
                Ok((Some(seed), spread))
            }
            SeedMode::DemProjection | SeedMode::ExternalSupplied => {
                let seed = artifact::load_json(&self.ws.seed_disparity())?;
                let spread_path = self.ws.seed_spread();
                let spread = artifact::try_load_json(&spread_path).ok_or(
                    StereoSeedError::MissingArtifact { path: spread_path },
                )?;
                Ok((Some(seed), Some(spread)))
            }
        }
    }
}
