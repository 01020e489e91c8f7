//! Lazy, tile-addressable correlation dispatch.
//!
//! `SeededCorrelator` exposes one operation: compute disparity for a tile.
//! Each tile resolves its own search range from the seed, optionally warps
//! the second image through the tile's homography, invokes the external
//! matching engine, and masks everything outside the crop window. Tiles are
//! pure functions of immutable shared inputs, so callers may evaluate them
//! concurrently without locking.

use nalgebra::Vector3;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::CorrConfig;
use crate::engine::{probe_seconds_per_op, CorrelationEngine, MatchRequest};
use crate::field::DisparityField;
use crate::geom::{PixelBox, ResolutionScale, SearchRange};
use crate::homography::{scale_homography, Homography};
use crate::raster::Raster;
use crate::search::TileRangeRefiner;
use crate::trace::{trace_event, trace_span};
use crate::util::{SeedResult, StereoSeedError};

/// Tile-granular disparity evaluator over fully materialized inputs.
pub struct SeededCorrelator<'a> {
    left: &'a Raster<f32>,
    right: &'a Raster<f32>,
    left_mask: &'a Raster<u8>,
    right_mask: &'a Raster<u8>,
    refiner: TileRangeRefiner<'a>,
    scale: ResolutionScale,
    crop_win: PixelBox,
    cfg: &'a CorrConfig,
    engine: &'a dyn CorrelationEngine,
    seconds_per_op: f64,
}

impl<'a> SeededCorrelator<'a> {
    /// Builds the dispatcher and runs the one-shot timing probe.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &'a CorrConfig,
        left: &'a Raster<f32>,
        right: &'a Raster<f32>,
        left_mask: &'a Raster<u8>,
        right_mask: &'a Raster<u8>,
        refiner: TileRangeRefiner<'a>,
        scale: ResolutionScale,
        engine: &'a dyn CorrelationEngine,
    ) -> SeedResult<Self> {
        if left.width() != left_mask.width() || left.height() != left_mask.height() {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!(
                    "left image and mask sizes differ: {}x{} vs {}x{}",
                    left.width(),
                    left.height(),
                    left_mask.width(),
                    left_mask.height()
                ),
            });
        }
        if right.width() != right_mask.width() || right.height() != right_mask.height() {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!(
                    "right image and mask sizes differ: {}x{} vs {}x{}",
                    right.width(),
                    right.height(),
                    right_mask.width(),
                    right_mask.height()
                ),
            });
        }
        let frame = PixelBox::from_size(0, 0, left.width() as i64, left.height() as i64);
        let crop_win = cfg.crop_win.unwrap_or(frame).intersect(&frame);

        // Per-pixel cost of the chosen metric, measured once per run.
        let seconds_per_op = if cfg.corr_timeout > 0 {
            probe_seconds_per_op(
                engine,
                left.view(),
                right.view(),
                left_mask.view(),
                right_mask.view(),
                refiner.global_range(),
                cfg.kernel_size,
                cfg.cost,
            )?
        } else {
            0.0
        };

        Ok(Self {
            left,
            right,
            left_mask,
            right_mask,
            refiner,
            scale,
            crop_win,
            cfg,
            engine,
            seconds_per_op,
        })
    }

    pub fn width(&self) -> usize {
        self.left.width()
    }

    pub fn height(&self) -> usize {
        self.left.height()
    }

    /// The uniform tile grid covering the full frame.
    pub fn tiles(&self) -> Vec<PixelBox> {
        let ts = self.cfg.corr_tile_size;
        let frame = PixelBox::from_size(0, 0, self.width() as i64, self.height() as i64);
        let mut out = Vec::new();
        let mut y = 0;
        while y < frame.max().y {
            let mut x = 0;
            while x < frame.max().x {
                out.push(PixelBox::from_size(x, y, ts, ts).intersect(&frame));
                x += ts;
            }
            y += ts;
        }
        out
    }

    /// Computes the disparity for one tile.
    ///
    /// Tiles that do not intersect the crop window return an all-invalid
    /// field of the tile's exact dimensions without invoking the engine.
    /// Cells of a partially overlapping tile that fall outside the crop
    /// window are forced invalid after the engine returns.
    pub fn compute_tile(&self, tile: &PixelBox) -> SeedResult<DisparityField> {
        let _span = trace_span!("tile", x = tile.min().x, y = tile.min().y).entered();
        let width = tile.width() as usize;
        let height = tile.height() as usize;

        if !tile.intersects(&self.crop_win) {
            return DisparityField::invalid(width, height);
        }

        let refined = self.refiner.refine(tile)?;
        let mut field = match refined.lowres_hom {
            Some(lowres_hom) => {
                let full_hom = scale_homography(&lowres_hom, self.scale);
                let needed = self.warp_region(tile, &refined.range);
                let (warped, warped_mask) =
                    warp_to_left_frame(self.right, self.right_mask, &full_hom, needed)?;
                self.correlate(tile, refined.range, Some((&warped, &warped_mask)))
            }
            None => self.correlate(tile, refined.range, None),
        }?;

        if field.width() != width || field.height() != height {
            return Err(StereoSeedError::Engine {
                reason: format!(
                    "engine returned {}x{} for a {}x{} tile",
                    field.width(),
                    field.height(),
                    width,
                    height
                ),
            });
        }

        for y in 0..height {
            for x in 0..width {
                let abs_x = tile.min().x + x as i64;
                let abs_y = tile.min().y + y as i64;
                if !self.crop_win.contains(abs_x, abs_y) {
                    field.invalidate(x, y);
                }
            }
        }
        Ok(field)
    }

    /// Computes every tile and assembles the full-resolution field for the
    /// raster-writer collaborator.
    pub fn compute_all(&self) -> SeedResult<DisparityField> {
        let tiles = self.tiles();
        trace_event!("dispatch_all", tiles = tiles.len());

        #[cfg(feature = "rayon")]
        let results: Vec<SeedResult<(PixelBox, DisparityField)>> = tiles
            .par_iter()
            .map(|tile| self.compute_tile(tile).map(|f| (*tile, f)))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let results: Vec<SeedResult<(PixelBox, DisparityField)>> = tiles
            .iter()
            .map(|tile| self.compute_tile(tile).map(|f| (*tile, f)))
            .collect();

        let mut full = DisparityField::invalid(self.width(), self.height())?;
        for result in results {
            let (tile, field) = result?;
            for y in 0..field.height() {
                for x in 0..field.width() {
                    full.set(
                        (tile.min().x as usize) + x,
                        (tile.min().y as usize) + y,
                        field.get(x, y),
                    );
                }
            }
        }
        Ok(full)
    }

    fn correlate(
        &self,
        tile: &PixelBox,
        search_range: SearchRange,
        warped: Option<(&Raster<f32>, &Raster<u8>)>,
    ) -> SeedResult<DisparityField> {
        let (right, right_mask) = match warped {
            Some((img, mask)) => (img, mask),
            None => (self.right, self.right_mask),
        };
        let request = MatchRequest {
            left: self.left.view(),
            right: right.view(),
            left_mask: self.left_mask.view(),
            right_mask: right_mask.view(),
            region: *tile,
            prefilter: self.cfg.prefilter,
            prefilter_width: self.cfg.prefilter_width,
            search_range,
            kernel_size: self.cfg.kernel_size,
            cost: self.cfg.cost,
            timeout_secs: self.cfg.corr_timeout,
            seconds_per_op: self.seconds_per_op,
            xcorr_threshold: self.cfg.xcorr_threshold,
            max_pyramid_levels: self.cfg.max_pyramid_levels,
            use_sgm: self.cfg.use_sgm,
            collar_size: self.cfg.collar_size,
            blob_filter_area: self.cfg.blob_filter_area,
        };
        self.engine.correlate(&request)
    }

    /// Region of the left frame the warped right image must cover for `tile`:
    /// the tile plus the search offsets, the kernel, and the collar.
    fn warp_region(&self, tile: &PixelBox, range: &SearchRange) -> PixelBox {
        let frame = PixelBox::from_size(0, 0, self.width() as i64, self.height() as i64);
        let margin_x = (self.cfg.kernel_size.0 as i64) / 2 + self.cfg.collar_size;
        let margin_y = (self.cfg.kernel_size.1 as i64) / 2 + self.cfg.collar_size;
        PixelBox::new(
            tile.min().x + range.min().x.floor() as i64 - margin_x,
            tile.min().y + range.min().y.floor() as i64 - margin_y,
            tile.max().x + range.max().x.ceil() as i64 + margin_x,
            tile.max().y + range.max().y.ceil() as i64 + margin_y,
        )
        .intersect(&frame)
    }
}

/// Warps the right image and its mask into the left frame through `hom`,
/// filling only `region`; everything else stays invalid.
///
/// Output pixel `p` samples the source at `hom^-1 * p` with bilinear
/// interpolation; samples touching any invalid source cell are invalid.
fn warp_to_left_frame(
    right: &Raster<f32>,
    right_mask: &Raster<u8>,
    hom: &Homography,
    region: PixelBox,
) -> SeedResult<(Raster<f32>, Raster<u8>)> {
    let width = right.width();
    let height = right.height();
    let mut image = Raster::filled(width, height, 0.0f32)?;
    let mut mask = Raster::filled(width, height, 0u8)?;

    let Some(inverse) = hom.try_inverse() else {
        // A singular homography cannot be inverted; leave the tile invalid
        // rather than guessing.
        return Ok((image, mask));
    };

    for y in region.min().y.max(0)..region.max().y.min(height as i64) {
        for x in region.min().x.max(0)..region.max().x.min(width as i64) {
            let src = inverse * Vector3::new(x as f64, y as f64, 1.0);
            if src.z == 0.0 {
                continue;
            }
            let sx = src.x / src.z;
            let sy = src.y / src.z;
            if !sx.is_finite() || !sy.is_finite() || sx < 0.0 || sy < 0.0 {
                continue;
            }
            let x0 = sx.floor() as usize;
            let y0 = sy.floor() as usize;
            if x0 + 1 >= width || y0 + 1 >= height {
                continue;
            }
            let valid = right_mask.get(x0, y0).unwrap_or(0) != 0
                && right_mask.get(x0 + 1, y0).unwrap_or(0) != 0
                && right_mask.get(x0, y0 + 1).unwrap_or(0) != 0
                && right_mask.get(x0 + 1, y0 + 1).unwrap_or(0) != 0;
            if !valid {
                continue;
            }
            let fx = (sx - x0 as f64) as f32;
            let fy = (sy - y0 as f64) as f32;
            let a = right.get(x0, y0).unwrap_or(0.0);
            let b = right.get(x0 + 1, y0).unwrap_or(0.0);
            let c = right.get(x0, y0 + 1).unwrap_or(0.0);
            let d = right.get(x0 + 1, y0 + 1).unwrap_or(0.0);
            let value = a * (1.0 - fx) * (1.0 - fy)
                + b * fx * (1.0 - fy)
                + c * (1.0 - fx) * fy
                + d * fx * fy;
            image.set(x as usize, y as usize, value);
            mask.set(x as usize, y as usize, 255);
        }
    }
    Ok((image, mask))
}
