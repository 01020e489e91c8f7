//! Per-tile search-range refinement from the seed disparity.
//!
//! For an output tile, the refiner maps the tile footprint into seed
//! coordinates, bounds the seed disparity found there (optionally corrected
//! through the tile's homography and widened by the spread field), and scales
//! the result back to full resolution. Every rounding step is outward, so the
//! refined range is guaranteed to contain the seed-implied disparity with
//! margin; it can only ever be wider than the truth, never narrower.

use nalgebra::Vector2;

use crate::field::DisparityField;
use crate::geom::{PixelBox, ResolutionScale, SearchRange};
use crate::homography::{transform_disparities, Homography, HomographyGrid};
use crate::trace::trace_event;
use crate::util::{SeedResult, StereoSeedError};

/// A tile's refined search range plus the seed-resolution homography that was
/// folded into it (to be applied to the second image before matching).
#[derive(Clone, Copy, Debug)]
pub struct RefinedRange {
    pub range: SearchRange,
    pub lowres_hom: Option<Homography>,
}

/// Derives tight per-tile search ranges from the seed field.
pub struct TileRangeRefiner<'a> {
    seed: Option<&'a DisparityField>,
    spread: Option<&'a DisparityField>,
    homographies: Option<&'a HomographyGrid>,
    scale: ResolutionScale,
    global_range: SearchRange,
}

impl<'a> TileRangeRefiner<'a> {
    /// Builds a refiner over immutable, already-materialized inputs.
    ///
    /// A spread field without a seed, or with dimensions different from the
    /// seed's, is a configuration contradiction.
    pub fn new(
        seed: Option<&'a DisparityField>,
        spread: Option<&'a DisparityField>,
        homographies: Option<&'a HomographyGrid>,
        scale: ResolutionScale,
        global_range: SearchRange,
    ) -> SeedResult<Self> {
        match (seed, spread) {
            (Some(seed), Some(spread))
                if seed.width() != spread.width() || seed.height() != spread.height() =>
            {
                return Err(StereoSeedError::ConfigContradiction {
                    reason: format!(
                        "seed disparity and spread must have equal sizes: {}x{} vs {}x{}",
                        seed.width(),
                        seed.height(),
                        spread.width(),
                        spread.height()
                    ),
                });
            }
            (None, Some(_)) => {
                return Err(StereoSeedError::ConfigContradiction {
                    reason: "spread field supplied without a seed disparity".into(),
                });
            }
            _ => {}
        }
        Ok(Self {
            seed,
            spread,
            homographies,
            scale,
            global_range,
        })
    }

    pub fn global_range(&self) -> SearchRange {
        self.global_range
    }

    /// Refines the search range for one full-resolution tile.
    ///
    /// Without a seed the global range is returned verbatim (no narrowing).
    /// A tile whose seed footprint holds no valid disparity also falls back
    /// to the global range; the tile homography still applies in that case.
    pub fn refine(&self, tile: &PixelBox) -> SeedResult<RefinedRange> {
        let hom = self
            .homographies
            .map(|grid| *grid.for_tile_origin(tile.min().x, tile.min().y));

        let Some(seed) = self.seed else {
            return Ok(RefinedRange {
                range: self.global_range,
                lowres_hom: hom,
            });
        };

        // Tile footprint in seed coordinates, widened by one seed pixel to
        // counter the rounding of the division, clipped to the seed extent.
        let seed_box = self
            .scale
            .box_to_seed(tile)
            .expand(1)
            .intersect(&seed.extent());
        if seed_box.is_empty() {
            return Ok(RefinedRange {
                range: self.global_range,
                lowres_hom: hom,
            });
        }

        let seed_in_box = seed.crop(&seed_box)?;
        let mut local = match &hom {
            None => seed_in_box.disparity_range(),
            // The seed was computed without the per-tile correction, so the
            // range must reflect the transformed disparities instead.
            Some(h) => transform_disparities(true, seed_box.min(), h, &seed_in_box)?
                .disparity_range(),
        };

        if let Some(spread) = self.spread {
            let spread_in_box = spread.crop(&seed_box)?;
            match &hom {
                None => {
                    if let (Some(range), Some(spread_range)) =
                        (local.as_mut(), spread_in_box.disparity_range())
                    {
                        let grow = Vector2::new(
                            spread_range.min().x.abs().max(spread_range.max().x.abs()),
                            spread_range.min().y.abs().max(spread_range.max().y.abs()),
                        );
                        range.expand_per_axis(grow);
                    }
                }
                Some(h) => {
                    // The homography is not a pure translation, so widening is
                    // asymmetric: transform seed +/- spread separately and
                    // take the union of their boxes.
                    let upper = seed_in_box.zip_map(&spread_in_box, |d, s| d + s)?;
                    let lower = seed_in_box.zip_map(&spread_in_box, |d, s| d - s)?;
                    let upper_range = transform_disparities(true, seed_box.min(), h, &upper)?
                        .disparity_range();
                    let lower_range = transform_disparities(true, seed_box.min(), h, &lower)?
                        .disparity_range();
                    match (upper_range, lower_range) {
                        (Some(mut u), Some(l)) => {
                            u.union(&l);
                            local = Some(u);
                        }
                        (Some(u), None) => local = Some(u),
                        (None, Some(l)) => local = Some(l),
                        (None, None) => {}
                    }
                }
            }
        }

        let Some(local) = local else {
            return Ok(RefinedRange {
                range: self.global_range,
                lowres_hom: hom,
            });
        };

        // The seed is integer-valued; the true sub-pixel range may exceed it
        // by up to one unit, so expand by one after rounding outward.
        let mut rounded = local.round_outward();
        rounded.expand(1.0);
        let range = rounded.scale_outward(self.scale.x, self.scale.y);
        trace_event!(
            "refined_range",
            tile_x = tile.min().x,
            tile_y = tile.min().y,
            width = range.width(),
            height = range.height()
        );
        Ok(RefinedRange {
            range,
            lowres_hom: hom,
        })
    }
}
