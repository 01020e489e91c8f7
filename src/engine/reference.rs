//! Reference block-matching engine.
//!
//! A deliberately plain normalized-cross-correlation matcher used by the CLI
//! and the integration tests. It honors masks, the search range, and the
//! kernel size, and ignores the pyramid/SGM knobs; production matchers plug in
//! through [`CorrelationEngine`](super::CorrelationEngine) instead.

use nalgebra::Vector2;

use crate::engine::{CorrelationEngine, MatchRequest};
use crate::field::DisparityField;
use crate::raster::RasterView;
use crate::util::{SeedResult, StereoSeedError};

/// Exhaustive integer-offset NCC block matcher.
#[derive(Clone, Copy, Debug)]
pub struct BlockMatcher {
    /// Matches scoring below this are marked invalid.
    pub min_score: f32,
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self { min_score: 0.5 }
    }
}

struct WindowStats {
    mean: f32,
    var: f32,
}

fn window_stats(
    img: RasterView<'_, f32>,
    mask: RasterView<'_, u8>,
    cx: i64,
    cy: i64,
    half: (i64, i64),
) -> Option<WindowStats> {
    let mut sum = 0.0f32;
    let mut sum2 = 0.0f32;
    let mut n = 0usize;
    for dy in -half.1..=half.1 {
        for dx in -half.0..=half.0 {
            let x = cx + dx;
            let y = cy + dy;
            if x < 0 || y < 0 {
                return None;
            }
            let (x, y) = (x as usize, y as usize);
            let value = *img.get(x, y)?;
            if *mask.get(x, y)? == 0 {
                return None;
            }
            sum += value;
            sum2 += value * value;
            n += 1;
        }
    }
    let n = n as f32;
    let mean = sum / n;
    Some(WindowStats {
        mean,
        var: (sum2 - sum * mean).max(0.0),
    })
}

fn ncc_score(
    left: RasterView<'_, f32>,
    right: RasterView<'_, f32>,
    lc: (i64, i64),
    rc: (i64, i64),
    half: (i64, i64),
    l_stats: &WindowStats,
    r_stats: &WindowStats,
) -> Option<f32> {
    let denom = (l_stats.var * r_stats.var).sqrt();
    if denom <= f32::EPSILON {
        return None;
    }
    let mut dot = 0.0f32;
    for dy in -half.1..=half.1 {
        for dx in -half.0..=half.0 {
            let lv = *left.get((lc.0 + dx) as usize, (lc.1 + dy) as usize)?;
            let rv = *right.get((rc.0 + dx) as usize, (rc.1 + dy) as usize)?;
            dot += (lv - l_stats.mean) * (rv - r_stats.mean);
        }
    }
    Some(dot / denom)
}

impl CorrelationEngine for BlockMatcher {
    fn correlate(&self, request: &MatchRequest<'_>) -> SeedResult<DisparityField> {
        let region = request.region;
        if region.is_empty() {
            return Err(StereoSeedError::InvalidDimensions {
                width: region.width() as usize,
                height: region.height() as usize,
            });
        }
        let half = (
            (request.kernel_size.0 / 2) as i64,
            (request.kernel_size.1 / 2) as i64,
        );
        let range = request.search_range.round_outward();
        let (dx0, dy0) = (range.min().x as i64, range.min().y as i64);
        let (dx1, dy1) = (range.max().x as i64, range.max().y as i64);

        let mut out = DisparityField::invalid(region.width() as usize, region.height() as usize)?;
        for oy in 0..region.height() {
            for ox in 0..region.width() {
                let x = region.min().x + ox;
                let y = region.min().y + oy;
                let Some(l_stats) =
                    window_stats(request.left, request.left_mask, x, y, half)
                else {
                    continue;
                };

                let mut best: Option<(f32, Vector2<f32>)> = None;
                for dy in dy0..=dy1 {
                    for dx in dx0..=dx1 {
                        let rx = x + dx;
                        let ry = y + dy;
                        let Some(r_stats) =
                            window_stats(request.right, request.right_mask, rx, ry, half)
                        else {
                            continue;
                        };
                        let Some(score) = ncc_score(
                            request.left,
                            request.right,
                            (x, y),
                            (rx, ry),
                            half,
                            &l_stats,
                            &r_stats,
                        ) else {
                            continue;
                        };
                        if best.map_or(true, |(s, _)| score > s) {
                            best = Some((score, Vector2::new(dx as f32, dy as f32)));
                        }
                    }
                }

                if let Some((score, d)) = best {
                    if score >= self.min_score {
                        out.set(ox as usize, oy as usize, Some(d));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::BlockMatcher;
    use crate::engine::{CorrelationEngine, CostMetric, MatchRequest, Prefilter};
    use crate::geom::{PixelBox, SearchRange};
    use crate::raster::Raster;
    use nalgebra::Vector2;

    fn textured(width: usize, height: usize, shift: usize) -> Raster<f32> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let sx = (x as i64 - shift as i64).rem_euclid(1 << 20) as usize;
                data.push((((sx * 13) ^ (y * 7) ^ (sx * y)) & 0xFF) as f32);
            }
        }
        Raster::from_vec(data, width, height).unwrap()
    }

    #[test]
    fn recovers_pure_horizontal_shift() {
        let width = 40;
        let height = 24;
        let shift = 3usize;
        let left = textured(width, height, 0);
        let right = textured(width, height, shift);
        let mask = Raster::filled(width, height, 255u8).unwrap();

        let request = MatchRequest {
            left: left.view(),
            right: right.view(),
            left_mask: mask.view(),
            right_mask: mask.view(),
            region: PixelBox::new(10, 8, 20, 16),
            prefilter: Prefilter::None,
            prefilter_width: 0.0,
            search_range: SearchRange::new(-5.0, -2.0, 5.0, 2.0),
            kernel_size: (5, 5),
            cost: CostMetric::CrossCorrelation,
            timeout_secs: 0,
            seconds_per_op: 0.0,
            xcorr_threshold: -1.0,
            max_pyramid_levels: 1,
            use_sgm: false,
            collar_size: 0,
            blob_filter_area: 0.0,
        };

        let engine = BlockMatcher::default();
        let field = engine.correlate(&request).unwrap();
        assert_eq!(field.width(), 10);
        assert_eq!(field.height(), 8);

        let expected = Vector2::new(shift as f32, 0.0);
        let mut hits = 0;
        for (_, _, d) in field.iter_valid() {
            if d == expected {
                hits += 1;
            }
        }
        assert!(hits > field.width() * field.height() / 2, "hits = {hits}");
    }
}
