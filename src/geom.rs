//! Boxes, search ranges, and resolution scaling.
//!
//! `PixelBox` addresses rectangular pixel regions (tiles, crop windows) with a
//! half-open integer interval per axis. `SearchRange` is the axis-aligned
//! bounding box over disparity-vector space that the matching engine is asked
//! to test. `ResolutionScale` is the measured per-axis ratio between the
//! full-resolution extent and its low-resolution counterpart; it is never
//! assumed to be a power of two.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::util::{SeedResult, StereoSeedError};

/// Half-open integer pixel rectangle: `min` inclusive, `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    min: Vector2<i64>,
    max: Vector2<i64>,
}

impl PixelBox {
    /// Creates a box from corner coordinates, normalizing so `min <= max`.
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self {
            min: Vector2::new(x0.min(x1), y0.min(y1)),
            max: Vector2::new(x0.max(x1), y0.max(y1)),
        }
    }

    /// Creates a box from an origin and a size.
    pub fn from_size(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self::new(x, y, x + width.max(0), y + height.max(0))
    }

    pub fn min(&self) -> Vector2<i64> {
        self.min
    }

    pub fn max(&self) -> Vector2<i64> {
        self.max
    }

    pub fn width(&self) -> i64 {
        (self.max.x - self.min.x).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.max.y - self.min.y).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    /// Componentwise intersection; may be empty.
    pub fn intersect(&self, other: &PixelBox) -> PixelBox {
        PixelBox {
            min: Vector2::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Vector2::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        }
    }

    pub fn intersects(&self, other: &PixelBox) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Grows the box by `margin` pixels on every side.
    pub fn expand(&self, margin: i64) -> PixelBox {
        PixelBox {
            min: self.min.map(|v| v - margin),
            max: self.max.map(|v| v + margin),
        }
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min.x && x < self.max.x && y >= self.min.y && y < self.max.y
    }
}

/// Axis-aligned bounding box over disparity-vector space.
///
/// Always normalized (`min <= max` componentwise) except for the growable
/// [`SearchRange::empty`] state used while accumulating points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRange {
    min: Vector2<f32>,
    max: Vector2<f32>,
}

impl SearchRange {
    /// Creates a range from per-axis bounds, normalizing componentwise.
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vector2::new(min_x.min(max_x), min_y.min(max_y)),
            max: Vector2::new(min_x.max(max_x), min_y.max(max_y)),
        }
    }

    /// An empty, growable range; `grow` turns it into a point box.
    pub fn empty() -> Self {
        Self {
            min: Vector2::new(f32::INFINITY, f32::INFINITY),
            max: Vector2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn min(&self) -> Vector2<f32> {
        self.min
    }

    pub fn max(&self) -> Vector2<f32> {
        self.max
    }

    pub fn width(&self) -> f32 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max.y - self.min.y).max(0.0)
    }

    /// Grows the range to include `point`.
    pub fn grow(&mut self, point: Vector2<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// Grows the range to include all of `other`.
    pub fn union(&mut self, other: &SearchRange) {
        if other.is_empty() {
            return;
        }
        self.grow(other.min);
        self.grow(other.max);
    }

    /// Grows the range by `margin` on every side.
    pub fn expand(&mut self, margin: f32) {
        self.min -= Vector2::new(margin, margin);
        self.max += Vector2::new(margin, margin);
    }

    /// Grows the range symmetrically by a per-axis margin.
    pub fn expand_per_axis(&mut self, margin: Vector2<f32>) {
        self.min -= margin;
        self.max += margin;
    }

    /// Grows each axis by `fraction` of its extent, split evenly per side.
    pub fn expand_by_fraction(&mut self, fraction: f32) {
        let half = Vector2::new(self.width(), self.height()) * (fraction / 2.0);
        self.min -= half;
        self.max += half;
    }

    /// Rounds outward to the nearest integer box: floor on min, ceil on max.
    /// Never rounds inward, so true correspondences are not quantized away.
    pub fn round_outward(&self) -> SearchRange {
        SearchRange {
            min: self.min.map(|v| v.floor()),
            max: self.max.map(|v| v.ceil()),
        }
    }

    /// Scales by a per-axis factor, rounding outward (floor min, ceil max).
    /// The asymmetric rounding always grows the box, never shrinks it.
    pub fn scale_outward(&self, sx: f64, sy: f64) -> SearchRange {
        SearchRange {
            min: Vector2::new(
                (self.min.x as f64 * sx).floor() as f32,
                (self.min.y as f64 * sy).floor() as f32,
            ),
            max: Vector2::new(
                (self.max.x as f64 * sx).ceil() as f32,
                (self.max.y as f64 * sy).ceil() as f32,
            ),
        }
    }

    pub fn contains(&self, point: Vector2<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// True when `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &SearchRange) -> bool {
        !other.is_empty() && self.contains(other.min) && self.contains(other.max)
    }
}

/// Measured per-axis ratio between full-resolution and low-resolution extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionScale {
    /// Full-resolution width divided by low-resolution width.
    pub x: f64,
    /// Full-resolution height divided by low-resolution height.
    pub y: f64,
}

impl ResolutionScale {
    /// Derives the scale from measured image dimensions.
    pub fn measure(full: (usize, usize), low: (usize, usize)) -> SeedResult<Self> {
        if full.0 == 0 || full.1 == 0 {
            return Err(StereoSeedError::InvalidDimensions {
                width: full.0,
                height: full.1,
            });
        }
        if low.0 == 0 || low.1 == 0 {
            return Err(StereoSeedError::InvalidDimensions {
                width: low.0,
                height: low.1,
            });
        }
        Ok(Self {
            x: full.0 as f64 / low.0 as f64,
            y: full.1 as f64 / low.1 as f64,
        })
    }

    /// Mean low-over-full factor, used to scale area thresholds down.
    pub fn inverse_mean(&self) -> f64 {
        (1.0 / self.x + 1.0 / self.y) / 2.0
    }

    /// Maps a full-resolution pixel box into seed coordinates (floor divide).
    pub fn box_to_seed(&self, full: &PixelBox) -> PixelBox {
        PixelBox::new(
            (full.min().x as f64 / self.x).floor() as i64,
            (full.min().y as f64 / self.y).floor() as i64,
            (full.max().x as f64 / self.x).floor() as i64,
            (full.max().y as f64 / self.y).floor() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{PixelBox, ResolutionScale, SearchRange};
    use nalgebra::Vector2;

    #[test]
    fn pixel_box_intersection_and_emptiness() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(5, 5, 15, 15);
        let c = a.intersect(&b);
        assert_eq!(c, PixelBox::new(5, 5, 10, 10));
        assert!(a.intersects(&b));

        let d = PixelBox::new(20, 20, 30, 30);
        assert!(a.intersect(&d).is_empty());
        assert!(!a.intersects(&d));
    }

    #[test]
    fn pixel_box_contains_is_half_open() {
        let b = PixelBox::new(0, 0, 4, 4);
        assert!(b.contains(0, 0));
        assert!(b.contains(3, 3));
        assert!(!b.contains(4, 3));
        assert!(!b.contains(-1, 0));
    }

    #[test]
    fn search_range_grow_from_empty() {
        let mut r = SearchRange::empty();
        assert!(r.is_empty());
        r.grow(Vector2::new(2.0, -3.0));
        r.grow(Vector2::new(-1.0, 4.0));
        assert_eq!(r, SearchRange::new(-1.0, -3.0, 2.0, 4.0));
    }

    #[test]
    fn round_outward_never_shrinks() {
        let r = SearchRange::new(-1.2, 0.4, 3.1, 2.6);
        let rounded = r.round_outward();
        assert_eq!(rounded, SearchRange::new(-2.0, 0.0, 4.0, 3.0));
        assert!(rounded.contains_range(&r));
    }

    #[test]
    fn scale_outward_grows_asymmetrically() {
        let r = SearchRange::new(-1.0, -1.0, 1.0, 1.0);
        let scaled = r.scale_outward(2.5, 2.5);
        assert_eq!(scaled, SearchRange::new(-3.0, -3.0, 3.0, 3.0));
    }

    #[test]
    fn expand_by_fraction_splits_per_side() {
        let mut r = SearchRange::new(0.0, 0.0, 8.0, 4.0);
        r.expand_by_fraction(0.25);
        assert_eq!(r, SearchRange::new(-1.0, -0.5, 9.0, 4.5));
    }

    #[test]
    fn resolution_scale_measures_ratios() {
        let s = ResolutionScale::measure((800, 600), (100, 100)).unwrap();
        assert!((s.x - 8.0).abs() < 1e-12);
        assert!((s.y - 6.0).abs() < 1e-12);

        let seed = s.box_to_seed(&PixelBox::new(80, 60, 160, 120));
        assert_eq!(seed, PixelBox::new(10, 10, 20, 20));
    }

    #[test]
    fn resolution_scale_rejects_zero_dims() {
        assert!(ResolutionScale::measure((0, 600), (100, 100)).is_err());
        assert!(ResolutionScale::measure((800, 600), (100, 0)).is_err());
    }
}
