//! Disparity fields with explicit per-cell validity.
//!
//! A `DisparityField` is a 2-D grid of optional disparity vectors. A cell is
//! either valid (a 2-vector of pixel offsets) or invalid (no correspondence
//! found); validity is stored per cell and never inferred from the values.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::geom::{PixelBox, SearchRange};
use crate::util::{SeedResult, StereoSeedError};

/// 2-D grid of optional disparity vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisparityField {
    width: usize,
    height: usize,
    cells: Vec<Option<Vector2<f32>>>,
}

impl DisparityField {
    /// Creates an all-invalid field.
    pub fn invalid(width: usize, height: usize) -> SeedResult<Self> {
        let needed = width
            .checked_mul(height)
            .filter(|_| width > 0 && height > 0)
            .ok_or(StereoSeedError::InvalidDimensions { width, height })?;
        Ok(Self {
            width,
            height,
            cells: vec![None; needed],
        })
    }

    /// Wraps an existing cell buffer; the length must match the dimensions.
    pub fn from_cells(
        cells: Vec<Option<Vector2<f32>>>,
        width: usize,
        height: usize,
    ) -> SeedResult<Self> {
        let needed = width
            .checked_mul(height)
            .filter(|_| width > 0 && height > 0)
            .ok_or(StereoSeedError::InvalidDimensions { width, height })?;
        if cells.len() != needed {
            return Err(StereoSeedError::BufferTooSmall {
                needed,
                got: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The field's extent as a pixel box anchored at the origin.
    pub fn extent(&self) -> PixelBox {
        PixelBox::from_size(0, 0, self.width as i64, self.height as i64)
    }

    /// Returns the cell value, or `None` when invalid or out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<Vector2<f32>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: Option<Vector2<f32>>) {
        debug_assert!(x < self.width && y < self.height);
        self.cells[y * self.width + x] = value;
    }

    /// Marks a cell invalid without touching its neighbors.
    pub fn invalidate(&mut self, x: usize, y: usize) {
        self.set(x, y, None);
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Iterates over valid cells as `(x, y, disparity)`.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, Vector2<f32>)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, c)| {
            c.map(|d| (i % self.width, i / self.width, d))
        })
    }

    /// Bounding box of all valid disparity vectors; `None` when the field has
    /// no valid cell.
    pub fn disparity_range(&self) -> Option<SearchRange> {
        let mut range = SearchRange::empty();
        for (_, _, d) in self.iter_valid() {
            range.grow(d);
        }
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }

    /// Combines two fields cell by cell; a cell is valid in the result only
    /// when valid in both inputs.
    pub fn zip_map(
        &self,
        other: &DisparityField,
        f: impl Fn(Vector2<f32>, Vector2<f32>) -> Vector2<f32>,
    ) -> SeedResult<DisparityField> {
        if self.width != other.width || self.height != other.height {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!(
                    "field size mismatch: {}x{} vs {}x{}",
                    self.width, self.height, other.width, other.height
                ),
            });
        }
        let cells = self
            .cells
            .iter()
            .zip(other.cells.iter())
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        DisparityField::from_cells(cells, self.width, self.height)
    }

    /// Extracts the sub-region covered by `region`, which must lie inside the
    /// field's extent (callers clip first).
    pub fn crop(&self, region: &PixelBox) -> SeedResult<DisparityField> {
        let clipped = region.intersect(&self.extent());
        if clipped != *region || region.is_empty() {
            return Err(StereoSeedError::RoiOutOfBounds {
                x: region.min().x.max(0) as usize,
                y: region.min().y.max(0) as usize,
                width: region.width() as usize,
                height: region.height() as usize,
                img_width: self.width,
                img_height: self.height,
            });
        }
        let mut out = DisparityField::invalid(region.width() as usize, region.height() as usize)?;
        for y in 0..out.height {
            for x in 0..out.width {
                let sx = (region.min().x as usize) + x;
                let sy = (region.min().y as usize) + y;
                out.set(x, y, self.get(sx, sy));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::DisparityField;
    use crate::geom::{PixelBox, SearchRange};
    use nalgebra::Vector2;

    #[test]
    fn disparity_range_covers_valid_cells_only() {
        let mut field = DisparityField::invalid(4, 3).unwrap();
        field.set(0, 0, Some(Vector2::new(1.0, -2.0)));
        field.set(3, 2, Some(Vector2::new(-4.0, 5.0)));
        let range = field.disparity_range().unwrap();
        assert_eq!(range, SearchRange::new(-4.0, -2.0, 1.0, 5.0));

        let empty = DisparityField::invalid(4, 3).unwrap();
        assert!(empty.disparity_range().is_none());
    }

    #[test]
    fn crop_preserves_validity_layout() {
        let mut field = DisparityField::invalid(4, 4).unwrap();
        field.set(1, 1, Some(Vector2::new(7.0, 7.0)));
        let sub = field.crop(&PixelBox::new(1, 1, 3, 3)).unwrap();
        assert_eq!(sub.width(), 2);
        assert_eq!(sub.get(0, 0), Some(Vector2::new(7.0, 7.0)));
        assert_eq!(sub.get(1, 1), None);

        assert!(field.crop(&PixelBox::new(2, 2, 6, 6)).is_err());
    }
}
