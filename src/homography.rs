//! Per-tile homographies derived from the seed disparity.
//!
//! Each tile of the full-resolution output gets one 3x3 projective matrix
//! mapping the second image's coordinates onto the first's, fitted from the
//! seed correspondences inside that tile's footprint at seed resolution. The
//! grid is deterministic from the image size and the tile size, computed once
//! and persisted whole; a corrupt artifact is recomputed in full, never
//! patched.

use std::path::Path;

use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::field::DisparityField;
use crate::geom::{PixelBox, ResolutionScale};
use crate::trace::trace_event;
use crate::util::{SeedResult, StereoSeedError};

pub type Homography = Matrix3<f64>;

/// Grid of per-tile homographies at seed resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomographyGrid {
    tiles_x: usize,
    tiles_y: usize,
    tile_size: i64,
    matrices: Vec<Homography>,
}

impl HomographyGrid {
    /// Fits one homography per tile from the seed field.
    ///
    /// Tiles with fewer than `min_samples` valid seed cells, or where the fit
    /// is degenerate, fall back to the identity.
    pub fn compute(
        seed: &DisparityField,
        full_size: (usize, usize),
        scale: ResolutionScale,
        tile_size: i64,
        min_samples: usize,
    ) -> SeedResult<Self> {
        if tile_size <= 0 {
            return Err(StereoSeedError::ConfigContradiction {
                reason: format!("tile size must be positive, got {tile_size}"),
            });
        }
        let tiles_x = full_size.0.div_ceil(tile_size as usize).max(1);
        let tiles_y = full_size.1.div_ceil(tile_size as usize).max(1);
        let seed_extent = seed.extent();

        let mut matrices = Vec::with_capacity(tiles_x * tiles_y);
        let mut fitted = 0usize;
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let tile = PixelBox::from_size(
                    tx as i64 * tile_size,
                    ty as i64 * tile_size,
                    tile_size,
                    tile_size,
                );
                let seed_box = scale.box_to_seed(&tile).expand(1).intersect(&seed_extent);

                let mut src = Vec::new();
                let mut dst = Vec::new();
                if !seed_box.is_empty() {
                    let sub = seed.crop(&seed_box)?;
                    for (x, y, d) in sub.iter_valid() {
                        let px = (seed_box.min().x + x as i64) as f64;
                        let py = (seed_box.min().y + y as i64) as f64;
                        src.push(Vector2::new(px, py));
                        dst.push(Vector2::new(px + d.x as f64, py + d.y as f64));
                    }
                }

                let hom = if src.len() >= min_samples.max(4) {
                    match fit_homography(&src, &dst) {
                        Some(h) => {
                            fitted += 1;
                            h
                        }
                        None => Matrix3::identity(),
                    }
                } else {
                    Matrix3::identity()
                };
                matrices.push(hom);
            }
        }
        trace_event!("homography_grid", tiles = matrices.len(), fitted = fitted);
        Ok(Self {
            tiles_x,
            tiles_y,
            tile_size,
            matrices,
        })
    }

    pub fn tiles(&self) -> (usize, usize) {
        (self.tiles_x, self.tiles_y)
    }

    pub fn tile_size(&self) -> i64 {
        self.tile_size
    }

    /// Matrix for tile grid indices, clamped to the grid.
    pub fn at(&self, tx: usize, ty: usize) -> &Homography {
        let tx = tx.min(self.tiles_x - 1);
        let ty = ty.min(self.tiles_y - 1);
        &self.matrices[ty * self.tiles_x + tx]
    }

    /// Matrix for the tile containing the full-resolution origin `(x, y)`.
    pub fn for_tile_origin(&self, x: i64, y: i64) -> &Homography {
        let tx = (x.max(0) / self.tile_size) as usize;
        let ty = (y.max(0) / self.tile_size) as usize;
        self.at(tx, ty)
    }

    pub fn save(&self, path: &Path) -> SeedResult<()> {
        artifact::save_json(path, self)
    }

    /// Loads a persisted grid, recomputing (and re-persisting) the whole grid
    /// when the artifact is missing or corrupt.
    pub fn load_or_compute(
        path: &Path,
        seed: &DisparityField,
        full_size: (usize, usize),
        scale: ResolutionScale,
        tile_size: i64,
        min_samples: usize,
    ) -> SeedResult<Self> {
        if let Some(grid) = artifact::try_load_json::<HomographyGrid>(path) {
            if grid.tile_size == tile_size
                && grid.tiles_x == full_size.0.div_ceil(tile_size as usize).max(1)
                && grid.tiles_y == full_size.1.div_ceil(tile_size as usize).max(1)
            {
                trace_event!("homography_cache_hit", tiles = grid.matrices.len());
                return Ok(grid);
            }
        }
        let grid = Self::compute(seed, full_size, scale, tile_size, min_samples)?;
        grid.save(path)?;
        Ok(grid)
    }
}

/// Direct linear transform with Hartley normalization.
///
/// Returns `None` when the point sets are too small or the system is
/// numerically degenerate.
pub fn fit_homography(src: &[Vector2<f64>], dst: &[Vector2<f64>]) -> Option<Homography> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }
    let (t_src, src_n) = normalize_points(src)?;
    let (t_dst, dst_n) = normalize_points(dst)?;

    let n = src_n.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let row = 2 * i;
        a[(row, 0)] = -s.x;
        a[(row, 1)] = -s.y;
        a[(row, 2)] = -1.0;
        a[(row, 6)] = d.x * s.x;
        a[(row, 7)] = d.x * s.y;
        a[(row, 8)] = d.x;
        a[(row + 1, 3)] = -s.x;
        a[(row + 1, 4)] = -s.y;
        a[(row + 1, 5)] = -1.0;
        a[(row + 1, 6)] = d.y * s.x;
        a[(row + 1, 7)] = d.y * s.y;
        a[(row + 1, 8)] = d.y;
    }

    // Null vector of A via the smallest eigenpair of the 9x9 normal matrix;
    // well defined for any n >= 4 unlike a thin SVD of the 2n x 9 system.
    let normal = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(normal);
    let mut min_idx = 0;
    for i in 1..eig.eigenvalues.len() {
        if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let h_vec = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2],
        h_vec[3], h_vec[4], h_vec[5],
        h_vec[6], h_vec[7], h_vec[8],
    );

    let t_dst_inv = t_dst.try_inverse()?;
    let mut h = t_dst_inv * h_norm * t_src;
    if h[(2, 2)].abs() < 1e-12 {
        return None;
    }
    h /= h[(2, 2)];
    Some(h)
}

fn normalize_points(points: &[Vector2<f64>]) -> Option<(Matrix3<f64>, Vec<Vector2<f64>>)> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector2<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !mean_dist.is_finite() {
        return None;
    }
    // Degenerate clusters (all points coincident) cannot constrain a fit.
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(
        s, 0.0, -s * centroid.x,
        0.0, s, -s * centroid.y,
        0.0, 0.0, 1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Vector2::new(s * (p.x - centroid.x), s * (p.y - centroid.y)))
        .collect();
    Some((t, normalized))
}

/// Conjugates a seed-resolution homography into full resolution:
/// `S * H * S^-1` with `S = diag(sx, sy, 1)`.
pub fn scale_homography(h: &Homography, scale: ResolutionScale) -> Homography {
    let up = Matrix3::new(
        scale.x, 0.0, 0.0,
        0.0, scale.y, 0.0,
        0.0, 0.0, 1.0,
    );
    let down = Matrix3::new(
        1.0 / scale.x, 0.0, 0.0,
        0.0, 1.0 / scale.y, 0.0,
        0.0, 0.0, 1.0,
    );
    up * h * down
}

/// Applies a homography to the disparities of a seed sub-region.
///
/// Each valid cell's target point `(x, y) + d` is pushed through `h`; the new
/// disparity is the transformed target minus the untouched source point.
/// Points whose homogeneous coordinate collapses to zero are skipped, not
/// fatal. With `round` set the transformed disparities snap to integers, as
/// the seed itself is integer-valued.
pub fn transform_disparities(
    round: bool,
    region_min: Vector2<i64>,
    h: &Homography,
    field: &DisparityField,
) -> SeedResult<DisparityField> {
    let mut out = DisparityField::invalid(field.width(), field.height())?;
    for (x, y, d) in field.iter_valid() {
        let px = (region_min.x + x as i64) as f64;
        let py = (region_min.y + y as i64) as f64;
        let target = h * Vector3::new(px + d.x as f64, py + d.y as f64, 1.0);
        if target.z == 0.0 {
            continue;
        }
        let mut nd = Vector2::new(
            (target.x / target.z - px) as f32,
            (target.y / target.z - py) as f32,
        );
        if round {
            nd = nd.map(|v| v.round());
        }
        out.set(x, y, Some(nd));
    }
    Ok(out)
}
