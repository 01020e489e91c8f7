#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Vector2;
use stereoseed::{
    CorrelationEngine, DisparityField, MatchRequest, Raster, SeedResult, Workspace,
};

/// Engine stub returning the same disparity for every cell of the requested
/// region, counting invocations.
pub struct ConstantEngine {
    disparity: Vector2<f32>,
    calls: AtomicUsize,
}

impl ConstantEngine {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self {
            disparity: Vector2::new(dx, dy),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CorrelationEngine for ConstantEngine {
    fn correlate(&self, request: &MatchRequest<'_>) -> SeedResult<DisparityField> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = DisparityField::invalid(
            request.region.width() as usize,
            request.region.height() as usize,
        )?;
        for y in 0..out.height() {
            for x in 0..out.width() {
                out.set(x, y, Some(self.disparity));
            }
        }
        Ok(out)
    }
}

/// Workspace under a unique temporary directory; the caller removes it.
pub fn temp_workspace(tag: &str) -> (Workspace, PathBuf) {
    let dir = std::env::temp_dir().join(format!("stereoseed-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    (Workspace::new(dir.join("run")), dir)
}

pub fn flat_image(width: usize, height: usize) -> Raster<f32> {
    Raster::filled(width, height, 0.0).unwrap()
}

pub fn full_mask(width: usize, height: usize) -> Raster<u8> {
    Raster::filled(width, height, 255).unwrap()
}

/// Repeatable texture; `shift` slides the pattern along x.
pub fn textured(width: usize, height: usize, shift: usize) -> Raster<f32> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let sx = (x as i64 - shift as i64).rem_euclid(1 << 20) as usize;
            data.push((((sx * 13) ^ (y * 7) ^ (sx * y)) & 0xFF) as f32);
        }
    }
    Raster::from_vec(data, width, height).unwrap()
}

/// Field with every cell set to `(dx, dy)`.
pub fn uniform_field(width: usize, height: usize, dx: f32, dy: f32) -> DisparityField {
    let mut field = DisparityField::invalid(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            field.set(x, y, Some(Vector2::new(dx, dy)));
        }
    }
    field
}
