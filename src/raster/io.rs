//! Convenience helpers for loading rasters via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use std::path::Path;

use crate::raster::Raster;
use crate::util::{SeedResult, StereoSeedError};

/// Creates an `f32` raster from a grayscale image buffer.
pub fn raster_from_gray_image(img: &image::GrayImage) -> SeedResult<Raster<f32>> {
    let data = img.as_raw().iter().map(|&v| v as f32).collect();
    Raster::from_vec(data, img.width() as usize, img.height() as usize)
}

/// Loads an image from disk and converts it to an `f32` grayscale raster.
pub fn load_gray_raster<P: AsRef<Path>>(path: P) -> SeedResult<Raster<f32>> {
    let img = image::open(&path).map_err(|err| StereoSeedError::ArtifactIo {
        path: path.as_ref().to_path_buf(),
        reason: err.to_string(),
    })?;
    raster_from_gray_image(&img.to_luma8())
}

/// Loads a validity mask from disk; nonzero pixels are valid.
pub fn load_mask<P: AsRef<Path>>(path: P) -> SeedResult<Raster<u8>> {
    let img = image::open(&path)
        .map_err(|err| StereoSeedError::ArtifactIo {
            path: path.as_ref().to_path_buf(),
            reason: err.to_string(),
        })?
        .to_luma8();
    Raster::from_vec(
        img.as_raw().clone(),
        img.width() as usize,
        img.height() as usize,
    )
}

/// All-valid mask of the given dimensions.
pub fn full_mask(width: usize, height: usize) -> SeedResult<Raster<u8>> {
    Raster::filled(width, height, 255)
}
