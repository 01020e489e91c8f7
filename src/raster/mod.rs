//! Owned rasters and borrowed strided views.
//!
//! `RasterView` is a borrowed 2D view into a 1D buffer with an explicit
//! stride; ROI slices are zero-copy views into the same backing slice and
//! retain the original stride. `Raster` owns a contiguous buffer. Images are
//! `f32` grayscale, validity masks are `u8` (nonzero = valid).

use crate::util::{SeedResult, StereoSeedError};

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed 2D view with an explicit stride.
#[derive(Copy, Clone)]
pub struct RasterView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> RasterView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> SeedResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> SeedResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(StereoSeedError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> SeedResult<Self> {
        if width == 0 || height == 0 {
            return Err(StereoSeedError::InvalidDimensions { width, height });
        }
        let oob = StereoSeedError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| oob.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| oob.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(oob);
        }
        let start = y * self.stride + x;
        RasterView::new(&self.data[start..], width, height, self.stride)
    }
}

/// Owned contiguous 2D buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> Raster<T> {
    /// Creates a raster filled with `fill`.
    pub fn filled(width: usize, height: usize, fill: T) -> SeedResult<Self> {
        let needed = checked_area(width, height)?;
        Ok(Self {
            data: vec![fill; needed],
            width,
            height,
        })
    }

    /// Wraps an existing buffer; the length must match the dimensions exactly.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> SeedResult<Self> {
        let needed = checked_area(width, height)?;
        if data.len() != needed {
            return Err(StereoSeedError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = value;
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns a borrowed view of the whole raster.
    pub fn view(&self) -> RasterView<'_, T> {
        RasterView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

fn checked_area(width: usize, height: usize) -> SeedResult<usize> {
    if width == 0 || height == 0 {
        return Err(StereoSeedError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(StereoSeedError::InvalidDimensions { width, height })
}

fn required_len(width: usize, height: usize, stride: usize) -> SeedResult<usize> {
    if width == 0 || height == 0 {
        return Err(StereoSeedError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(StereoSeedError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(StereoSeedError::InvalidDimensions { width, height })
}

/// Downsamples a grayscale image by two with a 2x2 box filter.
pub fn downsample_image(src: &Raster<f32>) -> SeedResult<Raster<f32>> {
    if src.width() < 2 || src.height() < 2 {
        return Err(StereoSeedError::InvalidDimensions {
            width: src.width(),
            height: src.height(),
        });
    }
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Raster::filled(dst_width, dst_height, 0.0f32)?;
    for y in 0..dst_height {
        for x in 0..dst_width {
            let a = src.get(2 * x, 2 * y).unwrap_or(0.0);
            let b = src.get(2 * x + 1, 2 * y).unwrap_or(0.0);
            let c = src.get(2 * x, 2 * y + 1).unwrap_or(0.0);
            let d = src.get(2 * x + 1, 2 * y + 1).unwrap_or(0.0);
            dst.set(x, y, (a + b + c + d) / 4.0);
        }
    }
    Ok(dst)
}

/// Downsamples a validity mask by two; a cell stays valid only when all four
/// contributing cells are valid.
pub fn downsample_mask(src: &Raster<u8>) -> SeedResult<Raster<u8>> {
    if src.width() < 2 || src.height() < 2 {
        return Err(StereoSeedError::InvalidDimensions {
            width: src.width(),
            height: src.height(),
        });
    }
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Raster::filled(dst_width, dst_height, 0u8)?;
    for y in 0..dst_height {
        for x in 0..dst_width {
            let all_valid = src.get(2 * x, 2 * y).unwrap_or(0) != 0
                && src.get(2 * x + 1, 2 * y).unwrap_or(0) != 0
                && src.get(2 * x, 2 * y + 1).unwrap_or(0) != 0
                && src.get(2 * x + 1, 2 * y + 1).unwrap_or(0) != 0;
            dst.set(x, y, if all_valid { 255 } else { 0 });
        }
    }
    Ok(dst)
}
