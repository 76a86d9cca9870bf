//! Raster containers shared by the backends.
//!
//! [`RasterImage`] is the immutable input; [`ScalarField`], [`FlowField`]
//! and [`BinaryMask`] are per-conversion intermediates that never outlive
//! the backend invocation that created them.

use std::sync::OnceLock;

use image::{GrayImage, Luma, RgbaImage};
use imageproc::definitions::Image;
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;

use crate::color::{self, Lab};
use crate::types::{Dimensions, TraceError};

/// Decoded RGBA8 input with a lazily computed CIE Lab plane.
#[derive(Debug, Clone)]
pub struct RasterImage {
    rgba: RgbaImage,
    lab: OnceLock<Vec<Lab>>,
}

impl RasterImage {
    /// Wrap an already decoded image.
    #[must_use]
    pub const fn new(rgba: RgbaImage) -> Self {
        Self {
            rgba,
            lab: OnceLock::new(),
        }
    }

    /// Build an image from a raw row-major RGBA8 buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidRaster`] if `bytes.len()` differs from
    /// `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, TraceError> {
        let expected = width as usize * height as usize * 4;
        let actual = bytes.len();
        let invalid = TraceError::InvalidRaster {
            width,
            height,
            expected,
            actual,
        };
        if actual != expected {
            return Err(invalid);
        }
        RgbaImage::from_raw(width, height, bytes)
            .map(Self::new)
            .ok_or(invalid)
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.rgba.width(),
            height: self.rgba.height(),
        }
    }

    /// The underlying RGBA buffer.
    #[must_use]
    pub const fn as_rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    /// RGBA value of one pixel.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.rgba.get_pixel(x, y).0
    }

    /// Row-major CIE Lab plane, computed on first access.
    ///
    /// Transparent pixels are composited over white first.
    pub fn lab(&self) -> &[Lab] {
        self.lab.get_or_init(|| color::lab_plane(&self.rgba))
    }
}

/// A width x height grid of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ScalarField {
    /// A zero-filled field.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Build a field by evaluating `f(x, y)` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a field row by row in parallel; `fill(y, row)` writes row `y`.
    #[must_use]
    pub fn par_from_rows(
        width: u32,
        height: u32,
        fill: impl Fn(u32, &mut [f32]) + Sync + Send,
    ) -> Self {
        let mut data = vec![0.0; width as usize * height as usize];
        if width > 0 {
            data.par_chunks_mut(width as usize)
                .enumerate()
                .for_each(|(y, row)| {
                    #[allow(clippy::cast_possible_truncation)]
                    let y = y as u32;
                    fill(y, row);
                });
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap a row-major buffer. Returns `None` if its length does not
    /// match the dimensions.
    #[must_use]
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Intensities of a grayscale image scaled to `[0, 1]`.
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            data: gray.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect(),
        }
    }

    /// Field width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Field height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Field dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major values.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major values.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Value at `(x, y)`. Coordinates must be in bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Overwrite the value at `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Value at signed coordinates, clamped to the nearest edge pixel.
    #[must_use]
    pub fn get_clamped(&self, x: i64, y: i64) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let cx = x.clamp(0, i64::from(self.width) - 1);
        let cy = y.clamp(0, i64::from(self.height) - 1);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let (cx, cy) = (cx as u32, cy as u32);
        self.get(cx, cy)
    }

    /// Bilinear sample at a sub-pixel position, clamped at the borders.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self, x: f64, y: f64) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = (x - x0) as f32;
        let fy = (y - y0) as f32;
        let (ix, iy) = (x0 as i64, y0 as i64);
        let top = (1.0 - fx).mul_add(self.get_clamped(ix, iy), fx * self.get_clamped(ix + 1, iy));
        let bottom = (1.0 - fx).mul_add(
            self.get_clamped(ix, iy + 1),
            fx * self.get_clamped(ix + 1, iy + 1),
        );
        (1.0 - fy).mul_add(top, fy * bottom)
    }

    /// Largest value, or 0 for an empty field.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    /// Mean value, or 0 for an empty field.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| f64::from(v)).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// The field divided by its maximum so that values lie in `[0, 1]`.
    ///
    /// An all-zero field is returned unchanged.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let max = self.max();
        if max <= 0.0 {
            return self.clone();
        }
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| v / max).collect(),
        }
    }

    /// Gaussian smoothing with clamped borders.
    #[must_use]
    pub fn gaussian(&self, sigma: f32) -> Self {
        if sigma <= 0.0 || self.data.is_empty() {
            return self.clone();
        }
        Self::from_image(gaussian_blur_f32(&self.to_image(), sigma))
    }

    /// Copy into an `imageproc` float image.
    #[must_use]
    pub fn to_image(&self) -> Image<Luma<f32>> {
        Image::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]))
    }

    /// Take over the buffer of an `imageproc` float image.
    #[must_use]
    pub fn from_image(image: Image<Luma<f32>>) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Per-pixel unit tangent plus a coherency weight.
///
/// Tangents have magnitude about 1 wherever the coherency is non-zero and
/// are exactly zero at masked-out pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    tangents: Vec<[f32; 2]>,
    coherency: Vec<f32>,
}

impl FlowField {
    /// A field with every pixel masked out.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            tangents: vec![[0.0, 0.0]; n],
            coherency: vec![0.0; n],
        }
    }

    pub(crate) const fn from_parts(
        width: u32,
        height: u32,
        tangents: Vec<[f32; 2]>,
        coherency: Vec<f32>,
    ) -> Self {
        Self {
            width,
            height,
            tangents,
            coherency,
        }
    }

    /// Field width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Field height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Unit tangent at `(x, y)`, or `[0, 0]` where masked.
    #[must_use]
    pub fn tangent(&self, x: u32, y: u32) -> [f32; 2] {
        self.tangents[y as usize * self.width as usize + x as usize]
    }

    /// Coherency in `[0, 1]` at `(x, y)`.
    #[must_use]
    pub fn coherency(&self, x: u32, y: u32) -> f32 {
        self.coherency[y as usize * self.width as usize + x as usize]
    }

    /// Row-major tangents.
    #[must_use]
    pub fn tangents(&self) -> &[[f32; 2]] {
        &self.tangents
    }

    /// Row-major coherency values.
    #[must_use]
    pub fn coherencies(&self) -> &[f32] {
        &self.coherency
    }

    /// Mean coherency over all pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_coherency(&self) -> f32 {
        if self.coherency.is_empty() {
            return 0.0;
        }
        self.coherency.iter().sum::<f32>() / self.coherency.len() as f32
    }
}

/// A width x height boolean grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl BinaryMask {
    /// An all-background mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask by evaluating `f(x, y)` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a mask row by row in parallel; `fill(y, row)` writes row `y`.
    #[must_use]
    pub fn par_from_rows(
        width: u32,
        height: u32,
        fill: impl Fn(u32, &mut [bool]) + Sync + Send,
    ) -> Self {
        let mut data = vec![false; width as usize * height as usize];
        if width > 0 {
            data.par_chunks_mut(width as usize)
                .enumerate()
                .for_each(|(y, row)| {
                    #[allow(clippy::cast_possible_truncation)]
                    let y = y as u32;
                    fill(y, row);
                });
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Non-zero pixels of `gray` become foreground.
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            data: gray.as_raw().iter().map(|&v| v > 0).collect(),
        }
    }

    /// Foreground as 255, background as 0.
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    /// Mask width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Whether `(x, y)` is foreground. Coordinates must be in bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Whether signed `(x, y)` is foreground; outside the grid is background.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn get_signed(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.get(x as u32, y as u32)
    }

    /// Set or clear `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Row-major values.
    #[must_use]
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Foreground pixel coordinates in raster order.
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.data.iter().enumerate().filter(|(_, v)| **v).map(move |(i, _)| {
            #[allow(clippy::cast_possible_truncation)]
            let pixel = ((i % width) as u32, (i / width) as u32);
            pixel
        })
    }
}
