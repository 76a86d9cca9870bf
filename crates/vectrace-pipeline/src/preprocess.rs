//! Grayscale conversion, smoothing and binarization shared by the backends.
//!
//! Alpha is composited over white before any conversion so transparent
//! regions read as paper, not ink. Binarization treats *dark* pixels as
//! foreground: the centerline backend traces ink strokes on light paper.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::distance_transform::Norm;
use imageproc::filter::bilateral::{GaussianEuclideanColorDistance, bilateral_filter};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

use crate::color::{composite_over_white, luminance};
use crate::raster::{BinaryMask, RasterImage};

/// Pixels with alpha below this are treated as transparent.
const OPAQUE_ALPHA: u8 = 10;

/// Fewer opaque pixels than this make the input degenerate.
const MIN_OPAQUE_PIXELS: usize = 10;

/// Sauvola dynamic range of the standard deviation for 8-bit input.
const SAUVOLA_R: f64 = 128.0;

/// Why an image carries nothing to trace, or `None` if it is usable.
#[must_use]
pub fn degeneracy(image: &RasterImage) -> Option<String> {
    if image.width() == 0 || image.height() == 0 {
        return Some("image has zero size".to_string());
    }
    let rgba = image.as_rgba();
    let opaque = rgba.pixels().filter(|p| p.0[3] >= OPAQUE_ALPHA).count();
    if opaque < MIN_OPAQUE_PIXELS {
        return Some(format!(
            "only {opaque} opaque pixels (need at least {MIN_OPAQUE_PIXELS})"
        ));
    }
    let mut pixels = rgba.pixels().map(|p| composite_over_white(p.0));
    let first = pixels.next()?;
    if pixels.all(|p| p == first) {
        return Some("image is a single solid color".to_string());
    }
    None
}

/// Luma of every pixel after compositing over white.
#[must_use = "returns the grayscale image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn grayscale(image: &RasterImage) -> GrayImage {
    let rgba = image.as_rgba();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let rgb = composite_over_white(rgba.get_pixel(x, y).0);
        Luma([luminance(rgb).round().clamp(0.0, 255.0) as u8])
    })
}

/// Apply Gaussian blur to a grayscale image.
///
/// Higher `sigma` values produce more smoothing. Non-positive sigma values
/// (zero or negative) return the image unchanged, since `imageproc`'s
/// underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Bilateral filter window radius used by `denoise`.
const DENOISE_RADIUS: u8 = 2;

/// Bilateral spatial sigma used by `denoise`.
const DENOISE_SIGMA_SPATIAL: f32 = 2.0;

/// Bilateral range sigma used by `denoise` (gray levels).
const DENOISE_SIGMA_RANGE: f32 = 25.0;

/// Bilateral filter with the parameters used by the `denoise` option.
#[must_use = "returns the filtered image"]
pub fn denoise(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    bilateral_filter(
        image,
        DENOISE_RADIUS,
        DENOISE_SIGMA_SPATIAL,
        GaussianEuclideanColorDistance::new(DENOISE_SIGMA_RANGE),
    )
}

/// How a grayscale image is turned into a [`BinaryMask`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    /// One global threshold chosen by Otsu's method.
    Otsu,
    /// Sauvola's sliding-window threshold.
    Sauvola {
        /// Odd window side length.
        window_size: u32,
        /// Sensitivity `k`.
        k: f32,
    },
}

impl ThresholdMethod {
    /// Short name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Otsu => "otsu",
            Self::Sauvola { .. } => "sauvola",
        }
    }
}

/// Binarize `image`, marking dark pixels as foreground.
#[must_use = "returns the binary mask"]
pub fn binarize(image: &GrayImage, method: ThresholdMethod) -> BinaryMask {
    match method {
        ThresholdMethod::Otsu => otsu(image),
        ThresholdMethod::Sauvola { window_size, k } => sauvola(image, window_size, k),
    }
}

/// Global Otsu threshold: pixels at or below the level are foreground.
#[must_use = "returns the binary mask"]
pub fn otsu(image: &GrayImage) -> BinaryMask {
    let level = imageproc::contrast::otsu_level(image);
    let (w, h) = image.dimensions();
    BinaryMask::from_fn(w, h, |x, y| image.get_pixel(x, y).0[0] <= level)
}

/// Windowed mean and standard deviation over a grayscale image, backed
/// by integral images of the values and their squares.
pub(crate) struct WindowStats {
    sum: Image<Luma<u64>>,
    squares: Image<Luma<u64>>,
}

impl WindowStats {
    pub(crate) fn new(image: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(image),
            squares: integral_squared_image::<_, u64>(image),
        }
    }

    /// Mean and standard deviation of the square window of half-width
    /// `half` centred on `(x, y)`, clipped to the image. `(x, y)` must lie
    /// inside a non-empty image.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn mean_deviation(&self, x: u32, y: u32, half: u32) -> (f64, f64) {
        let right_edge = self.sum.width() - 2;
        let bottom_edge = self.sum.height() - 2;
        let (left, top) = (x.saturating_sub(half), y.saturating_sub(half));
        let right = x.saturating_add(half).min(right_edge);
        let bottom = y.saturating_add(half).min(bottom_edge);
        let area = f64::from(right - left + 1) * f64::from(bottom - top + 1);
        let [sum] = sum_image_pixels(&self.sum, left, top, right, bottom);
        let [squares] = sum_image_pixels(&self.squares, left, top, right, bottom);
        let mean = sum as f64 / area;
        let variance = (squares as f64 / area - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }
}

/// Sauvola adaptive threshold computed with integral images.
///
/// A pixel is foreground when its value is at or below
/// `mean * (1 + k * (std / 128 - 1))` over the surrounding window. The
/// window is shrunk to fit images smaller than it.
#[must_use = "returns the binary mask"]
pub fn sauvola(image: &GrayImage, window_size: u32, k: f32) -> BinaryMask {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return BinaryMask::new(w, h);
    }
    let half = (window_size.min(w.max(h)) / 2).max(1);
    let stats = WindowStats::new(image);
    let k = f64::from(k);
    BinaryMask::par_from_rows(w, h, |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            let (mean, deviation) = stats.mean_deviation(x, y, half);
            let threshold = mean * k.mul_add(deviation / SAUVOLA_R - 1.0, 1.0);
            *out = f64::from(image.get_pixel(x, y).0[0]) <= threshold;
        }
    })
}

/// Morphological open then close with a 3x3 square element: removes
/// isolated specks, then fills pinholes.
#[must_use = "returns the cleaned mask"]
pub fn morphology_cleanup(mask: &BinaryMask) -> BinaryMask {
    let opened = imageproc::morphology::open(&mask.to_gray(), Norm::LInf, 1);
    let closed = imageproc::morphology::close(&opened, Norm::LInf, 1);
    BinaryMask::from_gray(&closed)
}
