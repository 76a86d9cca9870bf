//! Downsampling to the working resolution.
//!
//! Images whose longest side exceeds `max_image_size` are shrunk with a
//! triangle (bilinear) filter before any other stage runs. The pipeline
//! traces at the working resolution and scales the output back up by
//! [`Downsampled::factor`].

use image::imageops::{self, FilterType};

use crate::raster::RasterImage;

/// A reduced copy of an image.
#[derive(Debug, Clone)]
pub struct Downsampled {
    /// The working image.
    pub image: RasterImage,
    /// Source size divided by working size.
    pub factor: f64,
}

/// Shrink `image` so its longest side is at most `max_dimension`.
///
/// Returns `None` when the image already fits.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn downsample(image: &RasterImage, max_dimension: u32) -> Option<Downsampled> {
    let (w, h) = (image.width(), image.height());
    let long_axis = w.max(h);
    if long_axis <= max_dimension || max_dimension == 0 {
        return None;
    }
    let scale = f64::from(max_dimension) / f64::from(long_axis);
    let nw = ((f64::from(w) * scale).round() as u32).clamp(1, max_dimension);
    let nh = ((f64::from(h) * scale).round() as u32).clamp(1, max_dimension);
    let resized = imageops::resize(image.as_rgba(), nw, nh, FilterType::Triangle);
    Some(Downsampled {
        image: RasterImage::new(resized),
        factor: f64::from(long_axis) / f64::from(max_dimension),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    fn gray(w: u32, h: u32) -> RasterImage {
        RasterImage::new(RgbaImage::from_pixel(w, h, Rgba([128, 128, 128, 255])))
    }

    #[test]
    fn small_images_are_left_alone() {
        assert!(downsample(&gray(100, 80), 256).is_none());
        assert!(downsample(&gray(256, 200), 256).is_none());
    }

    #[test]
    fn landscape_keeps_its_aspect() {
        let out = downsample(&gray(1024, 768), 256).unwrap();
        assert_eq!((out.image.width(), out.image.height()), (256, 192));
        assert!((out.factor - 4.0).abs() < 1e-12);
    }

    #[test]
    fn portrait_keeps_its_aspect() {
        let out = downsample(&gray(600, 1200), 256).unwrap();
        assert_eq!((out.image.width(), out.image.height()), (128, 256));
    }

    #[test]
    fn colors_survive() {
        let out = downsample(&gray(500, 500), 100).unwrap();
        assert_eq!(out.image.pixel(50, 50), [128, 128, 128, 255]);
    }
}
