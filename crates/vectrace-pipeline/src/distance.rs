//! Euclidean distance transform of a binary mask.
//!
//! The radius at a foreground pixel is its distance to the nearest
//! background pixel, so a stroke of width `w` has a radius of about `w/2`
//! along its centerline. Background pixels have radius 0.

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::raster::{BinaryMask, ScalarField};

/// Distance from every foreground pixel of `mask` to the background.
///
/// Pixels outside the image do not count as background; a mask with no
/// background pixels at all gets radius 0 everywhere.
#[must_use = "returns the radius field"]
#[allow(clippy::cast_possible_truncation)]
pub fn distance_to_background(mask: &BinaryMask) -> ScalarField {
    let (w, h) = (mask.width(), mask.height());
    if mask.count() == mask.data().len() {
        return ScalarField::new(w, h);
    }
    // The transform measures distance to the nearest non-zero pixel, so
    // the background becomes the seed set.
    let background = GrayImage::from_fn(w, h, |x, y| Luma([if mask.get(x, y) { 0 } else { 255 }]));
    let squared = euclidean_squared_distance_transform(&background);
    ScalarField::from_fn(w, h, |x, y| squared.get_pixel(x, y).0[0].sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_radius_peaks_in_the_middle() {
        let mask = BinaryMask::from_fn(20, 11, |_, y| (2..9).contains(&y));
        let radius = distance_to_background(&mask);
        assert!(radius.get(10, 0).abs() < f32::EPSILON);
        assert!((radius.get(10, 2) - 1.0).abs() < 1e-6);
        assert!((radius.get(10, 5) - 4.0).abs() < 1e-6);
        assert!((radius.get(10, 8) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn diagonal_distance_is_euclidean() {
        let mut mask = BinaryMask::from_fn(9, 9, |_, _| true);
        mask.set(0, 0, false);
        let radius = distance_to_background(&mask);
        assert!((radius.get(3, 4) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn full_mask_has_zero_radius() {
        let mask = BinaryMask::from_fn(4, 4, |_, _| true);
        assert!(distance_to_background(&mask).max().abs() < f32::EPSILON);
    }
}
