//! Perceptual color conversion.
//!
//! sRGB is linearized, converted to CIE XYZ under the D65 white point and
//! then to CIE L\*a\*b\*, where Euclidean distance (ΔE76) approximates
//! perceived color difference. Superpixel clustering and dot background
//! detection both measure color in this space.

use image::RgbaImage;
use rayon::prelude::*;

use crate::types::Color;

/// D65 reference white.
const WHITE_X: f32 = 0.950_47;
const WHITE_Y: f32 = 1.0;
const WHITE_Z: f32 = 1.088_83;

/// A CIE L\*a\*b\* color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Lab {
    /// Lightness, 0 (black) to 100 (white).
    pub l: f32,
    /// Green (negative) to red (positive).
    pub a: f32,
    /// Blue (negative) to yellow (positive).
    pub b: f32,
}

impl Lab {
    /// Create a Lab color.
    #[must_use]
    pub const fn new(l: f32, a: f32, b: f32) -> Self {
        Self { l, a, b }
    }

    /// Squared ΔE76 distance.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl.mul_add(dl, da.mul_add(da, db * db))
    }

    /// ΔE76 distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Composite an RGBA pixel over an opaque white background.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn composite_over_white(rgba: [u8; 4]) -> [u8; 3] {
    if rgba[3] == 255 {
        return [rgba[0], rgba[1], rgba[2]];
    }
    let alpha = f32::from(rgba[3]) / 255.0;
    let blend = |c: u8| (f32::from(c) - 255.0).mul_add(alpha, 255.0).round() as u8;
    [blend(rgba[0]), blend(rgba[1]), blend(rgba[2])]
}

/// Rec. 601 luma in `[0, 255]`.
#[must_use]
pub fn luminance(rgb: [u8; 3]) -> f32 {
    0.114f32.mul_add(
        f32::from(rgb[2]),
        0.299f32.mul_add(f32::from(rgb[0]), 0.587 * f32::from(rgb[1])),
    )
}

/// sRGB transfer function inverse.
fn linearize(channel: u8) -> f32 {
    let c = f32::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    const EPSILON: f32 = 216.0 / 24_389.0;
    const KAPPA: f32 = 24_389.0 / 27.0;
    if t > EPSILON {
        t.cbrt()
    } else {
        KAPPA.mul_add(t, 16.0) / 116.0
    }
}

/// Convert an opaque sRGB color to Lab.
#[must_use]
pub fn srgb_to_lab(rgb: [u8; 3]) -> Lab {
    let r = linearize(rgb[0]);
    let g = linearize(rgb[1]);
    let b = linearize(rgb[2]);

    let x = 0.180_437_5f32.mul_add(b, 0.412_456_4f32.mul_add(r, 0.357_576_1 * g));
    let y = 0.072_175_0f32.mul_add(b, 0.212_672_9f32.mul_add(r, 0.715_152_2 * g));
    let z = 0.950_304_1f32.mul_add(b, 0.019_333_9f32.mul_add(r, 0.119_192 * g));

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab::new(
        116.0f32.mul_add(fy, -16.0),
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    )
}

/// Row-major Lab plane of an RGBA image, composited over white.
#[must_use]
pub fn lab_plane(rgba: &RgbaImage) -> Vec<Lab> {
    rgba.as_raw()
        .par_chunks_exact(4)
        .map(|px| srgb_to_lab(composite_over_white([px[0], px[1], px[2], px[3]])))
        .collect()
}

/// Convert a mean RGB accumulator to a [`Color`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn color_from_mean(rgb: [f64; 3]) -> Color {
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    Color::opaque(channel(rgb[0]), channel(rgb[1]), channel(rgb[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_lightness() {
        let white = srgb_to_lab([255, 255, 255]);
        let black = srgb_to_lab([0, 0, 0]);
        assert!((white.l - 100.0).abs() < 0.1, "white L = {}", white.l);
        assert!(white.a.abs() < 0.1 && white.b.abs() < 0.1);
        assert!(black.l.abs() < 0.1, "black L = {}", black.l);
    }

    #[test]
    fn red_has_positive_a() {
        let red = srgb_to_lab([255, 0, 0]);
        assert!((red.l - 53.2).abs() < 0.5, "red L = {}", red.l);
        assert!((red.a - 80.1).abs() < 1.0, "red a = {}", red.a);
        assert!((red.b - 67.2).abs() < 1.0, "red b = {}", red.b);
    }

    #[test]
    fn transparent_composites_to_white() {
        assert_eq!(composite_over_white([0, 0, 0, 0]), [255, 255, 255]);
        assert_eq!(composite_over_white([10, 20, 30, 255]), [10, 20, 30]);
        let half = composite_over_white([0, 0, 0, 128]);
        assert!((126..=128).contains(&half[0]), "half = {half:?}");
    }

    #[test]
    fn luminance_of_primaries() {
        assert!((luminance([255, 255, 255]) - 255.0).abs() < 0.01);
        assert!((luminance([0, 255, 0]) - 149.685).abs() < 0.01);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = srgb_to_lab([200, 10, 50]);
        let b = srgb_to_lab([20, 180, 90]);
        assert!((a.distance(b) - b.distance(a)).abs() < 1e-4);
        assert!(a.distance(a).abs() < f32::EPSILON);
    }

    #[test]
    fn mean_color_rounds_and_clamps() {
        assert_eq!(
            color_from_mean([12.4, 12.6, 300.0]),
            Color::opaque(12, 13, 255)
        );
    }
}
