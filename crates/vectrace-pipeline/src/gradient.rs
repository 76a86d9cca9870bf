//! Sobel gradients.
//!
//! This is step 1 of the edge backend and also feeds the flow field and
//! the dots backend's strength estimate.

use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

use crate::raster::ScalarField;

/// Horizontal and vertical derivatives plus magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// d/dx (positive where intensity increases to the right).
    pub gx: ScalarField,
    /// d/dy (positive where intensity increases downward).
    pub gy: ScalarField,
    /// `hypot(gx, gy)`.
    pub magnitude: ScalarField,
}

impl Gradient {
    /// Gradient orientation in radians at `(x, y)`.
    #[must_use]
    pub fn orientation(&self, x: u32, y: u32) -> f32 {
        self.gy.get(x, y).atan2(self.gx.get(x, y))
    }

    /// Unit gradient direction at `(x, y)`, or `None` on flat pixels.
    #[must_use]
    pub fn direction(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        let m = self.magnitude.get(x, y);
        (m > f32::EPSILON).then(|| [self.gx.get(x, y) / m, self.gy.get(x, y) / m])
    }
}

/// Sobel horizontal kernel scaled by 1/8.
const SOBEL_HORIZONTAL: Kernel<'static, f32> = Kernel::new(
    &[-0.125, 0.0, 0.125, -0.25, 0.0, 0.25, -0.125, 0.0, 0.125],
    3,
    3,
);

/// Sobel vertical kernel scaled by 1/8.
const SOBEL_VERTICAL: Kernel<'static, f32> = Kernel::new(
    &[-0.125, -0.25, -0.125, 0.0, 0.0, 0.0, 0.125, 0.25, 0.125],
    3,
    3,
);

/// 3x3 Sobel operator with clamped borders.
///
/// The kernels are scaled by 1/8 so a unit step produces a magnitude of
/// about 1 in the input's units.
#[must_use]
pub fn sobel(field: &ScalarField) -> Gradient {
    let image = field.to_image();
    let gx = ScalarField::from_image(filter_clamped::<_, f32, f32>(&image, SOBEL_HORIZONTAL));
    let gy = ScalarField::from_image(filter_clamped::<_, f32, f32>(&image, SOBEL_VERTICAL));
    let magnitude = ScalarField::par_from_rows(field.width(), field.height(), |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            *out = gx.get(x, y).hypot(gy.get(x, y));
        }
    });
    Gradient { gx, gy, magnitude }
}

/// Among pixels whose normalized magnitude reaches `weak`, the fraction
/// that also reaches `strong`. Zero when no pixel reaches `weak`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn strong_edge_fraction(magnitude: &ScalarField, weak: f32, strong: f32) -> f32 {
    let normalized = magnitude.normalized();
    let (mut weak_count, mut strong_count) = (0usize, 0usize);
    for &v in normalized.data() {
        if v >= weak {
            weak_count += 1;
            if v >= strong {
                strong_count += 1;
            }
        }
    }
    if weak_count == 0 {
        0.0
    } else {
        strong_count as f32 / weak_count as f32
    }
}
