//! Non-maximum suppression and hysteresis thresholding.
//!
//! This is step 4 of the edge backend. Suppression compares each pixel
//! with its two neighbours along the local normal (sampled bilinearly,
//! so diagonal normals need no angle quantization). A plateau two pixels
//! wide keeps exactly one pixel: the comparison is `>=` against the
//! neighbour behind the normal and `>` against the one ahead.
//!
//! Hysteresis is a non-recursive flood fill from strong pixels over all
//! 8 neighbours, bounds-checked at the image border.

use crate::raster::{BinaryMask, ScalarField};

/// Keep only local maxima of `strength` along `normal_at(x, y)`.
///
/// `normal_at` returns a unit vector or `None` where the pixel has no
/// direction (it is suppressed). The one-pixel image border is always
/// suppressed.
#[must_use]
pub fn non_maximum_suppression<F>(strength: &ScalarField, normal_at: F) -> ScalarField
where
    F: Fn(u32, u32) -> Option<[f32; 2]> + Sync + Send,
{
    let (w, h) = (strength.width(), strength.height());
    ScalarField::par_from_rows(w, h, |y, row| {
        if y == 0 || y + 1 >= h {
            return;
        }
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            if x == 0 || x + 1 >= w {
                continue;
            }
            let m = strength.get(x, y);
            if m <= 0.0 {
                continue;
            }
            let Some(n) = normal_at(x, y) else {
                continue;
            };
            let (fx, fy) = (f64::from(x), f64::from(y));
            let (nx, ny) = (f64::from(n[0]), f64::from(n[1]));
            let behind = strength.sample(fx - nx, fy - ny);
            let ahead = strength.sample(fx + nx, fy + ny);
            if m >= behind && m > ahead {
                *out = m;
            }
        }
    })
}

/// Pixels at or above `high`, plus pixels at or above `low` that are
/// 8-connected to them. Zero-valued pixels are never edges, whatever the
/// thresholds.
#[must_use]
pub fn hysteresis(input: &ScalarField, low: f32, high: f32) -> BinaryMask {
    let (w, h) = (input.width(), input.height());
    let mut out = BinaryMask::new(w, h);
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = input.get(x, y);
            if v < high || v <= 0.0 || out.get(x, y) {
                continue;
            }
            out.set(x, y, true);
            stack.push((x, y));
            while let Some((nx, ny)) = stack.pop() {
                let neighbors = [
                    (nx + 1, ny),
                    (nx + 1, ny + 1),
                    (nx, ny + 1),
                    (nx.wrapping_sub(1), ny.wrapping_sub(1)),
                    (nx.wrapping_sub(1), ny),
                    (nx.wrapping_sub(1), ny + 1),
                    (nx, ny.wrapping_sub(1)),
                    (nx + 1, ny.wrapping_sub(1)),
                ];
                for (qx, qy) in neighbors {
                    if qx >= w || qy >= h {
                        continue;
                    }
                    let q = input.get(qx, qy);
                    if q >= low && q > 0.0 && !out.get(qx, qy) {
                        out.set(qx, qy, true);
                        stack.push((qx, qy));
                    }
                }
            }
        }
    }
    out
}
