//! Flow-based difference of Gaussians (FDoG).
//!
//! Across the flow, each pixel is filtered with a 1D difference of
//! Gaussians (`sigma_c` against `1.6 * sigma_c`); the result is then
//! integrated along the flow streamline through the pixel with a Gaussian
//! of `sigma_s`. Dark lines and the dark side of steps produce a negative
//! response; the edge strength is its magnitude, normalized to `[0, 1]`
//! and cut below `1 - tau`.

use crate::raster::{FlowField, ScalarField};

/// Ratio between the surround and centre Gaussians.
const SURROUND_RATIO: f32 = 1.6;

/// Weight of the surround lobe; slightly below 1 so flat regions stay
/// near zero instead of cancelling exactly.
const RHO: f32 = 0.99;

/// FDoG parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FdogParams {
    /// Gaussian sigma along the flow.
    pub sigma_s: f32,
    /// Centre Gaussian sigma across the flow.
    pub sigma_c: f32,
    /// Detection sensitivity in `[0, 1]`.
    pub tau: f32,
}

fn gaussian_kernel(sigma: f32, radius: i64) -> Vec<f32> {
    (-radius..=radius)
        .map(|d| {
            #[allow(clippy::cast_precision_loss)]
            let d = d as f32;
            (-(d * d) / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * std::f32::consts::PI).sqrt())
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn kernel_radius(sigma: f32) -> i64 {
    (sigma * 3.0).ceil().max(1.0) as i64
}

/// Edge strength in `[0, 1]` of `intensity` (values in `[0, 1]`) along
/// `flow`. Masked flow pixels have no response.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fdog(intensity: &ScalarField, flow: &FlowField, params: FdogParams) -> ScalarField {
    let (w, h) = (intensity.width(), intensity.height());
    let sigma_surround = params.sigma_c * SURROUND_RATIO;
    let across_radius = kernel_radius(sigma_surround);
    let centre = gaussian_kernel(params.sigma_c, across_radius);
    let surround = gaussian_kernel(sigma_surround, across_radius);
    let dog: Vec<f32> = centre
        .iter()
        .zip(&surround)
        .map(|(c, s)| RHO.mul_add(-s, *c))
        .collect();

    // 1D DoG across the flow (along the local gradient direction).
    let across = ScalarField::par_from_rows(w, h, |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            let t = flow.tangent(x, y);
            if t == [0.0, 0.0] {
                continue;
            }
            let normal = [-t[1], t[0]];
            let mut sum = 0.0;
            for (k, s) in dog.iter().zip(-across_radius..=across_radius) {
                let s = s as f32;
                let sx = f64::from(s.mul_add(normal[0], x as f32));
                let sy = f64::from(s.mul_add(normal[1], y as f32));
                sum += k * intensity.sample(sx, sy);
            }
            *out = sum;
        }
    });

    // Integrate along the streamline in both directions.
    let along_radius = kernel_radius(params.sigma_s);
    let along = gaussian_kernel(params.sigma_s, along_radius);
    let centre_weight = along[usize::try_from(along_radius).unwrap_or(0)];
    let integrated = ScalarField::par_from_rows(w, h, |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            if flow.tangent(x, y) == [0.0, 0.0] {
                continue;
            }
            let mut sum = centre_weight * across.get(x, y);
            let mut weight = centre_weight;
            for direction in [1.0f32, -1.0] {
                let (mut px, mut py) = (x as f32, y as f32);
                let t0 = flow.tangent(x, y);
                let mut prev = [t0[0] * direction, t0[1] * direction];
                for step in 1..=along_radius {
                    px += prev[0];
                    py += prev[1];
                    let (ix, iy) = (px.round(), py.round());
                    if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
                        break;
                    }
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let (ix, iy) = (ix as u32, iy as u32);
                    let t = flow.tangent(ix, iy);
                    if t == [0.0, 0.0] {
                        break;
                    }
                    let g = along[usize::try_from(along_radius + step).unwrap_or(0)];
                    sum += g * across.get(ix, iy);
                    weight += g;
                    let dot = t[0].mul_add(prev[0], t[1] * prev[1]);
                    prev = if dot < 0.0 { [-t[0], -t[1]] } else { t };
                }
            }
            *out = (-sum / weight).max(0.0);
        }
    });

    let normalized = integrated.normalized();
    let cutoff = 1.0 - params.tau.clamp(0.0, 1.0);
    let mut strength = normalized;
    for v in strength.data_mut() {
        if *v < cutoff {
            *v = 0.0;
        }
    }
    strength
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TraceContext;
    use crate::flow::{EtfParams, compute_flow};

    #[test]
    fn dark_line_responds_on_the_line() {
        let field = ScalarField::from_fn(30, 30, |x, _| if x == 15 { 0.0 } else { 1.0 });
        let mut ctx = TraceContext::unlimited();
        let flow = compute_flow(
            &field,
            EtfParams {
                radius: 3,
                iterations: 2,
                coherency_tau: 0.2,
            },
            &mut ctx,
        )
        .flow;
        let response = fdog(
            &field,
            &flow,
            FdogParams {
                sigma_s: 0.8,
                sigma_c: 1.0,
                tau: 0.7,
            },
        );
        assert!((response.get(15, 15) - 1.0).abs() < 0.05);
        assert!(response.get(3, 15).abs() < f32::EPSILON);
        assert!(response.get(20, 15) < response.get(15, 15));
    }

    #[test]
    fn masked_flow_has_no_response() {
        let field = ScalarField::from_fn(10, 10, |x, _| if x < 5 { 0.0 } else { 1.0 });
        let flow = FlowField::new(10, 10);
        let response = fdog(
            &field,
            &flow,
            FdogParams {
                sigma_s: 1.0,
                sigma_c: 1.0,
                tau: 1.0,
            },
        );
        assert!(response.max().abs() < f32::EPSILON);
    }
}
