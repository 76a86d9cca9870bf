//! Edge tangent flow (ETF).
//!
//! The initial tangent at each pixel is perpendicular to the dominant
//! eigenvector of a Gaussian-smoothed structure tensor. Pixels whose
//! coherency `(l1 - l2) / (l1 + l2)` does not exceed `coherency_tau` are
//! masked out (zero tangent). Each refinement iteration then replaces
//! every tangent by a weighted average of its neighbours within `radius`,
//! weighted by spatial falloff, alignment `|t . t'|` and the neighbour's
//! coherency, with neighbours flipped into the same half-plane.

use rayon::prelude::*;

use crate::budget::TraceContext;
use crate::gradient::{Gradient, sobel};
use crate::raster::{FlowField, ScalarField};

/// Structure tensor smoothing sigma.
const TENSOR_SIGMA: f32 = 1.0;

/// Pixels below this coherency neither refine nor contribute.
const MIN_REFINE_COHERENCY: f32 = 0.1;

/// ETF parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtfParams {
    /// Neighbourhood radius of the refinement kernel.
    pub radius: u32,
    /// Refinement iterations.
    pub iterations: u32,
    /// Coherency at or below which a pixel is masked out.
    pub coherency_tau: f32,
}

/// Result of [`compute_flow`].
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    /// The refined flow field.
    pub flow: FlowField,
    /// Sobel gradient of the input.
    pub gradient: Gradient,
    /// Refinement iterations actually completed.
    pub iterations: u32,
}

/// Compute the edge tangent flow of `intensity` (values in `[0, 1]`).
///
/// Refinement stops early, keeping the last completed iteration, when the
/// time budget runs out.
#[must_use]
pub fn compute_flow(intensity: &ScalarField, params: EtfParams, ctx: &mut TraceContext) -> FlowOutcome {
    let gradient = sobel(intensity);
    let mut flow = initial_flow(&gradient, params.coherency_tau);
    let mut iterations = 0;
    for _ in 0..params.iterations {
        if ctx.is_exhausted() {
            ctx.timeout("flow field");
            break;
        }
        flow = refine(&flow, params.radius);
        iterations += 1;
    }
    FlowOutcome {
        flow,
        gradient,
        iterations,
    }
}

/// Tangents from the smoothed structure tensor.
#[must_use]
pub fn initial_flow(gradient: &Gradient, coherency_tau: f32) -> FlowField {
    let (w, h) = (gradient.gx.width(), gradient.gx.height());
    let jxx = ScalarField::from_fn(w, h, |x, y| gradient.gx.get(x, y).powi(2)).gaussian(TENSOR_SIGMA);
    let jyy = ScalarField::from_fn(w, h, |x, y| gradient.gy.get(x, y).powi(2)).gaussian(TENSOR_SIGMA);
    let jxy = ScalarField::from_fn(w, h, |x, y| gradient.gx.get(x, y) * gradient.gy.get(x, y))
        .gaussian(TENSOR_SIGMA);

    let n = w as usize * h as usize;
    let mut tangents = Vec::with_capacity(n);
    let mut coherency = Vec::with_capacity(n);
    for ((&a, &b), &c) in jxx.data().iter().zip(jxy.data()).zip(jyy.data()) {
        let half_diff = (a - c) / 2.0;
        let root = half_diff.hypot(b);
        let mean = (a + c) / 2.0;
        let (l1, l2) = (mean + root, mean - root);
        let coh = if l1 + l2 > f32::EPSILON {
            (l1 - l2) / (l1 + l2)
        } else {
            0.0
        };
        if coh <= coherency_tau {
            tangents.push([0.0, 0.0]);
            coherency.push(0.0);
            continue;
        }
        // Dominant eigenvector (gradient direction); pick the better
        // conditioned of the two equivalent forms.
        let (ex, ey) = if a >= c { (l1 - c, b) } else { (b, l1 - a) };
        let len = ex.hypot(ey);
        if len <= f32::EPSILON {
            tangents.push([0.0, 0.0]);
            coherency.push(0.0);
            continue;
        }
        tangents.push([-ey / len, ex / len]);
        coherency.push(coh.min(1.0));
    }
    FlowField::from_parts(w, h, tangents, coherency)
}

/// One refinement iteration.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn refine(flow: &FlowField, radius: u32) -> FlowField {
    let (w, h) = (flow.width(), flow.height());
    let r = i64::from(radius);
    let r2 = (r * r) as f32;
    let two_r2 = 2.0 * r2.max(1.0);
    let width = w as usize;

    let mut tangents = flow.tangents().to_vec();
    let coherency = flow.coherencies().to_vec();
    if width == 0 {
        return flow.clone();
    }

    tangents
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for (x, out) in (0i64..).zip(row.iter_mut()) {
                let idx = y as usize * width + x as usize;
                if flow.coherencies()[idx] < MIN_REFINE_COHERENCY {
                    continue;
                }
                let t = flow.tangents()[idx];
                let (mut sx, mut sy) = (0.0f32, 0.0f32);
                for dy in -r..=r {
                    let ny = y + dy;
                    if ny < 0 || ny >= i64::from(h) {
                        continue;
                    }
                    for dx in -r..=r {
                        let nx = x + dx;
                        let d2 = (dx * dx + dy * dy) as f32;
                        if nx < 0 || nx >= i64::from(w) || d2 > r2 {
                            continue;
                        }
                        let nidx = ny as usize * width + nx as usize;
                        let c = flow.coherencies()[nidx];
                        if c < MIN_REFINE_COHERENCY {
                            continue;
                        }
                        let tn = flow.tangents()[nidx];
                        let dot = t[0].mul_add(tn[0], t[1] * tn[1]);
                        let weight = (-d2 / two_r2).exp() * dot.abs() * c;
                        let sign = if dot < 0.0 { -1.0 } else { 1.0 };
                        sx += sign * weight * tn[0];
                        sy += sign * weight * tn[1];
                    }
                }
                let len = sx.hypot(sy);
                if len > f32::EPSILON {
                    *out = [sx / len, sy / len];
                }
            }
        });

    FlowField::from_parts(w, h, tangents, coherency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_step(width: u32, height: u32) -> ScalarField {
        ScalarField::from_fn(width, height, |x, _| if x < width / 2 { 0.0 } else { 1.0 })
    }

    #[test]
    fn tangent_runs_along_a_vertical_edge() {
        let field = vertical_step(20, 20);
        let mut ctx = TraceContext::unlimited();
        let outcome = compute_flow(
            &field,
            EtfParams {
                radius: 3,
                iterations: 2,
                coherency_tau: 0.2,
            },
            &mut ctx,
        );
        let t = outcome.flow.tangent(10, 10);
        assert!(t[0].abs() < 1e-3, "tangent = {t:?}");
        assert!((t[1].abs() - 1.0).abs() < 1e-3, "tangent = {t:?}");
        assert!(outcome.flow.coherency(10, 10) > 0.9);
        assert_eq!(outcome.iterations, 2);
    }

    #[test]
    fn flat_pixels_are_masked() {
        let field = vertical_step(20, 20);
        let flow = initial_flow(&sobel(&field), 0.2);
        assert_eq!(flow.tangent(1, 10), [0.0, 0.0]);
        assert!(flow.coherency(1, 10).abs() < f32::EPSILON);
    }

    #[test]
    fn unmasked_tangents_are_unit_length() {
        let field = ScalarField::from_fn(24, 24, |x, y| {
            let dx = f64::from(x) - 12.0;
            let dy = f64::from(y) - 12.0;
            if dx.hypot(dy) < 7.0 { 0.0 } else { 1.0 }
        });
        let mut ctx = TraceContext::unlimited();
        let outcome = compute_flow(
            &field,
            EtfParams {
                radius: 2,
                iterations: 3,
                coherency_tau: 0.2,
            },
            &mut ctx,
        );
        for (t, c) in outcome.flow.tangents().iter().zip(outcome.flow.coherencies()) {
            let len = t[0].hypot(t[1]);
            if *c > 0.0 {
                assert!((len - 1.0).abs() < 1e-3, "len = {len}");
            } else {
                assert!(len.abs() < f32::EPSILON);
            }
        }
    }

    #[test]
    fn exhausted_budget_skips_refinement() {
        let mut ctx = TraceContext::new(crate::budget::TimeBudget::new(0));
        let outcome = compute_flow(
            &vertical_step(8, 8),
            EtfParams {
                radius: 2,
                iterations: 5,
                coherency_tau: 0.2,
            },
            &mut ctx,
        );
        assert_eq!(outcome.iterations, 0);
        assert!(ctx.is_partial());
    }
}
