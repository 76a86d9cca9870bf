//! Edge backend: gradient edges linked into polylines.
//!
//! One pass runs, in order: Gaussian blur at the detail-derived sigma,
//! Sobel gradient, the optional edge tangent flow, the optional
//! flow-aligned DoG, non-maximum suppression with hysteresis, and
//! linking. Linking walks the flow field when flow tracing is enabled and
//! falls back to border following otherwise; border-followed polylines
//! shorter than the mapping's minimum stroke length are dropped.
//!
//! [`multipass`](crate::multipass) runs this pass several times and
//! merges the results.

use image::GrayImage;

use crate::budget::TraceContext;
use crate::config::{EdgeConfig, ThresholdMapping};
use crate::contour::trace_edges;
use crate::diagnostics::{StageMetrics, count_foreground, total_points};
use crate::fdog::{FdogParams, fdog};
use crate::flow::{EtfParams, compute_flow};
use crate::flow_trace::{TraceParams, trace_flow};
use crate::gradient::{Gradient, sobel};
use crate::nms::{hysteresis, non_maximum_suppression};
use crate::preprocess::gaussian_blur;
use crate::raster::{BinaryMask, FlowField, ScalarField};
use crate::types::Polyline;

/// Flow-traced polylines shorter than this are dropped (pixels).
const MIN_TRACED_LENGTH: f64 = 1.0;

/// Run one edge pass over `gray`.
#[must_use = "returns the edge polylines"]
pub fn extract_edges(
    gray: &GrayImage,
    config: &EdgeConfig,
    mapping: &ThresholdMapping,
    ctx: &mut TraceContext,
) -> Vec<Polyline> {
    let sigma = mapping.edge_blur_sigma;
    let intensity = ctx.stage("blur", |_| {
        let blurred = gaussian_blur(gray, sigma);
        let metrics = StageMetrics::Preprocess {
            width: blurred.width(),
            height: blurred.height(),
            blur_sigma: sigma,
            denoised: false,
        };
        (ScalarField::from_gray(&blurred), metrics)
    });

    let (gradient, flow) = if config.enable_flow_field {
        let params = EtfParams {
            radius: config.etf_radius,
            iterations: config.etf_iterations,
            coherency_tau: config.etf_coherency_tau,
        };
        let outcome = ctx.stage("flow field", |ctx| {
            let outcome = compute_flow(&intensity, params, ctx);
            let metrics = StageMetrics::FlowField {
                iterations: outcome.iterations,
                mean_coherency: outcome.flow.mean_coherency(),
            };
            (outcome, metrics)
        });
        (outcome.gradient, Some(outcome.flow))
    } else {
        (sobel(&intensity), None)
    };

    let fdog_response = match (&flow, config.enable_fdog) {
        (Some(flow), true) => {
            let params = FdogParams {
                sigma_s: config.fdog_sigma_s,
                sigma_c: config.fdog_sigma_c,
                tau: config.fdog_tau,
            };
            Some(ctx.stage("fdog", |_| {
                let response = fdog(&intensity, flow, params);
                let response_pixels = response.data().iter().filter(|v| **v > 0.0).count() as u64;
                (response, StageMetrics::Fdog { response_pixels })
            }))
        }
        _ => None,
    };

    let (strength, low, high) = match fdog_response {
        Some(response) => (response, config.nms_low, config.nms_high),
        None => (
            gradient.magnitude.normalized(),
            mapping.canny_low,
            mapping.canny_high,
        ),
    };

    let edges = ctx.stage("edge detection", |_| {
        let edges = detect(&strength, &gradient, flow.as_ref().filter(|_| config.enable_fdog), low, high);
        let metrics = StageMetrics::EdgeDetection {
            low_threshold: low,
            high_threshold: high,
            edge_pixel_count: count_foreground(&edges),
            total_pixel_count: u64::from(edges.width()) * u64::from(edges.height()),
        };
        (edges, metrics)
    });

    ctx.stage("edge linking", |ctx| {
        let (polylines, flow_traced) = match &flow {
            Some(flow) if config.enable_flow_tracing => {
                let params = TraceParams {
                    min_strength: config.trace_min_grad,
                    min_coherency: config.trace_min_coherency,
                    max_gap: config.trace_max_gap,
                    max_len: config.trace_max_len,
                };
                let traced = trace_flow(&edges, &strength, flow, params, ctx);
                let kept = traced
                    .into_iter()
                    .filter(|p| p.length() >= MIN_TRACED_LENGTH)
                    .collect();
                (kept, true)
            }
            _ => {
                let kept: Vec<Polyline> = trace_edges(&edges)
                    .into_iter()
                    .filter(|p| p.is_valid() && p.length() >= mapping.min_stroke_length)
                    .collect();
                (kept, false)
            }
        };
        let metrics = StageMetrics::EdgeLinking {
            flow_traced,
            polyline_count: polylines.len(),
            total_point_count: total_points(&polylines),
        };
        (polylines, metrics)
    })
}

/// Thin `strength` and apply hysteresis at fractions of its peak.
///
/// Suppression follows the flow normal when `flow` is given and the
/// gradient direction otherwise.
#[must_use = "returns the binary edge map"]
pub fn detect(
    strength: &ScalarField,
    gradient: &Gradient,
    flow: Option<&FlowField>,
    low: f32,
    high: f32,
) -> BinaryMask {
    let thin = match flow {
        Some(flow) => non_maximum_suppression(strength, |x, y| {
            let t = flow.tangent(x, y);
            (t != [0.0, 0.0]).then_some([t[1], -t[0]])
        }),
        None => non_maximum_suppression(strength, |x, y| gradient.direction(x, y)),
    };
    let peak = thin.max();
    if peak <= 0.0 {
        return BinaryMask::new(strength.width(), strength.height());
    }
    hysteresis(&thin, low * peak, high * peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    fn square_image() -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            let inside = (30..70).contains(&x) && (30..70).contains(&y);
            image::Luma([if inside { 0 } else { 255 }])
        })
    }

    fn mapping(detail: f32) -> ThresholdMapping {
        ThresholdMapping::new(
            detail,
            Dimensions {
                width: 100,
                height: 100,
            },
        )
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_fn(40, 40, |_, _| image::Luma([128]));
        let mut ctx = TraceContext::unlimited();
        let lines = extract_edges(&img, &EdgeConfig::default(), &mapping(0.5), &mut ctx);
        assert!(lines.is_empty());
    }

    #[test]
    fn square_outline_is_one_closed_polyline() {
        let mut ctx = TraceContext::unlimited();
        let lines = extract_edges(&square_image(), &EdgeConfig::default(), &mapping(0.5), &mut ctx);
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].is_closed());
        for p in lines[0].points() {
            let near_x = (p.x - 29.5).abs() <= 3.0 || (p.x - 69.5).abs() <= 3.0;
            let near_y = (p.y - 29.5).abs() <= 3.0 || (p.y - 69.5).abs() <= 3.0;
            assert!(near_x || near_y, "{p:?} is far from the square outline");
        }
    }

    #[test]
    fn flow_traced_square_follows_the_outline() {
        let mut ctx = TraceContext::unlimited();
        let lines = extract_edges(&square_image(), &EdgeConfig::flow_traced(), &mapping(0.5), &mut ctx);
        assert!(!lines.is_empty());
        let points: usize = lines.iter().map(Polyline::len).sum();
        assert!(points >= 80, "only {points} traced points");
        for p in lines.iter().flat_map(|l| l.points()) {
            let near_x = (p.x - 29.5).abs() <= 4.0 || (p.x - 69.5).abs() <= 4.0;
            let near_y = (p.y - 29.5).abs() <= 4.0 || (p.y - 69.5).abs() <= 4.0;
            assert!(near_x || near_y, "{p:?} is far from the square outline");
        }
    }

    #[test]
    fn stages_are_recorded() {
        let mut ctx = TraceContext::unlimited();
        let _ = extract_edges(&square_image(), &EdgeConfig::flow_traced(), &mapping(0.5), &mut ctx);
        let (_, stages, partial) = ctx.finish();
        let names: Vec<&str> = stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            names,
            ["blur", "flow field", "fdog", "edge detection", "edge linking"]
        );
        assert!(!partial);
    }

    #[test]
    fn vertical_step_gives_a_single_thin_line() {
        let img = GrayImage::from_fn(40, 40, |x, _| image::Luma([if x < 20 { 0 } else { 255 }]));
        let strength_source = ScalarField::from_gray(&gaussian_blur(&img, 1.5));
        let gradient = sobel(&strength_source);
        let edges = detect(&gradient.magnitude.normalized(), &gradient, None, 0.1, 0.3);
        for y in 1..39 {
            let row: Vec<u32> = (0..40).filter(|&x| edges.get(x, y)).collect();
            assert_eq!(row.len(), 1, "row {y}: {row:?}");
        }
    }
}
