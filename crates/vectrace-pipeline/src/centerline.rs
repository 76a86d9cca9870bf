//! Centerline backend: the medial axis of dark strokes.
//!
//! The grayscale image is blurred lightly, binarized with dark pixels as
//! foreground, optionally cleaned up morphologically and thinned to a
//! one-pixel skeleton. The skeleton becomes a [`SkeletonGraph`], which is
//! pruned, stripped of micro-loops and bridged before its branches are
//! emitted as polylines. Each point keeps the distance-transform radius of
//! its pixel so strokes can be drawn at the width of the original ink.

use image::GrayImage;

use crate::budget::TraceContext;
use crate::config::{CenterlineConfig, ThresholdMapping};
use crate::diagnostics::{StageMetrics, count_foreground};
use crate::distance::distance_to_background;
use crate::preprocess::{ThresholdMethod, binarize, gaussian_blur, morphology_cleanup};
use crate::skeleton::{CleanupParams, SkeletonGraph};
use crate::thinning::thin;
use crate::types::Polyline;

/// One skeleton branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Centerline {
    /// Branch geometry in pixel centres.
    pub polyline: Polyline,
    /// Distance-transform radius at each point.
    pub radii: Vec<f32>,
}

/// Trace the centerlines of the dark strokes in `gray`.
#[must_use = "returns the centerlines"]
pub fn extract_centerlines(
    gray: &GrayImage,
    config: &CenterlineConfig,
    mapping: &ThresholdMapping,
    ctx: &mut TraceContext,
) -> Vec<Centerline> {
    let sigma = mapping.centerline_blur_sigma;
    let blurred = ctx.stage("blur", |_| {
        let blurred = gaussian_blur(gray, sigma);
        let metrics = StageMetrics::Preprocess {
            width: blurred.width(),
            height: blurred.height(),
            blur_sigma: sigma,
            denoised: false,
        };
        (blurred, metrics)
    });

    let method = if config.adaptive_threshold {
        ThresholdMethod::Sauvola {
            window_size: config.window_size,
            k: config.sensitivity_k,
        }
    } else {
        ThresholdMethod::Otsu
    };
    let mask = ctx.stage("threshold", |_| {
        let mut mask = binarize(&blurred, method);
        if config.morphology {
            mask = morphology_cleanup(&mask);
        }
        let metrics = StageMetrics::Threshold {
            method: method.name().to_string(),
            foreground_pixels: count_foreground(&mask),
        };
        (mask, metrics)
    });

    let skeleton = ctx.stage("thinning", |ctx| {
        let outcome = thin(&mask, ctx);
        let metrics = StageMetrics::Thinning {
            iterations: outcome.iterations,
            converged: outcome.converged,
            skeleton_pixels: count_foreground(&outcome.skeleton),
        };
        (outcome.skeleton, metrics)
    });

    let radius = distance_to_background(&mask);
    let params = CleanupParams {
        min_branch_length: config.min_branch_length,
        micro_loop_length: config.micro_loop_length,
        bridging: config.enable_bridging,
        max_join_distance: config.max_join_distance,
        max_join_angle_deg: config.max_join_angle_deg,
    };
    let graph = ctx.stage("skeleton graph", |ctx| {
        let mut graph = SkeletonGraph::from_skeleton(&skeleton, &radius);
        let counts = graph.simplify(params, &radius, ctx);
        let metrics = StageMetrics::SkeletonGraph {
            branches_before: counts.branches_before,
            pruned: counts.pruned,
            micro_loops: counts.micro_loops,
            bridges: counts.bridges,
            branches_after: counts.branches_after,
        };
        (graph, metrics)
    });

    graph
        .polylines()
        .into_iter()
        .map(|(polyline, radii)| Centerline { polyline, radii })
        .collect()
}

/// Per-point stroke widths for `lines`.
///
/// Radii are mapped linearly from the smallest and largest radius over
/// all lines onto the `(min, max)` multipliers of `base_width`. When every
/// radius is the same, the midpoint of the range is used.
#[must_use]
pub fn stroke_widths(lines: &[Centerline], base_width: f64, (lo, hi): (f64, f64)) -> Vec<Vec<f64>> {
    let all = lines.iter().flat_map(|l| l.radii.iter().map(|r| f64::from(*r)));
    let (r_min, r_max) = all.fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), r| (a.min(r), b.max(r)));
    let span = r_max - r_min;
    lines
        .iter()
        .map(|line| {
            line.radii
                .iter()
                .map(|r| {
                    let t = if span > f64::EPSILON {
                        (f64::from(*r) - r_min) / span
                    } else {
                        0.5
                    };
                    base_width * (hi - lo).mul_add(t, lo)
                })
                .collect()
        })
        .collect()
}
