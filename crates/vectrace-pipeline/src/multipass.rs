//! Multi-pass edge extraction.
//!
//! The edge pass runs once per scheduled detail level, and optionally
//! over the image rotated by 180 degrees and over its transpose, so that
//! scan-order dependent linking sees every edge from more than one
//! direction. Directional passes only run when the image has enough
//! strong edges and the time budget is less than 90% spent. Passes are
//! merged in schedule order: a polyline whose points mostly lie within
//! two pixels of polylines kept from *earlier* passes is dropped. Lines
//! from the same pass never suppress each other.

use image::GrayImage;
use rstar::RTree;

use crate::budget::TraceContext;
use crate::config::{EdgeConfig, ThresholdMapping};
use crate::diagnostics::StageMetrics;
use crate::edge::extract_edges;
use crate::gradient::{sobel, strong_edge_fraction};
use crate::raster::ScalarField;
use crate::types::{Dimensions, Point, Polyline, TraceNotice};

/// Points closer than this to a kept polyline count as duplicated.
const DUPLICATE_DISTANCE: f64 = 2.0;

/// Fraction of duplicated points at which a polyline is dropped.
const DUPLICATE_FRACTION: f64 = 0.8;

/// Directional passes are skipped once this much of the budget is used.
const DIRECTIONAL_BUDGET_LIMIT: f64 = 0.9;

/// Normalized gradient levels separating weak and strong edge pixels for
/// directional gating.
const WEAK_EDGE: f32 = 0.1;
const STRONG_EDGE: f32 = 0.5;

/// Orientation of the image seen by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// The image as given.
    Forward,
    /// Rotated by 180 degrees: scans start at the bottom-right corner.
    Reverse,
    /// Transposed: rows become columns.
    Diagonal,
}

impl ScanOrder {
    /// Short name used in notices.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Diagonal => "diagonal",
        }
    }

    /// The image as this pass sees it.
    #[must_use = "returns the reoriented image"]
    pub fn apply(self, gray: &GrayImage) -> GrayImage {
        match self {
            Self::Forward => gray.clone(),
            Self::Reverse => image::imageops::rotate180(gray),
            Self::Diagonal => {
                GrayImage::from_fn(gray.height(), gray.width(), |x, y| *gray.get_pixel(y, x))
            }
        }
    }

    /// Map a point found by this pass back to source coordinates.
    #[must_use]
    pub fn restore(self, p: Point, source: Dimensions) -> Point {
        match self {
            Self::Forward => p,
            Self::Reverse => Point::new(
                f64::from(source.width) - 1.0 - p.x,
                f64::from(source.height) - 1.0 - p.y,
            ),
            Self::Diagonal => Point::new(p.y, p.x),
        }
    }
}

/// Detail level of forward pass `index` for a base `detail`.
///
/// Passes sweep from the base detail towards coarser levels; a base below
/// 0.01 is treated as 0.1.
#[must_use]
pub fn pass_detail(detail: f32, index: u32) -> f32 {
    let base = if detail < 0.01 { 0.1 } else { detail };
    #[allow(clippy::cast_precision_loss)]
    let multiplier = match index {
        0 => 1.0,
        1 => 0.8,
        2 => 0.6,
        i => 0.05f32.mul_add(-((i - 3) as f32), 0.4).max(0.1),
    };
    (base * multiplier).clamp(0.1, 1.0)
}

/// Run every scheduled pass over `gray` and merge the results.
#[must_use = "returns the merged edge polylines"]
pub fn run_passes(
    gray: &GrayImage,
    config: &EdgeConfig,
    detail: f32,
    ctx: &mut TraceContext,
) -> Vec<Polyline> {
    let source = Dimensions {
        width: gray.width(),
        height: gray.height(),
    };
    let multipass = &config.multipass;
    let mut schedule: Vec<(ScanOrder, f32)> = (0..multipass.pass_count)
        .map(|i| (ScanOrder::Forward, pass_detail(detail, i)))
        .collect();
    let mut directional = Vec::new();
    if multipass.reverse_pass {
        directional.push(ScanOrder::Reverse);
    }
    if multipass.diagonal_pass {
        directional.push(ScanOrder::Diagonal);
    }
    let mut skipped = 0usize;
    if !directional.is_empty() {
        let fraction = strong_edge_fraction(&sobel(&ScalarField::from_gray(gray)).magnitude, WEAK_EDGE, STRONG_EDGE);
        if fraction >= multipass.directional_strength_threshold {
            schedule.extend(directional.into_iter().map(|order| (order, pass_detail(detail, 0))));
        } else {
            for order in directional {
                skipped += 1;
                ctx.notice(TraceNotice::PassSkipped {
                    pass: order.name().to_string(),
                    reason: format!(
                        "strong-edge fraction {fraction:.2} below {:.2}",
                        multipass.directional_strength_threshold
                    ),
                });
            }
        }
    }

    let mut passes: Vec<Vec<Polyline>> = Vec::new();
    for (index, (order, level)) in schedule.into_iter().enumerate() {
        if index > 0 && ctx.is_exhausted() {
            ctx.timeout("multipass");
            skipped += 1;
            continue;
        }
        if order != ScanOrder::Forward && ctx.budget().fraction_used() >= DIRECTIONAL_BUDGET_LIMIT {
            skipped += 1;
            ctx.notice(TraceNotice::PassSkipped {
                pass: order.name().to_string(),
                reason: "time budget nearly spent".to_string(),
            });
            continue;
        }
        let oriented = order.apply(gray);
        let mapping = ThresholdMapping::new(
            level,
            Dimensions {
                width: oriented.width(),
                height: oriented.height(),
            },
        );
        let found = extract_edges(&oriented, config, &mapping, ctx);
        passes.push(
            found
                .into_iter()
                .map(|line| {
                    let closed = line.is_closed();
                    let points = line
                        .into_points()
                        .into_iter()
                        .map(|p| order.restore(p, source))
                        .collect();
                    Polyline::with_closed(points, closed)
                })
                .collect(),
        );
    }

    let passes_run = passes.len();
    let before: usize = passes.iter().map(Vec::len).sum();
    let start = web_time::Instant::now();
    let kept = deduplicate(passes);
    ctx.record(
        "multipass merge",
        start.elapsed(),
        StageMetrics::Multipass {
            passes_run,
            passes_skipped: skipped,
            polylines_before: before,
            polylines_after: kept.len(),
        },
    );
    kept
}

/// Merge per-pass polylines, dropping those that mostly retrace a
/// polyline kept from an earlier pass.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn deduplicate(passes: Vec<Vec<Polyline>>) -> Vec<Polyline> {
    let mut index: RTree<[f64; 2]> = RTree::new();
    let mut kept = Vec::new();
    let radius_sq = DUPLICATE_DISTANCE * DUPLICATE_DISTANCE;
    for pass in passes {
        let fresh: Vec<Polyline> = pass
            .into_iter()
            .filter(|line| {
                if line.is_empty() {
                    return false;
                }
                let covered = line
                    .points()
                    .iter()
                    .filter(|p| index.locate_within_distance([p.x, p.y], radius_sq).next().is_some())
                    .count();
                (covered as f64) < DUPLICATE_FRACTION * line.len() as f64
            })
            .collect();
        for line in &fresh {
            for p in line.points() {
                index.insert([p.x, p.y]);
            }
        }
        kept.extend(fresh);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TimeBudget;
    use crate::config::MultipassConfig;

    fn line(y: f64, x0: f64, x1: f64) -> Polyline {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = (x1 - x0) as usize;
        Polyline::new((0..=n).map(|i| Point::new(x0 + i as f64, y)).collect())
    }

    fn square_image() -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            let inside = (30..70).contains(&x) && (30..70).contains(&y);
            image::Luma([if inside { 0 } else { 255 }])
        })
    }

    #[test]
    fn detail_schedule_sweeps_towards_coarse() {
        let levels: Vec<f32> = (0..6).map(|i| pass_detail(0.8, i)).collect();
        let expected = [0.8, 0.64, 0.48, 0.32, 0.28, 0.24];
        for (got, want) in levels.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{levels:?}");
        }
        assert!((pass_detail(0.0, 0) - 0.1).abs() < 1e-6);
        assert!((pass_detail(0.2, 9) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn reverse_and_diagonal_restore_coordinates() {
        let dims = Dimensions {
            width: 10,
            height: 6,
        };
        let p = Point::new(2.0, 1.0);
        assert_eq!(ScanOrder::Reverse.restore(p, dims), Point::new(7.0, 4.0));
        assert_eq!(ScanOrder::Diagonal.restore(p, dims), Point::new(1.0, 2.0));
        let gray = GrayImage::from_fn(10, 6, |x, y| image::Luma([u8::try_from(x * 10 + y).unwrap_or(0)]));
        let rotated = ScanOrder::Reverse.apply(&gray);
        assert_eq!(rotated.get_pixel(7, 4), gray.get_pixel(2, 1));
        let transposed = ScanOrder::Diagonal.apply(&gray);
        assert_eq!(transposed.dimensions(), (6, 10));
        assert_eq!(transposed.get_pixel(1, 2), gray.get_pixel(2, 1));
    }

    #[test]
    fn near_duplicates_from_later_passes_are_dropped() {
        let passes = vec![
            vec![line(10.0, 0.0, 20.0)],
            vec![line(11.0, 0.0, 20.0), line(30.0, 0.0, 20.0), line(10.5, 2.0, 8.0)],
        ];
        let kept = deduplicate(passes);
        assert_eq!(kept.len(), 2);
        let ys: Vec<f64> = kept.iter().filter_map(|l| l.first().map(|p| p.y)).collect();
        assert!(ys.contains(&10.0));
        assert!(ys.contains(&30.0));
    }

    #[test]
    fn close_parallel_edges_from_one_pass_both_survive() {
        let kept = deduplicate(vec![vec![line(10.0, 0.0, 30.0), line(12.0, 0.0, 30.0)]]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn partially_overlapping_line_survives() {
        let kept = deduplicate(vec![vec![line(10.0, 0.0, 20.0)], vec![line(10.0, 15.0, 40.0)]]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn directional_passes_merge_into_one_outline() {
        let config = EdgeConfig {
            multipass: MultipassConfig {
                enabled: true,
                pass_count: 2,
                reverse_pass: true,
                diagonal_pass: true,
                directional_strength_threshold: 0.0,
            },
            ..EdgeConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let lines = run_passes(&square_image(), &config, 0.5, &mut ctx);
        assert_eq!(lines.len(), 1, "{lines:?}");
        let (notices, stages, _) = ctx.finish();
        assert!(notices.is_empty(), "{notices:?}");
        let Some(merge) = stages.iter().find(|s| s.stage == "multipass merge") else {
            unreachable!("merge stage missing");
        };
        let StageMetrics::Multipass { passes_run, .. } = merge.metrics else {
            unreachable!("unexpected metrics");
        };
        assert_eq!(passes_run, 4);
    }

    #[test]
    fn weak_images_skip_directional_passes() {
        let config = EdgeConfig {
            multipass: MultipassConfig {
                enabled: true,
                pass_count: 1,
                reverse_pass: true,
                diagonal_pass: false,
                directional_strength_threshold: 0.9,
            },
            ..EdgeConfig::default()
        };
        // Gradient magnitude grows linearly with x, so few pixels are strong.
        let soft = GrayImage::from_fn(60, 60, |x, _| image::Luma([u8::try_from(x * x / 15).unwrap_or(255)]));
        let mut ctx = TraceContext::unlimited();
        let _ = run_passes(&soft, &config, 0.5, &mut ctx);
        assert!(ctx
            .notices()
            .iter()
            .any(|n| matches!(n, TraceNotice::PassSkipped { pass, .. } if pass == "reverse")));
    }

    #[test]
    fn exhausted_budget_runs_only_the_first_pass() {
        let config = EdgeConfig {
            multipass: MultipassConfig {
                enabled: true,
                pass_count: 3,
                ..MultipassConfig::default()
            },
            ..EdgeConfig::default()
        };
        let mut ctx = TraceContext::new(TimeBudget::new(0));
        let _ = run_passes(&square_image(), &config, 0.5, &mut ctx);
        assert!(ctx.is_partial());
    }
}
