//! Conversion diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every call to [`process`](crate::process) collects diagnostics
//! alongside the traced paths. Which stages appear depends on the backend
//! and on the optional features enabled in the configuration, so stages
//! are recorded as an ordered list rather than fixed fields.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceDiagnostics {
    /// Executed stages in order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the conversion (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: TraceSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name as shown in reports.
    pub stage: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
///
/// Each variant captures the counts and sizes meaningful for that
/// particular processing step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Input reduction for oversized images.
    Downsample {
        /// Source width in pixels.
        original_width: u32,
        /// Source height in pixels.
        original_height: u32,
        /// Working width in pixels.
        width: u32,
        /// Working height in pixels.
        height: u32,
    },
    /// Grayscale conversion, denoise and blur.
    Preprocess {
        /// Working width in pixels.
        width: u32,
        /// Working height in pixels.
        height: u32,
        /// Gaussian pre-blur sigma (0 = none).
        blur_sigma: f32,
        /// Whether the bilateral denoise ran.
        denoised: bool,
    },
    /// Gradient and flow-field computation.
    FlowField {
        /// Refinement iterations completed.
        iterations: u32,
        /// Mean coherency over all pixels.
        mean_coherency: f32,
    },
    /// Flow-aligned difference of Gaussians.
    Fdog {
        /// Pixels with a non-zero response.
        response_pixels: u64,
    },
    /// Non-maximum suppression and hysteresis.
    EdgeDetection {
        /// Low threshold as a fraction of the strongest response.
        low_threshold: f32,
        /// High threshold as a fraction of the strongest response.
        high_threshold: f32,
        /// Number of edge pixels in the output.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Turning edge pixels into polylines.
    EdgeLinking {
        /// Whether flow-guided tracing was used.
        flow_traced: bool,
        /// Number of polylines produced.
        polyline_count: usize,
        /// Total number of points across all polylines.
        total_point_count: usize,
    },
    /// Multi-pass merge.
    Multipass {
        /// Passes that ran.
        passes_run: usize,
        /// Passes that were skipped.
        passes_skipped: usize,
        /// Polylines across all passes before deduplication.
        polylines_before: usize,
        /// Polylines after deduplication.
        polylines_after: usize,
    },
    /// Binarization.
    Threshold {
        /// `otsu` or `sauvola`.
        method: String,
        /// Foreground pixels in the mask.
        foreground_pixels: u64,
    },
    /// Topological thinning.
    Thinning {
        /// Iterations completed.
        iterations: u32,
        /// Whether the fixed point was reached.
        converged: bool,
        /// Pixels remaining in the skeleton.
        skeleton_pixels: u64,
    },
    /// Skeleton graph extraction, pruning and bridging.
    SkeletonGraph {
        /// Branches before pruning.
        branches_before: usize,
        /// Branches removed by length/blob pruning.
        pruned: usize,
        /// Micro-loops removed.
        micro_loops: usize,
        /// Bridges added between endpoints.
        bridges: usize,
        /// Branches in the final graph.
        branches_after: usize,
    },
    /// SLIC clustering.
    Clustering {
        /// Requested region count.
        requested: usize,
        /// Seeds placed.
        seeds: usize,
        /// Iterations completed.
        iterations: u32,
        /// Whether assignment stopped changing before the cap.
        converged: bool,
    },
    /// Connectivity enforcement and color merging.
    RegionMerge {
        /// Regions after connectivity enforcement.
        regions_before: usize,
        /// Regions after merging.
        regions_after: usize,
    },
    /// Region boundary extraction.
    Boundaries {
        /// Number of boundary polygons.
        polygon_count: usize,
        /// Total number of points across all polygons.
        total_point_count: usize,
    },
    /// Stipple placement.
    Stipple {
        /// Candidate positions examined.
        candidates: usize,
        /// Dots placed.
        placed: usize,
    },
    /// Path simplification.
    Simplification {
        /// Algorithm name.
        algorithm: String,
        /// Tolerance in pixels (global value; per-path overrides not shown).
        tolerance: f64,
        /// Number of polylines after simplification.
        polyline_count: usize,
        /// Total points before simplification.
        points_before: usize,
        /// Total points after simplification.
        points_after: usize,
        /// Reduction ratio: `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Cubic curve fitting.
    CurveFitting {
        /// Paths converted to cubic segments.
        fitted: usize,
        /// Paths kept as polylines.
        fallbacks: usize,
        /// Total cubic segments.
        segment_count: usize,
    },
    /// Stroke stylization.
    Style {
        /// Paths stylized.
        stylized: usize,
    },
}

/// High-level summary counts for the entire conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of output paths.
    pub path_count: usize,
    /// Total vertices across all output paths.
    pub point_count: usize,
}

impl TraceDiagnostics {
    /// Look up the first stage with the given name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Trace Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        for diag in &self.stages {
            let name = &diag.stage;
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Paths: {}  |  Output points: {}",
            self.summary.path_count, self.summary.point_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Downsample {
            original_width,
            original_height,
            width,
            height,
        } => format!("{original_width}x{original_height} -> {width}x{height}"),
        StageMetrics::Preprocess {
            width,
            height,
            blur_sigma,
            denoised,
        } => format!("{width}x{height} sigma={blur_sigma:.2} denoise={denoised}"),
        StageMetrics::FlowField {
            iterations,
            mean_coherency,
        } => format!("{iterations} iterations, mean coherency {mean_coherency:.3}"),
        StageMetrics::Fdog { response_pixels } => format!("{response_pixels} responding pixels"),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.2} high={high_threshold:.2} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::EdgeLinking {
            flow_traced,
            polyline_count,
            total_point_count,
        } => {
            let mode = if *flow_traced { "flow" } else { "border" };
            format!("{mode}: {polyline_count} polylines, {total_point_count} pts")
        }
        StageMetrics::Multipass {
            passes_run,
            passes_skipped,
            polylines_before,
            polylines_after,
        } => format!(
            "{passes_run} run, {passes_skipped} skipped, polys={polylines_before}->{polylines_after}",
        ),
        StageMetrics::Threshold {
            method,
            foreground_pixels,
        } => format!("{method}: {foreground_pixels} foreground"),
        StageMetrics::Thinning {
            iterations,
            converged,
            skeleton_pixels,
        } => format!("{iterations} iterations (converged={converged}), {skeleton_pixels} px"),
        StageMetrics::SkeletonGraph {
            branches_before,
            pruned,
            micro_loops,
            bridges,
            branches_after,
        } => format!(
            "branches={branches_before}->{branches_after} pruned={pruned} loops={micro_loops} bridges={bridges}",
        ),
        StageMetrics::Clustering {
            requested,
            seeds,
            iterations,
            converged,
        } => format!("k={requested} seeds={seeds} {iterations} iterations (converged={converged})"),
        StageMetrics::RegionMerge {
            regions_before,
            regions_after,
        } => format!("regions={regions_before}->{regions_after}"),
        StageMetrics::Boundaries {
            polygon_count,
            total_point_count,
        } => format!("{polygon_count} polygons, {total_point_count} pts"),
        StageMetrics::Stipple { candidates, placed } => {
            format!("{placed} dots from {candidates} candidates")
        }
        StageMetrics::Simplification {
            algorithm,
            tolerance,
            points_before,
            points_after,
            reduction_ratio,
            ..
        } => {
            format!(
                "{algorithm} tol={tolerance:.2} {points_before}->{points_after} pts ({:.1}% reduction)",
                reduction_ratio * 100.0,
            )
        }
        StageMetrics::CurveFitting {
            fitted,
            fallbacks,
            segment_count,
        } => format!("{fitted} fitted, {fallbacks} fallbacks, {segment_count} segments"),
        StageMetrics::Style { stylized } => format!("{stylized} stylized"),
    }
}

/// Total points across a slice of polylines.
pub(crate) fn total_points(polylines: &[crate::Polyline]) -> usize {
    polylines.iter().map(crate::Polyline::len).sum()
}

/// Count set pixels in a mask.
pub(crate) fn count_foreground(mask: &crate::BinaryMask) -> u64 {
    mask.count() as u64
}
