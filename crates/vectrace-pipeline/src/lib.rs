//! vectrace-pipeline: raster-to-vector tracing engine (sans-IO).
//!
//! Converts an in-memory RGBA raster into vector paths through one of
//! four backends:
//!
//! - **edge**: Canny or flow-guided edge tracing, optionally multi-pass
//! - **centerline**: skeletons of dark strokes, optionally variable width
//! - **superpixel**: SLIC regions, filled or outlined
//! - **dots**: stippling with tone-driven dot sizes
//!
//! Line and region output is simplified, optionally fitted with cubic
//! Bézier curves and optionally stylized as hand-drawn strokes. Every
//! stage reports timings and metrics; a time budget cuts refinement short
//! and marks the result partial instead of failing.
//!
//! This crate has **no I/O dependencies**. Decoding files and writing
//! SVG live in `vectrace-bench` and `vectrace-export`.

pub mod budget;
pub mod centerline;
pub mod color;
pub mod config;
pub mod contour;
pub mod diagnostics;
pub mod distance;
pub mod dots;
pub mod downsample;
pub mod edge;
pub mod fdog;
pub mod fit;
pub mod flow;
pub mod flow_trace;
pub mod gradient;
pub mod multipass;
pub mod nms;
pub mod pipeline;
pub mod preprocess;
pub mod raster;
pub mod simplify;
pub mod skeleton;
pub mod slic;
pub mod style;
pub mod superpixel;
pub mod thinning;
pub mod types;

pub use budget::{TimeBudget, TraceContext};
pub use config::{
    BackendConfig, CenterlineConfig, DotsConfig, EdgeConfig, FitConfig, MultipassConfig,
    SimplifyConfig, SuperpixelConfig, TraceConfig,
};
pub use diagnostics::{StageDiagnostics, StageMetrics, TraceDiagnostics, TraceSummary};
pub use dots::DotShape;
pub use pipeline::{Backend, BackendOutput};
pub use raster::{BinaryMask, RasterImage};
pub use simplify::SimplifyAlgorithm;
pub use style::StyleConfig;
pub use types::{
    BackendId, BezierPath, Color, ConfigErrors, ConfigViolation, CubicSegment, Dimensions,
    Geometry, Paint, PathRecord, Point, Polyline, TraceError, TraceNotice, TraceResult,
};

/// Trace `image` into vector paths.
///
/// The configuration is validated first and every violation is reported
/// together. Past that point nothing is fatal: degenerate images yield an
/// empty result with a [`TraceNotice::DegenerateInput`], and an exhausted
/// time budget yields whatever was traced so far with `partial` set.
///
/// # Errors
///
/// Returns [`TraceError::InvalidConfig`] if `config` fails validation.
pub fn process(image: &RasterImage, config: &TraceConfig) -> Result<TraceResult, TraceError> {
    config.validate()?;
    let mut ctx = TraceContext::new(TimeBudget::new(config.max_processing_time_ms));
    let dimensions = image.dimensions();

    let paths = match preprocess::degeneracy(image) {
        Some(reason) => {
            ctx.notice(TraceNotice::DegenerateInput { reason });
            Vec::new()
        }
        None => pipeline::run(image, config, &mut ctx),
    };

    let elapsed = ctx.budget().elapsed();
    let (notices, stages, partial) = ctx.finish();
    let summary = TraceSummary {
        image_width: dimensions.width,
        image_height: dimensions.height,
        pixel_count: u64::from(dimensions.width) * u64::from(dimensions.height),
        path_count: paths.len(),
        point_count: pipeline::vertex_count(&paths),
    };
    log::info!(
        "{} backend: {} paths, {} points in {:.1}ms{}",
        config.backend.id(),
        summary.path_count,
        summary.point_count,
        diagnostics::duration_ms(elapsed),
        if partial { " (partial)" } else { "" },
    );

    Ok(TraceResult {
        path_count: paths.len(),
        paths,
        backend: config.backend.id(),
        elapsed,
        partial,
        notices,
        dimensions,
        diagnostics: TraceDiagnostics {
            stages,
            total_duration: elapsed,
            summary,
        },
    })
}
