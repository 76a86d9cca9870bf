//! The conversion driver: preprocessing, one backend, post-processing.
//!
//! [`Backend`] is implemented by every backend configuration and by
//! [`BackendConfig`], which dispatches to the selected one. Backends that
//! produce lines or regions return [`TracedPath`]s, which then go through
//! simplification, curve fitting and stylization in that order, each step
//! parallel across paths. The dots backend returns finished records.

use image::GrayImage;
use rayon::prelude::*;

use crate::budget::TraceContext;
use crate::centerline::{extract_centerlines, stroke_widths};
use crate::color::{color_from_mean, composite_over_white};
use crate::config::{
    BackendConfig, CenterlineConfig, DotsConfig, EdgeConfig, SuperpixelConfig, ThresholdMapping,
    TraceConfig,
};
use crate::diagnostics::StageMetrics;
use crate::dots::stipple;
use crate::downsample::downsample;
use crate::edge::extract_edges;
use crate::fit::fit;
use crate::multipass::run_passes;
use crate::preprocess::{denoise, grayscale};
use crate::raster::RasterImage;
use crate::simplify::simplify_with_widths;
use crate::style::stylize;
use crate::superpixel::{extract_regions, to_traced};
use crate::types::{
    BackendId, BezierPath, Color, Geometry, Paint, PathRecord, Point, Polyline,
    TracedPath,
};

/// Everything a backend sees.
pub struct BackendInput<'a> {
    /// The working image.
    pub image: &'a RasterImage,
    /// Preprocessed luminance of `image`.
    pub gray: &'a GrayImage,
    /// Thresholds derived from `detail`.
    pub mapping: ThresholdMapping,
    /// The full configuration.
    pub config: &'a TraceConfig,
    /// Stroke width for the working resolution.
    pub stroke_width: f64,
}

/// What a backend hands to post-processing.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutput {
    /// Paths still to be simplified, fitted and stylized.
    Paths(Vec<TracedPath>),
    /// Finished records.
    Records(Vec<PathRecord>),
}

/// A tracing strategy.
pub trait Backend {
    /// Identifier reported in the result.
    fn id(&self) -> BackendId;

    /// Trace the working image.
    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput;
}

impl Backend for BackendConfig {
    fn id(&self) -> BackendId {
        Self::id(self)
    }

    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput {
        match self {
            Self::Edge(edge) => edge.trace(input, ctx),
            Self::Centerline(centerline) => centerline.trace(input, ctx),
            Self::Superpixel(superpixel) => superpixel.trace(input, ctx),
            Self::Dots(dots) => dots.trace(input, ctx),
        }
    }
}

impl Backend for EdgeConfig {
    fn id(&self) -> BackendId {
        BackendId::Edge
    }

    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput {
        let polylines = if self.multipass.enabled {
            run_passes(input.gray, self, input.config.detail, ctx)
        } else {
            extract_edges(input.gray, self, &input.mapping, ctx)
        };
        BackendOutput::Paths(
            polylines
                .into_iter()
                .map(|polyline| {
                    let color = line_color(input, &polyline);
                    TracedPath::stroked(polyline, color, input.stroke_width)
                })
                .collect(),
        )
    }
}

impl Backend for CenterlineConfig {
    fn id(&self) -> BackendId {
        BackendId::Centerline
    }

    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput {
        let lines = extract_centerlines(input.gray, self, &input.mapping, ctx);
        let widths: Vec<Option<Vec<f64>>> = if self.enable_width_modulation {
            stroke_widths(&lines, input.stroke_width, self.width_modulation_range)
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; lines.len()]
        };
        BackendOutput::Paths(
            lines
                .into_iter()
                .zip(widths)
                .map(|(line, widths)| {
                    let color = line_color(input, &line.polyline);
                    TracedPath {
                        widths,
                        ..TracedPath::stroked(line.polyline, color, input.stroke_width)
                    }
                })
                .collect(),
        )
    }
}

impl Backend for SuperpixelConfig {
    fn id(&self) -> BackendId {
        BackendId::Superpixel
    }

    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput {
        let regions = extract_regions(input.image, self, ctx);
        BackendOutput::Paths(to_traced(regions, self, input.config.ink, input.stroke_width))
    }
}

impl Backend for DotsConfig {
    fn id(&self) -> BackendId {
        BackendId::Dots
    }

    fn trace(&self, input: &BackendInput<'_>, ctx: &mut TraceContext) -> BackendOutput {
        let dots = stipple(input.image, input.gray, self, input.config.ink, ctx);
        BackendOutput::Records(dots.into_iter().map(|d| d.to_record(self.shape)).collect())
    }
}

/// Trace `image` with an already validated `config`.
///
/// Output coordinates are in the space of `image`, even when tracing ran
/// on a downsampled copy.
#[must_use = "returns the traced paths"]
pub fn run(image: &RasterImage, config: &TraceConfig, ctx: &mut TraceContext) -> Vec<PathRecord> {
    let reduced = ctx.stage("downsample", |_| {
        let reduced = downsample(image, config.max_image_size);
        let working = reduced.as_ref().map_or(image, |r| &r.image);
        let metrics = StageMetrics::Downsample {
            original_width: image.width(),
            original_height: image.height(),
            width: working.width(),
            height: working.height(),
        };
        (reduced, metrics)
    });
    let (working, factor) = reduced
        .as_ref()
        .map_or((image, 1.0), |r| (&r.image, r.factor));
    let dimensions = working.dimensions();
    let mapping = ThresholdMapping::new(config.detail, dimensions);

    let gray = ctx.stage("preprocess", |_| {
        let mut gray = grayscale(working);
        if config.denoise {
            gray = denoise(&gray);
        }
        let metrics = StageMetrics::Preprocess {
            width: gray.width(),
            height: gray.height(),
            blur_sigma: config.backend.blur_sigma(&mapping),
            denoised: config.denoise,
        };
        (gray, metrics)
    });

    let input = BackendInput {
        image: working,
        gray: &gray,
        mapping,
        config,
        stroke_width: config.stroke_width(dimensions),
    };
    let records = match config.backend.trace(&input, ctx) {
        BackendOutput::Paths(paths) => post_process(paths, &input, ctx),
        BackendOutput::Records(records) => records,
    };

    if (factor - 1.0).abs() > f64::EPSILON {
        records
            .into_iter()
            .map(|r| PathRecord::new(r.geometry.scaled(factor), scale_paint(r.paint, factor)))
            .collect()
    } else {
        records
    }
}

fn scale_paint(paint: Paint, factor: f64) -> Paint {
    match paint {
        Paint::Stroke { color, width } => Paint::Stroke {
            color,
            width: width * factor,
        },
        fill @ Paint::Fill(_) => fill,
    }
}

/// Mean source color under `polyline`, or the ink color.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn line_color(input: &BackendInput<'_>, polyline: &Polyline) -> Color {
    if !input.config.line_preserve_colors || polyline.is_empty() {
        return input.config.ink;
    }
    let (w, h) = (input.image.width(), input.image.height());
    let mut sum = [0.0f64; 3];
    for p in polyline.points() {
        let x = (p.x.round().max(0.0) as u32).min(w - 1);
        let y = (p.y.round().max(0.0) as u32).min(h - 1);
        let rgb = composite_over_white(input.image.pixel(x, y));
        for (s, c) in sum.iter_mut().zip(rgb) {
            *s += f64::from(c);
        }
    }
    let n = polyline.len() as f64;
    color_from_mean(sum.map(|s| s / n))
}

/// One path between post-processing steps.
struct Shaped {
    geometry: Geometry,
    paint: Paint,
}

fn post_process(
    paths: Vec<TracedPath>,
    input: &BackendInput<'_>,
    ctx: &mut TraceContext,
) -> Vec<PathRecord> {
    let config = input.config;
    let tolerance = config.simplify.epsilon.unwrap_or(input.mapping.dp_epsilon);
    let algorithm = config.simplify.algorithm;

    let simplified: Vec<TracedPath> = ctx.stage("simplification", |_| {
        let points_before: usize = paths.iter().map(|p| p.polyline.len()).sum();
        let simplified: Vec<TracedPath> = paths
            .into_par_iter()
            .filter_map(|path| {
                let epsilon = path.simplify_epsilon.unwrap_or(tolerance);
                let (polyline, widths) =
                    simplify_with_widths(&path.polyline, path.widths.as_deref(), algorithm, epsilon);
                (polyline.len() >= 2).then_some(TracedPath {
                    polyline,
                    widths,
                    ..path
                })
            })
            .collect();
        let points_after: usize = simplified.iter().map(|p| p.polyline.len()).sum();
        #[allow(clippy::cast_precision_loss)]
        let reduction_ratio = if points_before == 0 {
            0.0
        } else {
            1.0 - points_after as f64 / points_before as f64
        };
        let metrics = StageMetrics::Simplification {
            algorithm: algorithm.name().to_string(),
            tolerance,
            polyline_count: simplified.len(),
            points_before,
            points_after,
            reduction_ratio,
        };
        (simplified, metrics)
    });

    let mut shaped: Vec<Shaped> = if config.fit.enabled {
        ctx.stage("curve fitting", |_| {
            let shaped: Vec<(Shaped, bool)> = simplified
                .into_par_iter()
                .map(|path| match fit(&path.polyline, &config.fit) {
                    Some(outcome) => {
                        let bezier = match &path.widths {
                            Some(widths) => {
                                let joint_widths = outcome.joint_widths(widths);
                                outcome.path.with_widths(joint_widths)
                            }
                            None => outcome.path,
                        };
                        let shaped = Shaped {
                            geometry: Geometry::Bezier(bezier),
                            paint: path.paint,
                        };
                        (shaped, true)
                    }
                    None => (plain(path), false),
                })
                .collect();
            let fitted = shaped.iter().filter(|(_, f)| *f).count();
            let segment_count = shaped
                .iter()
                .map(|(s, _)| match &s.geometry {
                    Geometry::Bezier(b) => b.len(),
                    _ => 0,
                })
                .sum();
            let metrics = StageMetrics::CurveFitting {
                fitted,
                fallbacks: shaped.len() - fitted,
                segment_count,
            };
            (shaped.into_iter().map(|(s, _)| s).collect(), metrics)
        })
    } else {
        simplified.into_iter().map(plain).collect()
    };

    if let Some(style) = &config.style {
        let pixel_count = input.image.dimensions().pixel_count();
        shaped = ctx.stage("style", |_| {
            let styled: Vec<(Shaped, bool)> = shaped
                .into_par_iter()
                .enumerate()
                .map(|(index, s)| {
                    let Paint::Stroke { width, .. } = s.paint else {
                        return (s, false);
                    };
                    let bezier = match &s.geometry {
                        Geometry::Bezier(b) => Some(b.clone()),
                        Geometry::Polyline(p) => BezierPath::from_polyline(p),
                        Geometry::Circle { .. } => None,
                    };
                    match bezier {
                        Some(b) => {
                            let styled = stylize(&b, width, style, index, pixel_count);
                            let shaped = Shaped {
                                geometry: Geometry::Bezier(styled),
                                paint: s.paint,
                            };
                            (shaped, true)
                        }
                        None => (s, false),
                    }
                })
                .collect();
            let stylized = styled.iter().filter(|(_, done)| *done).count();
            let metrics = StageMetrics::Style { stylized };
            (styled.into_iter().map(|(s, _)| s).collect(), metrics)
        });
    }

    shaped
        .into_iter()
        .map(|s| PathRecord::new(s.geometry, s.paint))
        .collect()
}

/// A path that is not fitted keeps its polyline, unless it carries
/// per-point widths, which only cubic paths can hold.
fn plain(path: TracedPath) -> Shaped {
    let geometry = match path.widths {
        Some(mut widths) => match BezierPath::from_polyline(&path.polyline) {
            Some(bezier) => {
                if path.polyline.is_closed() {
                    widths.push(widths.first().copied().unwrap_or(1.0));
                }
                Geometry::Bezier(bezier.with_widths(widths))
            }
            None => Geometry::Polyline(path.polyline),
        },
        None => Geometry::Polyline(path.polyline),
    };
    Shaped {
        geometry,
        paint: path.paint,
    }
}

/// Coordinates of every vertex, for summaries.
#[must_use]
pub fn vertex_count(records: &[PathRecord]) -> usize {
    records.iter().map(|r| r.geometry.point_count()).sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::config::FitConfig;
    use crate::style::StyleConfig;

    fn square_image(size: u32, color: [u8; 4]) -> RasterImage {
        let lo = size * 3 / 10;
        let hi = size * 7 / 10;
        RasterImage::new(RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgba(color)
            } else {
                Rgba([255, 255, 255, 255])
            }
        }))
    }

    fn stage_names(ctx: TraceContext) -> Vec<String> {
        let (_, stages, _) = ctx.finish();
        stages.into_iter().map(|s| s.stage).collect()
    }

    #[test]
    fn edge_run_records_its_stages() {
        let image = square_image(100, [0, 0, 0, 255]);
        let mut ctx = TraceContext::unlimited();
        let records = run(&image, &TraceConfig::default(), &mut ctx);
        assert!(!records.is_empty());
        let names = stage_names(ctx);
        assert_eq!(names[0], "downsample");
        assert_eq!(names[1], "preprocess");
        assert_eq!(names.last().map(String::as_str), Some("simplification"));
    }

    #[test]
    fn preprocess_reports_the_backend_blur() {
        let image = square_image(100, [0, 0, 0, 255]);
        let config = TraceConfig {
            detail: 1.0,
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let _ = run(&image, &config, &mut ctx);
        let (_, stages, _) = ctx.finish();
        let Some(StageMetrics::Preprocess { blur_sigma, .. }) = stages
            .iter()
            .find(|s| s.stage == "preprocess")
            .map(|s| &s.metrics)
        else {
            unreachable!("preprocess stage is always recorded");
        };
        assert!((blur_sigma - 1.0).abs() < 1e-6, "sigma {blur_sigma}");
    }

    #[test]
    fn downsampled_output_is_in_source_coordinates() {
        let image = square_image(200, [0, 0, 0, 255]);
        let config = TraceConfig {
            max_image_size: 100,
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let records = run(&image, &config, &mut ctx);
        assert!(!records.is_empty());
        let mut max = 0.0f64;
        for r in &records {
            if let Geometry::Polyline(p) = &r.geometry {
                for q in p.points() {
                    max = max.max(q.x).max(q.y);
                }
            }
        }
        assert!(max > 120.0, "max coordinate {max}");
    }

    #[test]
    fn line_colors_come_from_the_source() {
        let image = square_image(100, [200, 0, 0, 255]);
        let config = TraceConfig {
            line_preserve_colors: true,
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let records = run(&image, &config, &mut ctx);
        assert!(!records.is_empty());
        let colors: Vec<Color> = records.iter().map(|r| r.paint.color()).collect();
        assert!(colors.iter().all(|c| c.r >= c.g && c.g == c.b), "{colors:?}");
        assert!(colors.iter().any(|c| c.r > c.g), "{colors:?}");
    }

    #[test]
    fn fitting_and_style_produce_variable_width_curves() {
        let image = square_image(100, [0, 0, 0, 255]);
        let config = TraceConfig {
            fit: FitConfig {
                enabled: true,
                ..FitConfig::default()
            },
            style: Some(StyleConfig::medium()),
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let records = run(&image, &config, &mut ctx);
        assert!(!records.is_empty());
        for r in &records {
            let Geometry::Bezier(b) = &r.geometry else {
                unreachable!("styled strokes are cubic paths");
            };
            assert!(!b.is_empty());
            assert_eq!(b.widths().map(<[f64]>::len), Some(b.len() + 1));
        }
        let names = stage_names(ctx);
        assert!(names.iter().any(|n| n == "curve fitting"));
        assert!(names.iter().any(|n| n == "style"));
    }

    #[test]
    fn dots_skip_post_processing() {
        let image = square_image(60, [0, 0, 0, 255]);
        let config = TraceConfig::for_backend(BackendConfig::Dots(DotsConfig::default()));
        let mut ctx = TraceContext::unlimited();
        let records = run(&image, &config, &mut ctx);
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| matches!(r.geometry, Geometry::Circle { .. })));
        assert!(!stage_names(ctx).iter().any(|n| n == "simplification"));
    }

    #[test]
    fn widths_without_fitting_become_cubic_paths() {
        let path = TracedPath {
            widths: Some(vec![1.0, 2.0, 3.0]),
            ..TracedPath::stroked(
                Polyline::closed(vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)]),
                Color::BLACK,
                1.0,
            )
        };
        let Geometry::Bezier(b) = plain(path).geometry else {
            unreachable!("widths need a cubic path");
        };
        assert_eq!(b.widths(), Some(&[1.0, 2.0, 3.0, 1.0][..]));
    }
}
