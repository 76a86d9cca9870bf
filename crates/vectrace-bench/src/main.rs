//! vectrace-bench: CLI tool for tracing experiments and diagnostics.
//!
//! Runs the tracing engine on a given image file with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Comparing backends on the same image
//! - Tuning detail, simplification and curve fitting
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin vectrace-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to see per-stage log lines.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use vectrace_pipeline::{
    BackendConfig, CenterlineConfig, DotShape, DotsConfig, EdgeConfig, FitConfig, RasterImage,
    SimplifyAlgorithm, SimplifyConfig, StyleConfig, SuperpixelConfig, TraceConfig,
    TraceDiagnostics,
};

/// Raster-to-vector tracing experiments for vectrace.
///
/// Traces a given image with configurable parameters and prints
/// per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "vectrace-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Tracing backend.
    #[arg(long, value_enum, default_value_t = Backend::Edge)]
    backend: Backend,

    /// Detail level in [0, 1].
    #[arg(long, default_value_t = 0.5)]
    detail: f32,

    /// Stroke width in pixels for a 1080p image.
    #[arg(long, default_value_t = 1.2)]
    stroke_width: f32,

    /// Use flow-guided edge tracing (edge backend).
    #[arg(long)]
    flow: bool,

    /// Run the multi-pass edge schedule (edge backend).
    #[arg(long)]
    multipass: bool,

    /// Color lines with the source colors under them.
    #[arg(long)]
    preserve_colors: bool,

    /// Bilateral denoise before tracing.
    #[arg(long)]
    denoise: bool,

    /// Simplification algorithm.
    #[arg(long, value_enum, default_value_t = Simplify::Rdp)]
    simplify: Simplify,

    /// Fixed simplification tolerance in pixels (default: derived from detail).
    #[arg(long)]
    epsilon: Option<f64>,

    /// Fit cubic Bézier curves to traced lines.
    #[arg(long)]
    fit: bool,

    /// Hand-drawn style preset.
    #[arg(long, value_enum)]
    style: Option<Style>,

    /// Dot outline (dots backend).
    #[arg(long, value_enum, default_value_t = Shape::Circle)]
    dot_shape: Shape,

    /// Time budget in milliseconds.
    #[arg(long, default_value_t = 300_000)]
    max_time_ms: u64,

    /// Longest side of the working image.
    #[arg(long, default_value_t = 4096)]
    max_image_size: u32,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full trace config as a JSON string.
    ///
    /// When provided, all other tracing flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Backend selection.
#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Edge detection and linking.
    Edge,
    /// Stroke skeletons.
    Centerline,
    /// SLIC region boundaries.
    Superpixel,
    /// Stippling.
    Dots,
}

/// Simplification algorithm selection.
#[derive(Clone, Copy, ValueEnum)]
enum Simplify {
    /// Ramer-Douglas-Peucker.
    Rdp,
    /// Visvalingam-Whyatt.
    Visvalingam,
}

/// Dot outlines.
#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Circle,
    Square,
    Diamond,
    Triangle,
}

/// Hand-drawn style presets.
#[derive(Clone, Copy, ValueEnum)]
enum Style {
    /// Light weight variation, barely any tremor.
    Subtle,
    /// Balanced variation.
    Medium,
    /// Pronounced weight and taper.
    Strong,
    /// Heavy tremor, curvature-driven weight.
    Sketchy,
}

/// Build a [`TraceConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<TraceConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let backend = match cli.backend {
        Backend::Edge => {
            let mut edge = if cli.flow {
                EdgeConfig::flow_traced()
            } else {
                EdgeConfig::default()
            };
            edge.multipass.enabled = cli.multipass;
            BackendConfig::Edge(edge)
        }
        Backend::Centerline => BackendConfig::Centerline(CenterlineConfig::default()),
        Backend::Superpixel => BackendConfig::Superpixel(SuperpixelConfig::default()),
        Backend::Dots => BackendConfig::Dots(DotsConfig {
            shape: match cli.dot_shape {
                Shape::Circle => DotShape::Circle,
                Shape::Square => DotShape::Square,
                Shape::Diamond => DotShape::Diamond,
                Shape::Triangle => DotShape::Triangle,
            },
            ..DotsConfig::default()
        }),
    };

    Ok(TraceConfig {
        backend,
        detail: cli.detail,
        stroke_px_at_1080p: cli.stroke_width,
        line_preserve_colors: cli.preserve_colors,
        denoise: cli.denoise,
        max_processing_time_ms: cli.max_time_ms,
        max_image_size: cli.max_image_size,
        simplify: SimplifyConfig {
            algorithm: match cli.simplify {
                Simplify::Rdp => SimplifyAlgorithm::Rdp,
                Simplify::Visvalingam => SimplifyAlgorithm::Visvalingam,
            },
            epsilon: cli.epsilon,
        },
        fit: FitConfig {
            enabled: cli.fit,
            ..FitConfig::default()
        },
        style: cli.style.map(|s| match s {
            Style::Subtle => StyleConfig::subtle(),
            Style::Medium => StyleConfig::medium(),
            Style::Strong => StyleConfig::strong(),
            Style::Sketchy => StyleConfig::sketchy(),
        }),
        ..TraceConfig::default()
    })
}

fn load_image(path: &Path) -> Result<RasterImage, String> {
    let decoded =
        image::open(path).map_err(|e| format!("Error decoding {}: {e}", path.display()))?;
    Ok(RasterImage::new(decoded.to_rgba8()))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match load_image(&cli.image_path) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        image.width(),
        image.height(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let result = match vectrace_pipeline::process(&image, &config) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Trace error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&result.diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", result.diagnostics.report());
            for notice in &result.notices {
                println!("Notice: {notice}");
            }
            if result.partial {
                println!("Result is partial: the time budget ran out.");
            }
        }

        // Write SVG on the first run only.
        if run == 0
            && let Some(ref svg_path) = cli.svg
        {
            let title = cli
                .image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("bench");
            let desc = format!("{} backend, detail {}", result.backend, config.detail);
            let config_json = serde_json::to_string(&config).ok();
            let metadata = vectrace_export::SvgMetadata {
                title: Some(title),
                description: Some(&desc),
                config_json: config_json.as_deref(),
            };
            let svg = vectrace_export::result_to_svg(&result, &metadata);
            match std::fs::write(svg_path, &svg) {
                Ok(()) => {
                    eprintln!(
                        "SVG written to {} ({} bytes)",
                        svg_path.display(),
                        svg.len(),
                    );
                }
                Err(e) => {
                    eprintln!("Error writing SVG to {}: {e}", svg_path.display());
                }
            }
        }

        all_diagnostics.push(result.diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[TraceDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means, in order of first appearance.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let mut order: Vec<&str> = Vec::new();
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for diag in all_diagnostics {
        for stage in &diag.stages {
            let entry = totals.entry(stage.stage.as_str()).or_insert_with(|| {
                order.push(stage.stage.as_str());
                (0.0, 0)
            });
            entry.0 += stage.duration.as_secs_f64() * 1000.0;
            entry.1 += 1;
        }
    }

    for name in order {
        if let Some(&(sum, count)) = totals.get(name) {
            let stage_mean = sum / count as f64;
            println!("{name:<24} {stage_mean:>10.3}ms");
        }
    }
}
