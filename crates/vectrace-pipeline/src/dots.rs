//! Dots backend: stippling.
//!
//! Every pixel gets a strength in `[0, 1]` built from its color contrast
//! against the background, the local luminance deviation and the Sobel
//! gradient. Candidate positions come from a regular grid or a blue-noise
//! sampler; candidates are visited strongest first and a dot is placed
//! when the strength exceeds `density_threshold` and no stronger dot sits
//! closer than `spacing_factor` times the larger of the two radii.
//!
//! The background color is the per-channel median of the border pixels in
//! Lab. Pixels within `background_tolerance * 100` ΔE of it never get a
//! dot.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::budget::TraceContext;
use crate::color::{Lab, composite_over_white};
use crate::config::DotsConfig;
use crate::diagnostics::StageMetrics;
use crate::gradient::sobel;
use crate::preprocess::WindowStats;
use crate::raster::{BinaryMask, RasterImage, ScalarField};
use crate::types::{Color, Geometry, Paint, PathRecord, Point, Polyline};

/// Half-width of the luminance deviation window.
const DEVIATION_RADIUS: u32 = 2;

/// Opacity of the faintest dot; the strongest dots are opaque.
const MIN_OPACITY: f64 = 0.3;

/// Dart attempts per active sample in blue-noise sampling.
const POISSON_ATTEMPTS: usize = 30;

/// Candidates placed between budget checks.
const BUDGET_STRIDE: usize = 1024;

/// Outline of a stipple dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DotShape {
    /// Disc of the dot's radius.
    #[default]
    Circle,
    /// Axis-aligned square with half-side equal to the radius.
    Square,
    /// Square rotated by 45 degrees, corners at the radius.
    Diamond,
    /// Upward equilateral triangle with circumradius equal to the radius.
    Triangle,
}

/// One stipple dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    /// Centre in pixel coordinates.
    pub center: Point,
    /// Radius in pixels.
    pub radius: f64,
    /// Fill color; alpha carries the dot's opacity.
    pub color: Color,
}

impl Dot {
    /// The dot as a filled record: a circle, or a closed polygon for the
    /// other shapes.
    #[must_use]
    pub fn to_record(self, shape: DotShape) -> PathRecord {
        let Point { x, y } = self.center;
        let r = self.radius;
        let corners = match shape {
            DotShape::Circle => {
                return PathRecord::new(
                    Geometry::Circle {
                        center: self.center,
                        radius: r,
                    },
                    Paint::Fill(self.color),
                );
            }
            DotShape::Square => vec![
                Point::new(x - r, y - r),
                Point::new(x + r, y - r),
                Point::new(x + r, y + r),
                Point::new(x - r, y + r),
            ],
            DotShape::Diamond => vec![
                Point::new(x, y - r),
                Point::new(x + r, y),
                Point::new(x, y + r),
                Point::new(x - r, y),
            ],
            DotShape::Triangle => {
                let half_base = r * 3.0f64.sqrt() / 2.0;
                vec![
                    Point::new(x, y - r),
                    Point::new(x + half_base, y + r / 2.0),
                    Point::new(x - half_base, y + r / 2.0),
                ]
            }
        };
        PathRecord::new(
            Geometry::Polyline(Polyline::closed(corners)),
            Paint::Fill(self.color),
        )
    }
}

struct Candidate {
    center: Point,
    radius: f64,
    strength: f32,
    pixel: (u32, u32),
}

/// Place stipple dots for `image`. `gray` is the preprocessed luminance.
#[must_use = "returns the dots"]
pub fn stipple(
    image: &RasterImage,
    gray: &GrayImage,
    config: &DotsConfig,
    ink: Color,
    ctx: &mut TraceContext,
) -> Vec<Dot> {
    ctx.stage("stipple", |ctx| {
        let background = background_color(image);
        let tolerance = config.background_tolerance * 100.0;
        let lab = image.lab();
        let (w, h) = (image.width(), image.height());
        let is_background = BinaryMask::par_from_rows(w, h, |y, row| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = lab[y as usize * w as usize + x].distance(background) <= tolerance;
            }
        });
        let strength = strength_field(image, gray, config, background);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let spacing = (2.0 * config.min_radius * config.spacing_factor).max(1.0);
        let positions = if config.poisson_disk_sampling {
            poisson_positions(w, h, spacing, &mut rng)
        } else {
            grid_positions(w, h, spacing)
        };
        let examined = positions.len();

        let mut candidates: Vec<Candidate> = positions
            .into_iter()
            .filter_map(|center| {
                let pixel = pixel_of(center, w, h);
                let s = strength.get(pixel.0, pixel.1);
                (!is_background.get(pixel.0, pixel.1) && s > config.density_threshold).then_some(
                    Candidate {
                        center,
                        radius: 0.0,
                        strength: s,
                        pixel,
                    },
                )
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then(a.pixel.1.cmp(&b.pixel.1))
                .then(a.pixel.0.cmp(&b.pixel.0))
        });
        for c in &mut candidates {
            c.radius = dot_radius(c.strength, config, &mut rng);
        }

        let mut placed: RTree<GeomWithData<[f64; 2], f64>> = RTree::new();
        let mut dots = Vec::new();
        let reach = config.spacing_factor * config.max_radius;
        for (i, c) in candidates.iter().enumerate() {
            if i % BUDGET_STRIDE == 0 && i > 0 && ctx.is_exhausted() {
                ctx.timeout("stipple");
                break;
            }
            let p = [c.center.x, c.center.y];
            let crowded = placed.locate_within_distance(p, reach * reach).any(|other| {
                let [ox, oy] = *other.geom();
                let min = config.spacing_factor * c.radius.max(other.data);
                (ox - p[0]).hypot(oy - p[1]) < min
            });
            if crowded {
                continue;
            }
            placed.insert(GeomWithData::new(p, c.radius));
            dots.push(Dot {
                center: c.center,
                radius: c.radius,
                color: dot_color(image, c, config, ink),
            });
        }

        let metrics = StageMetrics::Stipple {
            candidates: examined,
            placed: dots.len(),
        };
        (dots, metrics)
    })
}

/// Per-channel median Lab color of the image border.
#[must_use]
pub fn background_color(image: &RasterImage) -> Lab {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let lab = image.lab();
    if lab.is_empty() {
        return Lab::new(100.0, 0.0, 0.0);
    }
    let border: Vec<Lab> = (0..lab.len())
        .filter(|i| {
            let (x, y) = (i % w, i / w);
            x == 0 || y == 0 || x + 1 == w || y + 1 == h
        })
        .map(|i| lab[i])
        .collect();
    let median = |channel: fn(&Lab) -> f32| {
        let mut values: Vec<f32> = border.iter().map(channel).collect();
        values.sort_by(f32::total_cmp);
        values[values.len() / 2]
    };
    Lab::new(median(|c| c.l), median(|c| c.a), median(|c| c.b))
}

/// Strength in `[0, 1]` at every pixel.
///
/// Tone is the ΔE to the background over 100. Adaptive sizing blends tone
/// with the local luminance deviation, gradient sizing leans on the Sobel
/// magnitude, otherwise tone alone is used.
fn strength_field(image: &RasterImage, gray: &GrayImage, config: &DotsConfig, background: Lab) -> ScalarField {
    let (w, h) = (image.width(), image.height());
    let lab = image.lab();
    let tone = ScalarField::par_from_rows(w, h, |y, row| {
        for (x, out) in row.iter_mut().enumerate() {
            *out = (lab[y as usize * w as usize + x].distance(background) / 100.0).min(1.0);
        }
    });
    if config.gradient_based_sizing {
        let gradient = sobel(&ScalarField::from_gray(gray)).magnitude.normalized();
        blend(&gradient, &tone, 0.7)
    } else if config.adaptive_sizing {
        let deviation = local_deviation(gray).normalized();
        blend(&deviation, &tone, 0.5)
    } else {
        tone
    }
}

fn blend(detail: &ScalarField, tone: &ScalarField, weight: f32) -> ScalarField {
    let data = detail
        .data()
        .iter()
        .zip(tone.data())
        .map(|(d, t)| weight.mul_add(*d, (1.0 - weight) * t).clamp(0.0, 1.0))
        .collect();
    ScalarField::from_vec(detail.width(), detail.height(), data)
        .unwrap_or_else(|| ScalarField::new(detail.width(), detail.height()))
}

/// Standard deviation of luminance in a square window around each pixel.
fn local_deviation(gray: &GrayImage) -> ScalarField {
    if gray.width() == 0 || gray.height() == 0 {
        return ScalarField::new(gray.width(), gray.height());
    }
    let stats = WindowStats::new(gray);
    ScalarField::par_from_rows(gray.width(), gray.height(), |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            #[allow(clippy::cast_possible_truncation)]
            let deviation = stats.mean_deviation(x, y, DEVIATION_RADIUS).1 as f32;
            *out = deviation;
        }
    })
}

fn dot_radius(strength: f32, config: &DotsConfig, rng: &mut StdRng) -> f64 {
    let (lo, hi) = (config.min_radius, config.max_radius);
    let base = if config.adaptive_sizing || config.gradient_based_sizing {
        (hi - lo).mul_add(f64::from(strength), lo)
    } else {
        (lo + hi) / 2.0
    };
    let jitter = config.size_variation * rng.gen_range(-0.5..0.5);
    (base * (1.0 + jitter)).clamp(lo, hi)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dot_color(image: &RasterImage, candidate: &Candidate, config: &DotsConfig, ink: Color) -> Color {
    let opacity = (1.0 - MIN_OPACITY).mul_add(f64::from(candidate.strength), MIN_OPACITY);
    let base = if config.preserve_colors {
        let [r, g, b] = composite_over_white(image.pixel(candidate.pixel.0, candidate.pixel.1));
        Color::opaque(r, g, b)
    } else {
        ink
    };
    let alpha = (f64::from(base.a) * opacity).round().clamp(0.0, 255.0) as u8;
    Color::new(base.r, base.g, base.b, alpha)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_of(p: Point, w: u32, h: u32) -> (u32, u32) {
    let x = (p.x.floor().max(0.0) as u32).min(w.saturating_sub(1));
    let y = (p.y.floor().max(0.0) as u32).min(h.saturating_sub(1));
    (x, y)
}

#[allow(clippy::cast_precision_loss)]
fn grid_positions(w: u32, h: u32, spacing: f64) -> Vec<Point> {
    let mut points = Vec::new();
    let mut row = 0usize;
    loop {
        let y = (row as f64 + 0.5) * spacing;
        if y >= f64::from(h) {
            break;
        }
        let mut col = 0usize;
        loop {
            let x = (col as f64 + 0.5) * spacing;
            if x >= f64::from(w) {
                break;
            }
            points.push(Point::new(x, y));
            col += 1;
        }
        row += 1;
    }
    points
}

/// Bridson blue-noise sampling with minimum distance `spacing`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn poisson_positions(w: u32, h: u32, spacing: f64, rng: &mut StdRng) -> Vec<Point> {
    let (fw, fh) = (f64::from(w), f64::from(h));
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let cell = spacing / std::f64::consts::SQRT_2;
    let cols = (fw / cell).ceil() as usize;
    let rows = (fh / cell).ceil() as usize;
    let mut grid: Vec<Option<usize>> = vec![None; cols * rows];
    let cell_of = |p: Point| {
        (
            ((p.x / cell) as usize).min(cols - 1),
            ((p.y / cell) as usize).min(rows - 1),
        )
    };

    let first = Point::new(rng.gen_range(0.0..fw), rng.gen_range(0.0..fh));
    let mut points = vec![first];
    let (cx, cy) = cell_of(first);
    grid[cy * cols + cx] = Some(0);
    let mut active = vec![0usize];

    while !active.is_empty() {
        let slot = rng.gen_range(0..active.len());
        let origin = points[active[slot]];
        let mut found = false;
        for _ in 0..POISSON_ATTEMPTS {
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let dist = rng.gen_range(spacing..2.0 * spacing);
            let p = Point::new(
                dist.mul_add(angle.cos(), origin.x),
                dist.mul_add(angle.sin(), origin.y),
            );
            if p.x < 0.0 || p.y < 0.0 || p.x >= fw || p.y >= fh {
                continue;
            }
            let (gx, gy) = cell_of(p);
            let near = (gy.saturating_sub(2)..=(gy + 2).min(rows - 1)).any(|ny| {
                (gx.saturating_sub(2)..=(gx + 2).min(cols - 1)).any(|nx| {
                    grid[ny * cols + nx].is_some_and(|j| points[j].distance(p) < spacing)
                })
            });
            if !near {
                grid[gy * cols + gx] = Some(points.len());
                active.push(points.len());
                points.push(p);
                found = true;
                break;
            }
        }
        if !found {
            active.swap_remove(slot);
        }
    }
    points
}
