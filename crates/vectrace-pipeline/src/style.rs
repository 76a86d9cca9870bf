//! Hand-drawn stroke stylization.
//!
//! Three effects are applied to the joints of a cubic path, in order:
//! a width envelope (sinusoidal along the arc or driven by the turning
//! angle, plus pressure noise), a perpendicular tremor, and a linear taper
//! at both ends of open paths. Moving a joint moves its two neighbouring
//! handles by the same offset, so the curve keeps its local shape.
//!
//! Every path draws from its own generator, seeded from the style seed and
//! the path's index, which makes the result independent of the order in
//! which paths are processed.

use std::f64::consts::{PI, TAU};
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::config::Validator;
use crate::types::{BezierPath, CubicSegment, Point};

/// Tremor amplitude in pixels at full strength on a 800x600 image.
const TREMOR_SCALE: f64 = 30.0;

/// Pixel count the tremor amplitude is calibrated for.
const TREMOR_REFERENCE_PIXELS: f64 = 480_000.0;

/// Width factor at the very tip of a tapered end.
const TAPER_FLOOR: f64 = 0.1;

/// Arc-length period of the sinusoidal envelope, bounded to this range.
const ENVELOPE_PERIOD: (f64, f64) = (20.0, 200.0);

/// Shape of the width envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// Width swells and thins along the arc.
    #[default]
    Sinusoidal,
    /// Width grows with the turning angle.
    Curvature,
}

/// Stroke stylization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Depth of the width envelope.
    pub variable_weights: f64,
    /// Perpendicular jitter strength.
    pub tremor_strength: f64,
    /// Fraction of the arc length tapered at each open end.
    pub tapering: f64,
    /// Random pressure noise on top of the envelope.
    pub pressure_variation: f64,
    /// Envelope shape.
    pub envelope: Envelope,
    /// Seed for tremor, pressure and envelope phase.
    pub seed: u64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self::medium()
    }
}

impl StyleConfig {
    /// Barely visible wobble.
    #[must_use]
    pub const fn subtle() -> Self {
        Self {
            variable_weights: 0.15,
            tremor_strength: 0.05,
            tapering: 0.1,
            pressure_variation: 0.2,
            envelope: Envelope::Sinusoidal,
            seed: 42,
        }
    }

    /// A confident pen.
    #[must_use]
    pub const fn medium() -> Self {
        Self {
            variable_weights: 0.3,
            tremor_strength: 0.1,
            tapering: 0.2,
            pressure_variation: 0.4,
            envelope: Envelope::Sinusoidal,
            seed: 42,
        }
    }

    /// Heavy width changes and a visible tremor.
    #[must_use]
    pub const fn strong() -> Self {
        Self {
            variable_weights: 0.5,
            tremor_strength: 0.2,
            tapering: 0.3,
            pressure_variation: 0.6,
            envelope: Envelope::Sinusoidal,
            seed: 42,
        }
    }

    /// Loose, fast sketching.
    #[must_use]
    pub const fn sketchy() -> Self {
        Self {
            variable_weights: 0.6,
            tremor_strength: 0.4,
            tapering: 0.1,
            pressure_variation: 0.8,
            envelope: Envelope::Curvature,
            seed: 42,
        }
    }

    pub(crate) fn validate(&self, v: &mut Validator) {
        v.range("style.variable_weights", self.variable_weights, 0.0, 1.0);
        v.range("style.tremor_strength", self.tremor_strength, 0.0, 1.0);
        v.range("style.tapering", self.tapering, 0.0, 1.0);
        v.range("style.pressure_variation", self.pressure_variation, 0.0, 1.0);
    }

    fn rng_for(&self, index: usize) -> StdRng {
        let mut hasher = SipHasher13::new_with_keys(self.seed, 0);
        index.hash(&mut hasher);
        StdRng::seed_from_u64(hasher.finish())
    }
}

/// Stylize `path`, the `index`-th path of an image with `pixel_count`
/// pixels. The result always carries per-joint widths.
#[must_use]
pub fn stylize(
    path: &BezierPath,
    base_width: f64,
    config: &StyleConfig,
    index: usize,
    pixel_count: usize,
) -> BezierPath {
    let joints = path.joints();
    let m = joints.len();
    if m < 2 {
        return path.clone();
    }
    let closed = path.is_closed();
    let mut rng = config.rng_for(index);

    let mut arc = Vec::with_capacity(m);
    arc.push(0.0);
    for w in joints.windows(2) {
        arc.push(arc[arc.len() - 1] + w[0].distance(w[1]));
    }
    let total = arc[m - 1];

    // Width envelope.
    let period = (total / 1.5).clamp(ENVELOPE_PERIOD.0, ENVELOPE_PERIOD.1);
    let phase = rng.gen_range(0.0..TAU);
    let base: Vec<f64> = path
        .widths()
        .map_or_else(|| vec![base_width; m], <[f64]>::to_vec);
    let mut widths: Vec<f64> = (0..m)
        .map(|i| {
            let shape = match config.envelope {
                Envelope::Sinusoidal => (TAU * arc[i] / period + phase).sin(),
                Envelope::Curvature => 2.0f64.mul_add(turn(&joints, i, closed) / PI, -1.0),
            };
            let pressure = config.pressure_variation * rng.gen_range(-0.5..0.5);
            let factor = config.variable_weights.mul_add(shape + pressure, 1.0);
            base[i] * factor.max(TAPER_FLOOR)
        })
        .collect();

    // Tremor.
    #[allow(clippy::cast_precision_loss)]
    let amplitude = config.tremor_strength
        * TREMOR_SCALE
        * (pixel_count as f64 / TREMOR_REFERENCE_PIXELS).sqrt();
    let mut offsets = vec![Point::new(0.0, 0.0); m];
    for i in 0..m {
        let draw = rng.gen_range(-1.0..=1.0);
        let fixed = if closed { i == m - 1 } else { i == 0 || i == m - 1 };
        if fixed {
            continue;
        }
        let Some(normal) = normal(&joints, i, closed) else {
            continue;
        };
        let cap = widths[i] / 2.0 + 1.0;
        let d = (amplitude * draw).clamp(-cap, cap);
        offsets[i] = Point::new(normal.x * d, normal.y * d);
    }
    if closed {
        offsets[m - 1] = offsets[0];
    }

    // Taper.
    if !closed && config.tapering > 0.0 && total > f64::EPSILON {
        let head = config.tapering;
        for (w, s) in widths.iter_mut().zip(&arc) {
            let t = s / total;
            let ramp = |x: f64| (1.0 - TAPER_FLOOR).mul_add((x / head).min(1.0), TAPER_FLOOR);
            *w *= ramp(t).min(ramp(1.0 - t));
        }
    }

    let shift = |p: Point, o: Point| Point::new(p.x + o.x, p.y + o.y);
    let segments = path
        .segments()
        .iter()
        .enumerate()
        .map(|(k, s)| {
            let (a, b) = (offsets[k], offsets[k + 1]);
            CubicSegment::new(shift(s.p0, a), shift(s.p1, a), shift(s.p2, b), shift(s.p3, b))
        })
        .collect();
    BezierPath::new(segments, closed).with_widths(widths)
}

/// Neighbours of joint `i`, wrapping around on closed paths.
fn neighbours(joints: &[Point], i: usize, closed: bool) -> Option<(Point, Point)> {
    let m = joints.len();
    let prev = match i {
        0 if closed => joints[m - 2],
        0 => return None,
        _ => joints[i - 1],
    };
    let next = if i + 1 < m {
        joints[i + 1]
    } else if closed {
        joints[1]
    } else {
        return None;
    };
    Some((prev, next))
}

fn normal(joints: &[Point], i: usize, closed: bool) -> Option<Point> {
    let (prev, next) = neighbours(joints, i, closed)?;
    let (dx, dy) = (next.x - prev.x, next.y - prev.y);
    let len = dx.hypot(dy);
    (len > f64::EPSILON).then(|| Point::new(-dy / len, dx / len))
}

/// Turning angle at joint `i` in radians; zero at open ends.
fn turn(joints: &[Point], i: usize, closed: bool) -> f64 {
    let Some((prev, next)) = neighbours(joints, i, closed) else {
        return 0.0;
    };
    let p = joints[i];
    let (ax, ay) = (p.x - prev.x, p.y - prev.y);
    let (bx, by) = (next.x - p.x, next.y - p.y);
    let (la, lb) = (ax.hypot(ay), bx.hypot(by));
    if la < f64::EPSILON || lb < f64::EPSILON {
        return 0.0;
    }
    (ax.mul_add(bx, ay * by) / (la * lb)).clamp(-1.0, 1.0).acos()
}
