//! Cubic Bezier fitting.
//!
//! A polyline is first cut at hard corners, vertices whose turning angle
//! exceeds `split_angle_deg`. Each piece is fitted with one cubic by least
//! squares against chord-length parameters (Schneider's method), with an
//! optional penalty pulling both handle lengths towards a third of the
//! chord. A fit whose worst point misses by more than `max_error` is first
//! reparameterized with Newton steps, then split at that point and both
//! halves refitted. Once the split allowance is spent, the piece falls back
//! to straight segments through its points, so the error bound always
//! holds.

use crate::config::FitConfig;
use crate::types::{BezierPath, CubicSegment, Point, Polyline};

/// Newton reparameterization rounds before a piece is split.
const REPARAMETERIZE_ROUNDS: usize = 4;

/// Reparameterize only when the error is within this multiple of the bound.
const REPARAMETERIZE_SLACK: f64 = 4.0;

/// A fitted path plus the polyline index at every joint.
///
/// `joints[k]` is the index of the point where segment `k` starts; the
/// last entry is where the final segment ends. For closed paths that last
/// index equals the point count, i.e. the start point again.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// The fitted cubic path.
    pub path: BezierPath,
    /// Polyline indices of the joints.
    pub joints: Vec<usize>,
}

impl FitOutcome {
    /// Per-joint widths picked from per-point `widths`.
    #[must_use]
    pub fn joint_widths(&self, widths: &[f64]) -> Vec<f64> {
        self.joints
            .iter()
            .map(|&i| widths.get(i).or_else(|| widths.first()).copied().unwrap_or(1.0))
            .collect()
    }
}

/// Fit `polyline` with cubic segments.
///
/// Returns `None` for polylines with fewer than four points; callers keep
/// those as they are.
#[must_use]
pub fn fit(polyline: &Polyline, config: &FitConfig) -> Option<FitOutcome> {
    if polyline.len() < 4 {
        return None;
    }
    let closed = polyline.is_closed();
    let mut points = polyline.points().to_vec();
    if closed {
        points.push(points[0]);
    }
    let n = points.len();
    let limit = config.split_angle_deg.to_radians();

    let mut corners: Vec<usize> = (1..n - 1)
        .filter(|&i| turning_angle(points[i - 1], points[i], points[i + 1]) > limit)
        .collect();
    corners.insert(0, 0);
    corners.push(n - 1);

    let start_is_corner = !closed || turning_angle(points[n - 2], points[0], points[1]) > limit;
    let wrap = unit(sub(points[1], points[n - 2]));

    let mut fitter = Fitter {
        points: &points,
        max_error: config.max_error,
        penalty: config.curvature_penalty,
        splits_left: config.max_iterations,
        segments: Vec::new(),
        joints: vec![0],
    };
    for pair in corners.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let mut t1 = unit(sub(points[lo + 1], points[lo]));
        let mut t2 = unit(sub(points[hi - 1], points[hi]));
        if !start_is_corner {
            if lo == 0 {
                t1 = wrap.or(t1);
            }
            if hi == n - 1 {
                t2 = wrap.map(|t| scale(t, -1.0)).or(t2);
            }
        }
        fitter.fit_piece(lo, hi, t1, t2);
    }

    Some(FitOutcome {
        path: BezierPath::new(fitter.segments, closed),
        joints: fitter.joints,
    })
}

struct Fitter<'a> {
    points: &'a [Point],
    max_error: f64,
    penalty: f64,
    splits_left: u32,
    segments: Vec<CubicSegment>,
    joints: Vec<usize>,
}

impl Fitter<'_> {
    fn fit_piece(&mut self, lo: usize, hi: usize, t1: Option<Point>, t2: Option<Point>) {
        let pts = &self.points[lo..=hi];
        if pts.len() == 2 {
            self.push(CubicSegment::line(pts[0], pts[1]), hi);
            return;
        }
        let (Some(t1), Some(t2)) = (t1, t2) else {
            self.fall_back(lo, hi);
            return;
        };

        let mut u = chord_parameters(pts);
        let mut curve = least_squares(pts, &u, t1, t2, self.penalty);
        let (mut error, mut worst) = max_error(pts, &u, &curve);
        if error <= self.max_error {
            self.push(curve, hi);
            return;
        }
        if error < self.max_error * REPARAMETERIZE_SLACK {
            for _ in 0..REPARAMETERIZE_ROUNDS {
                u = reparameterize(pts, &u, &curve);
                curve = least_squares(pts, &u, t1, t2, self.penalty);
                (error, worst) = max_error(pts, &u, &curve);
                if error <= self.max_error {
                    self.push(curve, hi);
                    return;
                }
            }
        }

        if self.splits_left == 0 {
            self.fall_back(lo, hi);
            return;
        }
        self.splits_left -= 1;
        let split = lo + worst.clamp(1, pts.len() - 2);
        let center = unit(sub(self.points[split - 1], self.points[split + 1]));
        self.fit_piece(lo, split, Some(t1), center);
        self.fit_piece(split, hi, center.map(|c| scale(c, -1.0)), Some(t2));
    }

    fn fall_back(&mut self, lo: usize, hi: usize) {
        for i in lo..hi {
            self.push(CubicSegment::line(self.points[i], self.points[i + 1]), i + 1);
        }
    }

    fn push(&mut self, segment: CubicSegment, end: usize) {
        self.segments.push(segment);
        self.joints.push(end);
    }
}

fn sub(a: Point, b: Point) -> Point {
    Point::new(a.x - b.x, a.y - b.y)
}

fn add(a: Point, b: Point) -> Point {
    Point::new(a.x + b.x, a.y + b.y)
}

fn scale(a: Point, s: f64) -> Point {
    Point::new(a.x * s, a.y * s)
}

fn dot(a: Point, b: Point) -> f64 {
    a.x.mul_add(b.x, a.y * b.y)
}

fn unit(a: Point) -> Option<Point> {
    let len = a.x.hypot(a.y);
    (len > f64::EPSILON).then(|| scale(a, 1.0 / len))
}

/// Angle between the incoming and outgoing directions at `b`, in radians.
fn turning_angle(a: Point, b: Point, c: Point) -> f64 {
    let (Some(d1), Some(d2)) = (unit(sub(b, a)), unit(sub(c, b))) else {
        return 0.0;
    };
    dot(d1, d2).clamp(-1.0, 1.0).acos()
}

fn chord_parameters(pts: &[Point]) -> Vec<f64> {
    let mut u = Vec::with_capacity(pts.len());
    let mut total = 0.0;
    u.push(0.0);
    for w in pts.windows(2) {
        total += w[0].distance(w[1]);
        u.push(total);
    }
    if total > f64::EPSILON {
        for v in &mut u {
            *v /= total;
        }
    }
    u
}

fn bernstein(t: f64) -> [f64; 4] {
    let mt = 1.0 - t;
    [mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t]
}

/// Least-squares handle lengths along the fixed end tangents.
fn least_squares(pts: &[Point], u: &[f64], t1: Point, t2: Point, penalty: f64) -> CubicSegment {
    let first = pts[0];
    let last = pts[pts.len() - 1];
    let (mut c00, mut c01, mut c11, mut x0, mut x1) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (p, &t) in pts.iter().zip(u) {
        let [b0, b1, b2, b3] = bernstein(t);
        let a1 = scale(t1, b1);
        let a2 = scale(t2, b2);
        c00 += dot(a1, a1);
        c01 += dot(a1, a2);
        c11 += dot(a2, a2);
        let base = add(scale(first, b0 + b1), scale(last, b2 + b3));
        let rest = sub(*p, base);
        x0 += dot(a1, rest);
        x1 += dot(a2, rest);
    }

    let chord = first.distance(last);
    let target = chord / 3.0;
    let lambda = penalty * (c00 + c11) / 2.0;
    c00 += lambda;
    c11 += lambda;
    x0 += lambda * target;
    x1 += lambda * target;

    let det = c00.mul_add(c11, -c01 * c01);
    let (mut alpha1, mut alpha2) = if det.abs() > 1e-12 {
        (
            x0.mul_add(c11, -x1 * c01) / det,
            c00.mul_add(x1, -c01 * x0) / det,
        )
    } else {
        (target, target)
    };
    let floor = 1e-6 * chord;
    if alpha1 < floor || alpha2 < floor {
        alpha1 = target;
        alpha2 = target;
    }
    CubicSegment::new(
        first,
        add(first, scale(t1, alpha1)),
        add(last, scale(t2, alpha2)),
        last,
    )
}

/// Largest distance between a point and the curve at its parameter, and
/// the index of that point.
fn max_error(pts: &[Point], u: &[f64], curve: &CubicSegment) -> (f64, usize) {
    let mut worst = (0.0, pts.len() / 2);
    for (i, (p, &t)) in pts.iter().zip(u).enumerate() {
        let d = curve.eval(t).distance(*p);
        if d > worst.0 {
            worst = (d, i);
        }
    }
    worst
}

/// One Newton step per point towards the closest curve parameter.
fn reparameterize(pts: &[Point], u: &[f64], curve: &CubicSegment) -> Vec<f64> {
    let d1 = [
        scale(sub(curve.p1, curve.p0), 3.0),
        scale(sub(curve.p2, curve.p1), 3.0),
        scale(sub(curve.p3, curve.p2), 3.0),
    ];
    let d2 = [scale(sub(d1[1], d1[0]), 2.0), scale(sub(d1[2], d1[1]), 2.0)];
    pts.iter()
        .zip(u)
        .map(|(p, &t)| {
            let mt = 1.0 - t;
            let q = curve.eval(t);
            let q1 = add(
                add(scale(d1[0], mt * mt), scale(d1[1], 2.0 * mt * t)),
                scale(d1[2], t * t),
            );
            let q2 = add(scale(d2[0], mt), scale(d2[1], t));
            let diff = sub(q, *p);
            let numerator = dot(diff, q1);
            let denominator = dot(q1, q1) + dot(diff, q2);
            if denominator.abs() < f64::EPSILON {
                t
            } else {
                (t - numerator / denominator).clamp(0.0, 1.0)
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> FitConfig {
        FitConfig {
            enabled: true,
            ..FitConfig::default()
        }
    }

    /// Distance from every polyline point to the nearest sampled curve
    /// point.
    #[allow(clippy::cast_precision_loss)]
    fn deviation(polyline: &Polyline, path: &BezierPath) -> f64 {
        let samples: Vec<Point> = path
            .segments()
            .iter()
            .flat_map(|s| (0..=1000).map(move |k| s.eval(f64::from(k) / 1000.0)))
            .collect();
        polyline
            .points()
            .iter()
            .map(|p| {
                samples
                    .iter()
                    .map(|s| s.distance(*p))
                    .fold(f64::INFINITY, f64::min)
            })
            .fold(0.0, f64::max)
    }

    #[allow(clippy::cast_precision_loss)]
    fn arc(n: usize, radius: f64, sweep: f64) -> Polyline {
        Polyline::new(
            (0..n)
                .map(|i| {
                    let a = sweep * i as f64 / (n - 1) as f64;
                    Point::new(radius * a.cos(), radius * a.sin())
                })
                .collect(),
        )
    }

    #[test]
    fn short_polylines_are_not_fitted() {
        let p = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(2.0, 1.0)]);
        assert!(fit(&p, &config()).is_none());
    }

    #[test]
    fn straight_run_is_one_segment() {
        let p = Polyline::new((0..10).map(|i| Point::new(f64::from(i), 0.0)).collect());
        let out = fit(&p, &config()).unwrap();
        assert_eq!(out.path.len(), 1);
        assert_eq!(out.joints, vec![0, 9]);
        assert_eq!(out.path.segments()[0].p0, Point::new(0.0, 0.0));
        assert_eq!(out.path.segments()[0].p3, Point::new(9.0, 0.0));
    }

    #[test]
    fn quarter_circle_needs_few_segments() {
        let p = arc(30, 50.0, std::f64::consts::FRAC_PI_2);
        let out = fit(&p, &FitConfig { split_angle_deg: 90.0, ..config() }).unwrap();
        assert!(out.path.len() <= 3, "{} segments", out.path.len());
        assert!(out.path.is_continuous());
        assert!(deviation(&p, &out.path) <= 2.0 + 0.1);
    }

    #[test]
    fn error_bound_holds_when_splits_run_out() {
        let p = Polyline::new(
            (0..60)
                .map(|i| {
                    let x = f64::from(i);
                    Point::new(x, 8.0 * (x / 3.0).sin())
                })
                .collect(),
        );
        for max_iterations in [1, 4, 16] {
            let cfg = FitConfig {
                max_error: 0.5,
                split_angle_deg: 180.0,
                max_iterations,
                ..config()
            };
            let out = fit(&p, &cfg).unwrap();
            assert!(deviation(&p, &out.path) <= 0.5 + 0.1, "max_iterations {max_iterations}");
            assert_eq!(*out.joints.last().unwrap(), 59);
        }
    }

    #[test]
    fn corners_become_joints() {
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(Point::new(f64::from(i) * 4.0, 0.0));
        }
        for i in 0..10 {
            points.push(Point::new(40.0, f64::from(i) * 4.0));
        }
        for i in 0..10 {
            points.push(Point::new(40.0 - f64::from(i) * 4.0, 40.0));
        }
        for i in 0..10 {
            points.push(Point::new(0.0, 40.0 - f64::from(i) * 4.0));
        }
        let square = Polyline::closed(points);
        let out = fit(&square, &config()).unwrap();
        assert!(out.path.is_closed());
        assert_eq!(out.path.len(), 4);
        assert_eq!(out.joints, vec![0, 10, 20, 30, 40]);
        let joints = out.path.joints();
        assert_eq!(joints[1], Point::new(40.0, 0.0));
        assert_eq!(joints[4], joints[0]);
        assert!(deviation(&square, &out.path) < 1e-6);
    }

    #[test]
    fn smooth_closed_curve_has_no_seam_corner() {
        let mut circle = arc(41, 30.0, std::f64::consts::TAU).into_points();
        circle.pop();
        let ring = Polyline::closed(circle);
        let out = fit(&ring, &config()).unwrap();
        assert!(out.path.len() <= 8, "{} segments", out.path.len());
        assert!(deviation(&ring, &out.path) <= 2.0 + 0.1);
    }

    #[test]
    fn joint_widths_follow_indices() {
        let p = Polyline::new((0..5).map(|i| Point::new(f64::from(i), 0.0)).collect());
        let out = fit(&p, &config()).unwrap();
        let widths = out.joint_widths(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(widths, vec![1.0, 5.0]);
        let path = out.path.clone().with_widths(widths);
        assert_eq!(path.widths(), Some(&[1.0, 5.0][..]));
    }
}
