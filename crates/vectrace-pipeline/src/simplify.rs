//! Path simplification: Ramer-Douglas-Peucker and Visvalingam-Whyatt.
//!
//! Both reducers work on point indices so per-point data (stroke widths)
//! can follow the kept points. The endpoints of an open polyline are
//! always kept. A closed ring is split at the point farthest from its
//! first point and each half is reduced as an open chain, so a ring never
//! drops below three points.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::types::{Point, Polyline};

/// Selects which point reducer to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplifyAlgorithm {
    /// Recursive farthest-point subdivision. Keeps every point farther
    /// than `epsilon` from the chord it would be dropped onto.
    #[default]
    Rdp,

    /// Repeatedly drop the point spanning the smallest triangle with its
    /// neighbours, while that area is below `epsilon² / 2`. Gives smoother
    /// silhouettes than RDP at the same point count.
    Visvalingam,
}

impl SimplifyAlgorithm {
    /// Short name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rdp => "rdp",
            Self::Visvalingam => "visvalingam",
        }
    }
}

/// A point reducer for open chains.
pub trait Simplifier {
    /// Indices of the points of the open chain `points` to keep, in
    /// ascending order. The first and last index are always included.
    fn keep(&self, points: &[Point], epsilon: f64) -> Vec<usize>;
}

impl Simplifier for SimplifyAlgorithm {
    fn keep(&self, points: &[Point], epsilon: f64) -> Vec<usize> {
        match *self {
            Self::Rdp => rdp_indices(points, epsilon),
            Self::Visvalingam => visvalingam_indices(points, epsilon),
        }
    }
}

/// Indices of `polyline` kept at `epsilon`. Non-positive tolerances keep
/// every point.
#[must_use = "returns the kept indices"]
pub fn simplify_indices(simplifier: &impl Simplifier, polyline: &Polyline, epsilon: f64) -> Vec<usize> {
    let points = polyline.points();
    let n = points.len();
    if epsilon <= 0.0 || n < 3 {
        return (0..n).collect();
    }
    if !polyline.is_closed() {
        return simplifier.keep(points, epsilon);
    }

    let origin = points[0];
    let far = (1..n)
        .max_by(|&a, &b| {
            origin
                .distance_squared(points[a])
                .total_cmp(&origin.distance_squared(points[b]))
                .then(b.cmp(&a))
        })
        .unwrap_or(n - 1);

    let mut kept = simplifier.keep(&points[..=far], epsilon);
    let mut tail: Vec<Point> = points[far..].to_vec();
    tail.push(origin);
    kept.extend(
        simplifier
            .keep(&tail, epsilon)
            .into_iter()
            .map(|i| i + far)
            .filter(|&i| i > far && i < n),
    );

    if kept.len() < 3 {
        // Keep the point that deviates most from the split chord.
        let extra = (1..n)
            .filter(|i| !kept.contains(i))
            .max_by(|&a, &b| {
                chord_distance(points[a], origin, points[far])
                    .total_cmp(&chord_distance(points[b], origin, points[far]))
                    .then(b.cmp(&a))
            });
        kept.extend(extra);
        kept.sort_unstable();
    }
    kept
}

/// Simplify `polyline` with `algorithm` at `epsilon`.
#[must_use = "returns the simplified polyline"]
pub fn simplify(polyline: &Polyline, algorithm: SimplifyAlgorithm, epsilon: f64) -> Polyline {
    simplify_with_widths(polyline, None, algorithm, epsilon).0
}

/// Simplify `polyline` and carry the matching per-point `widths` along.
#[must_use = "returns the simplified polyline"]
pub fn simplify_with_widths(
    polyline: &Polyline,
    widths: Option<&[f64]>,
    algorithm: SimplifyAlgorithm,
    epsilon: f64,
) -> (Polyline, Option<Vec<f64>>) {
    let kept = simplify_indices(&algorithm, polyline, epsilon);
    let points = kept.iter().map(|&i| polyline.points()[i]).collect();
    let widths = widths
        .filter(|w| w.len() == polyline.len())
        .map(|w| kept.iter().map(|&i| w[i]).collect());
    (Polyline::with_closed(points, polyline.is_closed()), widths)
}

/// Ramer-Douglas-Peucker over an open chain.
///
/// A point is kept when its distance from the chord of its span exceeds
/// `tolerance` strictly; among equally distant points the lowest index
/// wins. Pending spans wait on an explicit stack.
#[must_use = "returns the kept indices"]
pub fn rdp_indices(points: &[Point], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let mut kept = vec![false; n];
    kept[0] = true;
    kept[n - 1] = true;
    let mut spans = vec![(0, n - 1)];
    while let Some((start, end)) = spans.pop() {
        let farthest = (start + 1..end)
            .map(|i| (i, chord_distance(points[i], points[start], points[end])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, far)) if far >= d => best,
                _ => Some((i, d)),
            });
        if let Some((split, d)) = farthest
            && d > tolerance
        {
            kept[split] = true;
            spans.push((start, split));
            spans.push((split, end));
        }
    }
    kept.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

/// Distance from `p` to the line through `a` and `b`, or to `a` when the
/// two coincide.
fn chord_distance(p: Point, a: Point, b: Point) -> f64 {
    let chord = a.distance(b);
    if chord <= f64::EPSILON {
        return p.distance(a);
    }
    2.0 * triangle_area(a, b, p) / chord
}

fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    ((b.x - a.x).mul_add(c.y - a.y, -((c.x - a.x) * (b.y - a.y)))).abs() / 2.0
}

/// Heap entry; the smallest area (then the lowest index) pops first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    area: f64,
    index: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .area
            .total_cmp(&self.area)
            .then(other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Visvalingam-Whyatt over an open chain with an area threshold of
/// `tolerance² / 2`.
///
/// Effective areas never decrease as points are removed, so the removal
/// order does not depend on the threshold.
#[must_use = "returns the kept indices"]
pub fn visvalingam_indices(points: &[Point], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let threshold = tolerance * tolerance / 2.0;
    let mut prev: Vec<usize> = (0..n).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1).min(n - 1)).collect();
    let mut area = vec![f64::INFINITY; n];
    let mut removed = vec![false; n];
    let mut heap = BinaryHeap::with_capacity(n);
    for i in 1..n - 1 {
        area[i] = triangle_area(points[i - 1], points[i], points[i + 1]);
        heap.push(Candidate { area: area[i], index: i });
    }

    let mut floor = 0.0f64;
    while let Some(Candidate { area: a, index: i }) = heap.pop() {
        if removed[i] || a.to_bits() != area[i].to_bits() {
            continue;
        }
        if a >= threshold {
            break;
        }
        floor = floor.max(a);
        removed[i] = true;
        let (p, q) = (prev[i], next[i]);
        next[p] = q;
        prev[q] = p;
        for j in [p, q] {
            if j == 0 || j == n - 1 {
                continue;
            }
            area[j] = triangle_area(points[prev[j]], points[j], points[next[j]]).max(floor);
            heap.push(Candidate { area: area[j], index: j });
        }
    }
    (0..n).filter(|&i| !removed[i]).collect()
}
