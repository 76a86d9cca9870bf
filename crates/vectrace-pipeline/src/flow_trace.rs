//! Flow-guided edge tracing.
//!
//! Seeds are edge pixels in order of decreasing strength. From each
//! unvisited seed a walker steps half a pixel at a time along the flow
//! tangent, in both directions, collecting edge pixels. Off the edge map
//! it keeps its heading and snaps back onto a nearby edge pixel when one
//! lies ahead; the walk ends on leaving the image, reaching a visited
//! pixel, losing coherency, turning too sharply, exceeding the gap
//! allowance, or reaching the length cap.

use crate::budget::TraceContext;
use crate::contour::neighbors8;
use crate::raster::{BinaryMask, FlowField, ScalarField};
use crate::types::{Point, Polyline};

/// Walker step along the tangent, in pixels.
const STEP: f32 = 0.5;

/// Cosine of the largest turn allowed between consecutive edge pixels
/// (30 degrees).
const MAX_TURN_COS: f32 = 0.866_025_4;

/// A trace whose ends are this close is closed.
const CLOSE_DISTANCE: f64 = 2.0;

/// Flow tracing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    /// Minimum normalized strength of a seed pixel.
    pub min_strength: f32,
    /// Minimum flow coherency for the walk to continue.
    pub min_coherency: f32,
    /// Longest run of consecutive non-edge pixels bridged.
    pub max_gap: u32,
    /// Maximum points per trace.
    pub max_len: u32,
}

/// Trace polylines through `edges` along `flow`.
///
/// `strength` (normalized to `[0, 1]`) orders the seeds. When the budget
/// runs out the traces finished so far are returned.
#[must_use]
pub fn trace_flow(
    edges: &BinaryMask,
    strength: &ScalarField,
    flow: &FlowField,
    params: TraceParams,
    ctx: &mut TraceContext,
) -> Vec<Polyline> {
    let (w, h) = (edges.width(), edges.height());
    let mut seeds: Vec<(u32, u32)> = edges
        .foreground()
        .filter(|&(x, y)| strength.get(x, y) >= params.min_strength)
        .collect();
    seeds.sort_by(|a, b| strength.get(b.0, b.1).total_cmp(&strength.get(a.0, a.1)));

    let mut visited = BinaryMask::new(w, h);
    let mut traces = Vec::new();
    for seed in seeds {
        if ctx.is_exhausted() {
            ctx.timeout("edge linking");
            break;
        }
        if visited.get(seed.0, seed.1) {
            continue;
        }
        let t = flow.tangent(seed.0, seed.1);
        if t == [0.0, 0.0] {
            continue;
        }
        visited.set(seed.0, seed.1, true);
        let budget = params.max_len.saturating_sub(1);
        let forward = walk(edges, flow, &mut visited, seed, t, params, budget);
        let remaining = budget.saturating_sub(u32::try_from(forward.len()).unwrap_or(u32::MAX));
        let backward = walk(edges, flow, &mut visited, seed, [-t[0], -t[1]], params, remaining);

        let mut pixels: Vec<(u32, u32)> = backward.into_iter().rev().collect();
        pixels.push(seed);
        pixels.extend(forward);
        if pixels.len() < 3 {
            continue;
        }
        let points: Vec<Point> = pixels
            .into_iter()
            .map(|(x, y)| Point::new(f64::from(x), f64::from(y)))
            .collect();
        let closed = points.len() >= 8
            && matches!((points.first(), points.last()), (Some(a), Some(b)) if a.distance(*b) <= CLOSE_DISTANCE);
        traces.push(Polyline::with_closed(points, closed));
    }
    traces
}

/// Walk from `seed` in `direction`, returning the edge pixels reached.
#[allow(clippy::cast_precision_loss, clippy::too_many_arguments)]
fn walk(
    edges: &BinaryMask,
    flow: &FlowField,
    visited: &mut BinaryMask,
    seed: (u32, u32),
    direction: [f32; 2],
    params: TraceParams,
    max_points: u32,
) -> Vec<(u32, u32)> {
    let (w, h) = (edges.width(), edges.height());
    let mut out = Vec::new();
    let (mut px, mut py) = (seed.0 as f32, seed.1 as f32);
    let mut heading = direction;
    let mut last = seed;
    let mut pixel = seed;
    let mut gap = 0u32;

    while u32::try_from(out.len()).unwrap_or(u32::MAX) < max_points {
        px += STEP * heading[0];
        py += STEP * heading[1];
        let (rx, ry) = (px.round(), py.round());
        if rx < 0.0 || ry < 0.0 || rx >= w as f32 || ry >= h as f32 {
            break;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let here = (rx as u32, ry as u32);
        if here == pixel {
            continue;
        }
        pixel = here;

        let next = if edges.get(here.0, here.1) {
            Some(here)
        } else {
            snap(edges, visited, here, last, heading)
        };
        let Some(next) = next else {
            gap += 1;
            if gap > params.max_gap {
                break;
            }
            continue;
        };
        if visited.get(next.0, next.1) {
            break;
        }
        if flow.coherency(next.0, next.1) < params.min_coherency {
            break;
        }
        let t = flow.tangent(next.0, next.1);
        let dot = t[0].mul_add(heading[0], t[1] * heading[1]);
        let t = if dot < 0.0 { [-t[0], -t[1]] } else { t };
        if dot.abs() < MAX_TURN_COS {
            break;
        }
        visited.set(next.0, next.1, true);
        out.push(next);
        gap = 0;
        heading = t;
        last = next;
        pixel = next;
        (px, py) = (next.0 as f32, next.1 as f32);
    }
    out
}

/// An unvisited edge pixel next to `here` that lies ahead of `last`.
#[allow(clippy::cast_precision_loss)]
fn snap(
    edges: &BinaryMask,
    visited: &BinaryMask,
    here: (u32, u32),
    last: (u32, u32),
    heading: [f32; 2],
) -> Option<(u32, u32)> {
    neighbors8(here.0, here.1, edges.width(), edges.height())
        .filter(|&(x, y)| edges.get(x, y) && !visited.get(x, y))
        .filter(|&(x, y)| {
            let dx = x as f32 - last.0 as f32;
            let dy = y as f32 - last.1 as f32;
            dx.mul_add(heading[0], dy * heading[1]) > 0.0
        })
        .min_by_key(|&(x, y)| x.abs_diff(here.0) + y.abs_diff(here.1))
}
