//! Contour tracing: extract polylines from a binary edge map.
//!
//! [`trace_edges`] is the edge backend's linker when flow-guided tracing
//! is off; [`outer_rings`] also feeds superpixel region boundaries.
//!
//! Border following on 1-pixel-wide edges walks every open line twice
//! (out and back). [`trace_edges`] therefore only keeps an outer border
//! as a closed ring once its spurs have been cut away and it still
//! encloses some area; every other edge pixel is linked into open chains
//! by [`link_pixels`].

use std::collections::{HashMap, HashSet};

use geo::{Area, Coord, LineString, Polygon};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

use crate::raster::BinaryMask;
use crate::types::{Point, Polyline};

/// Closed rings from outer borders plus open chains for everything else.
#[must_use]
pub fn trace_edges(edges: &BinaryMask) -> Vec<Polyline> {
    let (w, h) = (edges.width(), edges.height());
    let mut consumed = BinaryMask::new(w, h);
    let mut rings = Vec::new();

    for ring in outer_rings(&edges.to_gray()) {
        let Some(simple) = cut_spurs(&ring) else {
            continue;
        };
        if !encloses_area(&simple) {
            continue;
        }
        for &(x, y) in &simple {
            consumed.set(x, y, true);
        }
        rings.push(Polyline::closed(simple.iter().map(|&p| pixel_point(p)).collect()));
    }

    let residual = BinaryMask::from_fn(w, h, |x, y| edges.get(x, y) && !consumed.get(x, y));
    rings.extend(link_pixels(&residual));
    rings
}

/// Pixel lists of every outer border in `image` (nonzero = foreground).
#[must_use]
pub fn outer_rings(image: &GrayImage) -> Vec<Vec<(u32, u32)>> {
    find_contours::<u32>(image)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| c.points.into_iter().map(|p| (p.x, p.y)).collect())
        .collect()
}

/// Remove out-and-back excursions from a border walk, leaving a ring that
/// visits each pixel once. `None` if fewer than four pixels survive.
fn cut_spurs(border: &[(u32, u32)]) -> Option<Vec<(u32, u32)>> {
    let mut stack: Vec<(u32, u32)> = Vec::with_capacity(border.len());
    let mut position: HashMap<(u32, u32), usize> = HashMap::with_capacity(border.len());
    for &p in border {
        if let Some(&i) = position.get(&p) {
            for q in stack.drain(i + 1..) {
                position.remove(&q);
            }
        } else {
            position.insert(p, stack.len());
            stack.push(p);
        }
    }
    (stack.len() >= 4).then_some(stack)
}

/// Whether a ring encloses at least as many square pixels as it has
/// points; thin double-walked strokes do not.
#[allow(clippy::cast_precision_loss)]
fn encloses_area(ring: &[(u32, u32)]) -> bool {
    let coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(x, y)| Coord {
            x: f64::from(x),
            y: f64::from(y),
        })
        .collect();
    let polygon = Polygon::new(LineString::new(coords), Vec::new());
    polygon.unsigned_area() >= ring.len() as f64
}

fn pixel_point((x, y): (u32, u32)) -> Point {
    Point::new(f64::from(x), f64::from(y))
}

/// 8-neighbours of `(x, y)` inside a `w` x `h` grid, 4-neighbours first.
pub(crate) fn neighbors8(x: u32, y: u32, w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    const OFFSETS: [(i64, i64); 8] = [
        (1, 0),
        (0, 1),
        (-1, 0),
        (0, -1),
        (1, 1),
        (-1, 1),
        (-1, -1),
        (1, -1),
    ];
    OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let nx = u32::try_from(i64::from(x) + dx).ok()?;
        let ny = u32::try_from(i64::from(y) + dy).ok()?;
        (nx < w && ny < h).then_some((nx, ny))
    })
}

/// Link foreground pixels into chains.
///
/// Chains start at endpoints (one neighbour) first so open strokes come
/// out whole; what is left is walked in both directions from its first
/// pixel. A chain that returns next to its start is closed.
#[must_use]
pub fn link_pixels(mask: &BinaryMask) -> Vec<Polyline> {
    let (w, h) = (mask.width(), mask.height());
    let degree = |x: u32, y: u32| neighbors8(x, y, w, h).filter(|&(nx, ny)| mask.get(nx, ny)).count();
    let mut visited: HashSet<(u32, u32)> = HashSet::new();
    let mut chains = Vec::new();

    let endpoints: Vec<(u32, u32)> = mask.foreground().filter(|&(x, y)| degree(x, y) <= 1).collect();
    for start in endpoints {
        if visited.contains(&start) {
            continue;
        }
        let chain = walk(mask, start, &mut visited);
        if chain.len() >= 2 {
            chains.push(Polyline::new(chain.into_iter().map(pixel_point).collect()));
        }
    }

    let rest: Vec<(u32, u32)> = mask.foreground().collect();
    for start in rest {
        if visited.contains(&start) {
            continue;
        }
        let forward = walk(mask, start, &mut visited);
        let backward = continue_from(mask, start, &mut visited);
        let closed = backward.is_empty()
            && forward.len() >= 4
            && forward
                .last()
                .is_some_and(|&(lx, ly)| lx.abs_diff(start.0) <= 1 && ly.abs_diff(start.1) <= 1);
        let mut chain: Vec<(u32, u32)> = backward.into_iter().rev().collect();
        chain.extend(forward);
        if chain.len() >= 2 {
            let points = chain.into_iter().map(pixel_point).collect();
            chains.push(Polyline::with_closed(points, closed));
        }
    }
    chains
}

/// Walk from `start` through unvisited foreground pixels.
fn walk(mask: &BinaryMask, start: (u32, u32), visited: &mut HashSet<(u32, u32)>) -> Vec<(u32, u32)> {
    visited.insert(start);
    let mut chain = vec![start];
    chain.extend(continue_from(mask, start, visited));
    chain
}

/// Extend a chain from `from` (already visited) until it runs out of
/// unvisited pixels; the pixels after `from` are returned.
fn continue_from(
    mask: &BinaryMask,
    from: (u32, u32),
    visited: &mut HashSet<(u32, u32)>,
) -> Vec<(u32, u32)> {
    let (w, h) = (mask.width(), mask.height());
    let mut out = Vec::new();
    let mut current = from;
    while let Some(next) = neighbors8(current.0, current.1, w, h)
        .find(|&(nx, ny)| mask.get(nx, ny) && !visited.contains(&(nx, ny)))
    {
        visited.insert(next);
        out.push(next);
        current = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_ring(lo: u32, hi: u32, size: u32) -> BinaryMask {
        BinaryMask::from_fn(size, size, |x, y| {
            let on_x = (x == lo || x == hi) && (lo..=hi).contains(&y);
            let on_y = (y == lo || y == hi) && (lo..=hi).contains(&x);
            on_x || on_y
        })
    }

    #[test]
    fn empty_mask_produces_no_contours() {
        let mask = BinaryMask::new(10, 10);
        assert!(trace_edges(&mask).is_empty());
        assert!(link_pixels(&mask).is_empty());
    }

    #[test]
    fn thin_ring_is_one_closed_contour() {
        let mask = square_ring(5, 24, 30);
        let result = trace_edges(&mask);
        assert_eq!(result.len(), 1, "{result:?}");
        assert!(result[0].is_closed());
        assert_eq!(result[0].len(), 76);
    }

    #[test]
    fn straight_line_is_one_open_chain() {
        let mask = BinaryMask::from_fn(20, 5, |x, y| y == 2 && (3..=15).contains(&x));
        let result = trace_edges(&mask);
        assert_eq!(result.len(), 1);
        assert!(!result[0].is_closed());
        assert_eq!(result[0].len(), 13);
        let ends = (result[0].first().map(|p| p.x), result[0].last().map(|p| p.x));
        assert!(ends == (Some(3.0), Some(15.0)) || ends == (Some(15.0), Some(3.0)));
    }

    #[test]
    fn ring_with_spur_keeps_ring_and_spur() {
        let mut mask = square_ring(5, 24, 40);
        for x in 25..32 {
            mask.set(x, 12, true);
        }
        let result = trace_edges(&mask);
        let closed: Vec<_> = result.iter().filter(|p| p.is_closed()).collect();
        let open: Vec<_> = result.iter().filter(|p| !p.is_closed()).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(open.len(), 1);
        // The pixel where the spur leaves the ring may stay on the ring.
        assert!((6..=7).contains(&open[0].len()), "{:?}", open[0]);
    }

    #[test]
    fn chain_linking_closes_rings() {
        let mask = square_ring(2, 9, 12);
        let result = link_pixels(&mask);
        assert_eq!(result.len(), 1);
        assert!(result[0].is_closed());
        assert_eq!(result[0].len(), 28);
    }

    #[test]
    fn filled_rectangle_has_one_outer_ring() {
        let image = GrayImage::from_fn(20, 20, |x, y| {
            image::Luma([if (5..15).contains(&x) && (5..15).contains(&y) { 255 } else { 0 }])
        });
        let rings = outer_rings(&image);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 36);
    }
}
