//! Skeleton graph: branches between endpoints and junctions.
//!
//! Skeleton pixels are linked with a reduced 8-adjacency: a diagonal link
//! is dropped when the two pixels already share a foreground 4-neighbour,
//! so a staircase reads as a chain and not as a cluster of junctions.
//! Pixels with other than two links become nodes, and the pixel chains
//! between them become branches. A cycle with no node on it gets a single
//! loop node carrying a self-loop branch.
//!
//! The graph lives in a `petgraph` [`StableUnGraph`]: pruning, loop
//! removal and bridging delete and add edges freely while the remaining
//! indices stay valid. Every branch stores its pixels in the direction
//! of the edge (source node first) with the distance-transform radius at
//! each pixel.

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::budget::TraceContext;
use crate::raster::{BinaryMask, ScalarField};
use crate::types::{Point, Polyline};

/// A skeleton pixel.
pub type Pixel = (u32, u32);

/// Terminal branches shorter than this multiple of their largest radius
/// are blobs, not strokes.
const BLOB_RATIO: f64 = 3.0;

/// Pixels inside the branch used to estimate an endpoint's direction.
const TANGENT_SPAN: usize = 5;

/// Bridge sampling step in pixels.
const BRIDGE_STEP: f64 = 0.5;

/// Samples with a smaller radius lie outside the stroke mask.
const MIN_BRIDGE_RADIUS: f32 = 0.8;

/// Skeleton pixels this close to a bridge end may be crossed.
const ENDPOINT_CLEARANCE: f64 = 1.5;

/// A pixel chain between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pixels: Vec<Pixel>,
    radii: Vec<f32>,
}

impl Branch {
    fn new(pixels: Vec<Pixel>, radius: &ScalarField) -> Self {
        let radii = pixels.iter().map(|&(x, y)| radius.get(x, y)).collect();
        Self { pixels, radii }
    }

    /// Pixels from the source node to the target node.
    #[must_use]
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Distance-transform radius at each pixel.
    #[must_use]
    pub fn radii(&self) -> &[f32] {
        &self.radii
    }

    /// Arc length in pixels.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.pixels
            .windows(2)
            .map(|w| pixel_point(w[0]).distance(pixel_point(w[1])))
            .sum()
    }

    /// Mean radius along the branch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_radius(&self) -> f64 {
        if self.radii.is_empty() {
            return 0.0;
        }
        self.radii.iter().map(|r| f64::from(*r)).sum::<f64>() / self.radii.len() as f64
    }

    /// Largest radius along the branch.
    #[must_use]
    pub fn max_radius(&self) -> f64 {
        self.radii.iter().fold(0.0f64, |m, r| m.max(f64::from(*r)))
    }

    fn reversed(&self) -> Self {
        Self {
            pixels: self.pixels.iter().rev().copied().collect(),
            radii: self.radii.iter().rev().copied().collect(),
        }
    }

    /// `self` followed by `next`, which must start where `self` ends.
    fn joined(mut self, next: &Self) -> Self {
        self.pixels.extend(next.pixels.iter().skip(1));
        self.radii.extend(next.radii.iter().skip(1));
        self
    }
}

/// Counts from [`SkeletonGraph::simplify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphCleanup {
    /// Branches before any change.
    pub branches_before: usize,
    /// Terminal branches pruned.
    pub pruned: usize,
    /// Micro-loops removed.
    pub micro_loops: usize,
    /// Bridges added.
    pub bridges: usize,
    /// Branches after all changes.
    pub branches_after: usize,
}

/// Parameters for [`SkeletonGraph::simplify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanupParams {
    /// Terminal branches shorter than this are pruned.
    pub min_branch_length: f64,
    /// Loops shorter than this are removed.
    pub micro_loop_length: f64,
    /// Bridge nearby endpoints.
    pub bridging: bool,
    /// Longest bridge.
    pub max_join_distance: f64,
    /// Largest angle between a bridge and either branch direction.
    pub max_join_angle_deg: f64,
}

/// Arena of skeleton nodes and branches.
#[derive(Debug, Clone, Default)]
pub struct SkeletonGraph {
    graph: StableUnGraph<Pixel, Branch>,
}

/// The reduced 8-neighbourhood of `p` inside `mask`.
fn linked_neighbors(mask: &BinaryMask, (x, y): Pixel) -> Vec<Pixel> {
    let (x, y) = (i64::from(x), i64::from(y));
    let mut out = Vec::with_capacity(4);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            if (dx, dy) == (0, 0) || !mask.get_signed(x + dx, y + dy) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal && (mask.get_signed(x + dx, y) || mask.get_signed(x, y + dy)) {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let pixel = ((x + dx) as u32, (y + dy) as u32);
            out.push(pixel);
        }
    }
    out
}

fn link(a: Pixel, b: Pixel) -> (Pixel, Pixel) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Follow unused links from `start` through `first` until a node (or a
/// dead end) is reached.
fn walk_chain(
    skeleton: &BinaryMask,
    start: Pixel,
    first: Pixel,
    nodes: &HashMap<Pixel, NodeIndex>,
    used: &mut HashSet<(Pixel, Pixel)>,
    on_branch: &mut HashSet<Pixel>,
) -> Vec<Pixel> {
    let mut chain = vec![start, first];
    used.insert(link(start, first));
    let (mut prev, mut cur) = (start, first);
    while !nodes.contains_key(&cur) {
        let next = linked_neighbors(skeleton, cur)
            .into_iter()
            .find(|&q| q != prev && !used.contains(&link(cur, q)));
        let Some(next) = next else {
            break;
        };
        used.insert(link(cur, next));
        chain.push(next);
        prev = cur;
        cur = next;
    }
    on_branch.extend(chain.iter().copied());
    chain
}

fn pixel_point((x, y): Pixel) -> Point {
    Point::new(f64::from(x), f64::from(y))
}

impl SkeletonGraph {
    /// Build the graph of a one-pixel-wide `skeleton`, sampling branch
    /// radii from `radius`.
    #[must_use]
    pub fn from_skeleton(skeleton: &BinaryMask, radius: &ScalarField) -> Self {
        let mut graph = StableUnGraph::default();
        let mut nodes: HashMap<Pixel, NodeIndex> = HashMap::new();
        let mut node_order = Vec::new();
        for p in skeleton.foreground() {
            if linked_neighbors(skeleton, p).len() != 2 {
                nodes.insert(p, graph.add_node(p));
                node_order.push(p);
            }
        }

        let mut used: HashSet<(Pixel, Pixel)> = HashSet::new();
        let mut on_branch: HashSet<Pixel> = HashSet::new();

        for start in node_order {
            for first in linked_neighbors(skeleton, start) {
                if used.contains(&link(start, first)) {
                    continue;
                }
                let chain = walk_chain(skeleton, start, first, &nodes, &mut used, &mut on_branch);
                let Some(&end) = chain.last() else {
                    continue;
                };
                let end_node = *nodes.entry(end).or_insert_with(|| graph.add_node(end));
                let start_node = nodes[&start];
                graph.add_edge(start_node, end_node, Branch::new(chain, radius));
            }
        }

        // Whatever is left lies on node-free cycles.
        for p in skeleton.foreground() {
            if nodes.contains_key(&p) || on_branch.contains(&p) {
                continue;
            }
            let node = graph.add_node(p);
            nodes.insert(p, node);
            let Some(first) = linked_neighbors(skeleton, p).into_iter().next() else {
                continue;
            };
            let chain = walk_chain(skeleton, p, first, &nodes, &mut used, &mut on_branch);
            let Some(&end) = chain.last() else {
                continue;
            };
            let end_node = *nodes.entry(end).or_insert_with(|| graph.add_node(end));
            graph.add_edge(node, end_node, Branch::new(chain, radius));
        }

        Self { graph }
    }

    /// Number of branches.
    #[must_use]
    pub fn branch_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All branches.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.graph.edge_indices().map(|e| &self.graph[e])
    }

    /// Number of branches ending at `pixel`, a self-loop counting twice.
    #[must_use]
    pub fn degree_at(&self, pixel: Pixel) -> Option<usize> {
        self.graph
            .node_indices()
            .find(|&n| self.graph[n] == pixel)
            .map(|n| self.degree(n))
    }

    fn degree(&self, n: NodeIndex) -> usize {
        self.graph
            .edges(n)
            .map(|e| if e.source() == e.target() { 2 } else { 1 })
            .sum()
    }

    /// Branch pixels oriented to start at `from`.
    fn oriented(&self, e: EdgeIndex, from: NodeIndex) -> Option<Branch> {
        let (source, _) = self.graph.edge_endpoints(e)?;
        let branch = self.graph.edge_weight(e)?;
        Some(if source == from {
            branch.clone()
        } else {
            branch.reversed()
        })
    }

    /// Prune, drop micro-loops, then bridge, as configured.
    pub fn simplify(&mut self, params: CleanupParams, radius: &ScalarField, ctx: &mut TraceContext) -> GraphCleanup {
        let branches_before = self.branch_count();
        let pruned = self.prune(params.min_branch_length, ctx);
        let micro_loops = self.remove_micro_loops(params.micro_loop_length);
        let bridges = if params.bridging {
            self.bridge(radius, params.max_join_distance, params.max_join_angle_deg)
        } else {
            0
        };
        GraphCleanup {
            branches_before,
            pruned,
            micro_loops,
            bridges,
            branches_after: self.branch_count(),
        }
    }

    /// Repeatedly remove terminal branches that are shorter than
    /// `min_length` or than three times their largest radius; returns
    /// the number removed.
    pub fn prune(&mut self, min_length: f64, ctx: &mut TraceContext) -> usize {
        let mut removed = 0;
        loop {
            if ctx.is_exhausted() {
                ctx.timeout("pruning");
                break;
            }
            let doomed: Vec<EdgeIndex> = self
                .graph
                .edge_indices()
                .filter(|&e| {
                    let Some((a, b)) = self.graph.edge_endpoints(e) else {
                        return false;
                    };
                    if a == b || (self.degree(a) != 1 && self.degree(b) != 1) {
                        return false;
                    }
                    let branch = &self.graph[e];
                    let length = branch.length();
                    length < min_length || length < BLOB_RATIO * branch.max_radius()
                })
                .collect();
            if doomed.is_empty() {
                break;
            }
            for e in doomed {
                self.graph.remove_edge(e);
                removed += 1;
            }
            self.tidy();
        }
        self.tidy();
        removed
    }

    /// Remove self-loops shorter than `max_length`, and the longer of two
    /// parallel branches whose combined length is below it.
    pub fn remove_micro_loops(&mut self, max_length: f64) -> usize {
        let mut doomed = Vec::new();
        let mut parallel: HashMap<(NodeIndex, NodeIndex), Vec<EdgeIndex>> = HashMap::new();
        for e in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(e) else {
                continue;
            };
            if a == b {
                if self.graph[e].length() < max_length {
                    doomed.push(e);
                }
            } else {
                parallel.entry((a.min(b), a.max(b))).or_default().push(e);
            }
        }
        let mut groups: Vec<Vec<EdgeIndex>> = parallel.into_values().filter(|g| g.len() >= 2).collect();
        groups.sort();
        for mut group in groups {
            group.sort_by(|x, y| self.graph[*x].length().total_cmp(&self.graph[*y].length()));
            if self.graph[group[0]].length() + self.graph[group[1]].length() < max_length {
                doomed.push(group[1]);
            }
        }
        let removed = doomed.len();
        for e in doomed {
            self.graph.remove_edge(e);
        }
        self.tidy();
        removed
    }

    /// Join pairs of endpoints that face each other across a short gap
    /// inside the stroke mask; returns the number of bridges.
    ///
    /// `radius` is the distance transform of the binarized mask. A bridge
    /// is rejected if any half-pixel sample along it has a radius below
    /// 0.8 (it would leave the mask) or lands on another branch away from
    /// its ends (it would close an unintended loop).
    pub fn bridge(&mut self, radius: &ScalarField, max_distance: f64, max_angle_deg: f64) -> usize {
        struct End {
            node: NodeIndex,
            edge: EdgeIndex,
            position: Point,
            tangent: [f64; 2],
        }

        let mut ends = Vec::new();
        for node in self.graph.node_indices() {
            if self.degree(node) != 1 {
                continue;
            }
            let Some(edge) = self.graph.edges(node).next().map(|e| e.id()) else {
                continue;
            };
            let Some(branch) = self.oriented(edge, node) else {
                continue;
            };
            let pixels = branch.pixels();
            if pixels.len() < 2 {
                continue;
            }
            let position = pixel_point(pixels[0]);
            let inner = pixel_point(pixels[TANGENT_SPAN.min(pixels.len() - 1)]);
            let (dx, dy) = (position.x - inner.x, position.y - inner.y);
            let len = dx.hypot(dy);
            if len <= f64::EPSILON {
                continue;
            }
            ends.push(End {
                node,
                edge,
                position,
                tangent: [dx / len, dy / len],
            });
        }

        let tree = RTree::bulk_load(
            ends.iter()
                .enumerate()
                .map(|(i, end)| GeomWithData::new([end.position.x, end.position.y], i))
                .collect(),
        );
        let mut owner: HashMap<Pixel, EdgeIndex> = HashMap::new();
        for e in self.graph.edge_indices() {
            for &p in self.graph[e].pixels() {
                owner.insert(p, e);
            }
        }

        let min_cos = max_angle_deg.to_radians().cos();
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (i, a) in ends.iter().enumerate() {
            let query = [a.position.x, a.position.y];
            for found in tree.locate_within_distance(query, max_distance * max_distance) {
                let j = found.data;
                if j <= i {
                    continue;
                }
                let b = &ends[j];
                let d = a.position.distance(b.position);
                if d <= f64::EPSILON {
                    continue;
                }
                let v = [(b.position.x - a.position.x) / d, (b.position.y - a.position.y) / d];
                let facing_a = a.tangent[0].mul_add(v[0], a.tangent[1] * v[1]);
                let facing_b = -b.tangent[0].mul_add(v[0], b.tangent[1] * v[1]);
                if facing_a < min_cos || facing_b < min_cos {
                    continue;
                }
                if bridge_is_clear(a.position, b.position, (a.edge, b.edge), &owner, radius) {
                    candidates.push((d, i, j));
                }
            }
        }
        candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

        let mut joined = vec![false; ends.len()];
        let mut bridges = 0;
        for (_, i, j) in candidates {
            if joined[i] || joined[j] {
                continue;
            }
            joined[i] = true;
            joined[j] = true;
            let pixels = bridge_pixels(self.graph[ends[i].node], self.graph[ends[j].node]);
            self.graph
                .add_edge(ends[i].node, ends[j].node, Branch::new(pixels, radius));
            bridges += 1;
        }
        self.tidy();
        bridges
    }

    /// Drop isolated nodes and merge branches through nodes of degree 2.
    fn tidy(&mut self) {
        let isolated: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| self.graph.edges(n).next().is_none())
            .collect();
        for n in isolated {
            self.graph.remove_node(n);
        }

        let pass_through: Vec<NodeIndex> = self.graph.node_indices().collect();
        for n in pass_through {
            if !self.graph.contains_node(n) {
                continue;
            }
            let refs: Vec<(EdgeIndex, NodeIndex)> = self
                .graph
                .edges(n)
                .map(|e| (e.id(), if e.source() == n { e.target() } else { e.source() }))
                .collect();
            let &[(e1, a), (e2, b)] = refs.as_slice() else {
                continue;
            };
            if a == n || b == n {
                continue;
            }
            let (Some(first), Some(second)) = (self.oriented(e1, a), self.oriented(e2, n)) else {
                continue;
            };
            self.graph.remove_edge(e1);
            self.graph.remove_edge(e2);
            self.graph.remove_node(n);
            self.graph.add_edge(a, b, first.joined(&second));
        }
    }

    /// Every branch as a polyline with its per-point radii.
    ///
    /// Self-loops become closed polylines without a repeated end point.
    #[must_use]
    pub fn polylines(&self) -> Vec<(Polyline, Vec<f32>)> {
        let mut out = Vec::new();
        for e in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(e) else {
                continue;
            };
            let branch = &self.graph[e];
            let mut pixels = branch.pixels().to_vec();
            let mut radii = branch.radii().to_vec();
            let closed = a == b;
            if closed && pixels.len() > 1 && pixels.first() == pixels.last() {
                pixels.pop();
                radii.pop();
            }
            let points = pixels.into_iter().map(pixel_point).collect();
            let polyline = Polyline::with_closed(points, closed);
            if polyline.is_valid() {
                out.push((polyline, radii));
            }
        }
        out
    }
}

/// Whether the straight bridge from `a` to `b` stays inside the mask and
/// clear of branches other than the two it joins.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bridge_is_clear(
    a: Point,
    b: Point,
    (ea, eb): (EdgeIndex, EdgeIndex),
    owner: &HashMap<Pixel, EdgeIndex>,
    radius: &ScalarField,
) -> bool {
    let steps = (a.distance(b) / BRIDGE_STEP).ceil().max(1.0) as usize;
    (0..=steps).all(|k| {
        let s = a.lerp(b, k as f64 / steps as f64);
        let (rx, ry) = (s.x.round(), s.y.round());
        if rx < 0.0 || ry < 0.0 {
            return false;
        }
        let pixel = (rx as u32, ry as u32);
        if pixel.0 >= radius.width() || pixel.1 >= radius.height() {
            return false;
        }
        if radius.get(pixel.0, pixel.1) < MIN_BRIDGE_RADIUS {
            return false;
        }
        match owner.get(&pixel) {
            Some(&e) if e != ea && e != eb => {
                s.distance(a) <= ENDPOINT_CLEARANCE || s.distance(b) <= ENDPOINT_CLEARANCE
            }
            _ => true,
        }
    })
}

/// Bresenham pixels from `a` to `b`, both included, starting at `a`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bridge_pixels(a: Pixel, b: Pixel) -> Vec<Pixel> {
    let mut pixels: Vec<Pixel> = imageproc::drawing::BresenhamLineIter::new(
        (a.0 as f32, a.1 as f32),
        (b.0 as f32, b.1 as f32),
    )
    .map(|(x, y)| (x.max(0) as u32, y.max(0) as u32))
    .collect();
    if pixels.first() != Some(&a) {
        pixels.reverse();
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(w: u32, h: u32) -> ScalarField {
        ScalarField::from_fn(w, h, |_, _| 1.0)
    }

    fn params(min_branch_length: f64) -> CleanupParams {
        CleanupParams {
            min_branch_length,
            micro_loop_length: 12.0,
            bridging: true,
            max_join_distance: 7.0,
            max_join_angle_deg: 30.0,
        }
    }

    #[test]
    fn straight_line_is_one_branch() {
        let mask = BinaryMask::from_fn(30, 5, |x, y| y == 2 && (3..20).contains(&x));
        let graph = SkeletonGraph::from_skeleton(&mask, &ones(30, 5));
        assert_eq!(graph.branch_count(), 1);
        assert_eq!(graph.node_count(), 2);
        let Some(branch) = graph.branches().next() else {
            unreachable!("one branch expected");
        };
        assert!((branch.length() - 16.0).abs() < 1e-9);
        assert_eq!(graph.degree_at((3, 2)), Some(1));
    }

    #[test]
    fn tee_has_one_junction_and_three_branches() {
        let mask = BinaryMask::from_fn(50, 30, |x, y| {
            (y == 20 && (5..=45).contains(&x)) || (x == 25 && (21..=24).contains(&y))
        });
        let graph = SkeletonGraph::from_skeleton(&mask, &ones(50, 30));
        assert_eq!(graph.branch_count(), 3);
        assert_eq!(graph.degree_at((25, 20)), Some(3));
    }

    #[test]
    fn staircase_is_not_a_junction_cluster() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| x == y || x == y + 1);
        let graph = SkeletonGraph::from_skeleton(&mask, &ones(20, 20));
        assert_eq!(graph.branch_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn ring_is_one_self_loop() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| {
            let on_x = (x == 4 || x == 15) && (4..=15).contains(&y);
            let on_y = (y == 4 || y == 15) && (4..=15).contains(&x);
            on_x || on_y
        });
        let graph = SkeletonGraph::from_skeleton(&mask, &ones(20, 20));
        assert_eq!(graph.branch_count(), 1);
        let lines = graph.polylines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].0.is_closed());
        assert_eq!(lines[0].0.len(), 44);
    }

    #[test]
    fn short_spur_is_pruned_and_arms_merge() {
        let mask = BinaryMask::from_fn(50, 30, |x, y| {
            (y == 20 && (5..=45).contains(&x)) || (x == 25 && (21..=24).contains(&y))
        });
        let mut graph = SkeletonGraph::from_skeleton(&mask, &ones(50, 30));
        let mut ctx = TraceContext::unlimited();
        let pruned = graph.prune(12.0, &mut ctx);
        assert_eq!(pruned, 1);
        assert_eq!(graph.branch_count(), 1);
        let Some(branch) = graph.branches().next() else {
            unreachable!("one branch expected");
        };
        assert_eq!(branch.pixels().len(), 41);
    }

    #[test]
    fn fat_short_branch_is_a_blob() {
        let mask = BinaryMask::from_fn(30, 5, |x, y| y == 2 && (3..13).contains(&x));
        let radius = ScalarField::from_fn(30, 5, |_, _| 5.0);
        let mut graph = SkeletonGraph::from_skeleton(&mask, &radius);
        let mut ctx = TraceContext::unlimited();
        graph.prune(0.0, &mut ctx);
        assert_eq!(graph.branch_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn tiny_loop_is_removed() {
        let mask = BinaryMask::from_fn(10, 10, |x, y| {
            (3..=5).contains(&x) && (3..=5).contains(&y) && (x, y) != (4, 4)
        });
        let mut graph = SkeletonGraph::from_skeleton(&mask, &ones(10, 10));
        assert_eq!(graph.branch_count(), 1);
        assert_eq!(graph.remove_micro_loops(12.0), 1);
        assert_eq!(graph.branch_count(), 0);
    }

    #[test]
    fn facing_endpoints_are_bridged() {
        let mask = BinaryMask::from_fn(50, 20, |x, y| y == 10 && ((5..=20).contains(&x) || (25..=40).contains(&x)));
        let radius = ones(50, 20);
        let mut graph = SkeletonGraph::from_skeleton(&mask, &radius);
        assert_eq!(graph.branch_count(), 2);
        let bridges = graph.bridge(&radius, 7.0, 30.0);
        assert_eq!(bridges, 1);
        assert_eq!(graph.branch_count(), 1);
        let Some(branch) = graph.branches().next() else {
            unreachable!("one branch expected");
        };
        assert_eq!(branch.pixels().len(), 36);
    }

    #[test]
    fn bridge_outside_the_mask_is_rejected() {
        let mask = BinaryMask::from_fn(50, 20, |x, y| y == 10 && ((5..=20).contains(&x) || (25..=40).contains(&x)));
        let radius = ScalarField::from_fn(50, 20, |x, _| if (21..25).contains(&x) { 0.0 } else { 1.0 });
        let mut graph = SkeletonGraph::from_skeleton(&mask, &radius);
        assert_eq!(graph.bridge(&radius, 7.0, 30.0), 0);
        assert_eq!(graph.branch_count(), 2);
    }

    #[test]
    fn perpendicular_endpoints_are_not_bridged() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| {
            (y == 10 && (5..=20).contains(&x)) || (x == 24 && (14..=30).contains(&y))
        });
        let radius = ones(40, 40);
        let mut graph = SkeletonGraph::from_skeleton(&mask, &radius);
        assert_eq!(graph.bridge(&radius, 7.0, 30.0), 0);
    }

    #[test]
    fn simplify_reports_counts() {
        let mask = BinaryMask::from_fn(50, 30, |x, y| {
            (y == 20 && (5..=45).contains(&x)) || (x == 25 && (21..=24).contains(&y))
        });
        let radius = ones(50, 30);
        let mut graph = SkeletonGraph::from_skeleton(&mask, &radius);
        let mut ctx = TraceContext::unlimited();
        let counts = graph.simplify(params(12.0), &radius, &mut ctx);
        assert_eq!(
            counts,
            GraphCleanup {
                branches_before: 3,
                pruned: 1,
                micro_loops: 0,
                bridges: 0,
                branches_after: 1,
            }
        );
    }
}
