//! SLIC superpixel segmentation in CIE Lab.
//!
//! Cluster centres are seeded on a grid or by blue-noise sampling, nudged
//! off strong edges, then refined by alternating assignment and update
//! steps. Each pixel only looks at centres within about two grid spacings,
//! found through a bucket grid, so one iteration is linear in the pixel
//! count. Assignment is row-parallel.
//!
//! Clustering alone does not guarantee connected regions, so fragments
//! smaller than a quarter of a grid cell are absorbed by their largest
//! neighbour. Adjacent regions with similar mean colors are then merged,
//! in ascending order of color distance, down to 70% of the achievable
//! region count.

use std::collections::{HashMap, HashSet};

use petgraph::unionfind::UnionFind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::budget::TraceContext;
use crate::color::{Lab, composite_over_white};
use crate::diagnostics::StageMetrics;
use crate::raster::RasterImage;
use crate::types::{Point, TraceNotice};

/// Seed for the blue-noise sampler; clustering is deterministic.
const SAMPLER_SEED: u64 = 0x5eed_51_1c;

/// Smallest number of pixels a region can have.
const MIN_REGION_PIXELS: usize = 4;

/// Minimum distance between blue-noise seeds, in grid spacings.
const POISSON_SPACING: f64 = 0.7;

/// Dart-throwing attempts per requested seed.
const POISSON_ATTEMPTS: usize = 50;

/// Row pitch of a hexagonal lattice relative to its column pitch.
const HEX_ROW_PITCH: f64 = 0.866_025_403_784_438_6;

/// Square-grid jitter, in grid spacings.
const SQUARE_JITTER: f64 = 0.1;

/// Fraction of the achievable count that merging never goes below.
const COUNT_TOLERANCE: f64 = 0.7;

/// Initial placement of cluster centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seeding {
    /// Jittered square grid. Fastest; prone to diagonal artifacts.
    Square,
    /// Hexagonal lattice with alternate rows offset by half a pitch.
    Hexagonal,
    /// Blue-noise dart throwing, topped up from a square grid.
    #[default]
    Poisson,
}

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicParams {
    /// Requested number of regions.
    pub requested: usize,
    /// Weight of spatial distance against color distance.
    pub compactness: f32,
    /// Iteration cap.
    pub iterations: u32,
    /// Centre placement.
    pub seeding: Seeding,
    /// Adjacent regions closer than this ΔE are merged.
    pub merge_threshold: f32,
}

/// Statistics of one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Mean Lab color.
    pub color: Lab,
    /// Mean sRGB color composited over white.
    pub rgb: [f64; 3],
    /// Mean pixel position.
    pub centroid: Point,
    /// Number of pixels.
    pub pixel_count: usize,
}

/// One label per pixel plus a table of region statistics.
///
/// Labels are dense: every value in `[0, region_count)` is used.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLabeling {
    width: u32,
    height: u32,
    labels: Vec<u32>,
    regions: Vec<Region>,
}

impl RegionLabeling {
    /// Compute region statistics for dense `labels` over `image`.
    #[allow(clippy::cast_precision_loss)]
    fn from_dense(image: &RasterImage, labels: Vec<u32>, count: usize) -> Self {
        let (w, h) = (image.width(), image.height());
        let lab = image.lab();
        let mut sums = vec![[0.0f64; 8]; count];
        for (i, &label) in labels.iter().enumerate() {
            let (x, y) = (i % w as usize, i / w as usize);
            #[allow(clippy::cast_possible_truncation)]
            let rgb = composite_over_white(image.pixel(x as u32, y as u32));
            let s = &mut sums[label as usize];
            s[0] += f64::from(lab[i].l);
            s[1] += f64::from(lab[i].a);
            s[2] += f64::from(lab[i].b);
            s[3] += f64::from(rgb[0]);
            s[4] += f64::from(rgb[1]);
            s[5] += f64::from(rgb[2]);
            s[6] += x as f64;
            s[7] += y as f64;
        }
        let mut counts = vec![0usize; count];
        for &label in &labels {
            counts[label as usize] += 1;
        }
        let regions = sums
            .iter()
            .zip(&counts)
            .map(|(s, &n)| {
                let d = n.max(1) as f64;
                #[allow(clippy::cast_possible_truncation)]
                let color = Lab::new((s[0] / d) as f32, (s[1] / d) as f32, (s[2] / d) as f32);
                Region {
                    color,
                    rgb: [s[3] / d, s[4] / d, s[5] / d],
                    centroid: Point::new(s[6] / d, s[7] / d),
                    pixel_count: n,
                }
            })
            .collect();
        Self {
            width: w,
            height: h,
            labels,
            regions,
        }
    }

    /// Image width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Label of the pixel at `(x, y)`.
    #[must_use]
    pub fn label(&self, x: u32, y: u32) -> u32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// Row-major labels.
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Region statistics indexed by label.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    color: Lab,
    x: f64,
    y: f64,
}

/// Segment `image` into superpixels.
#[must_use = "returns the region labeling"]
#[allow(clippy::cast_precision_loss)]
pub fn segment(image: &RasterImage, params: &SlicParams, ctx: &mut TraceContext) -> RegionLabeling {
    let (w, h) = (image.width(), image.height());
    let n = w as usize * h as usize;
    if n == 0 {
        return RegionLabeling::from_dense(image, Vec::new(), 0);
    }
    let requested = params.requested.max(1);
    let achievable = requested.min(n / MIN_REGION_PIXELS).max(1);
    let spacing = (n as f64 / achievable as f64).sqrt().max(1.0);

    let labels = ctx.stage("clustering", |ctx| {
        let mut rng = StdRng::seed_from_u64(SAMPLER_SEED);
        let seeds = seed_positions(params.seeding, w, h, achievable, spacing, &mut rng);
        let seed_count = seeds.len();
        let (labels, iterations, converged) = cluster(image, seeds, spacing, params, ctx);
        let metrics = StageMetrics::Clustering {
            requested,
            seeds: seed_count,
            iterations,
            converged,
        };
        (labels, metrics)
    });

    let floor = (COUNT_TOLERANCE * achievable as f64).ceil() as usize;
    let labeling = ctx.stage("region merge", |_| {
        let min_size = ((spacing * spacing / 4.0) as usize).max(1);
        let (dense, count) = enforce_connectivity(&labels, w, h, min_size);
        let connected = RegionLabeling::from_dense(image, dense, count);
        let regions_before = connected.region_count();
        let merged = merge_similar(image, &connected, params.merge_threshold, floor);
        let metrics = StageMetrics::RegionMerge {
            regions_before,
            regions_after: merged.region_count(),
        };
        (merged, metrics)
    });

    let minimum = (COUNT_TOLERANCE * requested as f64).ceil() as usize;
    if achievable < requested || labeling.region_count() < minimum {
        ctx.notice(TraceNotice::AlgorithmFailure {
            stage: "superpixel".to_string(),
            detail: format!(
                "{} regions for {requested} requested ({achievable} achievable)",
                labeling.region_count()
            ),
        });
    }
    labeling
}

/// Initial centre positions for `count` clusters at grid `spacing`.
#[must_use]
pub fn seed_positions(
    seeding: Seeding,
    w: u32,
    h: u32,
    count: usize,
    spacing: f64,
    rng: &mut StdRng,
) -> Vec<Point> {
    match seeding {
        Seeding::Square => square_grid(w, h, spacing)
            .into_iter()
            .map(|p| {
                let jitter = SQUARE_JITTER * spacing;
                let dx = rng.gen_range(-jitter..=jitter);
                let dy = rng.gen_range(-jitter..=jitter);
                clamp_to(Point::new(p.x + dx, p.y + dy), w, h)
            })
            .collect(),
        Seeding::Hexagonal => hex_grid(w, h, spacing),
        Seeding::Poisson => poisson(w, h, count, spacing, rng),
    }
}

fn clamp_to(p: Point, w: u32, h: u32) -> Point {
    Point::new(
        p.x.clamp(0.0, f64::from(w) - 1.0),
        p.y.clamp(0.0, f64::from(h) - 1.0),
    )
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn square_grid(w: u32, h: u32, spacing: f64) -> Vec<Point> {
    let (fw, fh) = (f64::from(w), f64::from(h));
    let cols = (fw / spacing).round().max(1.0) as usize;
    let rows = (fh / spacing).round().max(1.0) as usize;
    let mut points = Vec::with_capacity(cols * rows);
    for r in 0..rows {
        for c in 0..cols {
            points.push(Point::new(
                (c as f64 + 0.5) * fw / cols as f64,
                (r as f64 + 0.5) * fh / rows as f64,
            ));
        }
    }
    points
}

#[allow(clippy::cast_precision_loss)]
fn hex_grid(w: u32, h: u32, spacing: f64) -> Vec<Point> {
    // Same area per cell as a square grid of `spacing`.
    let pitch = spacing / HEX_ROW_PITCH.sqrt();
    let row_pitch = pitch * HEX_ROW_PITCH;
    let (fw, fh) = (f64::from(w), f64::from(h));
    let mut points = Vec::new();
    let mut row = 0usize;
    loop {
        let y = (row as f64 + 0.5) * row_pitch;
        if y >= fh {
            break;
        }
        let offset = if row % 2 == 1 { 0.5 } else { 0.0 };
        let mut col = 0usize;
        loop {
            let x = (col as f64 + 0.5 + offset) * pitch;
            if x >= fw {
                break;
            }
            points.push(Point::new(x, y));
            col += 1;
        }
        row += 1;
    }
    if points.is_empty() {
        points.push(Point::new(fw / 2.0, fh / 2.0));
    }
    points
}

fn poisson(w: u32, h: u32, count: usize, spacing: f64, rng: &mut StdRng) -> Vec<Point> {
    let min_dist = POISSON_SPACING * spacing;
    let mut tree: RTree<[f64; 2]> = RTree::new();
    let mut seeds = Vec::with_capacity(count);
    let (fw, fh) = (f64::from(w), f64::from(h));
    for _ in 0..count * POISSON_ATTEMPTS {
        if seeds.len() >= count {
            break;
        }
        let p = [rng.gen_range(0.0..fw), rng.gen_range(0.0..fh)];
        if tree.locate_within_distance(p, min_dist * min_dist).next().is_none() {
            tree.insert(p);
            seeds.push(Point::new(p[0], p[1]));
        }
    }
    let fill = min_dist / 2.0;
    for g in square_grid(w, h, spacing) {
        if seeds.len() >= count {
            break;
        }
        let p = [g.x, g.y];
        if tree.locate_within_distance(p, fill * fill).next().is_none() {
            tree.insert(p);
            seeds.push(g);
        }
    }
    seeds
}

/// Run the assignment/update loop. Returns labels (one centre index per
/// pixel), iterations completed and whether assignment converged.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cluster(
    image: &RasterImage,
    seeds: Vec<Point>,
    spacing: f64,
    params: &SlicParams,
    ctx: &mut TraceContext,
) -> (Vec<u32>, u32, bool) {
    let (w, h) = (image.width(), image.height());
    let lab = image.lab();
    let at = |x: i64, y: i64| {
        let x = x.clamp(0, i64::from(w) - 1) as usize;
        let y = y.clamp(0, i64::from(h) - 1) as usize;
        lab[y * w as usize + x]
    };

    // Move each seed to the lowest-gradient pixel of its 3x3 neighbourhood.
    let mut centers: Vec<Center> = seeds
        .iter()
        .map(|p| {
            let (sx, sy) = (p.x.floor() as i64, p.y.floor() as i64);
            let mut best = (f32::INFINITY, sx, sy);
            for y in sy - 1..=sy + 1 {
                for x in sx - 1..=sx + 1 {
                    if x < 0 || y < 0 || x >= i64::from(w) || y >= i64::from(h) {
                        continue;
                    }
                    let g = at(x + 1, y).distance_squared(at(x - 1, y))
                        + at(x, y + 1).distance_squared(at(x, y - 1));
                    if g < best.0 {
                        best = (g, x, y);
                    }
                }
            }
            let (x, y) = (best.1.clamp(0, i64::from(w) - 1), best.2.clamp(0, i64::from(h) - 1));
            Center {
                color: at(x, y),
                x: x as f64,
                y: y as f64,
            }
        })
        .collect();

    let weight = f64::from(params.compactness) / spacing;
    let cells_x = (f64::from(w) / spacing).ceil().max(1.0) as usize;
    let cells_y = (f64::from(h) / spacing).ceil().max(1.0) as usize;
    let mut labels = vec![u32::MAX; lab.len()];
    let mut iterations = 0;
    let mut converged = false;

    loop {
        let mut buckets = vec![Vec::new(); cells_x * cells_y];
        for (i, c) in centers.iter().enumerate() {
            let bx = ((c.x / spacing) as usize).min(cells_x - 1);
            let by = ((c.y / spacing) as usize).min(cells_y - 1);
            buckets[by * cells_x + bx].push(i);
        }
        let distance = |c: &Center, x: u32, y: u32, color: Lab| {
            let spatial = (c.x - f64::from(x)).hypot(c.y - f64::from(y));
            f64::from(c.color.distance(color)) + weight * spatial
        };

        let previous = labels.clone();
        let changed: usize = labels
            .par_chunks_mut(w as usize)
            .zip(previous.par_chunks(w as usize))
            .enumerate()
            .map(|(y, (row, old))| {
                let y = y as u32;
                let by = ((f64::from(y) / spacing) as usize).min(cells_y - 1);
                let mut changed = 0;
                for (x, (out, &was)) in (0u32..).zip(row.iter_mut().zip(old)) {
                    let color = lab[y as usize * w as usize + x as usize];
                    let bx = ((f64::from(x) / spacing) as usize).min(cells_x - 1);
                    let mut best = (f64::INFINITY, u32::MAX);
                    for cy in by.saturating_sub(2)..=(by + 2).min(cells_y - 1) {
                        for cx in bx.saturating_sub(2)..=(bx + 2).min(cells_x - 1) {
                            for &i in &buckets[cy * cells_x + cx] {
                                let d = distance(&centers[i], x, y, color);
                                if d < best.0 {
                                    best = (d, i as u32);
                                }
                            }
                        }
                    }
                    if best.1 == u32::MAX {
                        for (i, c) in centers.iter().enumerate() {
                            let d = distance(c, x, y, color);
                            if d < best.0 {
                                best = (d, i as u32);
                            }
                        }
                    }
                    *out = best.1;
                    if best.1 != was {
                        changed += 1;
                    }
                }
                changed
            })
            .sum();

        let mut sums = vec![[0.0f64; 6]; centers.len()];
        for (i, &label) in labels.iter().enumerate() {
            let s = &mut sums[label as usize];
            s[0] += f64::from(lab[i].l);
            s[1] += f64::from(lab[i].a);
            s[2] += f64::from(lab[i].b);
            s[3] += (i % w as usize) as f64;
            s[4] += (i / w as usize) as f64;
            s[5] += 1.0;
        }
        for (c, s) in centers.iter_mut().zip(&sums) {
            if s[5] > 0.0 {
                c.color = Lab::new((s[0] / s[5]) as f32, (s[1] / s[5]) as f32, (s[2] / s[5]) as f32);
                c.x = s[3] / s[5];
                c.y = s[4] / s[5];
            }
        }

        iterations += 1;
        if changed == 0 {
            converged = true;
            break;
        }
        if iterations >= params.iterations {
            break;
        }
        if ctx.is_exhausted() {
            ctx.timeout("clustering");
            break;
        }
    }
    (labels, iterations, converged)
}

/// Absorb 4-connected fragments smaller than `min_size` into their
/// largest neighbouring region and relabel densely. Returns the labels
/// and the region count.
#[must_use]
pub fn enforce_connectivity(labels: &[u32], w: u32, h: u32, min_size: usize) -> (Vec<u32>, usize) {
    let (w, h) = (w as usize, h as usize);
    let n = labels.len();
    let mut component = vec![usize::MAX; n];
    let mut sizes: Vec<usize> = Vec::new();
    let mut stack = Vec::new();
    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        let id = sizes.len();
        let mut size = 0;
        component[start] = id;
        stack.push(start);
        while let Some(i) = stack.pop() {
            size += 1;
            let (x, y) = (i % w, i / w);
            let mut visit = |j: usize| {
                if component[j] == usize::MAX && labels[j] == labels[i] {
                    component[j] = id;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }
        sizes.push(size);
    }

    let count = sizes.len();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for i in 0..n {
        let (x, y) = (i % w, i / w);
        let right = (x + 1 < w).then_some(i + 1);
        let down = (y + 1 < h).then_some(i + w);
        for j in [right, down].into_iter().flatten() {
            let (a, b) = (component[i], component[j]);
            if a != b && seen.insert((a.min(b), a.max(b))) {
                neighbours[a].push(b);
                neighbours[b].push(a);
            }
        }
    }

    let mut order: Vec<usize> = (0..count).filter(|&c| sizes[c] < min_size).collect();
    order.sort_by_key(|&c| (sizes[c], c));
    let mut uf = UnionFind::<usize>::new(count);
    let mut group_size = sizes;
    for c in order {
        let root = uf.find_mut(c);
        if group_size[root] >= min_size {
            continue;
        }
        let mut target: Option<usize> = None;
        for &nb in &neighbours[c] {
            let r = uf.find_mut(nb);
            if r != root && target.is_none_or(|t| group_size[r] > group_size[t]) {
                target = Some(r);
            }
        }
        if let Some(target) = target {
            let size = group_size[root] + group_size[target];
            uf.union(root, target);
            let merged = uf.find_mut(root);
            group_size[merged] = size;
        }
    }

    let groups: Vec<usize> = component.iter().map(|&c| uf.find_mut(c)).collect();
    dense_relabel(&groups)
}

/// Renumber `groups` in order of first appearance.
fn dense_relabel(groups: &[usize]) -> (Vec<u32>, usize) {
    let mut map = HashMap::new();
    let labels = groups
        .iter()
        .map(|&g| {
            let next = map.len();
            #[allow(clippy::cast_possible_truncation)]
            let label = *map.entry(g).or_insert(next) as u32;
            label
        })
        .collect();
    (labels, map.len())
}

/// Merge adjacent regions closer than `threshold` ΔE, most similar first,
/// without going below `floor` regions.
#[must_use]
pub fn merge_similar(image: &RasterImage, labeling: &RegionLabeling, threshold: f32, floor: usize) -> RegionLabeling {
    let (w, h) = (labeling.width as usize, labeling.height as usize);
    let labels = &labeling.labels;
    let mut pairs: HashSet<(u32, u32)> = HashSet::new();
    for i in 0..labels.len() {
        let (x, y) = (i % w, i / w);
        let right = (x + 1 < w).then_some(i + 1);
        let down = (y + 1 < h).then_some(i + w);
        for j in [right, down].into_iter().flatten() {
            let (a, b) = (labels[i], labels[j]);
            if a != b {
                pairs.insert((a.min(b), a.max(b)));
            }
        }
    }
    let regions = &labeling.regions;
    let mut candidates: Vec<(f32, u32, u32)> = pairs
        .into_iter()
        .map(|(a, b)| (regions[a as usize].color.distance(regions[b as usize].color), a, b))
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    let mut uf = UnionFind::<usize>::new(regions.len());
    let mut count = regions.len();
    for (d, a, b) in candidates {
        if d >= threshold || count <= floor {
            break;
        }
        if uf.union(a as usize, b as usize) {
            count -= 1;
        }
    }
    if count == regions.len() {
        return labeling.clone();
    }
    let groups: Vec<usize> = labels.iter().map(|&l| uf.find_mut(l as usize)).collect();
    let (dense, count) = dense_relabel(&groups);
    RegionLabeling::from_dense(image, dense, count)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::budget::TimeBudget;

    fn params(requested: usize) -> SlicParams {
        SlicParams {
            requested,
            compactness: 10.0,
            iterations: 10,
            seeding: Seeding::Poisson,
            merge_threshold: 6.0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn gradient_image(w: u32, h: u32) -> RasterImage {
        RasterImage::new(RgbaImage::from_fn(w, h, |x, y| {
            let r = (x * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = if (x / 30 + y / 30) % 2 == 0 { 40 } else { 200 };
            Rgba([r, g, b, 255])
        }))
    }

    fn assert_covers(labeling: &RegionLabeling, n: usize) {
        assert_eq!(labeling.labels().len(), n);
        let count = labeling.region_count();
        assert!(labeling.labels().iter().all(|&l| (l as usize) < count));
        let total: usize = labeling.regions().iter().map(|r| r.pixel_count).sum();
        assert_eq!(total, n);
        assert!(labeling.regions().iter().all(|r| r.pixel_count > 0));
    }

    #[test]
    fn labels_cover_the_image_densely() {
        let image = gradient_image(60, 40);
        let mut ctx = TraceContext::unlimited();
        let labeling = segment(&image, &params(30), &mut ctx);
        assert_covers(&labeling, 60 * 40);
    }

    #[test]
    fn region_count_is_within_tolerance() {
        for seeding in [Seeding::Poisson, Seeding::Hexagonal, Seeding::Square] {
            let image = gradient_image(120, 90);
            let mut ctx = TraceContext::unlimited();
            let labeling = segment(&image, &SlicParams { seeding, ..params(50) }, &mut ctx);
            let count = labeling.region_count();
            assert!((35..=65).contains(&count), "{seeding:?}: {count} regions");
            assert_covers(&labeling, 120 * 90);
        }
    }

    #[test]
    fn two_colors_never_share_a_region() {
        let image = RasterImage::new(RgbaImage::from_fn(40, 30, |x, _| {
            if x < 20 { Rgba([220, 20, 20, 255]) } else { Rgba([20, 20, 220, 255]) }
        }));
        let mut ctx = TraceContext::unlimited();
        let labeling = segment(&image, &params(20), &mut ctx);
        let count = labeling.region_count();
        assert!((14..=26).contains(&count), "{count} regions");
        for region in labeling.regions() {
            let reddish = (region.rgb[0] - 220.0).abs() < 20.0 && (region.rgb[2] - 20.0).abs() < 20.0;
            let bluish = (region.rgb[2] - 220.0).abs() < 20.0 && (region.rgb[0] - 20.0).abs() < 20.0;
            assert!(reddish || bluish, "{region:?}");
        }
    }

    #[test]
    fn small_images_report_a_degraded_count() {
        let image = gradient_image(10, 8);
        let mut ctx = TraceContext::unlimited();
        let labeling = segment(&image, &params(150), &mut ctx);
        assert!(labeling.region_count() < 80);
        assert_covers(&labeling, 80);
        assert!(
            ctx.notices()
                .iter()
                .any(|n| matches!(n, TraceNotice::AlgorithmFailure { .. }))
        );
    }

    #[test]
    fn exhausted_budget_still_labels_every_pixel() {
        let image = gradient_image(50, 50);
        let mut ctx = TraceContext::new(TimeBudget::new(0));
        let labeling = segment(&image, &params(25), &mut ctx);
        assert_covers(&labeling, 2500);
        assert!(ctx.is_partial());
    }

    #[test]
    fn seeds_stay_inside_the_image() {
        let mut rng = StdRng::seed_from_u64(7);
        for seeding in [Seeding::Poisson, Seeding::Hexagonal, Seeding::Square] {
            let seeds = seed_positions(seeding, 100, 60, 60, 10.0, &mut rng);
            assert!((42..=78).contains(&seeds.len()), "{seeding:?}: {}", seeds.len());
            for p in &seeds {
                assert!((0.0..100.0).contains(&p.x) && (0.0..60.0).contains(&p.y), "{p:?}");
            }
        }
    }

    #[test]
    fn stray_fragment_joins_its_neighbour() {
        // Label 1 owns the bottom rows and a lone pixel in the middle.
        let labels: Vec<u32> = (0..100)
            .map(|i| {
                let (x, y) = (i % 10, i / 10);
                u32::from(y >= 8 || (x, y) == (5, 4))
            })
            .collect();
        let (dense, count) = enforce_connectivity(&labels, 10, 10, 4);
        assert_eq!(count, 2);
        assert_eq!(dense[4 * 10 + 5], dense[0]);
        assert_ne!(dense[9 * 10], dense[0]);
    }
}
