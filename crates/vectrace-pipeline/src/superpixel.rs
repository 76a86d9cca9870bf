//! Superpixel backend: color regions as closed polygons.
//!
//! The image is segmented with [`slic::segment`], then each region's outer
//! border is traced on a cropped mask of its label. Border pixels are
//! pushed half a pixel outwards, towards every 4-neighbour that belongs to
//! another region, so adjacent polygons meet along shared pixel edges
//! instead of leaving a one-pixel gap.

use geo::{Area, Coord, LineString, Polygon};
use image::{GrayImage, Luma};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::budget::TraceContext;
use crate::color::color_from_mean;
use crate::config::SuperpixelConfig;
use crate::contour::outer_rings;
use crate::diagnostics::StageMetrics;
use crate::raster::RasterImage;
use crate::simplify::{SimplifyAlgorithm, simplify};
use crate::slic::{self, RegionLabeling, SlicParams};
use crate::types::{Color, Paint, Point, Polyline, TracedPath};

/// How regions are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStyle {
    /// Filled polygons.
    #[default]
    Filled,
    /// Stroked outlines.
    Outlined,
}

/// The boundary of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygon {
    /// Region label.
    pub label: u32,
    /// Closed boundary.
    pub polyline: Polyline,
    /// Mean region color.
    pub color: Color,
    /// Pixels in the region.
    pub pixel_count: usize,
}

/// Segment `image` and trace every region boundary, largest region first.
#[must_use = "returns the region polygons"]
pub fn extract_regions(
    image: &RasterImage,
    config: &SuperpixelConfig,
    ctx: &mut TraceContext,
) -> Vec<RegionPolygon> {
    let params = SlicParams {
        requested: config.num_superpixels as usize,
        compactness: config.compactness,
        iterations: config.iterations,
        seeding: config.seeding,
        merge_threshold: config.merge_threshold,
    };
    let labeling = slic::segment(image, &params, ctx);
    let epsilon = config.simplify_boundaries.then_some(config.boundary_epsilon);

    ctx.stage("boundaries", |_| {
        let polygons = region_polygons(&labeling, epsilon);
        let metrics = StageMetrics::Boundaries {
            polygon_count: polygons.len(),
            total_point_count: polygons.iter().map(|p| p.polyline.len()).sum(),
        };
        (polygons, metrics)
    })
}

/// Paths for `regions`, painted with their mean color or `ink`.
///
/// Boundaries are already simplified, so the paths opt out of the global
/// simplification pass.
#[must_use]
pub fn to_traced(
    regions: Vec<RegionPolygon>,
    config: &SuperpixelConfig,
    ink: Color,
    stroke_width: f64,
) -> Vec<TracedPath> {
    regions
        .into_iter()
        .map(|region| {
            let color = if config.preserve_colors { region.color } else { ink };
            let paint = match config.region_style {
                RegionStyle::Filled => Paint::Fill(color),
                RegionStyle::Outlined => Paint::Stroke {
                    color,
                    width: stroke_width,
                },
            };
            TracedPath {
                polyline: region.polyline,
                widths: None,
                paint,
                simplify_epsilon: Some(0.0),
            }
        })
        .collect()
}

fn region_polygons(labeling: &RegionLabeling, epsilon: Option<f64>) -> Vec<RegionPolygon> {
    let (w, h) = (labeling.width(), labeling.height());
    let mut bounds = vec![[u32::MAX, u32::MAX, 0, 0]; labeling.region_count()];
    for y in 0..h {
        for x in 0..w {
            let b = &mut bounds[labeling.label(x, y) as usize];
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
    }

    let mut polygons: Vec<RegionPolygon> = labeling
        .regions()
        .par_iter()
        .zip(bounds.par_iter())
        .enumerate()
        .filter(|(_, (region, _))| region.pixel_count > 0)
        .map(|(label, (region, &bbox))| {
            #[allow(clippy::cast_possible_truncation)]
            let label = label as u32;
            let ring = boundary(labeling.labels(), w, h, label, bbox);
            let polyline = match epsilon {
                Some(eps) => simplify(&ring, SimplifyAlgorithm::Rdp, eps),
                None => ring,
            };
            RegionPolygon {
                label,
                polyline,
                color: color_from_mean(region.rgb),
                pixel_count: region.pixel_count,
            }
        })
        .collect();
    polygons.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count).then(a.label.cmp(&b.label)));
    polygons
}

/// Closed outline of `label` within `bbox` (`[x0, y0, x1, y1]`, inclusive).
fn boundary(labels: &[u32], w: u32, h: u32, label: u32, bbox: [u32; 4]) -> Polyline {
    let [x0, y0, x1, y1] = bbox;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let inside = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && x < i64::from(w)
            && y < i64::from(h)
            && labels[y as usize * w as usize + x as usize] == label
    };

    // One pixel of padding so borders on the crop edge are still traced.
    let crop = GrayImage::from_fn(x1 - x0 + 3, y1 - y0 + 3, |cx, cy| {
        let (x, y) = (i64::from(x0) + i64::from(cx) - 1, i64::from(y0) + i64::from(cy) - 1);
        Luma([if inside(x, y) { 255 } else { 0 }])
    });
    let ring = outer_rings(&crop)
        .into_iter()
        .max_by_key(Vec::len)
        .unwrap_or_default();

    let mut points: Vec<Point> = Vec::with_capacity(ring.len());
    for (cx, cy) in ring {
        let (x, y) = (i64::from(x0) + i64::from(cx) - 1, i64::from(y0) + i64::from(cy) - 1);
        let (mut ox, mut oy) = (0.0, 0.0);
        for (dx, dy) in [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)] {
            if !inside(x + i64::from(dx), y + i64::from(dy)) {
                ox += f64::from(dx);
                oy += f64::from(dy);
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let p = Point::new(0.5f64.mul_add(ox, x as f64), 0.5f64.mul_add(oy, y as f64));
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    if distinct(&points) < 3 {
        let (l, t) = (f64::from(x0) - 0.5, f64::from(y0) - 0.5);
        let (r, b) = (f64::from(x1) + 0.5, f64::from(y1) + 0.5);
        return Polyline::closed(vec![
            Point::new(l, t),
            Point::new(r, t),
            Point::new(r, b),
            Point::new(l, b),
        ]);
    }

    let ring: LineString<f64> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if Polygon::new(ring, Vec::new()).signed_area() < 0.0 {
        points.reverse();
    }
    Polyline::closed(points)
}

fn distinct(points: &[Point]) -> usize {
    let mut seen: Vec<&Point> = Vec::with_capacity(3);
    for p in points {
        if !seen.contains(&p) {
            seen.push(p);
            if seen.len() == 3 {
                break;
            }
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::types::Dimensions;

    fn bounds(points: &[Point]) -> (f64, f64, f64, f64) {
        points.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), p| (a.min(p.x), b.min(p.y), c.max(p.x), d.max(p.y)),
        )
    }

    #[test]
    fn full_region_outline_follows_pixel_edges() {
        let labels = vec![0; 12];
        let ring = boundary(&labels, 4, 3, 0, [0, 0, 3, 2]);
        assert!(ring.is_closed());
        assert_eq!(bounds(ring.points()), (-0.5, -0.5, 3.5, 2.5));
    }

    #[test]
    fn single_pixel_becomes_a_square() {
        let mut labels = vec![0; 9];
        labels[4] = 1;
        let ring = boundary(&labels, 3, 3, 1, [1, 1, 1, 1]);
        assert_eq!(ring.len(), 4);
        assert_eq!(bounds(ring.points()), (0.5, 0.5, 1.5, 1.5));
    }

    #[test]
    fn neighbouring_outlines_share_an_edge() {
        let labels: Vec<u32> = (0..20).map(|i| u32::from(i % 5 >= 2)).collect();
        let left = boundary(&labels, 5, 4, 0, [0, 0, 1, 3]);
        let right = boundary(&labels, 5, 4, 1, [2, 0, 4, 3]);
        assert!((bounds(left.points()).2 - 1.5).abs() < 1e-12);
        assert!((bounds(right.points()).0 - 1.5).abs() < 1e-12);
    }

    #[test]
    fn regions_cover_the_image_and_keep_their_colors() {
        let image = RasterImage::new(RgbaImage::from_fn(60, 40, |x, _| {
            if x < 30 { Rgba([200, 30, 30, 255]) } else { Rgba([30, 30, 200, 255]) }
        }));
        let config = SuperpixelConfig {
            num_superpixels: 24,
            ..SuperpixelConfig::default()
        };
        let mut ctx = TraceContext::unlimited();
        let regions = extract_regions(&image, &config, &mut ctx);
        let dims = Dimensions { width: 60, height: 40 };
        assert_eq!(regions.iter().map(|r| r.pixel_count).sum::<usize>(), dims.pixel_count());
        for pair in regions.windows(2) {
            assert!(pair[0].pixel_count >= pair[1].pixel_count);
        }
        for region in &regions {
            assert!(region.polyline.is_closed());
            assert!(region.polyline.len() >= 3);
            let c = region.color;
            assert!((c.r == 200 && c.b == 30) || (c.r == 30 && c.b == 200), "{c:?}");
        }

        let (_, stages, _) = ctx.finish();
        let names: Vec<&str> = stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(names, ["clustering", "region merge", "boundaries"]);
    }

    #[test]
    fn paint_follows_region_style() {
        let region = RegionPolygon {
            label: 0,
            polyline: Polyline::closed(vec![
                Point::new(0.0, 0.0),
                Point::new(4.0, 0.0),
                Point::new(4.0, 4.0),
            ]),
            color: Color::opaque(10, 20, 30),
            pixel_count: 16,
        };
        let filled = to_traced(vec![region.clone()], &SuperpixelConfig::default(), Color::BLACK, 1.5);
        assert_eq!(filled[0].paint, Paint::Fill(Color::opaque(10, 20, 30)));
        assert_eq!(filled[0].simplify_epsilon, Some(0.0));

        let outlined = SuperpixelConfig {
            region_style: RegionStyle::Outlined,
            preserve_colors: false,
            ..SuperpixelConfig::default()
        };
        let stroked = to_traced(vec![region], &outlined, Color::BLACK, 1.5);
        assert_eq!(
            stroked[0].paint,
            Paint::Stroke {
                color: Color::BLACK,
                width: 1.5
            }
        );
    }
}
