//! SVG export serializer.
//!
//! Converts a [`TraceResult`] into an SVG string using the [`svg`] crate
//! for document construction, XML escaping, and path data formatting.
//!
//! - Polylines become `<path>` elements with `M`/`L` commands (`Z` when
//!   closed).
//! - Cubic paths become `<path>` elements with `M`/`C` commands. A cubic
//!   path carrying per-joint widths is emitted as a `<g>` of one `<path>`
//!   per segment, each stroked with the mean of its two joint widths.
//! - Dots become `<circle>` elements.
//!
//! Optional [`SvgMetadata`] embeds `<title>` and `<desc>` elements for
//! accessibility and to help file managers identify exported files.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use vectrace_pipeline::{
    BezierPath, Color, CubicSegment, Dimensions, Geometry, Paint, PathRecord, Polyline,
    TraceResult,
};

/// Metadata to embed in the SVG document.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename (without extension).
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized trace configuration, embedded inside `<metadata>` so
    /// exported files carry their settings.
    pub config_json: Option<&'a str>,
}

/// Build an SVG path `d` attribute string from a polyline.
///
/// Uses `M` for the first point, `L` for the rest and `Z` for closed
/// polylines. Returns an empty string for polylines with fewer than 2
/// points.
///
/// # Examples
///
/// ```
/// use vectrace_pipeline::{Point, Polyline};
/// use vectrace_export::build_path_data;
///
/// let polyline = Polyline::new(vec![
///     Point::new(10.0, 20.0),
///     Point::new(30.0, 40.0),
/// ]);
/// let d = build_path_data(&polyline);
/// assert_eq!(d, "M10,20 L30,40");
/// ```
#[must_use]
pub fn build_path_data(polyline: &Polyline) -> String {
    let points = polyline.points();
    if points.len() < 2 {
        return String::new();
    }

    let first = &points[0];
    let mut data = Data::new().move_to((first.x, first.y));
    for p in &points[1..] {
        data = data.line_to((p.x, p.y));
    }
    if polyline.is_closed() {
        data = data.close();
    }
    String::from(Value::from(data))
}

/// Build an SVG path `d` attribute string from cubic segments.
///
/// Returns an empty string when there are no segments.
#[must_use]
pub fn build_bezier_data(segments: &[CubicSegment], closed: bool) -> String {
    let Some(first) = segments.first() else {
        return String::new();
    };
    let mut data = Data::new().move_to((first.p0.x, first.p0.y));
    for s in segments {
        data = data.cubic_curve_to(((s.p1.x, s.p1.y), (s.p2.x, s.p2.y), (s.p3.x, s.p3.y)));
    }
    if closed {
        data = data.close();
    }
    String::from(Value::from(data))
}

fn paint_path(path: Path, paint: Paint) -> Path {
    match paint {
        Paint::Fill(color) => {
            let path = path.set("fill", color.to_hex()).set("stroke", "none");
            with_opacity(path, "fill-opacity", color)
        }
        Paint::Stroke { color, width } => {
            let path = path
                .set("fill", "none")
                .set("stroke", color.to_hex())
                .set("stroke-width", width)
                .set("stroke-linecap", "round")
                .set("stroke-linejoin", "round");
            with_opacity(path, "stroke-opacity", color)
        }
    }
}

fn with_opacity<T: Node>(mut node: T, attribute: &str, color: Color) -> T {
    if color.a < u8::MAX {
        node.assign(attribute, color.opacity());
    }
    node
}

/// A stroked cubic path with per-joint widths, one `<path>` per segment.
fn variable_width(bezier: &BezierPath, widths: &[f64], color: Color) -> Group {
    let group = Group::new()
        .set("fill", "none")
        .set("stroke", color.to_hex())
        .set("stroke-linecap", "round");
    let mut group = with_opacity(group, "stroke-opacity", color);
    for (segment, pair) in bezier.segments().iter().zip(widths.windows(2)) {
        let d = build_bezier_data(std::slice::from_ref(segment), false);
        group.append(
            Path::new()
                .set("d", d)
                .set("stroke-width", (pair[0] + pair[1]) / 2.0),
        );
    }
    group
}

fn record_node(record: &PathRecord) -> Option<Box<dyn Node>> {
    match (&record.geometry, record.paint) {
        (Geometry::Polyline(polyline), paint) => {
            let d = build_path_data(polyline);
            (!d.is_empty()).then(|| Box::new(paint_path(Path::new().set("d", d), paint)) as Box<dyn Node>)
        }
        (Geometry::Bezier(bezier), Paint::Stroke { color, .. }) if bezier.widths().is_some() => {
            let widths = bezier.widths().unwrap_or_default();
            (!bezier.is_empty()).then(|| Box::new(variable_width(bezier, widths, color)) as Box<dyn Node>)
        }
        (Geometry::Bezier(bezier), paint) => {
            let d = build_bezier_data(bezier.segments(), bezier.is_closed());
            (!d.is_empty()).then(|| Box::new(paint_path(Path::new().set("d", d), paint)) as Box<dyn Node>)
        }
        (Geometry::Circle { center, radius }, paint) => {
            let circle = Circle::new()
                .set("cx", center.x)
                .set("cy", center.y)
                .set("r", *radius);
            let circle = match paint {
                Paint::Fill(color) => with_opacity(circle.set("fill", color.to_hex()), "fill-opacity", color),
                Paint::Stroke { color, width } => with_opacity(
                    circle
                        .set("fill", "none")
                        .set("stroke", color.to_hex())
                        .set("stroke-width", width),
                    "stroke-opacity",
                    color,
                ),
            };
            Some(Box::new(circle))
        }
    }
}

/// Serialize paths into a complete SVG document string.
///
/// The `viewBox` spans `dimensions` so coordinates map 1:1 to source
/// pixels. Paths are emitted in order, so later records paint over
/// earlier ones. Degenerate geometry (fewer than 2 points, no segments)
/// is skipped.
#[must_use]
pub fn to_svg(paths: &[PathRecord], dimensions: Dimensions, metadata: &SvgMetadata<'_>) -> String {
    let w = dimensions.width;
    let h = dimensions.height;
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("vectrace:config");
        config_el.assign("xmlns:vectrace", "https://vectrace.dev/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    for node in paths.iter().filter_map(record_node) {
        doc.append(node);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

/// Serialize a whole [`TraceResult`].
#[must_use]
pub fn result_to_svg(result: &TraceResult, metadata: &SvgMetadata<'_>) -> String {
    to_svg(&result.paths, result.dimensions, metadata)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vectrace_pipeline::Point;

    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions {
            width: w,
            height: h,
        }
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn stroke(polyline: Polyline) -> PathRecord {
        PathRecord::new(
            Geometry::Polyline(polyline),
            Paint::Stroke {
                color: Color::BLACK,
                width: 1.5,
            },
        )
    }

    fn open(points: &[(f64, f64)]) -> Polyline {
        Polyline::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_single_point() {
        assert_eq!(build_path_data(&open(&[(1.0, 2.0)])), "");
    }

    #[test]
    fn build_path_data_three_points() {
        let d = build_path_data(&open(&[(0.0, 0.0), (10.5, 20.3), (30.0, 40.0)]));
        assert_eq!(d, "M0,0 L10.5,20.3 L30,40");
    }

    #[test]
    fn closed_polyline_ends_with_z() {
        let square = Polyline::closed(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ]);
        let d = build_path_data(&square);
        assert!(d.starts_with("M0,0 L4,0"));
        assert!(d.ends_with('z') || d.ends_with('Z'), "{d}");
    }

    #[test]
    fn bezier_data_uses_cubic_commands() {
        let segment = CubicSegment::new(
            Point::new(0.0, 0.0),
            Point::new(1.0, 2.0),
            Point::new(3.0, 2.0),
            Point::new(4.0, 0.0),
        );
        assert_eq!(build_bezier_data(&[segment], false), "M0,0 C1,2,3,2,4,0");
        assert_eq!(build_bezier_data(&[], false), "");
    }

    // --- to_svg: document structure ---

    #[test]
    fn empty_result_produces_valid_svg_with_no_paths() {
        let svg = to_svg(&[], dims(100, 50), &no_meta());
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(svg.contains("viewBox=\"0 0 100 50\""));
        assert!(svg.contains("xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(!svg.contains("<path"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn degenerate_polylines_are_skipped() {
        let paths = [
            stroke(open(&[(1.0, 1.0)])),
            stroke(open(&[(0.0, 0.0), (5.0, 5.0)])),
        ];
        let svg = to_svg(&paths, dims(10, 10), &no_meta());
        assert_eq!(svg.matches("<path").count(), 1);
        assert!(svg.contains("stroke=\"#000000\""));
        assert!(svg.contains("stroke-width=\"1.5\""));
        assert!(svg.contains("fill=\"none\""));
    }

    #[test]
    fn filled_regions_use_their_color() {
        let region = PathRecord::new(
            Geometry::Polyline(Polyline::closed(vec![
                Point::new(0.0, 0.0),
                Point::new(5.0, 0.0),
                Point::new(5.0, 5.0),
            ])),
            Paint::Fill(Color::opaque(255, 0, 0)),
        );
        let svg = to_svg(&[region], dims(10, 10), &no_meta());
        assert!(svg.contains("fill=\"#ff0000\""));
        assert!(svg.contains("stroke=\"none\""));
        assert!(!svg.contains("fill-opacity"));
    }

    #[test]
    fn dots_become_circles_with_opacity() {
        let dot = PathRecord::new(
            Geometry::Circle {
                center: Point::new(3.0, 4.0),
                radius: 1.5,
            },
            Paint::Fill(Color::new(0, 0, 0, 128)),
        );
        let svg = to_svg(&[dot], dims(10, 10), &no_meta());
        assert!(svg.contains("<circle"));
        assert!(svg.contains("cx=\"3\""));
        assert!(svg.contains("cy=\"4\""));
        assert!(svg.contains("r=\"1.5\""));
        assert!(svg.contains("fill-opacity"));
    }

    #[test]
    fn shaped_dots_become_filled_closed_paths() {
        let dot = vectrace_pipeline::dots::Dot {
            center: Point::new(5.0, 5.0),
            radius: 2.0,
            color: Color::BLACK,
        };
        let record = dot.to_record(vectrace_pipeline::DotShape::Diamond);
        let svg = to_svg(&[record], dims(10, 10), &no_meta());
        assert!(!svg.contains("<circle"));
        assert!(svg.contains("<path"));
        assert!(svg.contains("M5,3 L7,5 L5,7 L3,5"), "{svg}");
        assert!(svg.contains("fill=\"#000000\""), "{svg}");
    }

    #[test]
    fn variable_width_curves_emit_one_path_per_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        let c = Point::new(20.0, 0.0);
        let bezier = BezierPath::new(vec![CubicSegment::line(a, b), CubicSegment::line(b, c)], false)
            .with_widths(vec![1.0, 3.0, 1.0]);
        let record = PathRecord::new(
            Geometry::Bezier(bezier),
            Paint::Stroke {
                color: Color::BLACK,
                width: 2.0,
            },
        );
        let svg = to_svg(&[record], dims(20, 10), &no_meta());
        assert!(svg.contains("<g"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert_eq!(svg.matches("stroke-width=\"2\"").count(), 2);
    }

    #[test]
    fn uniform_curves_are_a_single_path() {
        let bezier = BezierPath::new(
            vec![CubicSegment::line(Point::new(0.0, 0.0), Point::new(5.0, 5.0))],
            false,
        );
        let record = PathRecord::new(
            Geometry::Bezier(bezier),
            Paint::Stroke {
                color: Color::BLACK,
                width: 1.0,
            },
        );
        let svg = to_svg(&[record], dims(10, 10), &no_meta());
        assert_eq!(svg.matches("<path").count(), 1);
        assert!(svg.contains(" C"));
        assert!(!svg.contains("<g"));
    }

    // --- metadata ---

    #[test]
    fn title_and_desc_are_emitted_before_paths() {
        let meta = SvgMetadata {
            title: Some("cat"),
            description: Some("edge backend"),
            config_json: None,
        };
        let svg = to_svg(&[stroke(open(&[(0.0, 0.0), (1.0, 1.0)]))], dims(10, 10), &meta);
        let title = svg.find("<title>cat</title>").unwrap();
        let desc = svg.find("<desc>").unwrap();
        let path = svg.find("<path").unwrap();
        assert!(title < desc && desc < path);
        assert!(!svg.contains("<metadata"));
    }

    #[test]
    fn special_characters_in_title_are_escaped() {
        let meta = SvgMetadata {
            title: Some("a < b & c"),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&[], dims(10, 10), &meta);
        assert!(svg.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn config_json_is_embedded_in_metadata() {
        let meta = SvgMetadata {
            config_json: Some(r#"{"detail":0.5}"#),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&[], dims(10, 10), &meta);
        assert!(svg.contains("<metadata>"));
        assert!(svg.contains("vectrace:config"));
        assert!(svg.contains("detail"));
    }

    // --- end to end ---

    #[test]
    fn traced_square_exports_a_closed_path() {
        let image = image::RgbaImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let raster = vectrace_pipeline::RasterImage::new(image);
        let result =
            vectrace_pipeline::process(&raster, &vectrace_pipeline::TraceConfig::default()).unwrap();
        let svg = result_to_svg(&result, &no_meta());
        assert!(svg.contains("viewBox=\"0 0 60 60\""));
        assert_eq!(svg.matches("<path").count(), result.path_count);
    }
}
