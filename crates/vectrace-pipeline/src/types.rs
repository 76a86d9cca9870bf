//! Shared types for the vectrace tracing engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{TraceDiagnostics, duration_serde};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can build input rasters
/// without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation from `self` (at `t = 0`) to `other` (at `t = 1`).
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            t.mul_add(other.x - self.x, self.x),
            t.mul_add(other.y - self.y, self.y),
        )
    }

    /// Both coordinates multiplied by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// An ordered point sequence, either open or closed.
///
/// A closed polyline implicitly connects its last point back to the
/// first; the first point is *not* repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point>,
    closed: bool,
}

impl Polyline {
    /// Create a new open polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    /// Create a closed polyline (a ring) from a vector of points.
    #[must_use]
    pub const fn closed(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    /// Create a polyline with an explicit `closed` flag.
    #[must_use]
    pub const fn with_closed(points: Vec<Point>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// Whether the last point connects back to the first.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns the first point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    /// Returns the last point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Total arc length, including the closing segment of a ring.
    #[must_use]
    pub fn length(&self) -> f64 {
        let open: f64 = self
            .points
            .windows(2)
            .map(|w| w[0].distance(w[1]))
            .sum();
        match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) => open + last.distance(*first),
            _ => open,
        }
    }

    /// Whether the polyline satisfies the output invariant: at least two
    /// points when open, at least three when closed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        if self.closed {
            self.points.len() >= 3
        } else {
            self.points.len() >= 2
        }
    }

    /// The polyline with every coordinate multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            points: self.points.iter().map(|p| p.scaled(factor)).collect(),
            closed: self.closed,
        }
    }
}

/// A single cubic Bezier segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicSegment {
    /// Start point.
    pub p0: Point,
    /// First control point.
    pub p1: Point,
    /// Second control point.
    pub p2: Point,
    /// End point.
    pub p3: Point,
}

impl CubicSegment {
    /// Create a segment from its four control points.
    #[must_use]
    pub const fn new(p0: Point, p1: Point, p2: Point, p3: Point) -> Self {
        Self { p0, p1, p2, p3 }
    }

    /// A cubic that traces the straight line from `a` to `b`.
    #[must_use]
    pub fn line(a: Point, b: Point) -> Self {
        Self::new(a, a.lerp(b, 1.0 / 3.0), a.lerp(b, 2.0 / 3.0), b)
    }

    /// Evaluate the curve at parameter `t` in `[0, 1]`.
    #[must_use]
    pub fn eval(&self, t: f64) -> Point {
        let mt = 1.0 - t;
        let b0 = mt * mt * mt;
        let b1 = 3.0 * mt * mt * t;
        let b2 = 3.0 * mt * t * t;
        let b3 = t * t * t;
        Point::new(
            b3.mul_add(
                self.p3.x,
                b2.mul_add(self.p2.x, b0.mul_add(self.p0.x, b1 * self.p1.x)),
            ),
            b3.mul_add(
                self.p3.y,
                b2.mul_add(self.p2.y, b0.mul_add(self.p0.y, b1 * self.p1.y)),
            ),
        )
    }

    /// The segment with every control point multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.p0.scaled(factor),
            self.p1.scaled(factor),
            self.p2.scaled(factor),
            self.p3.scaled(factor),
        )
    }
}

/// An ordered chain of cubic segments.
///
/// Consecutive segments share their joint point: segment `i` ends exactly
/// where segment `i + 1` starts. When `widths` is present it holds one
/// stroke width per joint, i.e. `segments.len() + 1` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BezierPath {
    segments: Vec<CubicSegment>,
    closed: bool,
    widths: Option<Vec<f64>>,
}

impl BezierPath {
    /// Create a path from segments.
    #[must_use]
    pub const fn new(segments: Vec<CubicSegment>, closed: bool) -> Self {
        Self {
            segments,
            closed,
            widths: None,
        }
    }

    /// Straight-line cubic path through the points of `polyline`.
    ///
    /// Returns `None` for polylines that cannot form a segment.
    #[must_use]
    pub fn from_polyline(polyline: &Polyline) -> Option<Self> {
        let pts = polyline.points();
        if pts.len() < 2 {
            return None;
        }
        let mut segments: Vec<CubicSegment> = pts
            .windows(2)
            .map(|w| CubicSegment::line(w[0], w[1]))
            .collect();
        if polyline.is_closed() {
            segments.push(CubicSegment::line(pts[pts.len() - 1], pts[0]));
        }
        Some(Self::new(segments, polyline.is_closed()))
    }

    /// Attach per-joint stroke widths.
    ///
    /// Widths whose count does not match the joint count are discarded.
    #[must_use]
    pub fn with_widths(mut self, widths: Vec<f64>) -> Self {
        self.widths = (widths.len() == self.segments.len() + 1).then_some(widths);
        self
    }

    /// The cubic segments in order.
    #[must_use]
    pub fn segments(&self) -> &[CubicSegment] {
        &self.segments
    }

    /// Whether the path ends where it started.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Per-joint stroke widths, when the stroke is variable-width.
    #[must_use]
    pub fn widths(&self) -> Option<&[f64]> {
        self.widths.as_deref()
    }

    /// Number of segments.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the path has no segments.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Joint points: the start of every segment followed by the end of
    /// the last one.
    #[must_use]
    pub fn joints(&self) -> Vec<Point> {
        let mut joints: Vec<Point> = self.segments.iter().map(|s| s.p0).collect();
        if let Some(last) = self.segments.last() {
            joints.push(last.p3);
        }
        joints
    }

    /// Whether every segment starts exactly where the previous one ends.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        self.segments.windows(2).all(|w| w[0].p3 == w[1].p0)
    }

    /// The path with every coordinate and width multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            segments: self.segments.iter().map(|s| s.scaled(factor)).collect(),
            closed: self.closed,
            widths: self
                .widths
                .as_ref()
                .map(|w| w.iter().map(|v| v * factor).collect()),
        }
    }
}

/// The shape of one output path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Straight segments between points.
    Polyline(Polyline),
    /// Piecewise cubic curve.
    Bezier(BezierPath),
    /// A disc (used for stipple dots).
    Circle {
        /// Disc centre.
        center: Point,
        /// Disc radius in pixels.
        radius: f64,
    },
}

impl Geometry {
    /// Whether the geometry is a closed shape.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        match self {
            Self::Polyline(p) => p.is_closed(),
            Self::Bezier(b) => b.is_closed(),
            Self::Circle { .. } => true,
        }
    }

    /// Number of vertices (polyline points, Bezier joints, or 1 for a circle).
    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            Self::Polyline(p) => p.len(),
            Self::Bezier(b) => b.len() + 1,
            Self::Circle { .. } => 1,
        }
    }

    /// The geometry with every coordinate and size multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            Self::Polyline(p) => Self::Polyline(p.scaled(factor)),
            Self::Bezier(b) => Self::Bezier(b.scaled(factor)),
            Self::Circle { center, radius } => Self::Circle {
                center: center.scaled(factor),
                radius: radius * factor,
            },
        }
    }
}

/// An sRGB color with alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (255 = opaque).
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    /// Opaque white.
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    /// Create a color from all four channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb` hex notation (alpha is not included).
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Alpha as a fraction in `[0, 1]`.
    #[must_use]
    pub fn opacity(self) -> f64 {
        f64::from(self.a) / 255.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// How a path is painted: filled or stroked, never both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    /// Fill the interior.
    Fill(Color),
    /// Stroke the outline.
    Stroke {
        /// Stroke color.
        color: Color,
        /// Stroke width in pixels.
        width: f64,
    },
}

impl Paint {
    /// The paint color regardless of mode.
    #[must_use]
    pub const fn color(&self) -> Color {
        match *self {
            Self::Fill(color) | Self::Stroke { color, .. } => color,
        }
    }

    /// Whether this is a stroke.
    #[must_use]
    pub const fn is_stroke(&self) -> bool {
        matches!(self, Self::Stroke { .. })
    }
}

/// One path in the output list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    /// The path shape.
    pub geometry: Geometry,
    /// Fill or stroke attributes.
    pub paint: Paint,
}

impl PathRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(geometry: Geometry, paint: Paint) -> Self {
        Self { geometry, paint }
    }

    /// Whether the geometry is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.geometry.is_closed()
    }
}

/// A backend path on its way through simplification, fitting and
/// stylization.
///
/// `widths`, when present, holds one stroke width per point and follows
/// the points through every post-processing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedPath {
    /// The traced geometry.
    pub polyline: Polyline,
    /// Per-point stroke widths for variable-width strokes.
    pub widths: Option<Vec<f64>>,
    /// Fill or stroke attributes.
    pub paint: Paint,
    /// Simplification tolerance overriding the global one. `Some(0.0)`
    /// disables simplification for this path.
    pub simplify_epsilon: Option<f64>,
}

impl TracedPath {
    /// A stroked path with the global simplification tolerance.
    #[must_use]
    pub const fn stroked(polyline: Polyline, color: Color, width: f64) -> Self {
        Self {
            polyline,
            widths: None,
            paint: Paint::Stroke { color, width },
            simplify_epsilon: None,
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of the image diagonal in pixels.
    #[must_use]
    pub fn diagonal(self) -> f64 {
        f64::from(self.width).hypot(f64::from(self.height))
    }
}

/// Identifies which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    /// Gradient edges.
    Edge,
    /// Skeletal centerlines.
    Centerline,
    /// Color regions.
    Superpixel,
    /// Stipple dots.
    Dots,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Edge => "edge",
            Self::Centerline => "centerline",
            Self::Superpixel => "superpixel",
            Self::Dots => "dots",
        };
        f.write_str(name)
    }
}

/// A recoverable condition encountered during a conversion.
///
/// None of these fail the call: they are attached to an otherwise
/// successful [`TraceResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceNotice {
    /// The image carries no traceable content (zero size, nearly fully
    /// transparent, or a single solid color).
    DegenerateInput {
        /// Why the image was considered degenerate.
        reason: String,
    },
    /// The time budget ran out inside a stage; later refinement was skipped.
    Timeout {
        /// Stage that observed the exhausted budget.
        stage: String,
    },
    /// A stage could not reach its target and degraded gracefully.
    AlgorithmFailure {
        /// Stage that degraded.
        stage: String,
        /// What was achieved instead.
        detail: String,
    },
    /// An optional multi-pass variant was not run.
    PassSkipped {
        /// Name of the skipped pass.
        pass: String,
        /// Why it was skipped.
        reason: String,
    },
}

impl fmt::Display for TraceNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateInput { reason } => write!(f, "degenerate input: {reason}"),
            Self::Timeout { stage } => write!(f, "time budget exhausted during {stage}"),
            Self::AlgorithmFailure { stage, detail } => write!(f, "{stage} degraded: {detail}"),
            Self::PassSkipped { pass, reason } => write!(f, "{pass} pass skipped: {reason}"),
        }
    }
}

/// The output of one conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceResult {
    /// Output paths in paint order.
    pub paths: Vec<PathRecord>,
    /// Backend that produced the paths.
    pub backend: BackendId,
    /// Number of paths (equal to `paths.len()`).
    pub path_count: usize,
    /// Wall-clock time of the conversion (seconds).
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// `true` when the time budget cut refinement short.
    pub partial: bool,
    /// Recoverable conditions encountered along the way.
    pub notices: Vec<TraceNotice>,
    /// Dimensions of the source image (output coordinate space).
    pub dimensions: Dimensions,
    /// Per-stage timings and metrics.
    pub diagnostics: TraceDiagnostics,
}

impl TraceResult {
    /// Returns `true` if no paths were produced.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether a notice of the given kind was recorded.
    #[must_use]
    pub fn has_notice(&self, predicate: impl Fn(&TraceNotice) -> bool) -> bool {
        self.notices.iter().any(predicate)
    }
}

/// One out-of-range parameter or violated dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    /// Dotted path of the offending field, e.g. `edge.nms_low`.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ConfigViolation {
    /// Create a violation.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found while validating a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigErrors(Vec<ConfigViolation>);

impl ConfigErrors {
    /// Wrap a list of violations.
    #[must_use]
    pub const fn new(violations: Vec<ConfigViolation>) -> Self {
        Self(violations)
    }

    /// All violations in discovery order.
    #[must_use]
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.0
    }

    /// Number of violations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no violations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any violation concerns `field`.
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Errors that abort a conversion before any processing starts.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// One or more configuration parameters are invalid.
    #[error("invalid trace configuration: {0}")]
    InvalidConfig(ConfigErrors),

    /// The RGBA buffer does not match the stated dimensions.
    #[error("raster buffer of {actual} bytes does not match {width}x{height} RGBA ({expected} bytes)")]
    InvalidRaster {
        /// Stated width.
        width: u32,
        /// Stated height.
        height: u32,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
}

impl From<ConfigErrors> for TraceError {
    fn from(errors: ConfigErrors) -> Self {
        Self::InvalidConfig(errors)
    }
}

/// Serde-compatible proxy for `TraceError`.
///
/// Keeps the wire format independent of the `thiserror` derive.
#[derive(Serialize, Deserialize)]
enum TraceErrorProxy {
    InvalidConfig(Vec<ConfigViolation>),
    InvalidRaster {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl Serialize for TraceError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidConfig(errors) => TraceErrorProxy::InvalidConfig(errors.0.clone()),
            Self::InvalidRaster {
                width,
                height,
                expected,
                actual,
            } => TraceErrorProxy::InvalidRaster {
                width: *width,
                height: *height,
                expected: *expected,
                actual: *actual,
            },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TraceError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = TraceErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            TraceErrorProxy::InvalidConfig(v) => Self::InvalidConfig(ConfigErrors(v)),
            TraceErrorProxy::InvalidRaster {
                width,
                height,
                expected,
                actual,
            } => Self::InvalidRaster {
                width,
                height,
                expected,
                actual,
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_lerp_midpoint() {
        let m = Point::new(0.0, 0.0).lerp(Point::new(4.0, -2.0), 0.5);
        assert_eq!(m, Point::new(2.0, -1.0));
    }

    // --- Polyline tests ---

    #[test]
    fn polyline_length_counts_closing_segment() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 4.0),
        ];
        let open = Polyline::new(pts.clone());
        let ring = Polyline::closed(pts);
        assert!((open.length() - 7.0).abs() < 1e-12);
        assert!((ring.length() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn polyline_validity_depends_on_closed_flag() {
        let two = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert!(Polyline::new(two.clone()).is_valid());
        assert!(!Polyline::closed(two).is_valid());
        assert!(!Polyline::new(vec![Point::new(0.0, 0.0)]).is_valid());
    }

    // --- Bezier tests ---

    #[test]
    fn line_segment_evaluates_on_chord() {
        let seg = CubicSegment::line(Point::new(0.0, 0.0), Point::new(9.0, 3.0));
        let mid = seg.eval(0.5);
        assert!((mid.x - 4.5).abs() < 1e-12);
        assert!((mid.y - 1.5).abs() < 1e-12);
        assert_eq!(seg.eval(0.0), seg.p0);
        assert_eq!(seg.eval(1.0), seg.p3);
    }

    #[test]
    fn bezier_from_closed_polyline_wraps() {
        let ring = Polyline::closed(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
        ]);
        let path = BezierPath::from_polyline(&ring).unwrap();
        assert_eq!(path.len(), 3);
        assert!(path.is_continuous());
        assert_eq!(path.segments()[2].p3, Point::new(0.0, 0.0));
    }

    #[test]
    fn bezier_widths_must_match_joint_count() {
        let line = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        let path = BezierPath::from_polyline(&line).unwrap();
        assert!(path.clone().with_widths(vec![1.0]).widths().is_none());
        assert_eq!(path.with_widths(vec![1.0, 2.0]).widths(), Some(&[1.0, 2.0][..]));
    }

    // --- Color / paint tests ---

    #[test]
    fn color_hex() {
        assert_eq!(Color::opaque(255, 16, 0).to_hex(), "#ff1000");
        assert_eq!(Color::default(), Color::BLACK);
    }

    #[test]
    fn paint_reports_mode() {
        let fill = Paint::Fill(Color::WHITE);
        let stroke = Paint::Stroke {
            color: Color::BLACK,
            width: 1.5,
        };
        assert!(!fill.is_stroke());
        assert!(stroke.is_stroke());
        assert_eq!(stroke.color(), Color::BLACK);
    }

    // --- TraceError tests ---

    #[test]
    fn config_errors_display_lists_every_violation() {
        let errors = ConfigErrors::new(vec![
            ConfigViolation::new("detail", "must be within [0, 1]"),
            ConfigViolation::new("edge.nms_low", "must not exceed edge.nms_high"),
        ]);
        let err = TraceError::from(errors);
        assert_eq!(
            err.to_string(),
            "invalid trace configuration: detail: must be within [0, 1]; edge.nms_low: must not exceed edge.nms_high",
        );
    }

    #[test]
    fn trace_error_serde_round_trip() {
        let err = TraceError::InvalidRaster {
            width: 2,
            height: 2,
            expected: 16,
            actual: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: TraceError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), err.to_string());
    }

    #[test]
    fn backend_id_display() {
        assert_eq!(BackendId::Superpixel.to_string(), "superpixel");
    }
}
