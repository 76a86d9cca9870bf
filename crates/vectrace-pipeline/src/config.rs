//! Trace configuration, validation, and the detail-driven threshold mapping.
//!
//! A [`TraceConfig`] is a plain data bundle. [`TraceConfig::validate`]
//! checks every range and every feature dependency and reports *all*
//! violations at once; [`process`](crate::process) calls it before any
//! pixel is touched.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::dots::DotShape;
use crate::simplify::SimplifyAlgorithm;
use crate::slic::Seeding;
use crate::style::StyleConfig;
use crate::superpixel::RegionStyle;
use crate::types::{BackendId, Color, ConfigErrors, ConfigViolation, Dimensions};

/// Diagonal of a 1920x1080 frame, the reference for stroke scaling.
const REFERENCE_DIAGONAL: f64 = 2_202.907_170_082_298;

/// Top-level configuration for one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Which backend to run, with its parameters.
    pub backend: BackendConfig,
    /// Global detail level in `[0, 1]`; higher keeps more structure.
    pub detail: f32,
    /// Stroke width in pixels for a 1080p image, scaled by image diagonal.
    pub stroke_px_at_1080p: f32,
    /// Sample the source color under each line instead of using `ink`.
    pub line_preserve_colors: bool,
    /// Fixed color for strokes and dots when colors are not preserved.
    pub ink: Color,
    /// Apply an edge-preserving bilateral filter before blurring.
    pub denoise: bool,
    /// Wall-clock budget; iterative stages stop early once it is spent.
    pub max_processing_time_ms: u64,
    /// Longest side allowed before the input is downsampled.
    pub max_image_size: u32,
    /// Path simplification settings.
    pub simplify: SimplifyConfig,
    /// Cubic curve fitting settings.
    pub fit: FitConfig,
    /// Optional hand-drawn stroke stylization.
    pub style: Option<StyleConfig>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            detail: 0.5,
            stroke_px_at_1080p: 1.2,
            line_preserve_colors: false,
            ink: Color::BLACK,
            denoise: false,
            max_processing_time_ms: 300_000,
            max_image_size: 4096,
            simplify: SimplifyConfig::default(),
            fit: FitConfig::default(),
            style: None,
        }
    }
}

impl TraceConfig {
    /// Default configuration for the given backend.
    #[must_use]
    pub fn for_backend(backend: BackendConfig) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Check every parameter range and feature dependency.
    ///
    /// # Errors
    ///
    /// Returns every violation found, not just the first.
    pub fn validate(&self) -> Result<(), ConfigErrors> {
        let mut v = Validator::default();

        v.range("detail", self.detail, 0.0, 1.0);
        v.range("stroke_px_at_1080p", self.stroke_px_at_1080p, 0.1, 50.0);
        v.range(
            "max_processing_time_ms",
            self.max_processing_time_ms,
            1,
            3_600_000,
        );
        v.range("max_image_size", self.max_image_size, 64, 16_384);
        if let Some(epsilon) = self.simplify.epsilon {
            v.range("simplify.epsilon", epsilon, 0.0, 100.0);
        }
        self.fit.validate(&mut v);
        if let Some(style) = &self.style {
            style.validate(&mut v);
        }

        match &self.backend {
            BackendConfig::Edge(edge) => {
                edge.validate(&mut v);
                v.require(
                    !self.fit.enabled || edge.enable_flow_tracing,
                    "fit.enabled",
                    "curve fitting on the edge backend requires edge.enable_flow_tracing",
                );
            }
            BackendConfig::Centerline(centerline) => centerline.validate(&mut v),
            BackendConfig::Superpixel(superpixel) => {
                superpixel.validate(&mut v);
                v.require(
                    self.style.is_none() || superpixel.region_style == RegionStyle::Outlined,
                    "style",
                    "stylization needs stroked output; filled superpixel regions have none",
                );
            }
            BackendConfig::Dots(dots) => {
                dots.validate(&mut v);
                v.require(
                    self.style.is_none(),
                    "style",
                    "stylization needs stroked output; dots are filled",
                );
            }
        }

        v.finish()
    }

    /// Stroke width in pixels for an image of the given size.
    #[must_use]
    pub fn stroke_width(&self, dimensions: Dimensions) -> f64 {
        (f64::from(self.stroke_px_at_1080p) * dimensions.diagonal() / REFERENCE_DIAGONAL)
            .clamp(0.5, 10.0)
    }
}

/// Backend selection. Exactly one backend runs per conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Gradient edges.
    Edge(EdgeConfig),
    /// Skeletal centerlines.
    Centerline(CenterlineConfig),
    /// Color regions.
    Superpixel(SuperpixelConfig),
    /// Stipple dots.
    Dots(DotsConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Edge(EdgeConfig::default())
    }
}

impl BackendConfig {
    /// Identifier of the selected backend.
    #[must_use]
    pub const fn id(&self) -> BackendId {
        match self {
            Self::Edge(_) => BackendId::Edge,
            Self::Centerline(_) => BackendId::Centerline,
            Self::Superpixel(_) => BackendId::Superpixel,
            Self::Dots(_) => BackendId::Dots,
        }
    }

    /// Gaussian sigma the backend pre-blurs its grayscale input with
    /// (0 = none). Multi-pass edge runs re-derive it per pass.
    #[must_use]
    pub const fn blur_sigma(&self, mapping: &ThresholdMapping) -> f32 {
        match self {
            Self::Edge(_) => mapping.edge_blur_sigma,
            Self::Centerline(_) => mapping.centerline_blur_sigma,
            Self::Superpixel(_) | Self::Dots(_) => 0.0,
        }
    }
}

/// Edge backend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct EdgeConfig {
    /// Compute an edge tangent flow field.
    pub enable_flow_field: bool,
    /// Neighbourhood radius of flow refinement.
    pub etf_radius: u32,
    /// Flow refinement iterations.
    pub etf_iterations: u32,
    /// Pixels with structure-tensor coherency at or below this are masked.
    pub etf_coherency_tau: f32,
    /// Filter with a flow-aligned difference of Gaussians.
    pub enable_fdog: bool,
    /// Gaussian sigma along the flow.
    pub fdog_sigma_s: f32,
    /// Gaussian sigma across the flow (the wider lobe is 1.6x this).
    pub fdog_sigma_c: f32,
    /// Detection sensitivity: responses below `1 - tau` of the strongest
    /// response are discarded.
    pub fdog_tau: f32,
    /// Hysteresis low threshold on the FDoG response (fraction of max).
    pub nms_low: f32,
    /// Hysteresis high threshold on the FDoG response (fraction of max).
    pub nms_high: f32,
    /// Link edges by walking along the flow field.
    pub enable_flow_tracing: bool,
    /// Minimum normalized edge strength for a tracing seed.
    pub trace_min_grad: f32,
    /// Minimum coherency for tracing to continue.
    pub trace_min_coherency: f32,
    /// Longest run of non-edge pixels a trace may bridge.
    pub trace_max_gap: u32,
    /// Maximum points in one traced polyline.
    pub trace_max_len: u32,
    /// Multi-pass settings.
    pub multipass: MultipassConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enable_flow_field: false,
            etf_radius: 4,
            etf_iterations: 4,
            etf_coherency_tau: 0.2,
            enable_fdog: false,
            fdog_sigma_s: 0.8,
            fdog_sigma_c: 1.6,
            fdog_tau: 0.7,
            nms_low: 0.05,
            nms_high: 0.4,
            enable_flow_tracing: false,
            trace_min_grad: 0.02,
            trace_min_coherency: 0.05,
            trace_max_gap: 8,
            trace_max_len: 10_000,
            multipass: MultipassConfig::default(),
        }
    }
}

impl EdgeConfig {
    /// Flow field, FDoG and flow tracing all switched on.
    #[must_use]
    pub fn flow_traced() -> Self {
        Self {
            enable_flow_field: true,
            enable_fdog: true,
            enable_flow_tracing: true,
            ..Self::default()
        }
    }

    fn validate(&self, v: &mut Validator) {
        v.range("edge.etf_radius", self.etf_radius, 1, 16);
        v.range("edge.etf_iterations", self.etf_iterations, 1, 20);
        v.range("edge.etf_coherency_tau", self.etf_coherency_tau, 0.0, 1.0);
        v.range("edge.fdog_sigma_s", self.fdog_sigma_s, 0.1, 10.0);
        v.range("edge.fdog_sigma_c", self.fdog_sigma_c, 0.1, 10.0);
        v.range("edge.fdog_tau", self.fdog_tau, 0.0, 1.0);
        v.range("edge.nms_low", self.nms_low, 0.0, 1.0);
        v.range("edge.nms_high", self.nms_high, 0.0, 1.0);
        v.require(
            self.nms_low <= self.nms_high,
            "edge.nms_low",
            "must not exceed edge.nms_high",
        );
        v.range("edge.trace_min_grad", self.trace_min_grad, 0.0, 1.0);
        v.range(
            "edge.trace_min_coherency",
            self.trace_min_coherency,
            0.0,
            1.0,
        );
        v.range("edge.trace_max_gap", self.trace_max_gap, 0, 64);
        v.range("edge.trace_max_len", self.trace_max_len, 10, 100_000);
        v.require(
            !self.enable_flow_tracing || self.enable_flow_field,
            "edge.enable_flow_tracing",
            "flow tracing requires edge.enable_flow_field",
        );
        v.require(
            !self.enable_fdog || self.enable_flow_field,
            "edge.enable_fdog",
            "the flow-aligned DoG requires edge.enable_flow_field",
        );
        self.multipass.validate(v);
    }
}

/// Multi-pass edge extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipassConfig {
    /// Run the edge backend more than once and merge the results.
    pub enabled: bool,
    /// Number of detail-scheduled passes.
    pub pass_count: u32,
    /// Add a pass over the image rotated by 180 degrees.
    pub reverse_pass: bool,
    /// Add a pass over the transposed image.
    pub diagonal_pass: bool,
    /// Minimum strong-edge fraction for directional passes to run.
    pub directional_strength_threshold: f32,
}

impl Default for MultipassConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pass_count: 1,
            reverse_pass: false,
            diagonal_pass: false,
            directional_strength_threshold: 0.3,
        }
    }
}

impl MultipassConfig {
    fn validate(&self, v: &mut Validator) {
        v.range("edge.multipass.pass_count", self.pass_count, 1, 10);
        v.range(
            "edge.multipass.directional_strength_threshold",
            self.directional_strength_threshold,
            0.0,
            1.0,
        );
        v.require(
            self.enabled || !self.reverse_pass,
            "edge.multipass.reverse_pass",
            "requires edge.multipass.enabled",
        );
        v.require(
            self.enabled || !self.diagonal_pass,
            "edge.multipass.diagonal_pass",
            "requires edge.multipass.enabled",
        );
    }
}

/// Centerline backend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterlineConfig {
    /// Sauvola adaptive threshold instead of global Otsu.
    pub adaptive_threshold: bool,
    /// Odd side length of the adaptive threshold window.
    pub window_size: u32,
    /// Sauvola sensitivity `k`.
    pub sensitivity_k: f32,
    /// Morphological open then close on the binary mask.
    pub morphology: bool,
    /// Terminal branches shorter than this are pruned (pixels).
    pub min_branch_length: f64,
    /// Closed branches shorter than this are removed (pixels).
    pub micro_loop_length: f64,
    /// Reconnect nearby endpoints.
    pub enable_bridging: bool,
    /// Longest bridge (pixels).
    pub max_join_distance: f64,
    /// Largest deviation between bridge and branch tangent (degrees).
    pub max_join_angle_deg: f64,
    /// Vary stroke width with the distance-transform radius.
    pub enable_width_modulation: bool,
    /// Stroke width multipliers for the thinnest and thickest strokes.
    pub width_modulation_range: (f64, f64),
}

impl Default for CenterlineConfig {
    fn default() -> Self {
        Self {
            adaptive_threshold: true,
            window_size: 31,
            sensitivity_k: 0.4,
            morphology: false,
            min_branch_length: 12.0,
            micro_loop_length: 12.0,
            enable_bridging: true,
            max_join_distance: 7.0,
            max_join_angle_deg: 30.0,
            enable_width_modulation: false,
            width_modulation_range: (0.5, 2.0),
        }
    }
}

impl CenterlineConfig {
    fn validate(&self, v: &mut Validator) {
        v.range("centerline.window_size", self.window_size, 3, 201);
        v.require(
            self.window_size % 2 == 1,
            "centerline.window_size",
            "must be odd",
        );
        v.range("centerline.sensitivity_k", self.sensitivity_k, 0.05, 1.0);
        v.range(
            "centerline.min_branch_length",
            self.min_branch_length,
            0.0,
            500.0,
        );
        v.range(
            "centerline.micro_loop_length",
            self.micro_loop_length,
            0.0,
            200.0,
        );
        v.range(
            "centerline.max_join_distance",
            self.max_join_distance,
            0.0,
            100.0,
        );
        v.range(
            "centerline.max_join_angle_deg",
            self.max_join_angle_deg,
            0.0,
            180.0,
        );
        let (lo, hi) = self.width_modulation_range;
        v.require(
            lo > 0.0 && lo <= hi && hi <= 10.0,
            "centerline.width_modulation_range",
            format!("must satisfy 0 < min <= max <= 10, got ({lo}, {hi})"),
        );
    }
}

/// Superpixel backend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperpixelConfig {
    /// Requested region count (a target, not a guarantee).
    pub num_superpixels: u32,
    /// Shape regularity versus color fidelity.
    pub compactness: f32,
    /// Maximum clustering iterations.
    pub iterations: u32,
    /// Initial cluster placement.
    pub seeding: Seeding,
    /// Adjacent regions closer than this Lab distance are merged.
    pub merge_threshold: f32,
    /// Filled polygons or stroked outlines.
    pub region_style: RegionStyle,
    /// Simplify region boundaries with `boundary_epsilon`.
    pub simplify_boundaries: bool,
    /// Boundary simplification tolerance (pixels).
    pub boundary_epsilon: f64,
    /// Paint each region with its mean color instead of `ink`.
    pub preserve_colors: bool,
}

impl Default for SuperpixelConfig {
    fn default() -> Self {
        Self {
            num_superpixels: 150,
            compactness: 10.0,
            iterations: 10,
            seeding: Seeding::default(),
            merge_threshold: 6.0,
            region_style: RegionStyle::default(),
            simplify_boundaries: true,
            boundary_epsilon: 1.0,
            preserve_colors: true,
        }
    }
}

impl SuperpixelConfig {
    fn validate(&self, v: &mut Validator) {
        v.range("superpixel.num_superpixels", self.num_superpixels, 20, 1000);
        v.range("superpixel.compactness", self.compactness, 1.0, 50.0);
        v.range("superpixel.iterations", self.iterations, 1, 50);
        v.range("superpixel.merge_threshold", self.merge_threshold, 0.0, 100.0);
        v.range(
            "superpixel.boundary_epsilon",
            self.boundary_epsilon,
            0.1,
            10.0,
        );
    }
}

/// Dots backend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DotsConfig {
    /// Minimum local strength for a dot to be placed.
    pub density_threshold: f32,
    /// Smallest dot radius (pixels).
    pub min_radius: f64,
    /// Largest dot radius (pixels).
    pub max_radius: f64,
    /// Blend gradient and local variance into the strength.
    pub adaptive_sizing: bool,
    /// Emphasize gradient magnitude in the strength.
    pub gradient_based_sizing: bool,
    /// Paint each dot with the source color instead of `ink`.
    pub preserve_colors: bool,
    /// Blue-noise candidate positions instead of a regular grid.
    pub poisson_disk_sampling: bool,
    /// Minimum centre separation as a multiple of the larger radius.
    pub spacing_factor: f64,
    /// Lab distance (as a fraction of 100) within which a pixel counts as
    /// background.
    pub background_tolerance: f32,
    /// Random radius jitter in `[0, 1]`.
    pub size_variation: f64,
    /// Outline drawn for each dot.
    pub shape: DotShape,
    /// Seed for sampling and jitter.
    pub seed: u64,
}

impl Default for DotsConfig {
    fn default() -> Self {
        Self {
            density_threshold: 0.1,
            min_radius: 0.5,
            max_radius: 3.0,
            adaptive_sizing: true,
            gradient_based_sizing: false,
            preserve_colors: true,
            poisson_disk_sampling: false,
            spacing_factor: 1.5,
            background_tolerance: 0.1,
            size_variation: 0.0,
            shape: DotShape::Circle,
            seed: 42,
        }
    }
}

impl DotsConfig {
    fn validate(&self, v: &mut Validator) {
        v.range("dots.density_threshold", self.density_threshold, 0.0, 1.0);
        v.range("dots.min_radius", self.min_radius, 0.1, 50.0);
        v.range("dots.max_radius", self.max_radius, 0.1, 50.0);
        v.require(
            self.min_radius <= self.max_radius,
            "dots.min_radius",
            "must not exceed dots.max_radius",
        );
        v.range("dots.spacing_factor", self.spacing_factor, 1.0, 5.0);
        v.range(
            "dots.background_tolerance",
            self.background_tolerance,
            0.0,
            1.0,
        );
        v.range("dots.size_variation", self.size_variation, 0.0, 1.0);
    }
}

/// Path simplification settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyConfig {
    /// Point-reduction algorithm.
    pub algorithm: SimplifyAlgorithm,
    /// Tolerance in pixels; `None` derives it from `detail`.
    pub epsilon: Option<f64>,
}

/// Cubic curve fitting settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Replace polylines with cubic Bezier paths.
    pub enabled: bool,
    /// Largest allowed distance between a polyline point and the curve.
    pub max_error: f64,
    /// Turning angle (degrees) above which a vertex is a hard corner.
    pub split_angle_deg: f64,
    /// Maximum recursive splits per polyline.
    pub max_iterations: u32,
    /// Regularization pulling handle lengths towards a third of the chord.
    pub curvature_penalty: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_error: 2.0,
            split_angle_deg: 32.0,
            max_iterations: 16,
            curvature_penalty: 0.01,
        }
    }
}

impl FitConfig {
    fn validate(&self, v: &mut Validator) {
        v.range("fit.max_error", self.max_error, 0.1, 20.0);
        v.range("fit.split_angle_deg", self.split_angle_deg, 5.0, 180.0);
        v.range("fit.max_iterations", self.max_iterations, 1, 64);
        v.range("fit.curvature_penalty", self.curvature_penalty, 0.0, 1.0);
    }
}

/// Thresholds derived from `detail` and the working image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdMapping {
    /// Default simplification tolerance (pixels).
    pub dp_epsilon: f64,
    /// Shortest untraced edge polyline kept (pixels).
    pub min_stroke_length: f64,
    /// Hysteresis high threshold (fraction of max gradient).
    pub canny_high: f32,
    /// Hysteresis low threshold (fraction of max gradient).
    pub canny_low: f32,
    /// Pre-blur sigma for the edge backend.
    pub edge_blur_sigma: f32,
    /// Pre-blur sigma for the centerline backend.
    pub centerline_blur_sigma: f32,
}

impl ThresholdMapping {
    /// Derive thresholds for `detail` on an image of the given size.
    #[must_use]
    pub fn new(detail: f32, dimensions: Dimensions) -> Self {
        let detail = detail.clamp(0.0, 1.0);
        let coarse = 1.0 - detail;
        let diag = dimensions.diagonal();
        let canny_high = 0.4f32.mul_add(coarse, 0.1);
        Self {
            dp_epsilon: 0.012f64.mul_add(f64::from(coarse), 0.003) * diag,
            min_stroke_length: 40.0f64.mul_add(f64::from(coarse), 10.0),
            canny_high,
            canny_low: 0.4 * canny_high,
            edge_blur_sigma: 1.0 + coarse,
            centerline_blur_sigma: 0.4f32.mul_add(coarse, 0.8).clamp(0.8, 1.2),
        }
    }
}

/// Collects violations while a configuration is checked.
#[derive(Default)]
pub(crate) struct Validator {
    violations: Vec<ConfigViolation>,
}

impl Validator {
    /// Record a violation unless `min <= value <= max` (NaN always fails).
    pub(crate) fn range<T: PartialOrd + Display + Copy>(
        &mut self,
        field: &str,
        value: T,
        min: T,
        max: T,
    ) {
        if !(min..=max).contains(&value) {
            self.violations.push(ConfigViolation::new(
                field,
                format!("must be within [{min}, {max}], got {value}"),
            ));
        }
    }

    /// Record a violation unless `ok`.
    pub(crate) fn require(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.violations.push(ConfigViolation::new(field, message));
        }
    }

    pub(crate) fn finish(self) -> Result<(), ConfigErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors::new(self.violations))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_every_backend() {
        for backend in [
            BackendConfig::Edge(EdgeConfig::default()),
            BackendConfig::Edge(EdgeConfig::flow_traced()),
            BackendConfig::Centerline(CenterlineConfig::default()),
            BackendConfig::Superpixel(SuperpixelConfig::default()),
            BackendConfig::Dots(DotsConfig::default()),
        ] {
            let config = TraceConfig::for_backend(backend);
            assert!(config.validate().is_ok(), "{config:?}");
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let config = TraceConfig {
            detail: 1.5,
            backend: BackendConfig::Edge(EdgeConfig {
                enable_flow_tracing: true,
                enable_fdog: true,
                nms_low: 0.6,
                nms_high: 0.3,
                ..EdgeConfig::default()
            }),
            fit: FitConfig {
                enabled: true,
                ..FitConfig::default()
            },
            ..TraceConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.mentions("detail"));
        assert!(errors.mentions("edge.nms_low"));
        assert!(errors.mentions("edge.enable_flow_tracing"));
        assert!(errors.mentions("edge.enable_fdog"));
        assert_eq!(errors.len(), 4, "{errors}");
    }

    #[test]
    fn fitting_without_tracing_is_rejected() {
        let config = TraceConfig {
            fit: FitConfig {
                enabled: true,
                ..FitConfig::default()
            },
            ..TraceConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.mentions("fit.enabled"));
    }

    #[test]
    fn fitting_is_allowed_on_centerlines() {
        let config = TraceConfig {
            backend: BackendConfig::Centerline(CenterlineConfig::default()),
            fit: FitConfig {
                enabled: true,
                ..FitConfig::default()
            },
            ..TraceConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn directional_passes_require_multipass() {
        let config = TraceConfig::for_backend(BackendConfig::Edge(EdgeConfig {
            multipass: MultipassConfig {
                reverse_pass: true,
                diagonal_pass: true,
                ..MultipassConfig::default()
            },
            ..EdgeConfig::default()
        }));
        let errors = config.validate().unwrap_err();
        assert!(errors.mentions("edge.multipass.reverse_pass"));
        assert!(errors.mentions("edge.multipass.diagonal_pass"));
    }

    #[test]
    fn nan_is_out_of_range() {
        let config = TraceConfig {
            detail: f32::NAN,
            ..TraceConfig::default()
        };
        assert!(config.validate().unwrap_err().mentions("detail"));
    }

    #[test]
    fn even_window_and_inverted_radii_are_rejected() {
        let centerline = TraceConfig::for_backend(BackendConfig::Centerline(CenterlineConfig {
            window_size: 30,
            width_modulation_range: (2.0, 1.0),
            ..CenterlineConfig::default()
        }));
        let errors = centerline.validate().unwrap_err();
        assert!(errors.mentions("centerline.window_size"));
        assert!(errors.mentions("centerline.width_modulation_range"));

        let dots = TraceConfig::for_backend(BackendConfig::Dots(DotsConfig {
            min_radius: 4.0,
            max_radius: 2.0,
            ..DotsConfig::default()
        }));
        assert!(dots.validate().unwrap_err().mentions("dots.min_radius"));
    }

    #[test]
    fn style_on_filled_output_is_rejected() {
        let config = TraceConfig {
            backend: BackendConfig::Dots(DotsConfig::default()),
            style: Some(StyleConfig::default()),
            ..TraceConfig::default()
        };
        assert!(config.validate().unwrap_err().mentions("style"));
    }

    #[test]
    fn mapping_follows_detail() {
        let dims = Dimensions {
            width: 100,
            height: 100,
        };
        let coarse = ThresholdMapping::new(0.0, dims);
        let fine = ThresholdMapping::new(1.0, dims);
        assert!(coarse.dp_epsilon > fine.dp_epsilon);
        assert!(coarse.min_stroke_length > fine.min_stroke_length);
        assert!(coarse.canny_high > fine.canny_high);
        assert!((fine.canny_high - 0.1).abs() < 1e-6);
    }

    #[test]
    fn higher_detail_blurs_less() {
        let dims = Dimensions {
            width: 200,
            height: 200,
        };
        let coarse = ThresholdMapping::new(0.0, dims);
        let fine = ThresholdMapping::new(1.0, dims);
        assert!(fine.edge_blur_sigma < coarse.edge_blur_sigma);
        assert!(fine.centerline_blur_sigma < coarse.centerline_blur_sigma);
        assert!((coarse.edge_blur_sigma - 2.0).abs() < 1e-6);
        assert!((fine.edge_blur_sigma - 1.0).abs() < 1e-6);
        assert!((coarse.centerline_blur_sigma - 1.2).abs() < 1e-6);
        assert!((fine.centerline_blur_sigma - 0.8).abs() < 1e-6);
    }

    #[test]
    fn only_line_backends_blur() {
        let mapping = ThresholdMapping::new(
            0.25,
            Dimensions {
                width: 64,
                height: 64,
            },
        );
        let edge = BackendConfig::Edge(EdgeConfig::default()).blur_sigma(&mapping);
        let centerline =
            BackendConfig::Centerline(CenterlineConfig::default()).blur_sigma(&mapping);
        assert!((edge - 1.75).abs() < 1e-6);
        assert!((centerline - 1.1).abs() < 1e-6);
        assert!(BackendConfig::Dots(DotsConfig::default()).blur_sigma(&mapping).abs() < f32::EPSILON);
    }

    #[test]
    fn stroke_width_scales_with_diagonal() {
        let config = TraceConfig::default();
        let hd = config.stroke_width(Dimensions {
            width: 1920,
            height: 1080,
        });
        assert!((hd - 1.2).abs() < 1e-9);
        let tiny = config.stroke_width(Dimensions {
            width: 10,
            height: 10,
        });
        assert!((tiny - 0.5).abs() < 1e-12);
    }

    #[test]
    fn json_round_trip_keeps_backend_tag() {
        let config = TraceConfig::for_backend(BackendConfig::Superpixel(SuperpixelConfig {
            num_superpixels: 64,
            ..SuperpixelConfig::default()
        }));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"superpixel\""), "{json}");
        let back: TraceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"detail": 0.8, "backend": {"kind": "dots", "seed": 7}}"#)
                .unwrap();
        assert!((config.detail - 0.8).abs() < f32::EPSILON);
        let BackendConfig::Dots(dots) = config.backend else {
            unreachable!("expected the dots backend");
        };
        assert_eq!(dots.seed, 7);
        assert!((dots.max_radius - 3.0).abs() < f64::EPSILON);
    }
}
