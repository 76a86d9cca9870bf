//! vectrace-export: Pure format serializers (sans-IO)
//!
//! Converts traced paths into output formats. Currently supports SVG.

pub mod svg;

pub use svg::{SvgMetadata, build_bezier_data, build_path_data, result_to_svg, to_svg};
