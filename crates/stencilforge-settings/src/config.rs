//! Stencil generation configuration
//!
//! Provides the configuration model, JSON/TOML file handling and validation.
//!
//! Configuration is organized into logical sections:
//! - Top level: layer patterns, thickness, paste offset, output mode
//! - Outline reconstruction tolerances and strategy
//! - QFN detection thresholds
//! - Locator ring/step geometry
//! - Mesh engine quality, voxel pitch and cleanup
//! - STL output format

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use stencilforge_core::{Error, Result};
use tracing::debug;

/// What gets extruded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Paste apertures only (a positive of the openings)
    HolesOnly,
    /// Outline minus paste (the actual stencil)
    SolidWithCutouts,
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::SolidWithCutouts
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HolesOnly => write!(f, "holes_only"),
            Self::SolidWithCutouts => write!(f, "solid_with_cutouts"),
        }
    }
}

/// Mesh backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Plain triangulated extrusion with cleanup
    Triangulation,
    /// Triangulated extrusion with voxel watertight rebuild and decimation
    Sfmesh,
}

impl Default for ModelBackend {
    fn default() -> Self {
        Self::Sfmesh
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangulation => write!(f, "triangulation"),
            Self::Sfmesh => write!(f, "sfmesh"),
        }
    }
}

impl FromStr for ModelBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "triangulation" | "trimesh" => Ok(Self::Triangulation),
            "sfmesh" => Ok(Self::Sfmesh),
            _ => Err(Error::invalid_config(
                "model_backend",
                "must be triangulation or sfmesh",
            )),
        }
    }
}

/// Outline reconstruction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStrategy {
    /// Snap, dedupe, bridge, polygonize; legacy strategies as fallback
    RobustPolygonize,
    /// Only the legacy stitcher and junction-graph strategies
    Legacy,
}

impl Default for CloseStrategy {
    fn default() -> Self {
        Self::RobustPolygonize
    }
}

/// Rule for resolving nested outline candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillRule {
    /// Keep only the largest candidate
    #[serde(rename = "legacy")]
    Legacy,
    /// Alternate fill by containment depth
    #[serde(rename = "even-odd", alias = "evenodd", alias = "even_odd")]
    EvenOdd,
}

impl Default for FillRule {
    fn default() -> Self {
        Self::EvenOdd
    }
}

impl fmt::Display for FillRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::EvenOdd => write!(f, "even-odd"),
        }
    }
}

/// Locator structure style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorMode {
    /// Wall standing on top of the stencil around the board
    Ring,
    /// Bridge in the stencil plane plus a step hanging below it
    Step,
}

impl Default for LocatorMode {
    fn default() -> Self {
        Self::Ring
    }
}

/// Side of the locator left open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenSide {
    None,
    Top,
    Right,
    Bottom,
    Left,
}

impl Default for OpenSide {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for OpenSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Top => "top",
            Self::Right => "right",
            Self::Bottom => "bottom",
            Self::Left => "left",
        };
        write!(f, "{}", s)
    }
}

/// Watertight rebuild policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// Never rebuild
    Fast,
    /// Rebuild only when the extrusion is not watertight
    Auto,
    /// Always rebuild
    Watertight,
}

impl Default for QualityMode {
    fn default() -> Self {
        Self::Fast
    }
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Auto => write!(f, "auto"),
            Self::Watertight => write!(f, "watertight"),
        }
    }
}

/// STL encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlFormat {
    Binary,
    Ascii,
}

impl Default for StlFormat {
    fn default() -> Self {
        Self::Binary
    }
}

/// Outline reconstruction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettings {
    /// Reconstruction strategy
    pub close_strategy: CloseStrategy,
    /// Endpoint snap grid (mm)
    pub snap_eps_mm: f64,
    /// Maximum chord deviation when discretizing arcs (mm)
    pub arc_max_chord_error_mm: f64,
    /// Largest gap closed by a synthetic bridge segment (mm), 0 disables
    pub gap_bridge_mm: f64,
    /// Cap on bridge segments
    pub gap_bridge_max_links: usize,
    /// Near-colinear merge corridor for the legacy strategies (mm)
    pub merge_tol_mm: f64,
    /// Endpoint match distance for the legacy strategies (mm)
    pub close_tol_mm: f64,
    /// Candidate selection rule
    pub fill_rule: FillRule,
    /// Buffer the line network when polygonize finds no faces
    pub buffer_fallback: bool,
    /// Buffer distance as a multiple of `snap_eps_mm`
    pub buffer_scale: f64,
    /// Minimum segment length as a multiple of `snap_eps_mm`
    pub min_seg_len_scale: f64,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            close_strategy: CloseStrategy::RobustPolygonize,
            snap_eps_mm: 0.001,
            arc_max_chord_error_mm: 0.01,
            gap_bridge_mm: 0.05,
            gap_bridge_max_links: 200,
            merge_tol_mm: 0.01,
            close_tol_mm: 0.02,
            fill_rule: FillRule::EvenOdd,
            buffer_fallback: true,
            buffer_scale: 2.0,
            min_seg_len_scale: 0.5,
        }
    }
}

/// QFN detection and regeneration settings
///
/// The detection constants are empirical; they are exposed rather than
/// hard-coded so boards that trip them can be tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QfnSettings {
    pub enabled: bool,
    /// Narrowest printable web or opening (mm)
    pub min_feature_mm: f64,
    /// Minimum detection score in [0, 1]
    pub confidence_threshold: f64,
    /// Widest short side a pad may have (mm)
    pub max_pad_width_mm: f64,
    pub min_rectangularity: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_candidates: usize,
    pub min_group_size: usize,
    pub min_row_pads: usize,
    /// Allowed side count spread as a fraction of the largest side
    pub side_count_tolerance: f64,
    /// Center pad must be this many times the median pad area
    pub center_pad_area_ratio: f64,
    pub pitch_cv_scale: f64,
    pub width_cv_scale: f64,
    pub center_pad_bonus: f64,
    /// Target open fraction of a windowpaned center pad
    pub window_open_ratio: f64,
}

impl Default for QfnSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_feature_mm: 0.15,
            confidence_threshold: 0.75,
            max_pad_width_mm: 0.6,
            min_rectangularity: 0.85,
            min_aspect: 1.2,
            max_aspect: 6.0,
            min_candidates: 12,
            min_group_size: 6,
            min_row_pads: 3,
            side_count_tolerance: 0.3,
            center_pad_area_ratio: 4.0,
            pitch_cv_scale: 0.2,
            width_cv_scale: 0.25,
            center_pad_bonus: 0.05,
            window_open_ratio: 0.5,
        }
    }
}

/// Locator structure settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorSettings {
    pub enabled: bool,
    pub mode: LocatorMode,
    pub height_mm: f64,
    pub width_mm: f64,
    pub clearance_mm: f64,
    pub step_height_mm: f64,
    pub step_width_mm: f64,
    pub open_side: OpenSide,
    pub open_width_mm: f64,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: LocatorMode::Ring,
            height_mm: 2.0,
            width_mm: 2.0,
            clearance_mm: 0.2,
            step_height_mm: 1.0,
            step_width_mm: 2.0,
            open_side: OpenSide::None,
            open_width_mm: 0.0,
        }
    }
}

/// Mesh engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub quality_mode: QualityMode,
    /// Base voxel pitch for the watertight rebuild (mm)
    pub voxel_pitch_mm: f64,
    pub adaptive_pitch_enabled: bool,
    pub adaptive_pitch_min_mm: f64,
    pub adaptive_pitch_max_mm: f64,
    /// Rebuild is skipped above this face count
    pub watertight_face_limit: usize,
    pub simplify_tol_mm: f64,
    pub min_polygon_area_mm2: f64,
    pub min_hole_area_mm2: f64,
    /// Target face ratio in (0, 1]; 1 disables decimation
    pub decimate_target_ratio: f64,
    pub hole_protect_enabled: bool,
    /// Holes at most this wide cap the voxel pitch (mm)
    pub hole_protect_max_width_mm: f64,
    pub hole_pitch_divisor: f64,
    /// Boards longer than this rebuild tile by tile (mm)
    pub chunk_size_mm: f64,
    pub chunk_overlap_mm: f64,
    /// Fraction of polygon area the triangulation must cover
    pub min_coverage_ratio: f64,
    /// Vertex merge precision, decimal digits of a millimeter
    pub merge_digits: u32,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            quality_mode: QualityMode::Fast,
            voxel_pitch_mm: 0.08,
            adaptive_pitch_enabled: true,
            adaptive_pitch_min_mm: 0.08,
            adaptive_pitch_max_mm: 0.24,
            watertight_face_limit: 250_000,
            simplify_tol_mm: 0.0,
            min_polygon_area_mm2: 0.0,
            min_hole_area_mm2: 0.0,
            decimate_target_ratio: 1.0,
            hole_protect_enabled: true,
            hole_protect_max_width_mm: 0.8,
            hole_pitch_divisor: 3.0,
            chunk_size_mm: 60.0,
            chunk_overlap_mm: 1.0,
            min_coverage_ratio: 0.995,
            merge_digits: 6,
        }
    }
}

/// STL output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StlSettings {
    pub format: StlFormat,
}

/// Complete stencil configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilConfig {
    /// File name globs for paste layers
    #[serde(deserialize_with = "string_or_list")]
    pub paste_patterns: Vec<String>,
    /// File name globs for the outline layer
    #[serde(deserialize_with = "string_or_list")]
    pub outline_patterns: Vec<String>,
    pub thickness_mm: f64,
    /// Paste buffer distance, negative shrinks (mm)
    pub paste_offset_mm: f64,
    /// Margin around the paste bounds when no outline exists (mm)
    pub outline_margin_mm: f64,
    pub output_mode: OutputMode,
    /// Points per stroked or region arc
    pub arc_steps: usize,
    /// Segments per quarter circle for apertures and offsets
    pub curve_resolution: usize,
    pub model_backend: ModelBackend,
    pub outline: OutlineSettings,
    pub qfn: QfnSettings,
    pub locator: LocatorSettings,
    pub mesh: MeshSettings,
    pub stl: StlSettings,
}

impl Default for StencilConfig {
    fn default() -> Self {
        Self {
            paste_patterns: vec![
                "*.gtp".to_string(),
                "*paste*top*".to_string(),
                "*.crm".to_string(),
            ],
            outline_patterns: vec![
                "*.gko".to_string(),
                "*.gm1".to_string(),
                "*outline*".to_string(),
                "*edge_cuts*".to_string(),
            ],
            thickness_mm: 0.12,
            paste_offset_mm: -0.05,
            outline_margin_mm: 5.0,
            output_mode: OutputMode::SolidWithCutouts,
            arc_steps: 64,
            curve_resolution: 16,
            model_backend: ModelBackend::Sfmesh,
            outline: OutlineSettings::default(),
            qfn: QfnSettings::default(),
            locator: LocatorSettings::default(),
            mesh: MeshSettings::default(),
            stl: StlSettings::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(s)) => vec![s],
        Some(StringOrList::Many(v)) => v,
    })
}

fn require(ok: bool, key: &str, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_config(key, reason))
    }
}

impl StencilConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it
    pub fn from_json_str(content: &str) -> SettingsResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> SettingsResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        debug!("Loading stencil config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        match extension_of(path).as_str() {
            "json" => Self::from_json_str(&content),
            "toml" => Self::from_toml_str(&content),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match extension_of(path).as_str() {
            "json" => serde_json::to_string_pretty(self)?,
            "toml" => toml::to_string_pretty(self)?,
            other => return Err(SettingsError::UnsupportedFormat(other.to_string())),
        };
        std::fs::write(path, content)?;
        debug!("Saved stencil config to {}", path.display());
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        require(self.thickness_mm > 0.0, "thickness_mm", "must be > 0")?;
        require(self.arc_steps >= 8, "arc_steps", "must be >= 8")?;
        require(self.curve_resolution >= 4, "curve_resolution", "must be >= 4")?;
        require(
            self.outline_margin_mm >= 0.0,
            "outline_margin_mm",
            "must be >= 0",
        )?;
        require(
            self.paste_offset_mm.is_finite(),
            "paste_offset_mm",
            "must be finite",
        )?;
        self.validate_outline()?;
        self.validate_qfn()?;
        self.validate_locator()?;
        self.validate_mesh()
    }

    fn validate_outline(&self) -> Result<()> {
        let o = &self.outline;
        require(o.snap_eps_mm > 0.0, "outline.snap_eps_mm", "must be > 0")?;
        require(
            o.arc_max_chord_error_mm > 0.0,
            "outline.arc_max_chord_error_mm",
            "must be > 0",
        )?;
        require(o.gap_bridge_mm >= 0.0, "outline.gap_bridge_mm", "must be >= 0")?;
        require(o.merge_tol_mm >= 0.0, "outline.merge_tol_mm", "must be >= 0")?;
        require(o.close_tol_mm >= 0.0, "outline.close_tol_mm", "must be >= 0")?;
        require(o.buffer_scale > 0.0, "outline.buffer_scale", "must be > 0")?;
        require(
            o.min_seg_len_scale >= 0.0,
            "outline.min_seg_len_scale",
            "must be >= 0",
        )
    }

    fn validate_qfn(&self) -> Result<()> {
        let q = &self.qfn;
        require(q.min_feature_mm > 0.0, "qfn.min_feature_mm", "must be > 0")?;
        require(
            (0.0..=1.0).contains(&q.confidence_threshold),
            "qfn.confidence_threshold",
            "must be in [0, 1]",
        )?;
        require(q.max_pad_width_mm > 0.0, "qfn.max_pad_width_mm", "must be > 0")?;
        require(
            q.min_aspect > 0.0 && q.min_aspect <= q.max_aspect,
            "qfn.min_aspect",
            "must be > 0 and <= qfn.max_aspect",
        )?;
        require(
            (0.0..=1.0).contains(&q.min_rectangularity),
            "qfn.min_rectangularity",
            "must be in [0, 1]",
        )?;
        require(
            q.window_open_ratio > 0.0 && q.window_open_ratio < 1.0,
            "qfn.window_open_ratio",
            "must be in (0, 1)",
        )
    }

    fn validate_locator(&self) -> Result<()> {
        let l = &self.locator;
        require(l.height_mm >= 0.0, "locator.height_mm", "must be >= 0")?;
        require(l.width_mm >= 0.0, "locator.width_mm", "must be >= 0")?;
        require(l.clearance_mm >= 0.0, "locator.clearance_mm", "must be >= 0")?;
        require(l.step_height_mm >= 0.0, "locator.step_height_mm", "must be >= 0")?;
        require(l.step_width_mm >= 0.0, "locator.step_width_mm", "must be >= 0")?;
        require(l.open_width_mm >= 0.0, "locator.open_width_mm", "must be >= 0")
    }

    fn validate_mesh(&self) -> Result<()> {
        let m = &self.mesh;
        require(m.voxel_pitch_mm > 0.0, "mesh.voxel_pitch_mm", "must be > 0")?;
        require(
            m.adaptive_pitch_min_mm > 0.0,
            "mesh.adaptive_pitch_min_mm",
            "must be > 0",
        )?;
        require(
            m.adaptive_pitch_max_mm > 0.0,
            "mesh.adaptive_pitch_max_mm",
            "must be > 0",
        )?;
        require(
            m.adaptive_pitch_min_mm <= m.adaptive_pitch_max_mm,
            "mesh.adaptive_pitch_min_mm",
            "must be <= mesh.adaptive_pitch_max_mm",
        )?;
        require(
            m.watertight_face_limit > 0,
            "mesh.watertight_face_limit",
            "must be > 0",
        )?;
        require(m.simplify_tol_mm >= 0.0, "mesh.simplify_tol_mm", "must be >= 0")?;
        require(
            m.min_polygon_area_mm2 >= 0.0,
            "mesh.min_polygon_area_mm2",
            "must be >= 0",
        )?;
        require(
            m.min_hole_area_mm2 >= 0.0,
            "mesh.min_hole_area_mm2",
            "must be >= 0",
        )?;
        require(
            m.decimate_target_ratio > 0.0 && m.decimate_target_ratio <= 1.0,
            "mesh.decimate_target_ratio",
            "must be in (0, 1]",
        )?;
        require(
            m.hole_protect_max_width_mm > 0.0,
            "mesh.hole_protect_max_width_mm",
            "must be > 0",
        )?;
        require(
            m.hole_pitch_divisor > 1.0,
            "mesh.hole_pitch_divisor",
            "must be > 1",
        )?;
        require(m.chunk_size_mm > 0.0, "mesh.chunk_size_mm", "must be > 0")?;
        require(
            m.chunk_overlap_mm >= 0.0 && m.chunk_overlap_mm < m.chunk_size_mm,
            "mesh.chunk_overlap_mm",
            "must be >= 0 and < mesh.chunk_size_mm",
        )?;
        require(
            m.min_coverage_ratio > 0.0 && m.min_coverage_ratio <= 1.0,
            "mesh.min_coverage_ratio",
            "must be in (0, 1]",
        )?;
        require(
            (1..=9).contains(&m.merge_digits),
            "mesh.merge_digits",
            "must be in [1, 9]",
        )
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StencilConfig::default();
        assert_eq!(cfg.thickness_mm, 0.12);
        assert_eq!(cfg.paste_offset_mm, -0.05);
        assert_eq!(cfg.output_mode, OutputMode::SolidWithCutouts);
        assert_eq!(cfg.model_backend, ModelBackend::Sfmesh);
        assert_eq!(cfg.mesh.quality_mode, QualityMode::Fast);
        assert_eq!(cfg.mesh.voxel_pitch_mm, 0.08);
        assert!(cfg.mesh.adaptive_pitch_enabled);
        assert_eq!(cfg.mesh.adaptive_pitch_min_mm, 0.08);
        assert_eq!(cfg.mesh.adaptive_pitch_max_mm, 0.24);
        assert_eq!(cfg.mesh.watertight_face_limit, 250_000);
        assert_eq!(cfg.mesh.decimate_target_ratio, 1.0);
        assert_eq!(cfg.mesh.hole_protect_max_width_mm, 0.8);
        assert_eq!(cfg.mesh.hole_pitch_divisor, 3.0);
        assert_eq!(cfg.outline.snap_eps_mm, 0.001);
        assert_eq!(cfg.outline.gap_bridge_max_links, 200);
        assert_eq!(cfg.qfn.min_candidates, 12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = StencilConfig::from_json_str(
            r#"{"thickness_mm": 0.15, "mesh": {"quality_mode": "watertight"}, "paste_patterns": "*.gtp"}"#,
        )
        .unwrap();
        assert_eq!(cfg.thickness_mm, 0.15);
        assert_eq!(cfg.mesh.quality_mode, QualityMode::Watertight);
        assert_eq!(cfg.mesh.voxel_pitch_mm, 0.08);
        assert_eq!(cfg.paste_patterns, vec!["*.gtp".to_string()]);
    }

    #[test]
    fn test_fill_rule_spellings() {
        for spelling in ["even-odd", "evenodd", "even_odd"] {
            let doc = format!(r#"{{"outline": {{"fill_rule": "{}"}}}}"#, spelling);
            let cfg = StencilConfig::from_json_str(&doc).unwrap();
            assert_eq!(cfg.outline.fill_rule, FillRule::EvenOdd);
        }
        let cfg = StencilConfig::from_json_str(r#"{"outline": {"fill_rule": "legacy"}}"#).unwrap();
        assert_eq!(cfg.outline.fill_rule, FillRule::Legacy);
    }

    #[test]
    fn test_unknown_quality_mode_is_rejected() {
        let err = StencilConfig::from_json_str(r#"{"mesh": {"quality_mode": "bad_mode"}}"#);
        assert!(matches!(err, Err(SettingsError::JsonError(_))));
    }

    #[test]
    fn test_validation_messages() {
        let cases: Vec<(Box<dyn Fn(&mut StencilConfig)>, &str)> = vec![
            (
                Box::new(|c| c.mesh.voxel_pitch_mm = 0.0),
                "mesh.voxel_pitch_mm must be > 0",
            ),
            (
                Box::new(|c| {
                    c.mesh.adaptive_pitch_min_mm = 0.2;
                    c.mesh.adaptive_pitch_max_mm = 0.1;
                }),
                "mesh.adaptive_pitch_min_mm must be <= mesh.adaptive_pitch_max_mm",
            ),
            (
                Box::new(|c| c.mesh.watertight_face_limit = 0),
                "mesh.watertight_face_limit must be > 0",
            ),
            (
                Box::new(|c| c.mesh.decimate_target_ratio = 0.0),
                "mesh.decimate_target_ratio must be in (0, 1]",
            ),
            (
                Box::new(|c| c.mesh.hole_pitch_divisor = 1.0),
                "mesh.hole_pitch_divisor must be > 1",
            ),
            (Box::new(|c| c.thickness_mm = 0.0), "thickness_mm must be > 0"),
            (Box::new(|c| c.arc_steps = 4), "arc_steps must be >= 8"),
            (
                Box::new(|c| c.locator.open_width_mm = -1.0),
                "locator.open_width_mm must be >= 0",
            ),
        ];
        for (mutate, expected) in cases {
            let mut cfg = StencilConfig::default();
            mutate(&mut cfg);
            let err = cfg.validate().unwrap_err();
            assert!(
                err.to_string().ends_with(expected),
                "{} does not end with {}",
                err,
                expected
            );
        }
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("sfmesh".parse::<ModelBackend>().unwrap(), ModelBackend::Sfmesh);
        assert_eq!(
            "trimesh".parse::<ModelBackend>().unwrap(),
            ModelBackend::Triangulation
        );
        let err = "bad_backend".parse::<ModelBackend>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: model_backend must be triangulation or sfmesh"
        );
    }
}
