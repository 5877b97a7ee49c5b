//! Error handling for StencilForge
//!
//! Errors fall into three families:
//! - Input geometry errors (empty or degenerate 2D input at any stage), fatal
//! - Export validation errors (written STL empty or unreadable), fatal
//! - Configuration, file discovery and I/O errors raised around the core
//!
//! Best-effort degradations (QFN regeneration, watertight rebuild) are not
//! errors. They are logged and recorded in [`crate::trace::StencilTrace`].

use std::path::PathBuf;
use thiserror::Error;

/// Input geometry error type
///
/// Raised when a stage receives, or would produce, geometry that cannot be
/// carried forward. Messages include the tolerances in effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A layer rasterized to nothing
    #[error("{layer} layer produced empty geometry")]
    EmptyLayer {
        /// Layer label ("paste", "outline", ...).
        layer: String,
    },

    /// Buffering the paste region removed it entirely
    #[error("Paste offset of {offset_mm} mm produced empty geometry")]
    EmptyAfterOffset {
        /// The offset that was applied.
        offset_mm: f64,
    },

    /// The robust outline strategy could not produce a polygon
    #[error(
        "robust outline failed: {reason}; eps_mm={eps_mm} arc_err={arc_err_mm} raw={raw_segments} deduped={deduped_segments} fallback={buffer_fallback}"
    )]
    OutlineReconstruction {
        /// What went wrong.
        reason: String,
        /// Snap grid size in millimeters.
        eps_mm: f64,
        /// Arc chord error tolerance in millimeters.
        arc_err_mm: f64,
        /// Segment count before snapping.
        raw_segments: usize,
        /// Segment count after snapping and deduplication.
        deduped_segments: usize,
        /// Whether the buffer fallback was enabled.
        buffer_fallback: bool,
    },

    /// Every outline strategy failed
    #[error("Outline reconstruction failed after {attempts} strategies: {summary}")]
    OutlineExhausted {
        /// Number of strategies tried.
        attempts: usize,
        /// Semicolon separated failure reasons.
        summary: String,
    },

    /// Triangulation yielded no faces
    #[error("Triangulation produced no faces for {polygons} polygon(s) at thickness {thickness_mm} mm")]
    NoTriangles {
        /// Polygon count handed to the extruder.
        polygons: usize,
        /// Extrusion thickness.
        thickness_mm: f64,
    },

    /// Every triangulator rejected one polygon of the region
    #[error("Polygon {polygon} ({area_mm2} mm2) could not be triangulated: {reasons}")]
    Triangulation {
        /// Index of the polygon in the oriented region.
        polygon: usize,
        /// Its area.
        area_mm2: f64,
        /// Semicolon separated triangulator failures.
        reasons: String,
    },

    /// Region is empty after preprocessing
    #[error("Geometry is empty after preprocessing: {stage}")]
    EmptyRegion {
        /// Stage that observed the empty region.
        stage: String,
    },

    /// Geometry with zero or negative area
    #[error("Invalid polygon area {area} at {stage}")]
    ZeroArea {
        /// Stage that observed the area.
        stage: String,
        /// The offending area.
        area: f64,
    },
}

/// Export validation error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The mesh handed to the writer had no faces
    #[error("Generated mesh is empty; check outline/paste geometry")]
    EmptyMesh,

    /// The file on disk has zero length
    #[error("Exported STL file is empty: {path}")]
    EmptyFile {
        /// Output path.
        path: PathBuf,
    },

    /// The file reloaded with zero faces
    #[error("Exported STL has no faces: {path}")]
    NoFaces {
        /// Output path.
        path: PathBuf,
    },

    /// The file could not be re-read
    #[error("Failed to validate exported STL {path}: {reason}")]
    ReloadFailed {
        /// Output path.
        path: PathBuf,
        /// Reader error.
        reason: String,
    },
}

/// Main error type for StencilForge
///
/// A unified error type used by every public API in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Input geometry error
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Export validation error
    #[error(transparent)]
    Export(#[from] ExportError),

    /// A configuration value failed validation
    #[error("Invalid configuration: {key} {reason}")]
    InvalidConfig {
        /// Dotted configuration key.
        key: String,
        /// Constraint that was violated.
        reason: String,
    },

    /// No file matched the layer patterns
    #[error("No {layer} layer files found in {dir}")]
    MissingLayer {
        /// Layer label.
        layer: String,
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// The Gerber collaborator could not read a file
    #[error("Failed to read Gerber file {path}: {reason}")]
    Gerber {
        /// Offending file.
        path: PathBuf,
        /// Reader error.
        reason: String,
    },

    /// Cancellation flag observed between stages
    #[error("Stencil generation cancelled before {stage}")]
    Cancelled {
        /// Stage that would have run next.
        stage: String,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a configuration validation error
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is an input geometry error
    pub fn is_input_geometry(&self) -> bool {
        matches!(self, Error::Geometry(_))
    }

    /// Check if this is an export validation error
    pub fn is_export_validation(&self) -> bool {
        matches!(self, Error::Export(_))
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidConfig { .. })
    }

    /// Check if generation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
