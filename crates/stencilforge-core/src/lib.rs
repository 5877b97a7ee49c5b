//! # StencilForge Core
//!
//! Core types shared by every StencilForge crate: the error taxonomy,
//! length units, 2D value types, cooperative cancellation and the
//! per-request diagnostic trace.

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod trace;
pub mod units;

pub use cancel::CancelFlag;
pub use error::{Error, ExportError, GeometryError, Result};
pub use geometry::{
    bounds_of, distance, pt, Coord, LineString, MultiPolygon, Point2, Polygon, Rect, Segment,
};
pub use trace::{
    AttemptOutcome, Degradation, MeshReport, OutlineSource, OutlineTrace, QfnReport, RebuildKind,
    StencilTrace, StrategyAttempt,
};
pub use units::{LengthUnit, MM_PER_INCH};
