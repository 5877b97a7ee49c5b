//! # StencilForge Geometry
//!
//! Everything 2D between the Gerber files and the mesh engine.
//!
//! ## Input
//!
//! - **Gerber adapter**: raw file in, normalized primitives out
//! - **Primitives**: apertures, strokes, regions and their polarity
//! - **Arc**: arc parameters and chord-error discretization
//!
//! ## Regions
//!
//! - **Rasterizer**: polarity-aware fill of primitives
//! - **Offset**: buffering with a capsule fallback
//! - **Polygon**: boolean helpers, repair and cleanup
//!
//! ## Reconstruction and regeneration
//!
//! - **Outline**: one closed board polygon from imperfect segments
//! - **QFN**: slot and windowpane regeneration of fine-pitch pads
//! - **Locator**: alignment rings, steps and bridges

pub mod arc;
pub mod gerber;
pub mod locator;
pub mod offset;
pub mod outline;
pub mod polygon;
pub mod primitives;
pub mod qfn;
pub mod rasterizer;

pub use arc::{ArcDirection, ArcSpec};
pub use gerber::{parse_layer, read_layer};
pub use locator::{LocatorBuilder, LocatorGeometry};
pub use offset::buffer;
pub use outline::{BoardOutline, OutlineReconstructor};
pub use primitives::{Aperture, Edge, Layer, Polarity, Primitive, Shape};
pub use qfn::QfnRegenerator;
pub use rasterizer::{rasterize, RasterSettings};
