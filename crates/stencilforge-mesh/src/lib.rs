//! # StencilForge Mesh
//!
//! Turns the final 2D stencil region into a validated STL file.
//!
//! ## Pipeline
//!
//! ```text
//! region ─ prepare ─ extrude ─┬─ (sfmesh) voxel / chunked rebuild ─ decimate ─ repair ─┬─ translate ─ STL
//!                             └─ (triangulation) cleanup ──────────────────────────────┘
//! ```
//!
//! - **Extrusion**: constrained Delaunay per polygon with coverage checks,
//!   falling back to unconstrained Delaunay and then ear clipping
//! - **Voxel rebuild**: ray-parity occupancy and marching tetrahedra, fitted
//!   back to the input bounding box
//! - **Chunked rebuild**: the same lattice processed tile by tile
//! - **Repair**: vertex merge, bad-face removal, winding, small-hole filling
//! - **STL**: binary or ASCII output, reloaded and recounted after writing

pub mod backend;
pub mod chunked;
pub mod extrude;
pub mod mesh;
pub mod prepare;
pub mod repair;
pub mod stl;
pub mod voxel;

pub use backend::{backend_for, ExportInput, ExportSummary, MeshBackend, SfmeshBackend, TriangulationBackend};
pub use chunked::rebuild_chunked;
pub use extrude::{Extruder, Extrusion};
pub use mesh::{Bounds3, Mesh};
pub use prepare::{critical_hole_width, prepare_region};
pub use stl::{read_stl, validate_stl, write_stl, StlSummary};
pub use voxel::{adaptive_pitch, rebuild, RebuildError};
