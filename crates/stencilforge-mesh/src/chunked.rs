//! Tiled watertight rebuild for large boards
//!
//! Tiles share one global lattice and one surface vertex table, so faces
//! extracted from neighbouring tiles meet on identical vertices. Each tile
//! classifies its core plus an overlap margin and only extracts the cubes of
//! its core.

use crate::mesh::Mesh;
use crate::voxel::{self, classify, fit_to_bounds, Lattice, RebuildError, SurfaceBuilder, MAX_GRID_NODES};
use std::ops::Range;
use stencilforge_core::RebuildKind;
use tracing::{info, warn};

/// Pitch multiplier of the sealing pass
const RESEAL_PITCH_FACTOR: f64 = 1.5;

fn tiles(cubes: Range<usize>, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (cubes.start..cubes.end)
        .step_by(size)
        .map(|start| start..(start + size).min(cubes.end))
        .collect()
}

fn with_margin(core: &Range<usize>, margin: usize, nodes: usize) -> Range<usize> {
    core.start.saturating_sub(margin)..(core.end + 1 + margin).min(nodes)
}

/// Rebuild tile by tile, sealing with one coarser global pass if needed
pub fn rebuild_chunked(
    mesh: &Mesh,
    pitch: f64,
    chunk_size_mm: f64,
    overlap_mm: f64,
) -> Result<(Mesh, RebuildKind), RebuildError> {
    let target = mesh.bounds().filter(|_| !mesh.is_empty()).ok_or(RebuildError::Empty)?;
    let lattice = Lattice::around(&target, pitch)?;

    let cells = |axis: usize| ((chunk_size_mm / lattice.step[axis]).floor() as usize).max(1);
    let margin = |axis: usize| (overlap_mm / lattice.step[axis]).ceil() as usize;
    let x_tiles = tiles(lattice.cube_range(0), cells(0));
    let y_tiles = tiles(lattice.cube_range(1), cells(1));

    let mut surface = SurfaceBuilder::default();
    for core_x in &x_tiles {
        for core_y in &y_tiles {
            let xs = with_margin(core_x, margin(0), lattice.dims[0]);
            let ys = with_margin(core_y, margin(1), lattice.dims[1]);
            let nodes = xs.len() * ys.len() * lattice.dims[2];
            if nodes > MAX_GRID_NODES {
                return Err(RebuildError::GridTooLarge {
                    nodes,
                    limit: MAX_GRID_NODES,
                });
            }
            let occupancy = classify(mesh, &lattice, xs, ys);
            surface.extract(&lattice, &occupancy, core_x.clone(), core_y.clone());
        }
    }
    info!(
        "Chunked rebuild: {}x{} tiles over {:?} nodes at pitch {:.4}",
        x_tiles.len(),
        y_tiles.len(),
        lattice.dims,
        pitch
    );

    let mut rebuilt = surface.mesh;
    if rebuilt.is_empty() {
        return Err(RebuildError::NoSurface);
    }
    fit_to_bounds(&mut rebuilt, &target);
    if rebuilt.is_watertight() {
        return Ok((rebuilt, RebuildKind::Chunked));
    }

    warn!("Chunked rebuild left open seams; resealing with one global pass");
    match voxel::rebuild(mesh, pitch * RESEAL_PITCH_FACTOR) {
        Ok(sealed) => Ok((sealed, RebuildKind::ChunkedResealed)),
        Err(e) => {
            warn!("Global reseal failed: {}", e);
            Ok((rebuilt, RebuildKind::Chunked))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrude::Extruder;
    use approx::assert_relative_eq;
    use stencilforge_core::{LineString, MultiPolygon, Polygon};
    use stencilforge_geometry::polygon::rect_polygon;

    fn plate() -> Mesh {
        let region = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (30.0, 0.0), (30.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![
                rect_polygon(7.0, 3.0, 9.5, 7.0).exterior().clone(),
                rect_polygon(14.0, 4.0, 17.0, 6.0).exterior().clone(),
            ],
        )]);
        Extruder::default().extrude(&region, 0.5).unwrap().mesh
    }

    #[test]
    fn test_tiles_cover_range() {
        let t = tiles(0..10, 4);
        assert_eq!(t, vec![0..4, 4..8, 8..10]);
        assert_eq!(with_margin(&(4..8), 2, 11), 2..11);
        assert_eq!(with_margin(&(0..4), 2, 11), 0..7);
    }

    #[test]
    fn test_chunked_matches_single_grid() {
        let source = plate();
        let (chunked, kind) = rebuild_chunked(&source, 0.25, 8.0, 1.0).unwrap();
        let single = voxel::rebuild(&source, 0.25).unwrap();
        assert_eq!(kind, RebuildKind::Chunked);
        assert!(chunked.is_watertight());
        assert_eq!(chunked.face_count(), single.face_count());
        assert_relative_eq!(chunked.volume(), single.volume(), max_relative = 1e-9);
    }

    #[test]
    fn test_chunked_bounds_within_one_pitch() {
        let source = plate();
        let pitch = 0.25;
        let (rebuilt, _) = rebuild_chunked(&source, pitch, 6.0, 1.0).unwrap();
        let (a, b) = (source.bounds().unwrap(), rebuilt.bounds().unwrap());
        for axis in 0..3 {
            assert!((a.min[axis] - b.min[axis]).abs() <= pitch);
            assert!((a.max[axis] - b.max[axis]).abs() <= pitch);
        }
    }
}
