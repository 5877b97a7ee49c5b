//! # Watertight voxel rebuild
//!
//! The mesh is sampled on a lattice of nodes, each node classified inside or
//! outside by ray parity along +z. The boundary between the two classes is
//! extracted with marching tetrahedra over the Freudenthal split of every
//! lattice cube, which yields a closed 2-manifold by construction. The
//! result is fitted back to the bounding box of the input.
//!
//! Nodes sit at cell centers with one padding layer outside the bounding
//! box, so faces lying exactly on the box are reproduced in place.

use crate::mesh::{Bounds3, Mesh};
use geo::kernels::{Kernel, Orientation, RobustKernel};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::ops::Range;
use stencilforge_core::Point2;
use stencilforge_settings::MeshSettings;
use thiserror::Error;
use tracing::{debug, info};

/// Node count above which a single grid is refused
pub const MAX_GRID_NODES: usize = 60_000_000;

/// Why a rebuild could not run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RebuildError {
    #[error("mesh is empty")]
    Empty,

    #[error("voxel pitch {0} mm is not positive")]
    InvalidPitch(f64),

    #[error("voxel grid of {nodes} nodes exceeds the limit of {limit}")]
    GridTooLarge { nodes: usize, limit: usize },

    #[error("surface extraction produced no faces")]
    NoSurface,

    #[error("rebuild panicked")]
    Panicked,
}

/// Sample lattice shared by every tile of a rebuild
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    /// Position of node (0, 0, 0)
    pub origin: Point3<f64>,
    pub step: Vector3<f64>,
    /// Node counts per axis, padding included
    pub dims: [usize; 3],
}

impl Lattice {
    /// Lattice with cells no larger than `pitch` covering `bounds`
    pub fn around(bounds: &Bounds3, pitch: f64) -> Result<Self, RebuildError> {
        if !(pitch > 0.0) {
            return Err(RebuildError::InvalidPitch(pitch));
        }
        let extents = bounds.extents();
        let mut step = Vector3::zeros();
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let cells = (extents[axis] / pitch).ceil().max(1.0) as usize;
            step[axis] = if extents[axis] > 0.0 {
                extents[axis] / cells as f64
            } else {
                pitch
            };
            dims[axis] = cells + 2;
        }
        let origin = bounds.min - step * 0.5;
        Ok(Self { origin, step, dims })
    }

    pub fn node_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn position(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(
            self.origin.x + i as f64 * self.step.x,
            self.origin.y + j as f64 * self.step.y,
            self.origin.z + k as f64 * self.step.z,
        )
    }

    fn linear(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.dims[1] + j) * self.dims[2] + k
    }

    /// Cube index range per axis (cube `c` spans nodes `c` and `c + 1`)
    pub fn cube_range(&self, axis: usize) -> Range<usize> {
        0..self.dims[axis] - 1
    }

    /// Column index range whose x or y falls inside `[lo, hi]`
    fn columns_within(&self, axis: usize, lo: f64, hi: f64, clamp: &Range<usize>) -> Range<usize> {
        let o = self.origin[axis];
        let s = self.step[axis];
        let first = ((lo - o) / s).ceil().max(0.0) as usize;
        let last = ((hi - o) / s).floor();
        if last < 0.0 {
            return 0..0;
        }
        let end = (last as usize + 1).min(clamp.end);
        first.max(clamp.start)..end.max(first.max(clamp.start))
    }
}

/// Inside/outside flags for a box of lattice nodes
pub(crate) struct Occupancy {
    xs: Range<usize>,
    ys: Range<usize>,
    nz: usize,
    inside: Vec<bool>,
}

impl Occupancy {
    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        ((i - self.xs.start) * self.ys.len() + (j - self.ys.start)) * self.nz + k
    }

    pub(crate) fn get(&self, i: usize, j: usize, k: usize) -> bool {
        self.inside[self.offset(i, j, k)]
    }
}

fn xy(p: &Point3<f64>) -> Point2 {
    Point2 { x: p.x, y: p.y }
}

fn signed_area2(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Edge ownership for points exactly on an edge of a CCW triangle
///
/// Antisymmetric in the edge direction, so a shared edge belongs to exactly
/// one of its two triangles.
fn owns_edge(from: Point2, to: Point2) -> bool {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    dy < 0.0 || (dy == 0.0 && dx < 0.0)
}

fn edge_admits(from: Point2, to: Point2, p: Point2) -> bool {
    match RobustKernel::orient2d(from, to, p) {
        Orientation::CounterClockwise => true,
        Orientation::Collinear => owns_edge(from, to),
        Orientation::Clockwise => false,
    }
}

/// Height where the vertical line through `p` crosses the triangle
fn ray_hit(tri: &[Point3<f64>; 3], p: Point2) -> Option<f64> {
    let (a, mut b, mut c) = (tri[0], tri[1], tri[2]);
    let area = signed_area2(xy(&a), xy(&b), xy(&c));
    if area == 0.0 {
        return None;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
    }
    let (a2, b2, c2) = (xy(&a), xy(&b), xy(&c));
    if !(edge_admits(a2, b2, p) && edge_admits(b2, c2, p) && edge_admits(c2, a2, p)) {
        return None;
    }
    let wa = signed_area2(b2, c2, p);
    let wb = signed_area2(c2, a2, p);
    let wc = signed_area2(a2, b2, p);
    let total = wa + wb + wc;
    if total.abs() <= f64::EPSILON {
        return Some((a.z + b.z + c.z) / 3.0);
    }
    Some((wa * a.z + wb * b.z + wc * c.z) / total)
}

/// Classify the nodes of `xs × ys × all z` by ray parity
pub(crate) fn classify(mesh: &Mesh, lattice: &Lattice, xs: Range<usize>, ys: Range<usize>) -> Occupancy {
    let (nx, ny) = (xs.len(), ys.len());
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); nx * ny];
    for face in &mesh.faces {
        let tri = mesh.triangle(face);
        let (mut lo, mut hi) = (xy(&tri[0]), xy(&tri[0]));
        for p in &tri[1..] {
            lo = Point2 { x: lo.x.min(p.x), y: lo.y.min(p.y) };
            hi = Point2 { x: hi.x.max(p.x), y: hi.y.max(p.y) };
        }
        for i in lattice.columns_within(0, lo.x, hi.x, &xs) {
            for j in lattice.columns_within(1, lo.y, hi.y, &ys) {
                let node = lattice.position(i, j, 0);
                if let Some(z) = ray_hit(&tri, xy(&node)) {
                    columns[(i - xs.start) * ny + (j - ys.start)].push(z);
                }
            }
        }
    }

    let nz = lattice.dims[2];
    let mut inside = vec![false; nx * ny * nz];
    for (c, hits) in columns.iter_mut().enumerate() {
        if hits.is_empty() {
            continue;
        }
        hits.sort_by(|a, b| a.total_cmp(b));
        let mut crossed = 0;
        for k in 0..nz {
            let z = lattice.origin.z + k as f64 * lattice.step.z;
            while crossed < hits.len() && hits[crossed] < z {
                crossed += 1;
            }
            inside[c * nz + k] = crossed % 2 == 1;
        }
    }
    Occupancy { xs, ys, nz, inside }
}

/// Cube corner offsets, bit 0 = x, bit 1 = y, bit 2 = z
const fn corner(bits: usize) -> [usize; 3] {
    [bits & 1, (bits >> 1) & 1, (bits >> 2) & 1]
}

/// Freudenthal split: one tetrahedron per axis permutation, all sharing the
/// main diagonal, which keeps face splits consistent between neighbours
const TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Surface vertices keyed on the lattice edge they sit on
#[derive(Default)]
pub(crate) struct SurfaceBuilder {
    pub(crate) mesh: Mesh,
    index: HashMap<(usize, usize), usize>,
}

impl SurfaceBuilder {
    fn vertex(&mut self, lattice: &Lattice, a: [usize; 3], b: [usize; 3]) -> usize {
        let ka = lattice.linear(a[0], a[1], a[2]);
        let kb = lattice.linear(b[0], b[1], b[2]);
        let key = (ka.min(kb), ka.max(kb));
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let pa = lattice.position(a[0], a[1], a[2]);
        let pb = lattice.position(b[0], b[1], b[2]);
        let i = self.mesh.vertices.len();
        self.mesh.vertices.push(Point3::from((pa.coords + pb.coords) * 0.5));
        self.index.insert(key, i);
        i
    }

    /// Push a triangle wound so its normal points along `outward`
    fn face(&mut self, mut f: [usize; 3], outward: Vector3<f64>) {
        if self.mesh.face_normal(&f).dot(&outward) < 0.0 {
            f.swap(1, 2);
        }
        self.mesh.faces.push(f);
    }

    fn tetrahedron(&mut self, lattice: &Lattice, nodes: [[usize; 3]; 4], inside: [bool; 4]) {
        let ins: Vec<usize> = (0..4).filter(|&t| inside[t]).collect();
        let outs: Vec<usize> = (0..4).filter(|&t| !inside[t]).collect();
        if ins.is_empty() || outs.is_empty() {
            return;
        }
        let centroid = |set: &[usize]| {
            set.iter()
                .map(|&t| lattice.position(nodes[t][0], nodes[t][1], nodes[t][2]).coords)
                .sum::<Vector3<f64>>()
                / set.len() as f64
        };
        let outward = centroid(&outs) - centroid(&ins);
        let mut edge = |a: usize, b: usize| self.vertex(lattice, nodes[a], nodes[b]);
        let faces: Vec<[usize; 3]> = match (ins.as_slice(), outs.as_slice()) {
            (&[v], &[o1, o2, o3]) => vec![[edge(v, o1), edge(v, o2), edge(v, o3)]],
            (&[i1, i2, i3], &[o]) => vec![[edge(o, i1), edge(o, i2), edge(o, i3)]],
            (&[a, b], &[c, d]) => {
                let (ac, ad, bd, bc) = (edge(a, c), edge(a, d), edge(b, d), edge(b, c));
                vec![[ac, ad, bd], [ac, bd, bc]]
            }
            _ => Vec::new(),
        };
        for f in faces {
            self.face(f, outward);
        }
    }

    /// Extract every cube in `xs × ys × all z` from `occupancy`
    pub(crate) fn extract(&mut self, lattice: &Lattice, occupancy: &Occupancy, xs: Range<usize>, ys: Range<usize>) {
        for i in xs {
            for j in ys.clone() {
                for k in lattice.cube_range(2) {
                    let mut flags = [false; 8];
                    let mut nodes = [[0usize; 3]; 8];
                    for (bits, slot) in nodes.iter_mut().enumerate() {
                        let [dx, dy, dz] = corner(bits);
                        *slot = [i + dx, j + dy, k + dz];
                        flags[bits] = occupancy.get(i + dx, j + dy, k + dz);
                    }
                    if flags.iter().all(|f| *f) || flags.iter().all(|f| !*f) {
                        continue;
                    }
                    for tet in TETS {
                        self.tetrahedron(
                            lattice,
                            tet.map(|c| nodes[c]),
                            tet.map(|c| flags[c]),
                        );
                    }
                }
            }
        }
    }
}

/// Scale and shift `mesh` so its bounds become `target`
pub fn fit_to_bounds(mesh: &mut Mesh, target: &Bounds3) {
    let Some(current) = mesh.bounds() else {
        return;
    };
    let (cur, tgt) = (current.extents(), target.extents());
    let mut scale = Vector3::new(1.0, 1.0, 1.0);
    for axis in 0..3 {
        if cur[axis] > 1e-12 && tgt[axis] > 0.0 {
            scale[axis] = tgt[axis] / cur[axis];
        }
    }
    for v in &mut mesh.vertices {
        let local = (*v - current.min).component_mul(&scale);
        *v = target.min + local;
    }
}

/// Voxel pitch for a mesh with the given bounds
///
/// Larger boards get a coarser pitch, clamped to the configured range; a
/// narrow hole then caps the pitch so it survives the rebuild.
pub fn adaptive_pitch(bounds: &Bounds3, settings: &MeshSettings, critical_hole_width: Option<f64>) -> f64 {
    let mut pitch = settings.voxel_pitch_mm;
    if !settings.adaptive_pitch_enabled {
        return pitch;
    }
    let longest = bounds.longest();
    pitch *= if longest > 180.0 {
        3.0
    } else if longest > 120.0 {
        2.4
    } else if longest > 80.0 {
        2.0
    } else if longest > 50.0 {
        1.6
    } else {
        1.0
    };
    pitch = pitch.clamp(settings.adaptive_pitch_min_mm, settings.adaptive_pitch_max_mm);
    if settings.hole_protect_enabled {
        if let Some(width) = critical_hole_width {
            let cap = settings.adaptive_pitch_min_mm.max(width / settings.hole_pitch_divisor);
            if pitch > cap {
                info!("Hole-protect pitch cap: {:.4} -> {:.4} (critical_hole={:.4} mm)", pitch, cap, width);
                pitch = cap;
            }
        }
    }
    pitch
}

/// Rebuild `mesh` as one grid at `pitch`
pub fn rebuild(mesh: &Mesh, pitch: f64) -> Result<Mesh, RebuildError> {
    let target = mesh.bounds().filter(|_| !mesh.is_empty()).ok_or(RebuildError::Empty)?;
    let lattice = Lattice::around(&target, pitch)?;
    let nodes = lattice.node_count();
    if nodes > MAX_GRID_NODES {
        return Err(RebuildError::GridTooLarge {
            nodes,
            limit: MAX_GRID_NODES,
        });
    }
    debug!("Voxel grid {:?} at pitch {:.4}", lattice.dims, pitch);

    let xs = 0..lattice.dims[0];
    let ys = 0..lattice.dims[1];
    let occupancy = classify(mesh, &lattice, xs, ys);
    let mut surface = SurfaceBuilder::default();
    surface.extract(&lattice, &occupancy, lattice.cube_range(0), lattice.cube_range(1));
    let mut rebuilt = surface.mesh;
    if rebuilt.is_empty() {
        return Err(RebuildError::NoSurface);
    }
    fit_to_bounds(&mut rebuilt, &target);
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrude::Extruder;
    use crate::mesh::tests::cube;
    use approx::assert_relative_eq;
    use stencilforge_core::{LineString, MultiPolygon, Polygon};
    use stencilforge_geometry::polygon::rect_polygon;

    fn bounds(mesh: &Mesh) -> Bounds3 {
        mesh.bounds().unwrap()
    }

    #[test]
    fn test_lattice_pads_bounds() {
        let b = Bounds3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(10.0, 5.0, 0.12),
        };
        let lattice = Lattice::around(&b, 0.1).unwrap();
        assert_eq!(lattice.dims, [102, 52, 4]);
        assert_relative_eq!(lattice.step.z, 0.06, epsilon = 1e-12);
        assert_relative_eq!(lattice.origin.z, -0.03, epsilon = 1e-12);
        assert!(Lattice::around(&b, 0.0).is_err());
    }

    #[test]
    fn test_ray_hit_shared_edge_counts_once() {
        let z = 1.0;
        let t1 = [Point3::new(0.0, 0.0, z), Point3::new(1.0, 0.0, z), Point3::new(1.0, 1.0, z)];
        let t2 = [Point3::new(0.0, 0.0, z), Point3::new(1.0, 1.0, z), Point3::new(0.0, 1.0, z)];
        let on_diagonal = Point2 { x: 0.5, y: 0.5 };
        let hits = [ray_hit(&t1, on_diagonal), ray_hit(&t2, on_diagonal)];
        assert_eq!(hits.iter().filter(|h| h.is_some()).count(), 1);
    }

    #[test]
    fn test_rebuild_cube_is_watertight() {
        let source = cube(1.0);
        let rebuilt = rebuild(&source, 0.05).unwrap();
        assert!(rebuilt.is_watertight());
        // edges come back chamfered by at most one cell
        assert_relative_eq!(rebuilt.volume(), 1.0, max_relative = 0.05);
        let b = bounds(&rebuilt);
        assert_relative_eq!(b.min.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(b.max.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rebuild_thin_plate_with_hole() {
        let region = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 5.0), (0.0, 0.0)]),
            vec![rect_polygon(3.0, 1.5, 7.0, 3.5).exterior().clone()],
        )]);
        let source = Extruder::default().extrude(&region, 0.12).unwrap().mesh;
        let rebuilt = rebuild(&source, 0.1).unwrap();
        assert!(rebuilt.is_watertight());
        assert_relative_eq!(rebuilt.volume(), source.volume(), max_relative = 0.05);
        let (a, b) = (bounds(&source), bounds(&rebuilt));
        assert_relative_eq!((a.max - b.max).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!((a.min - b.min).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rebuild_of_watertight_mesh_stays_watertight() {
        let once = rebuild(&cube(2.0), 0.25).unwrap();
        let twice = rebuild(&once, 0.25).unwrap();
        assert!(once.is_watertight() && twice.is_watertight());
        assert_relative_eq!(twice.volume(), once.volume(), max_relative = 0.01);
    }

    #[test]
    fn test_adaptive_pitch_steps_and_hole_cap() {
        let settings = MeshSettings::default();
        let board = |len: f64| Bounds3 {
            min: Point3::origin(),
            max: Point3::new(len, 20.0, 0.12),
        };
        assert_relative_eq!(adaptive_pitch(&board(40.0), &settings, None), 0.08);
        assert_relative_eq!(adaptive_pitch(&board(60.0), &settings, None), 0.128, epsilon = 1e-12);
        assert_relative_eq!(adaptive_pitch(&board(200.0), &settings, None), 0.24, epsilon = 1e-12);
        assert_relative_eq!(adaptive_pitch(&board(200.0), &settings, Some(0.3)), 0.1, epsilon = 1e-12);
        assert_relative_eq!(adaptive_pitch(&board(200.0), &settings, Some(0.1)), 0.08, epsilon = 1e-12);

        let fixed = MeshSettings {
            adaptive_pitch_enabled: false,
            voxel_pitch_mm: 0.5,
            ..Default::default()
        };
        assert_relative_eq!(adaptive_pitch(&board(200.0), &fixed, Some(0.1)), 0.5);
    }

    #[test]
    fn test_empty_mesh_is_refused() {
        assert_eq!(rebuild(&Mesh::default(), 0.1).unwrap_err(), RebuildError::Empty);
    }
}
