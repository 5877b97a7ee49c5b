//! # Mesh post-processing
//!
//! Cleanup passes run on every mesh before export:
//! - vertex merge at a fixed decimal precision
//! - degenerate and duplicate face removal
//! - consistent, outward winding per connected component
//! - filling of 3- and 4-edge boundary loops
//! - translation of the bounding-box minimum to the origin
//!
//! Decimation is a separate, opt-in pass.

use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Meshes below this face count are never decimated
pub const DECIMATE_MIN_FACES: usize = 2000;
/// Decimation never targets fewer faces than this
pub const DECIMATE_FLOOR: usize = 500;

/// Twice-area below which a face counts as degenerate
const DEGENERATE_NORMAL: f64 = 1e-14;

fn undirected(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

fn quantize(v: f64, scale: f64) -> i64 {
    (v * scale).round() as i64
}

/// Snap vertices to `digits` decimals and merge the ones that coincide
pub fn merge_vertices(mesh: &mut Mesh, digits: u32) {
    let scale = 10f64.powi(digits as i32);
    let mut index: HashMap<(i64, i64, i64), usize> = HashMap::with_capacity(mesh.vertices.len());
    let mut merged = Vec::with_capacity(mesh.vertices.len());
    let remap: Vec<usize> = mesh
        .vertices
        .iter()
        .map(|v| {
            let key = (quantize(v.x, scale), quantize(v.y, scale), quantize(v.z, scale));
            *index.entry(key).or_insert_with(|| {
                merged.push(Point3::new(
                    key.0 as f64 / scale,
                    key.1 as f64 / scale,
                    key.2 as f64 / scale,
                ));
                merged.len() - 1
            })
        })
        .collect();
    for f in &mut mesh.faces {
        for i in f.iter_mut() {
            *i = remap[*i];
        }
    }
    mesh.vertices = merged;
}

/// Drop faces with repeated vertices or no area
pub fn remove_degenerate_faces(mesh: &mut Mesh) -> usize {
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;
    mesh.faces.retain(|f| {
        if f[0] == f[1] || f[1] == f[2] || f[0] == f[2] {
            return false;
        }
        let (a, b, c) = (vertices[f[0]], vertices[f[1]], vertices[f[2]]);
        (b - a).cross(&(c - a)).norm() > DEGENERATE_NORMAL
    });
    before - mesh.faces.len()
}

/// Drop faces using the same three vertices as an earlier face
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    let before = mesh.faces.len();
    let mut seen = HashSet::with_capacity(mesh.faces.len());
    mesh.faces.retain(|f| {
        let mut key = *f;
        key.sort_unstable();
        seen.insert(key)
    });
    before - mesh.faces.len()
}

fn has_directed(face: &[usize; 3], a: usize, b: usize) -> bool {
    (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b)
}

fn flip(face: &mut [usize; 3]) {
    face.swap(1, 2);
}

/// Make winding consistent across manifold edges, then outward
///
/// Each connected component is walked breadth first from its first face;
/// a component with negative signed volume is flipped as a whole.
pub fn fix_winding(mesh: &mut Mesh) -> usize {
    let mut adjacency: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (fi, f) in mesh.faces.iter().enumerate() {
        for i in 0..3 {
            adjacency.entry(undirected(f[i], f[(i + 1) % 3])).or_default().push(fi);
        }
    }

    let mut flipped = 0;
    let mut visited = vec![false; mesh.faces.len()];
    for seed in 0..mesh.faces.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut component = Vec::new();
        let mut queue = vec![seed];
        while let Some(fi) = queue.pop() {
            component.push(fi);
            let face = mesh.faces[fi];
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                let Some(neighbours) = adjacency.get(&undirected(a, b)) else {
                    continue;
                };
                if neighbours.len() != 2 {
                    continue;
                }
                let g = if neighbours[0] == fi { neighbours[1] } else { neighbours[0] };
                if visited[g] {
                    continue;
                }
                if has_directed(&mesh.faces[g], a, b) {
                    flip(&mut mesh.faces[g]);
                    flipped += 1;
                }
                visited[g] = true;
                queue.push(g);
            }
        }

        let volume: f64 = component
            .iter()
            .map(|&fi| {
                let [a, b, c] = mesh.triangle(&mesh.faces[fi]);
                a.coords.dot(&b.coords.cross(&c.coords))
            })
            .sum();
        if volume < 0.0 {
            for &fi in &component {
                flip(&mut mesh.faces[fi]);
            }
            flipped += component.len();
        }
    }
    flipped
}

/// Close boundary loops of three or four edges
pub fn fill_small_holes(mesh: &mut Mesh) -> usize {
    let counts = mesh.edge_counts();
    let mut next: HashMap<usize, Vec<usize>> = HashMap::new();
    for f in &mesh.faces {
        for i in 0..3 {
            let (a, b) = (f[i], f[(i + 1) % 3]);
            if counts.get(&undirected(a, b)) == Some(&1) {
                next.entry(a).or_default().push(b);
            }
        }
    }

    let mut starts: Vec<usize> = next.keys().copied().collect();
    starts.sort_unstable();
    let mut used: HashSet<usize> = HashSet::new();
    let mut patches = Vec::new();
    for start in starts {
        if used.contains(&start) {
            continue;
        }
        let mut ring = vec![start];
        let mut current = start;
        let closed = loop {
            match next.get(&current).map(Vec::as_slice) {
                Some(&[n]) if n == start => break true,
                Some(&[n]) if ring.len() < 4 && !ring.contains(&n) => {
                    ring.push(n);
                    current = n;
                }
                _ => break false,
            }
        };
        if !closed || ring.len() < 3 {
            continue;
        }
        used.extend(ring.iter().copied());
        match ring.as_slice() {
            &[v0, v1, v2] => patches.push([v1, v0, v2]),
            &[v0, v1, v2, v3] => {
                patches.push([v0, v3, v2]);
                patches.push([v0, v2, v1]);
            }
            _ => {}
        }
    }
    let added = patches.len();
    mesh.faces.extend(patches);
    added
}

/// Merge, drop bad faces and unreferenced vertices, then fix winding
pub fn cleanup(mesh: &mut Mesh, merge_digits: u32) {
    let before = mesh.face_count();
    merge_vertices(mesh, merge_digits);
    remove_degenerate_faces(mesh);
    remove_duplicate_faces(mesh);
    mesh.remove_unreferenced_vertices();
    fix_winding(mesh);
    info!("Mesh cleanup: faces {} -> {}", before, mesh.face_count());
}

/// Heavier topology pass: cleanup plus small-hole filling
pub fn repair_topology(mesh: &mut Mesh, merge_digits: u32) {
    cleanup(mesh, merge_digits);
    let filled = fill_small_holes(mesh);
    if filled > 0 {
        debug!("Filled {} small boundary loop(s)", filled);
        remove_duplicate_faces(mesh);
        fix_winding(mesh);
    }
}

/// Move the bounding-box minimum to the origin, returning the offset
pub fn translate_to_origin(mesh: &mut Mesh) -> Vector3<f64> {
    let Some(bounds) = mesh.bounds() else {
        return Vector3::zeros();
    };
    let offset = -bounds.min.coords;
    mesh.translate(offset);
    info!("Mesh translated to origin: offset=({:.4}, {:.4}, {:.4})", offset.x, offset.y, offset.z);
    offset
}

/// Closed-ness, Euler number and connected components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Topology {
    watertight: bool,
    euler: i64,
    components: usize,
}

impl Topology {
    fn of(mesh: &Mesh) -> Self {
        Self {
            watertight: mesh.is_watertight(),
            euler: mesh.euler_number(),
            components: component_count(mesh),
        }
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Vertex-connected components over referenced vertices
fn component_count(mesh: &Mesh) -> usize {
    let mut parent: Vec<usize> = (0..mesh.vertices.len()).collect();
    let mut used = vec![false; mesh.vertices.len()];
    for f in &mesh.faces {
        for i in 0..3 {
            used[f[i]] = true;
            let (a, b) = (find(&mut parent, f[i]), find(&mut parent, f[(i + 1) % 3]));
            if a != b {
                parent[a] = b;
            }
        }
    }
    (0..parent.len()).filter(|&i| used[i] && find(&mut parent, i) == i).count()
}

/// Merge vertices sharing a planar cell of size `cell` at the same height
///
/// Lossy: features narrower than `cell` collapse.
fn cluster(mesh: &Mesh, cell: f64, merge_digits: u32) -> Mesh {
    let z_scale = 10f64.powi(merge_digits as i32);
    let mut groups: HashMap<(i64, i64, i64), (Vector3<f64>, usize)> = HashMap::new();
    let keys: Vec<(i64, i64, i64)> = mesh
        .vertices
        .iter()
        .map(|v| {
            let key = (
                (v.x / cell).floor() as i64,
                (v.y / cell).floor() as i64,
                quantize(v.z, z_scale),
            );
            let entry = groups.entry(key).or_insert((Vector3::zeros(), 0));
            entry.0 += v.coords;
            entry.1 += 1;
            key
        })
        .collect();

    let mut order: HashMap<(i64, i64, i64), usize> = HashMap::with_capacity(groups.len());
    let mut vertices = Vec::with_capacity(groups.len());
    let remap: Vec<usize> = keys
        .iter()
        .map(|key| {
            *order.entry(*key).or_insert_with(|| {
                let (sum, n) = groups[key];
                vertices.push(Point3::from(sum / n as f64));
                vertices.len() - 1
            })
        })
        .collect();
    let faces = mesh.faces.iter().map(|f| [remap[f[0]], remap[f[1]], remap[f[2]]]).collect();
    let mut out = Mesh::new(vertices, faces);
    remove_degenerate_faces(&mut out);
    remove_duplicate_faces(&mut out);
    out.remove_unreferenced_vertices();
    out
}

/// Planar vertex-clustering decimation towards `faces · ratio`
///
/// Vertex clustering is lossy, so every pass is checked against the input
/// topology; the first pass that differs (a collapsed aperture, a
/// non-manifold seam) ends the search and the last good result is kept.
/// Height levels are kept apart so thin plates keep both faces.
/// Returns `None` when decimation does not apply or makes nothing smaller.
pub fn decimate(mesh: &Mesh, ratio: f64, merge_digits: u32) -> Option<Mesh> {
    let faces = mesh.face_count();
    if ratio >= 1.0 || faces < DECIMATE_MIN_FACES {
        return None;
    }
    let target = DECIMATE_FLOOR.max((faces as f64 * ratio) as usize);
    let bounds = mesh.bounds()?;
    let extents = bounds.extents();
    let mut cell = (extents.x.hypot(extents.y) / (target as f64).sqrt()).max(1e-6);
    let topology = Topology::of(mesh);

    let mut best: Option<(Mesh, f64)> = None;
    for _ in 0..16 {
        let candidate = cluster(mesh, cell, merge_digits);
        if candidate.is_empty() {
            break;
        }
        if Topology::of(&candidate) != topology {
            debug!("Decimation cell {:.4} mm changes topology; stopping", cell);
            break;
        }
        let reached = candidate.face_count() <= target;
        best = Some((candidate, cell));
        if reached {
            break;
        }
        cell *= 2.0;
    }
    let (best, cell) = best.filter(|(m, _)| m.face_count() < faces)?;
    info!(
        "Decimation: faces {} -> {} (ratio={:.3}, cell={:.4} mm)",
        faces,
        best.face_count(),
        ratio,
        cell
    );
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::cube;
    use crate::voxel;
    use approx::assert_relative_eq;

    #[test]
    fn test_merge_vertices_welds_split_cube() {
        let mesh = cube(1.0);
        // split every face onto its own vertices, with sub-precision noise
        let mut split = Mesh::default();
        for (n, f) in mesh.faces.iter().enumerate() {
            let base = split.vertices.len();
            for &i in f {
                let noise = if n % 2 == 0 { 1e-9 } else { 0.0 };
                split.vertices.push(mesh.vertices[i] + Vector3::new(noise, 0.0, 0.0));
            }
            split.faces.push([base, base + 1, base + 2]);
        }
        assert!(!split.is_watertight());
        merge_vertices(&mut split, 6);
        assert_eq!(split.vertex_count(), 8);
        assert!(split.is_watertight());
    }

    #[test]
    fn test_degenerate_and_duplicate_faces_removed() {
        let mut mesh = cube(1.0);
        mesh.faces.push([0, 0, 1]);
        mesh.faces.push([2, 1, 0]);
        mesh.vertices.push(Point3::new(0.5, 0.0, 0.0));
        mesh.faces.push([0, 1, 8]);
        assert_eq!(remove_degenerate_faces(&mut mesh), 2);
        assert_eq!(remove_duplicate_faces(&mut mesh), 1);
        assert_eq!(mesh.face_count(), 12);
    }

    #[test]
    fn test_fix_winding_restores_outward_orientation() {
        let mut mesh = cube(1.0);
        for i in [1, 4, 7] {
            flip(&mut mesh.faces[i]);
        }
        fix_winding(&mut mesh);
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-12);

        let mut inverted = cube(1.0);
        inverted.faces.iter_mut().for_each(flip);
        assert!(inverted.volume() < 0.0);
        assert_eq!(fix_winding(&mut inverted), 12);
        assert_relative_eq!(inverted.volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fill_triangle_and_quad_holes() {
        let mut one = cube(1.0);
        one.faces.remove(2);
        assert_eq!(fill_small_holes(&mut one), 1);
        assert!(one.is_watertight());
        assert_relative_eq!(one.volume(), 1.0, epsilon = 1e-12);

        let mut two = cube(1.0);
        two.faces.drain(2..4);
        assert_eq!(fill_small_holes(&mut two), 2);
        assert!(two.is_watertight());
        assert_relative_eq!(two.volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_translate_to_origin() {
        let mut mesh = cube(1.0);
        mesh.translate(Vector3::new(-3.0, 2.0, -0.5));
        let offset = translate_to_origin(&mut mesh);
        assert_relative_eq!(offset.x, 3.0);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.min.coords.norm(), 0.0);
    }

    #[test]
    fn test_component_count() {
        let mut two = cube(1.0);
        let mut other = cube(1.0);
        other.translate(Vector3::new(3.0, 0.0, 0.0));
        two.append(&other);
        assert_eq!(component_count(&cube(1.0)), 1);
        assert_eq!(component_count(&two), 2);
    }

    #[test]
    fn test_decimate_keeps_small_apertures_open() {
        use crate::extrude::Extruder;
        use stencilforge_core::{MultiPolygon, Polygon};
        use stencilforge_geometry::polygon::rect_polygon;

        let apertures = [(1.0, 1.0), (2.0, 1.0), (3.5, 2.5), (5.0, 2.5)]
            .iter()
            .map(|&(x, y)| rect_polygon(x, y, x + 0.4, y + 0.4).exterior().clone())
            .collect();
        let plate = MultiPolygon::new(vec![Polygon::new(
            rect_polygon(0.0, 0.0, 6.0, 4.0).exterior().clone(),
            apertures,
        )]);
        let source = Extruder::default().extrude(&plate, 0.3).unwrap().mesh;
        let dense = voxel::rebuild(&source, 0.05).unwrap();
        assert!(dense.is_watertight());
        assert_eq!(dense.euler_number(), 2 - 2 * 4);
        assert!(dense.face_count() >= DECIMATE_MIN_FACES);

        // Every aperture fits inside one 2 mm cell, so clustering alone closes them
        assert_ne!(Topology::of(&cluster(&dense, 2.0, 6)), Topology::of(&dense));

        // A 0.02 ratio asks for cells far wider than the apertures
        let decimated = decimate(&dense, 0.02, 6).unwrap_or_else(|| dense.clone());
        assert!(decimated.is_watertight());
        assert_eq!(decimated.euler_number(), dense.euler_number());
        assert_eq!(component_count(&decimated), 1);
    }

    #[test]
    fn test_decimate_reduces_dense_mesh() {
        let dense = voxel::rebuild(&cube(1.0), 0.05).unwrap();
        assert!(dense.face_count() >= DECIMATE_MIN_FACES);
        if let Some(decimated) = decimate(&dense, 0.25, 6) {
            assert!(decimated.face_count() < dense.face_count());
            assert_eq!(Topology::of(&decimated), Topology::of(&dense));
        }
        assert!(decimate(&cube(1.0), 0.25, 6).is_none());
        assert!(decimate(&dense, 1.0, 6).is_none());
    }
}
