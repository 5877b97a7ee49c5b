//! # Prism extrusion of a planar region
//!
//! Each polygon is triangulated on its own, then turned into a prism: a top
//! triangle at `z = thickness` and a reversed copy at `z = 0` per kept
//! triangle, plus two wall triangles per ring edge.
//!
//! Triangulation runs as an ordered fallback chain:
//! 1. Constrained Delaunay (spade), keeping only triangles covered by the
//!    polygon
//! 2. Unconstrained Delaunay over the ring vertices, same coverage filter
//! 3. Ear clipping (earcutr)
//!
//! The first two must cover `min_coverage` of the polygon area to be
//! accepted. Kernel panics are caught and count as a failed attempt. A
//! polygon that exhausts the chain fails the whole extrusion.

use crate::mesh::Mesh;
use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::Area;
use nalgebra::Point3;
use spade::{
    ConstrainedDelaunayTriangulation, DelaunayTriangulation, Point2 as SpadePoint2, Triangulation,
};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use stencilforge_core::{GeometryError, MultiPolygon, Point2, Polygon, Result, StrategyAttempt};
use stencilforge_geometry::polygon;
use tracing::{debug, warn};

type Triangle2 = [Point2; 3];

/// Triangulation strategies in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Triangulator {
    Constrained,
    Unconstrained,
    EarClip,
}

impl Triangulator {
    const CHAIN: [Triangulator; 3] = [Self::Constrained, Self::Unconstrained, Self::EarClip];

    fn name(self) -> &'static str {
        match self {
            Self::Constrained => "constrained_delaunay",
            Self::Unconstrained => "unconstrained_delaunay",
            Self::EarClip => "ear_clipping",
        }
    }
}

/// Extruded mesh plus what the triangulation chain went through
#[derive(Debug, Clone, Default)]
pub struct Extrusion {
    pub mesh: Mesh,
    pub attempts: Vec<StrategyAttempt>,
}

/// Ring points without the closing duplicate or repeated neighbours
fn open_ring(points: &[Point2]) -> Vec<Point2> {
    let mut out: Vec<Point2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn polygon_rings(poly: &Polygon<f64>) -> Vec<Vec<Point2>> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors().iter())
        .map(|ring| open_ring(&ring.0))
        .filter(|ring| ring.len() >= 3)
        .collect()
}

fn bits(p: Point2) -> (u64, u64) {
    // -0.0 and 0.0 must share a key
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

fn edge_key(a: Point2, b: Point2) -> ((u64, u64), (u64, u64)) {
    let (ka, kb) = (bits(a), bits(b));
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

fn tri_area(t: &Triangle2) -> f64 {
    ((t[1].x - t[0].x) * (t[2].y - t[0].y) - (t[2].x - t[0].x) * (t[1].y - t[0].y)) * 0.5
}

fn midpoint(a: Point2, b: Point2) -> Point2 {
    Point2 {
        x: (a.x + b.x) * 0.5,
        y: (a.y + b.y) * 0.5,
    }
}

/// Coverage test against the source polygon
///
/// The centroid must lie inside, and so must the midpoint of every edge
/// that is not itself a ring edge.
struct CoverageFilter<'a> {
    poly: &'a Polygon<f64>,
    ring_edges: HashSet<((u64, u64), (u64, u64))>,
}

impl<'a> CoverageFilter<'a> {
    fn new(poly: &'a Polygon<f64>, rings: &[Vec<Point2>]) -> Self {
        let ring_edges = rings
            .iter()
            .flat_map(|ring| (0..ring.len()).map(move |i| edge_key(ring[i], ring[(i + 1) % ring.len()])))
            .collect();
        Self { poly, ring_edges }
    }

    fn covered(&self, p: Point2) -> bool {
        self.poly.coordinate_position(&p) != CoordPos::Outside
    }

    fn keeps(&self, t: &Triangle2) -> bool {
        if tri_area(t).abs() <= f64::EPSILON {
            return false;
        }
        let centroid = Point2 {
            x: (t[0].x + t[1].x + t[2].x) / 3.0,
            y: (t[0].y + t[1].y + t[2].y) / 3.0,
        };
        if self.poly.coordinate_position(&centroid) != CoordPos::Inside {
            return false;
        }
        (0..3).all(|i| {
            let (a, b) = (t[i], t[(i + 1) % 3]);
            self.ring_edges.contains(&edge_key(a, b)) || self.covered(midpoint(a, b))
        })
    }
}

fn to_spade(p: Point2) -> SpadePoint2<f64> {
    SpadePoint2::new(p.x, p.y)
}

fn from_spade(p: SpadePoint2<f64>) -> Point2 {
    Point2 { x: p.x, y: p.y }
}

fn constrained(rings: &[Vec<Point2>]) -> std::result::Result<Vec<Triangle2>, String> {
    let mut cdt = ConstrainedDelaunayTriangulation::<SpadePoint2<f64>>::new();
    for ring in rings {
        let mut handles = Vec::with_capacity(ring.len());
        for p in ring {
            handles.push(cdt.insert(to_spade(*p)).map_err(|e| format!("CDT insert: {e:?}"))?);
        }
        for i in 0..handles.len() {
            let (from, to) = (handles[i], handles[(i + 1) % handles.len()]);
            if from != to {
                cdt.add_constraint(from, to);
            }
        }
    }
    Ok(cdt
        .inner_faces()
        .map(|face| face.positions().map(from_spade))
        .collect())
}

fn unconstrained(rings: &[Vec<Point2>]) -> std::result::Result<Vec<Triangle2>, String> {
    let mut dt = DelaunayTriangulation::<SpadePoint2<f64>>::new();
    for p in rings.iter().flatten() {
        dt.insert(to_spade(*p)).map_err(|e| format!("Delaunay insert: {e:?}"))?;
    }
    Ok(dt
        .inner_faces()
        .map(|face| face.positions().map(from_spade))
        .collect())
}

fn ear_clip(rings: &[Vec<Point2>]) -> std::result::Result<Vec<Triangle2>, String> {
    let mut coords: Vec<Point2> = Vec::new();
    let mut hole_indices = Vec::with_capacity(rings.len().saturating_sub(1));
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            hole_indices.push(coords.len());
        }
        coords.extend_from_slice(ring);
    }
    let flat: Vec<f64> = coords.iter().flat_map(|p| [p.x, p.y]).collect();
    let indices = earcutr::earcut(&flat, &hole_indices, 2).map_err(|e| format!("earcut: {e:?}"))?;
    Ok(indices
        .chunks_exact(3)
        .map(|t| [coords[t[0]], coords[t[1]], coords[t[2]]])
        .collect())
}

/// Shared vertex table keyed on exact coordinates
#[derive(Default)]
struct VertexTable {
    mesh: Mesh,
    index: HashMap<(u64, u64, u64), usize>,
}

impl VertexTable {
    fn vertex(&mut self, p: Point2, z: f64) -> usize {
        let (kx, ky) = bits(p);
        let key = (kx, ky, (z + 0.0).to_bits());
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.mesh.vertices.len();
        self.mesh.vertices.push(Point3::new(p.x, p.y, z));
        self.index.insert(key, i);
        i
    }

    fn prism(&mut self, triangles: &[Triangle2], rings: &[Vec<Point2>], thickness: f64) {
        for t in triangles {
            let t = if tri_area(t) < 0.0 { [t[0], t[2], t[1]] } else { *t };
            let top = [
                self.vertex(t[0], thickness),
                self.vertex(t[1], thickness),
                self.vertex(t[2], thickness),
            ];
            let bottom = [self.vertex(t[0], 0.0), self.vertex(t[1], 0.0), self.vertex(t[2], 0.0)];
            self.mesh.faces.push(top);
            self.mesh.faces.push([bottom[0], bottom[2], bottom[1]]);
        }
        // Rings are oriented with material on the left, so outward is right
        for ring in rings {
            for i in 0..ring.len() {
                let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
                let a0 = self.vertex(a, 0.0);
                let b0 = self.vertex(b, 0.0);
                let a1 = self.vertex(a, thickness);
                let b1 = self.vertex(b, thickness);
                self.mesh.faces.push([a0, b0, b1]);
                self.mesh.faces.push([a0, b1, a1]);
            }
        }
    }
}

/// Planar region to prism mesh
#[derive(Debug, Clone, Copy)]
pub struct Extruder {
    min_coverage: f64,
}

impl Default for Extruder {
    fn default() -> Self {
        Self { min_coverage: 0.995 }
    }
}

impl Extruder {
    pub fn new(min_coverage: f64) -> Self {
        Self { min_coverage }
    }

    fn triangulate(
        &self,
        kind: Triangulator,
        poly: &Polygon<f64>,
        rings: &[Vec<Point2>],
    ) -> std::result::Result<Vec<Triangle2>, String> {
        let run = || match kind {
            Triangulator::Constrained => constrained(rings),
            Triangulator::Unconstrained => unconstrained(rings),
            Triangulator::EarClip => ear_clip(rings),
        };
        let triangles = panic::catch_unwind(AssertUnwindSafe(run))
            .map_err(|_| "triangulation kernel panicked".to_string())??;

        if kind == Triangulator::EarClip {
            if triangles.is_empty() {
                return Err("no triangles".to_string());
            }
            return Ok(triangles);
        }

        let filter = CoverageFilter::new(poly, rings);
        let kept: Vec<Triangle2> = triangles.into_iter().filter(|t| filter.keeps(t)).collect();
        let area = poly.unsigned_area();
        let covered: f64 = kept.iter().map(|t| tri_area(t).abs()).sum();
        let coverage = if area > 0.0 { covered / area } else { 0.0 };
        if coverage < self.min_coverage {
            return Err(format!(
                "coverage {:.3} below {:.3} (area={:.6} kept={:.6})",
                coverage, self.min_coverage, area, covered
            ));
        }
        Ok(kept)
    }

    /// Extrude every polygon of `region` from `z = 0` to `z = thickness`
    pub fn extrude(&self, region: &MultiPolygon<f64>, thickness: f64) -> Result<Extrusion> {
        self.extrude_with(region, thickness, &Triangulator::CHAIN)
    }

    fn extrude_with(&self, region: &MultiPolygon<f64>, thickness: f64, chain: &[Triangulator]) -> Result<Extrusion> {
        let region = polygon::orient(region);
        let polygons: Vec<&Polygon<f64>> = region.0.iter().filter(|p| p.unsigned_area() > 0.0).collect();
        if polygons.is_empty() {
            return Err(GeometryError::EmptyRegion {
                stage: "extrusion".to_string(),
            }
            .into());
        }

        let mut table = VertexTable::default();
        let mut attempts = Vec::new();
        let mut used: Vec<&'static str> = Vec::new();
        for (i, poly) in polygons.iter().enumerate() {
            let rings = polygon_rings(poly);
            if rings.is_empty() {
                continue;
            }
            let mut reasons = Vec::new();
            for &kind in chain {
                match self.triangulate(kind, poly, &rings) {
                    Ok(triangles) => {
                        table.prism(&triangles, &rings, thickness);
                        if !used.contains(&kind.name()) {
                            used.push(kind.name());
                        }
                        reasons.clear();
                        break;
                    }
                    Err(reason) => {
                        warn!("Polygon {} {} failed: {}", i, kind.name(), reason);
                        attempts.push(StrategyAttempt::failed(kind.name(), format!("polygon {i}: {reason}")));
                        reasons.push(format!("{}: {}", kind.name(), reason));
                    }
                }
            }
            if reasons.len() == chain.len() {
                return Err(GeometryError::Triangulation {
                    polygon: i,
                    area_mm2: poly.unsigned_area(),
                    reasons: reasons.join("; "),
                }
                .into());
            }
        }
        attempts.extend(used.into_iter().map(StrategyAttempt::succeeded));

        if table.mesh.is_empty() {
            return Err(GeometryError::NoTriangles {
                polygons: polygons.len(),
                thickness_mm: thickness,
            }
            .into());
        }
        debug!(
            "Extruded {} polygon(s): faces={} vertices={}",
            polygons.len(),
            table.mesh.face_count(),
            table.mesh.vertex_count()
        );
        Ok(Extrusion {
            mesh: table.mesh,
            attempts,
        })
    }
}
