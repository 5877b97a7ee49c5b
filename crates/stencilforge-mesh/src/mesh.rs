//! # Indexed triangle mesh
//!
//! Vertex array plus triangle index array, nothing else. Normals are derived
//! from winding when needed; the STL writer computes them per face.

use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Indexed triangle mesh in millimeters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

/// Axis-aligned bounds of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds3 {
    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Longest of the three extents
    pub fn longest(&self) -> f64 {
        self.extents().max()
    }
}

impl Mesh {
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Bounds over referenced and unreferenced vertices alike
    pub fn bounds(&self) -> Option<Bounds3> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices[1..] {
            min = min.inf(v);
            max = max.sup(v);
        }
        Some(Bounds3 { min, max })
    }

    pub fn triangle(&self, face: &[usize; 3]) -> [Point3<f64>; 3] {
        [
            self.vertices[face[0]],
            self.vertices[face[1]],
            self.vertices[face[2]],
        ]
    }

    /// Unnormalized face normal (length is twice the area)
    pub fn face_normal(&self, face: &[usize; 3]) -> Vector3<f64> {
        let [a, b, c] = self.triangle(face);
        (b - a).cross(&(c - a))
    }

    pub fn face_area(&self, face: &[usize; 3]) -> f64 {
        self.face_normal(face).norm() * 0.5
    }

    pub fn translate(&mut self, offset: Vector3<f64>) {
        for v in &mut self.vertices {
            *v += offset;
        }
    }

    /// Append another mesh, reindexing its faces
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + base, f[1] + base, f[2] + base]),
        );
    }

    /// Concatenate meshes without merging vertices
    pub fn concatenate<'a, I>(meshes: I) -> Mesh
    where
        I: IntoIterator<Item = &'a Mesh>,
    {
        let mut out = Mesh::default();
        for mesh in meshes {
            out.append(mesh);
        }
        out
    }

    /// Signed volume by the divergence theorem; positive for outward winding
    pub fn volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|f| {
                let [a, b, c] = self.triangle(f);
                a.coords.dot(&b.coords.cross(&c.coords))
            })
            .sum::<f64>()
            / 6.0
    }

    /// Undirected edge use counts
    pub fn edge_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::with_capacity(self.faces.len() * 3 / 2);
        for f in &self.faces {
            for i in 0..3 {
                let (a, b) = (f[i], f[(i + 1) % 3]);
                *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Every edge shared by exactly two faces
    pub fn is_watertight(&self) -> bool {
        !self.faces.is_empty() && self.edge_counts().values().all(|&n| n == 2)
    }

    /// V - E + F over referenced vertices
    pub fn euler_number(&self) -> i64 {
        let mut used = vec![false; self.vertices.len()];
        for f in &self.faces {
            for &i in f {
                used[i] = true;
            }
        }
        let v = used.iter().filter(|u| **u).count() as i64;
        let e = self.edge_counts().len() as i64;
        v - e + self.faces.len() as i64
    }

    /// Drop vertices no face refers to
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len());
        for f in &mut self.faces {
            for i in f.iter_mut() {
                if remap[*i] == usize::MAX {
                    remap[*i] = kept.len();
                    kept.push(self.vertices[*i]);
                }
                *i = remap[*i];
            }
        }
        self.vertices = kept;
    }
}
