//! STL writing, reloading and post-write validation

use crate::mesh::Mesh;
use nalgebra::Point3;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use stencilforge_core::{ExportError, Result};
use stencilforge_settings::StlFormat;
use stl_io::{IndexedMesh, Normal, Triangle, Vertex};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// What the validated file on disk contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StlSummary {
    pub bytes: u64,
    pub faces: usize,
}

fn f32x3(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

fn unit_normal(mesh: &Mesh, face: &[usize; 3]) -> [f32; 3] {
    let n = mesh.face_normal(face);
    let len = n.norm();
    if len > 0.0 {
        let n = n / len;
        [n.x as f32, n.y as f32, n.z as f32]
    } else {
        [0.0; 3]
    }
}

fn write_binary(mesh: &Mesh, out: &mut impl Write) -> std::io::Result<()> {
    let triangles: Vec<Triangle> = mesh
        .faces
        .iter()
        .map(|f| {
            let [a, b, c] = mesh.triangle(f);
            Triangle {
                normal: Normal::new(unit_normal(mesh, f)),
                vertices: [Vertex::new(f32x3(&a)), Vertex::new(f32x3(&b)), Vertex::new(f32x3(&c))],
            }
        })
        .collect();
    stl_io::write_stl(out, triangles.iter())
}

fn write_ascii(mesh: &Mesh, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "solid stencilforge")?;
    for f in &mesh.faces {
        let [nx, ny, nz] = unit_normal(mesh, f);
        writeln!(out, "  facet normal {} {} {}", nx, ny, nz)?;
        writeln!(out, "    outer loop")?;
        for p in mesh.triangle(f) {
            let [x, y, z] = f32x3(&p);
            writeln!(out, "      vertex {} {} {}", x, y, z)?;
        }
        writeln!(out, "    endloop")?;
        writeln!(out, "  endfacet")?;
    }
    writeln!(out, "endsolid stencilforge")
}

/// Write `mesh` to `path` and validate the result by reloading it
///
/// The file is written next to `path` under a temporary name and only
/// renamed into place once it validates, so a failed export leaves no file
/// (and any earlier file at `path` untouched).
pub fn write_stl(mesh: &Mesh, path: &Path, format: StlFormat) -> Result<StlSummary> {
    if mesh.is_empty() {
        return Err(ExportError::EmptyMesh.into());
    }
    let summary = write_validated(path, |out| match format {
        StlFormat::Binary => write_binary(mesh, out),
        StlFormat::Ascii => write_ascii(mesh, out),
    })?;
    info!(
        "Wrote {:?} STL {} ({} bytes, {} faces)",
        format,
        path.display(),
        summary.bytes,
        summary.faces
    );
    Ok(summary)
}

fn write_validated<F>(path: &Path, write: F) -> Result<StlSummary>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> std::io::Result<()>,
{
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(&mut tmp);
        write(&mut out)?;
        out.flush()?;
    }

    // Dropping `tmp` on the error path removes it
    let summary = check_stl(tmp.path(), path)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(summary)
}

/// Check that a written STL is non-empty and reloads with at least one face
pub fn validate_stl(path: &Path) -> Result<StlSummary> {
    check_stl(path, path)
}

/// Validate the file at `on_disk`, reporting errors against `target`
fn check_stl(on_disk: &Path, target: &Path) -> Result<StlSummary> {
    let bytes = fs::metadata(on_disk)?.len();
    if bytes == 0 {
        return Err(ExportError::EmptyFile {
            path: target.to_path_buf(),
        }
        .into());
    }
    let reloaded = load_indexed(on_disk, target)?;
    let faces = reloaded.faces.len();
    debug!("Reloaded {} with {} faces", target.display(), faces);
    if faces == 0 {
        return Err(ExportError::NoFaces {
            path: target.to_path_buf(),
        }
        .into());
    }
    Ok(StlSummary { bytes, faces })
}

fn load_indexed(on_disk: &Path, target: &Path) -> Result<IndexedMesh> {
    let reload_failed = |e: std::io::Error| ExportError::ReloadFailed {
        path: target.to_path_buf(),
        reason: e.to_string(),
    };
    let mut file = File::open(on_disk).map_err(reload_failed)?;
    Ok(stl_io::read_stl(&mut file).map_err(reload_failed)?)
}

/// Load an STL file, ASCII or binary, as a [`Mesh`]
pub fn read_stl(path: &Path) -> Result<Mesh> {
    let indexed = load_indexed(path, path)?;
    let vertices = indexed
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();
    let faces = indexed.faces.iter().map(|f| f.vertices).collect();
    Ok(Mesh::new(vertices, faces))
}
