//! Mesh backends
//!
//! A backend turns the final 2D stencil region into a validated STL file.
//! Both backends share extrusion, locator placement and export; they differ
//! in how much post-processing runs in between.

use crate::chunked::rebuild_chunked;
use crate::extrude::Extruder;
use crate::mesh::Mesh;
use crate::prepare::{critical_hole_width, prepare_region};
use crate::repair::{cleanup, decimate, repair_topology, translate_to_origin};
use crate::stl::{write_stl, StlSummary};
use crate::voxel::{self, adaptive_pitch, RebuildError};
use nalgebra::Vector3;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use stencilforge_core::{Degradation, MeshReport, MultiPolygon, RebuildKind, Result};
use stencilforge_geometry::LocatorGeometry;
use stencilforge_settings::{MeshSettings, ModelBackend, QualityMode, StencilConfig};
use tracing::{info, warn};

/// Regions handed to a backend
#[derive(Debug, Clone, Copy)]
pub struct ExportInput<'a> {
    /// Stencil plane, extruded from `z = 0` to the configured thickness
    pub stencil: &'a MultiPolygon<f64>,
    /// Locator ring, placed on top of the stencil
    pub ring: Option<&'a MultiPolygon<f64>>,
    /// Locator step, hanging below the stencil
    pub step: Option<&'a MultiPolygon<f64>>,
}

impl<'a> ExportInput<'a> {
    pub fn new(stencil: &'a MultiPolygon<f64>) -> Self {
        Self {
            stencil,
            ring: None,
            step: None,
        }
    }

    pub fn with_locators(mut self, locators: &'a LocatorGeometry) -> Self {
        self.ring = locators.ring.as_ref();
        self.step = locators.step.as_ref();
        self
    }
}

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub report: MeshReport,
    pub stl: StlSummary,
    /// Best-effort steps that failed without aborting the export
    pub degradations: Vec<Degradation>,
}

/// Converts a stencil region into an STL file
pub trait MeshBackend: Send + Sync {
    /// Get the name/identifier of this backend
    fn name(&self) -> &str;

    /// Get a description of what this backend does
    fn description(&self) -> &str;

    /// Build the solid and write it to `path`
    ///
    /// Fails on empty input, on an extrusion that yields no triangles and on
    /// an STL that does not validate after writing.
    fn export(&self, input: &ExportInput<'_>, config: &StencilConfig, path: &Path) -> Result<ExportSummary>;
}

/// Backend for the configured [`ModelBackend`]
pub fn backend_for(kind: ModelBackend) -> Box<dyn MeshBackend> {
    match kind {
        ModelBackend::Triangulation => Box::new(TriangulationBackend),
        ModelBackend::Sfmesh => Box::new(SfmeshBackend),
    }
}

fn degrade(degradations: &mut Vec<Degradation>, stage: &str, reason: impl std::fmt::Display) {
    let reason = reason.to_string();
    warn!("{} degraded: {}", stage, reason);
    degradations.push(Degradation {
        stage: stage.to_string(),
        reason,
    });
}

/// Extrude the locator ring and step into place
///
/// With `settings` set, the regions go through geometry preparation first,
/// holes kept. A locator that fails to extrude is skipped.
fn locator_meshes(
    extruder: &Extruder,
    input: &ExportInput<'_>,
    config: &StencilConfig,
    settings: Option<&MeshSettings>,
    degradations: &mut Vec<Degradation>,
) -> Vec<Mesh> {
    let locator = &config.locator;
    let parts = [
        (input.ring, "locator_ring", locator.height_mm, config.thickness_mm),
        (input.step, "locator_step", locator.step_height_mm, -locator.step_height_mm),
    ];

    let mut meshes = Vec::new();
    for (region, stage, height, z) in parts {
        let Some(region) = region else {
            continue;
        };
        let region = match settings {
            Some(settings) => prepare_region(region, settings, false),
            None => region.clone(),
        };
        match extruder.extrude(&region, height) {
            Ok(extrusion) => {
                let mut mesh = extrusion.mesh;
                mesh.translate(Vector3::new(0.0, 0.0, z));
                info!("{}: {} faces at z={:.3}", stage, mesh.face_count(), z);
                meshes.push(mesh);
            }
            Err(e) => degrade(degradations, stage, e),
        }
    }
    meshes
}

/// Whether the voxel rebuild should run for this mesh
fn should_rebuild(mode: QualityMode, mesh: &Mesh, face_limit: usize) -> bool {
    match mode {
        QualityMode::Fast => false,
        _ if mesh.face_count() > face_limit => {
            warn!(
                "Skipping watertight rebuild: {} faces exceeds limit {}",
                mesh.face_count(),
                face_limit
            );
            false
        }
        QualityMode::Auto => !mesh.is_watertight(),
        QualityMode::Watertight => true,
    }
}

/// Single or chunked rebuild, with panics reported as failures
fn run_rebuild(mesh: &Mesh, pitch: f64, settings: &MeshSettings) -> std::result::Result<(Mesh, RebuildKind), RebuildError> {
    let chunked = mesh
        .bounds()
        .is_some_and(|b| b.longest() > settings.chunk_size_mm);
    panic::catch_unwind(AssertUnwindSafe(|| {
        if chunked {
            rebuild_chunked(mesh, pitch, settings.chunk_size_mm, settings.chunk_overlap_mm)
        } else {
            voxel::rebuild(mesh, pitch).map(|m| (m, RebuildKind::Single))
        }
    }))
    .unwrap_or(Err(RebuildError::Panicked))
}

/// Translate, measure and write the final mesh
fn finish(
    mut mesh: Mesh,
    mut report: MeshReport,
    degradations: Vec<Degradation>,
    config: &StencilConfig,
    path: &Path,
) -> Result<ExportSummary> {
    translate_to_origin(&mut mesh);
    report.faces = mesh.face_count();
    report.vertices = mesh.vertex_count();
    report.watertight = mesh.is_watertight();
    report.euler_number = mesh.euler_number();
    info!(
        "Mesh stats: faces={} vertices={} watertight={} euler={}",
        report.faces, report.vertices, report.watertight, report.euler_number
    );

    let stl = write_stl(&mesh, path, config.stl.format)?;
    Ok(ExportSummary {
        report,
        stl,
        degradations,
    })
}

/// Plain extrusion with cleanup, no voxel pass
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangulationBackend;

impl MeshBackend for TriangulationBackend {
    fn name(&self) -> &str {
        "triangulation"
    }

    fn description(&self) -> &str {
        "Extrude with constrained triangulation and clean up the result"
    }

    fn export(&self, input: &ExportInput<'_>, config: &StencilConfig, path: &Path) -> Result<ExportSummary> {
        let extruder = Extruder::new(config.mesh.min_coverage_ratio);
        let extrusion = extruder.extrude(input.stencil, config.thickness_mm)?;
        let report = MeshReport {
            extrusion_attempts: extrusion.attempts,
            ..Default::default()
        };

        let mut degradations = Vec::new();
        let mut mesh = extrusion.mesh;
        for locator in locator_meshes(&extruder, input, config, None, &mut degradations) {
            mesh.append(&locator);
        }
        cleanup(&mut mesh, config.mesh.merge_digits);
        finish(mesh, report, degradations, config, path)
    }
}

/// Extrusion followed by the watertight rebuild and repair passes
#[derive(Debug, Clone, Copy, Default)]
pub struct SfmeshBackend;

impl MeshBackend for SfmeshBackend {
    fn name(&self) -> &str {
        "sfmesh"
    }

    fn description(&self) -> &str {
        "Prepare, extrude, optionally rebuild watertight, decimate and repair"
    }

    fn export(&self, input: &ExportInput<'_>, config: &StencilConfig, path: &Path) -> Result<ExportSummary> {
        let settings = &config.mesh;
        let extruder = Extruder::new(settings.min_coverage_ratio);
        let region = prepare_region(input.stencil, settings, true);
        let extrusion = extruder.extrude(&region, config.thickness_mm)?;
        let mut report = MeshReport {
            extrusion_attempts: extrusion.attempts,
            ..Default::default()
        };

        let mut degradations = Vec::new();
        let mut mesh = extrusion.mesh;
        for locator in locator_meshes(&extruder, input, config, Some(settings), &mut degradations) {
            mesh.append(&locator);
        }

        if settings.hole_protect_enabled {
            report.critical_hole_width_mm = critical_hole_width(&region, settings.hole_protect_max_width_mm);
        }

        if should_rebuild(settings.quality_mode, &mesh, settings.watertight_face_limit) {
            if let Some(bounds) = mesh.bounds() {
                let pitch = adaptive_pitch(&bounds, settings, report.critical_hole_width_mm);
                report.pitch_mm = Some(pitch);
                info!(
                    "Watertight rebuild: mode={} pitch={:.4} faces={}",
                    settings.quality_mode,
                    pitch,
                    mesh.face_count()
                );
                match run_rebuild(&mesh, pitch, settings) {
                    Ok((rebuilt, kind)) => {
                        mesh = rebuilt;
                        report.rebuild = kind;
                    }
                    Err(e) => degrade(&mut degradations, "watertight_rebuild", e),
                }
            }
        }

        if let Some(decimated) = decimate(&mesh, settings.decimate_target_ratio, settings.merge_digits) {
            mesh = decimated;
        }
        repair_topology(&mut mesh, settings.merge_digits);
        if report.rebuild != RebuildKind::None && !mesh.is_watertight() {
            warn!("Mesh is not watertight after rebuild");
        }
        finish(mesh, report, degradations, config, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::cube;

    #[test]
    fn test_should_rebuild_gates() {
        let closed = cube(1.0);
        let mut open = cube(1.0);
        open.faces.pop();

        assert!(!should_rebuild(QualityMode::Fast, &open, 1000));
        assert!(!should_rebuild(QualityMode::Auto, &closed, 1000));
        assert!(should_rebuild(QualityMode::Auto, &open, 1000));
        assert!(should_rebuild(QualityMode::Watertight, &closed, 1000));
        assert!(!should_rebuild(QualityMode::Watertight, &closed, 10));
    }

    #[test]
    fn test_backend_factory() {
        assert_eq!(backend_for(ModelBackend::Triangulation).name(), "triangulation");
        assert_eq!(backend_for(ModelBackend::Sfmesh).name(), "sfmesh");
    }

    #[test]
    fn test_run_rebuild_reports_kind() {
        let settings = MeshSettings {
            chunk_size_mm: 0.5,
            ..Default::default()
        };
        let (_, kind) = run_rebuild(&cube(1.0), 0.1, &settings).unwrap();
        assert!(matches!(kind, RebuildKind::Chunked | RebuildKind::ChunkedResealed));

        let (_, kind) = run_rebuild(&cube(1.0), 0.1, &MeshSettings::default()).unwrap();
        assert_eq!(kind, RebuildKind::Single);
    }
}
