//! End-to-end stencil generation from Gerber files on disk

use approx::assert_relative_eq;
use std::fs;
use std::path::Path;
use stencilforge::{generate_stencil, CancelFlag, Error, StencilConfig};
use stencilforge_core::{OutlineSource, RebuildKind};
use stencilforge_mesh::read_stl;
use stencilforge_settings::{LocatorMode, ModelBackend, OutputMode, QualityMode};
use tempfile::TempDir;

const OUTLINE: &str = "%FSLAX46Y46*%
%MOMM*%
%ADD10C,0.100000*%
D10*
X0Y0D02*
G01*
X40000000Y0D01*
X40000000Y24000000D01*
X0Y24000000D01*
X0Y0D01*
M02*
";

const PASTE: &str = "%FSLAX46Y46*%
%MOMM*%
%ADD11R,10.000000X10.000000*%
D11*
X20000000Y12000000D03*
M02*
";

// Aperture selected and moved, nothing drawn
const EMPTY_OUTLINE: &str = "%FSLAX46Y46*%
%MOMM*%
%ADD10C,0.100000*%
D10*
X0Y0D02*
M02*
";

fn board(with_outline: bool) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("board.GTP"), PASTE).unwrap();
    if with_outline {
        fs::create_dir_all(dir.path().join("mech")).unwrap();
        fs::write(dir.path().join("mech").join("board.gko"), OUTLINE).unwrap();
    }
    dir
}

fn exact_config() -> StencilConfig {
    StencilConfig {
        paste_offset_mm: 0.0,
        ..Default::default()
    }
}

fn volume(path: &Path) -> f64 {
    read_stl(path).unwrap().volume()
}

#[test]
fn test_solid_with_cutouts_volume() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let expected = (40.0 * 24.0 - 10.0 * 10.0) * 0.12;

    for backend in [ModelBackend::Triangulation, ModelBackend::Sfmesh] {
        let path = out.path().join(format!("{backend}.stl"));
        let config = StencilConfig {
            model_backend: backend,
            ..exact_config()
        };
        let trace = generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap();

        assert_eq!(trace.paste_files, vec!["board.GTP".to_string()]);
        assert_eq!(trace.outline_file.as_deref(), Some("board.gko"));
        assert_eq!(trace.outline.as_ref().unwrap().source, OutlineSource::RobustPolygonize);
        assert!(trace.mesh.as_ref().unwrap().watertight);
        assert!(trace.stl_faces > 0);
        assert_eq!(trace.stl_bytes, fs::metadata(&path).unwrap().len());
        assert_relative_eq!(volume(&path), expected, max_relative = 1e-4);
    }
}

#[test]
fn test_holes_only_extrudes_paste() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let path = out.path().join("holes.stl");
    let config = StencilConfig {
        output_mode: OutputMode::HolesOnly,
        ..exact_config()
    };
    generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap();
    assert_relative_eq!(volume(&path), 100.0 * 0.12, max_relative = 1e-4);
}

#[test]
fn test_missing_outline_uses_paste_bounds() {
    let dir = board(false);
    let out = TempDir::new().unwrap();
    let path = out.path().join("fallback.stl");
    let trace = generate_stencil(dir.path(), &path, &exact_config(), &CancelFlag::new()).unwrap();

    assert!(trace.outline_file.is_none());
    assert!(trace.outline.is_none());
    // 10 mm pad plus a 5 mm margin on every side
    assert_relative_eq!(volume(&path), (20.0 * 20.0 - 100.0) * 0.12, max_relative = 1e-4);
}

#[test]
fn test_paste_offset_shrinks_apertures() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let path = out.path().join("offset.stl");
    let config = StencilConfig {
        output_mode: OutputMode::HolesOnly,
        paste_offset_mm: -0.5,
        ..Default::default()
    };
    generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap();
    assert_relative_eq!(volume(&path), 9.0 * 9.0 * 0.12, max_relative = 1e-3);
}

#[test]
fn test_watertight_mode_end_to_end() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let path = out.path().join("watertight.stl");
    let mut config = exact_config();
    config.mesh.quality_mode = QualityMode::Watertight;
    config.mesh.voxel_pitch_mm = 0.24;
    config.mesh.adaptive_pitch_enabled = false;

    let trace = generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap();
    let mesh = trace.mesh.unwrap();
    assert_eq!(mesh.rebuild, RebuildKind::Single);
    assert!(mesh.watertight);
    assert!(read_stl(&path).unwrap().is_watertight());
}

#[test]
fn test_locator_ring_adds_height() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let path = out.path().join("ring.stl");
    let mut config = exact_config();
    config.model_backend = ModelBackend::Triangulation;
    config.locator.enabled = true;
    config.locator.mode = LocatorMode::Ring;
    config.locator.height_mm = 1.5;

    generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap();
    let bounds = read_stl(&path).unwrap().bounds().unwrap();
    assert_relative_eq!(bounds.max.z, 0.12 + 1.5, epsilon = 1e-5);
    // Ring outer edge at clearance + width beyond the 40 mm outline on both sides
    assert_relative_eq!(bounds.max.x - bounds.min.x, 40.0 + 2.0 * 2.2, epsilon = 0.05);
}

#[test]
fn test_unusable_outline_is_fatal() {
    let dir = board(false);
    fs::write(dir.path().join("board.gko"), EMPTY_OUTLINE).unwrap();
    let path = dir.path().join("out.stl");
    let mut config = exact_config();
    config.outline.buffer_fallback = false;

    let err = generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap_err();
    assert!(err.is_input_geometry());
    let msg = err.to_string();
    assert!(msg.contains("eps_mm=0.001"));
    assert!(msg.contains("fallback=false"));
    assert!(!path.exists());
}

#[test]
fn test_no_paste_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("board.gko"), OUTLINE).unwrap();
    let err = generate_stencil(
        dir.path(),
        &dir.path().join("out.stl"),
        &StencilConfig::default(),
        &CancelFlag::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::MissingLayer { .. }));
}

#[test]
fn test_offset_consuming_paste_is_input_error() {
    let dir = board(true);
    let config = StencilConfig {
        paste_offset_mm: -6.0,
        ..Default::default()
    };
    let err = generate_stencil(dir.path(), &dir.path().join("out.stl"), &config, &CancelFlag::new())
        .unwrap_err();
    assert!(err.is_input_geometry());
    assert!(err.to_string().contains("-6"));
}

#[test]
fn test_invalid_config_rejected_before_work() {
    let dir = board(true);
    let path = dir.path().join("out.stl");
    let config = StencilConfig {
        thickness_mm: 0.0,
        ..Default::default()
    };
    let err = generate_stencil(dir.path(), &path, &config, &CancelFlag::new()).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("thickness_mm"));
    assert!(!path.exists());
}

#[test]
fn test_cancelled_before_start() {
    let dir = board(true);
    let path = dir.path().join("out.stl");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = generate_stencil(dir.path(), &path, &StencilConfig::default(), &cancel).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!path.exists());
}

#[test]
fn test_trace_serializes() {
    let dir = board(true);
    let out = TempDir::new().unwrap();
    let trace = generate_stencil(
        dir.path(),
        &out.path().join("trace.stl"),
        &exact_config(),
        &CancelFlag::new(),
    )
    .unwrap();
    let json = trace.to_json().unwrap();
    assert!(json.contains("\"paste_files\""));
    assert!(json.contains("robust_polygonize"));
}
