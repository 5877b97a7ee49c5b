use approx::assert_relative_eq;
use stencilforge_core::{LineString, MultiPolygon, Polygon, RebuildKind};
use stencilforge_geometry::polygon::rect_polygon;
use stencilforge_mesh::{backend_for, read_stl, ExportInput, MeshBackend, SfmeshBackend, TriangulationBackend};
use stencilforge_settings::{ModelBackend, QualityMode, StencilConfig, StlFormat};
use tempfile::tempdir;

fn plate(width: f64, height: f64, hole: (f64, f64, f64, f64)) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![Polygon::new(
        LineString::from(vec![(0.0, 0.0), (width, 0.0), (width, height), (0.0, height), (0.0, 0.0)]),
        vec![rect_polygon(hole.0, hole.1, hole.2, hole.3).exterior().clone()],
    )])
}

fn small_pitch_config(mode: QualityMode) -> StencilConfig {
    let mut config = StencilConfig::default();
    config.mesh.quality_mode = mode;
    config.mesh.voxel_pitch_mm = 0.2;
    config.mesh.adaptive_pitch_enabled = false;
    config
}

#[test]
fn test_solid_with_cutout_volume() {
    let dir = tempdir().unwrap();
    let region = plate(40.0, 24.0, (15.0, 7.0, 25.0, 17.0));
    let expected = (40.0 * 24.0 - 10.0 * 10.0) * 0.12;

    for kind in [ModelBackend::Triangulation, ModelBackend::Sfmesh] {
        let path = dir.path().join(format!("{kind}.stl"));
        let summary = backend_for(kind)
            .export(&ExportInput::new(&region), &StencilConfig::default(), &path)
            .unwrap();
        assert!(summary.report.watertight);
        assert_eq!(summary.report.rebuild, RebuildKind::None);

        let mesh = read_stl(&path).unwrap();
        assert_eq!(mesh.face_count(), summary.stl.faces);
        assert_relative_eq!(mesh.volume(), expected, max_relative = 1e-4);
    }
}

#[test]
fn test_ascii_output_reloads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("ascii.stl");
    let mut config = StencilConfig::default();
    config.stl.format = StlFormat::Ascii;

    let region = plate(20.0, 10.0, (5.0, 3.0, 8.0, 6.0));
    let summary = TriangulationBackend
        .export(&ExportInput::new(&region), &config, &path)
        .unwrap();
    assert!(summary.stl.faces > 0);
    assert!(std::fs::read_to_string(&path).unwrap().starts_with("solid stencilforge"));
}

#[test]
fn test_output_starts_at_origin() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shifted.stl");
    let region = MultiPolygon::new(vec![rect_polygon(100.0, 50.0, 110.0, 55.0)]);
    TriangulationBackend
        .export(&ExportInput::new(&region), &StencilConfig::default(), &path)
        .unwrap();

    let bounds = read_stl(&path).unwrap().bounds().unwrap();
    assert_relative_eq!(bounds.min.x, 0.0, epsilon = 1e-6);
    assert_relative_eq!(bounds.min.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(bounds.min.z, 0.0, epsilon = 1e-6);
    assert_relative_eq!(bounds.max.x, 10.0, epsilon = 1e-5);
}

#[test]
fn test_watertight_mode_keeps_watertight() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("watertight.stl");
    let region = plate(12.0, 8.0, (4.6, 2.6, 7.4, 5.4));
    let config = small_pitch_config(QualityMode::Watertight);

    let summary = SfmeshBackend
        .export(&ExportInput::new(&region), &config, &path)
        .unwrap();
    assert_eq!(summary.report.rebuild, RebuildKind::Single);
    assert_eq!(summary.report.pitch_mm, Some(0.2));
    assert!(summary.report.watertight);
    assert!(summary.degradations.is_empty());

    let mesh = read_stl(&path).unwrap();
    assert_relative_eq!(mesh.volume(), (96.0 - 2.8 * 2.8) * 0.12, max_relative = 0.1);
}

#[test]
fn test_auto_mode_skips_closed_mesh() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("auto.stl");
    let region = plate(12.0, 8.0, (4.0, 2.0, 7.0, 5.0));
    let summary = SfmeshBackend
        .export(&ExportInput::new(&region), &small_pitch_config(QualityMode::Auto), &path)
        .unwrap();
    assert_eq!(summary.report.rebuild, RebuildKind::None);
    assert!(summary.report.pitch_mm.is_none());
}

#[test]
fn test_chunked_rebuild_keeps_bounds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunked.stl");
    let region = plate(30.0, 10.0, (12.0, 3.0, 18.0, 7.0));
    let mut config = small_pitch_config(QualityMode::Watertight);
    config.mesh.chunk_size_mm = 6.0;

    let summary = SfmeshBackend
        .export(&ExportInput::new(&region), &config, &path)
        .unwrap();
    assert!(matches!(
        summary.report.rebuild,
        RebuildKind::Chunked | RebuildKind::ChunkedResealed
    ));

    let bounds = read_stl(&path).unwrap().bounds().unwrap();
    let extents = bounds.extents();
    assert!((extents.x - 30.0).abs() <= 0.2);
    assert!((extents.y - 10.0).abs() <= 0.2);
    assert!((extents.z - 0.12).abs() <= 0.2);
}

#[test]
fn test_locator_ring_sits_on_top() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring.stl");
    let stencil = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 20.0, 10.0)]);
    let ring = MultiPolygon::new(vec![Polygon::new(
        rect_polygon(-3.0, -3.0, 23.0, 13.0).exterior().clone(),
        vec![rect_polygon(-1.0, -1.0, 21.0, 11.0).exterior().clone()],
    )]);
    let mut config = StencilConfig::default();
    config.locator.height_mm = 2.0;

    let input = ExportInput {
        ring: Some(&ring),
        ..ExportInput::new(&stencil)
    };
    TriangulationBackend.export(&input, &config, &path).unwrap();

    let bounds = read_stl(&path).unwrap().bounds().unwrap();
    assert_relative_eq!(bounds.max.z, 2.12, epsilon = 1e-5);
    assert_relative_eq!(bounds.max.x, 26.0, epsilon = 1e-5);
}

#[test]
fn test_empty_region_is_input_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("none.stl");
    let err = SfmeshBackend
        .export(&ExportInput::new(&MultiPolygon::new(vec![])), &StencilConfig::default(), &path)
        .unwrap_err();
    assert!(err.is_input_geometry());
    assert!(!path.exists());
}
