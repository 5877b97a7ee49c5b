use stencilforge_settings::{
    FillRule, LocatorMode, OpenSide, QualityMode, SettingsError, StencilConfig, StlFormat,
};
use tempfile::TempDir;

#[test]
fn test_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stencil.json");

    let mut cfg = StencilConfig::default();
    cfg.thickness_mm = 0.15;
    cfg.locator.enabled = true;
    cfg.locator.mode = LocatorMode::Step;
    cfg.locator.open_side = OpenSide::Left;
    cfg.locator.open_width_mm = 10.0;
    cfg.save_to_file(&path).unwrap();

    let loaded = StencilConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.thickness_mm, 0.15);
    assert_eq!(loaded.locator.mode, LocatorMode::Step);
    assert_eq!(loaded.locator.open_side, OpenSide::Left);
    assert_eq!(loaded.paste_patterns, cfg.paste_patterns);
}

#[test]
fn test_toml_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stencil.toml");
    std::fs::write(
        &path,
        r#"
paste_patterns = ["*.gtp"]
outline_patterns = "*.gko"
output_mode = "holes_only"

[outline]
fill_rule = "legacy"

[mesh]
quality_mode = "auto"

[stl]
format = "ascii"
"#,
    )
    .unwrap();

    let cfg = StencilConfig::load_from_file(&path).unwrap();
    assert_eq!(cfg.outline_patterns, vec!["*.gko".to_string()]);
    assert_eq!(cfg.outline.fill_rule, FillRule::Legacy);
    assert_eq!(cfg.mesh.quality_mode, QualityMode::Auto);
    assert_eq!(cfg.stl.format, StlFormat::Ascii);
    assert_eq!(cfg.thickness_mm, 0.12);
}

#[test]
fn test_invalid_values_fail_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"mesh": {"voxel_pitch_mm": -1.0}}"#).unwrap();

    match StencilConfig::load_from_file(&path) {
        Err(SettingsError::Validation(err)) => {
            assert!(err.is_config());
            assert!(err.to_string().contains("mesh.voxel_pitch_mm"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stencil.yaml");
    std::fs::write(&path, "thickness_mm: 0.1").unwrap();
    assert!(matches!(
        StencilConfig::load_from_file(&path),
        Err(SettingsError::UnsupportedFormat(_))
    ));
}
