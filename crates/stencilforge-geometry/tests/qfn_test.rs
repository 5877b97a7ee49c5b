//! QFN detection gates

use stencilforge_core::MultiPolygon;
use stencilforge_geometry::polygon::rect_polygon;
use stencilforge_geometry::QfnRegenerator;
use stencilforge_settings::QfnSettings;

fn settings() -> QfnSettings {
    QfnSettings {
        enabled: true,
        ..Default::default()
    }
}

#[test]
fn test_aspect_outside_range_is_not_regenerated() {
    // 40 pads of 0.1 x 0.8 mm: aspect 8
    let paste = MultiPolygon::new(
        (0..40)
            .map(|i| {
                let x = (i % 10) as f64 * 0.3;
                let y = (i / 10) as f64 * 3.0;
                rect_polygon(x, y, x + 0.1, y + 0.8)
            })
            .collect(),
    );
    let settings = settings();
    let (out, report) = QfnRegenerator::new(&settings).regenerate(&paste);
    assert_eq!(out, paste);
    assert_eq!(report.candidates, 0);
    assert!(!report.regenerated());
}

#[test]
fn test_single_row_is_not_a_package() {
    let paste = MultiPolygon::new(
        (0..16)
            .map(|i| {
                let x = i as f64 * 0.4;
                rect_polygon(x, 0.0, x + 0.25, 0.8)
            })
            .collect(),
    );
    let settings = settings();
    let (out, report) = QfnRegenerator::new(&settings).regenerate(&paste);
    assert_eq!(out, paste);
    assert_eq!(report.candidates, 16);
    assert!(report.skipped_reason.is_some());
}
