//! Region cleanup ahead of extrusion

use geo::{Area, BoundingRect};
use stencilforge_core::MultiPolygon;
use stencilforge_geometry::polygon;
use stencilforge_settings::MeshSettings;

/// Repair, orient, simplify and drop noise
///
/// With `preserve_holes` false every hole is kept as-is; locator bands rely
/// on their inner ring. If filtering would remove everything the repaired
/// input is returned instead.
pub fn prepare_region(region: &MultiPolygon<f64>, settings: &MeshSettings, preserve_holes: bool) -> MultiPolygon<f64> {
    let repaired = polygon::orient(&polygon::repair(region));
    if repaired.0.is_empty() {
        return repaired;
    }
    let simplified = polygon::orient(&polygon::simplify(&repaired, settings.simplify_tol_mm));
    if simplified.0.is_empty() {
        return repaired;
    }
    let min_hole = if preserve_holes {
        settings.min_hole_area_mm2
    } else {
        0.0
    };
    let filtered = polygon::drop_small(&simplified, settings.min_polygon_area_mm2, min_hole);
    if filtered.0.is_empty() {
        return simplified;
    }
    polygon::orient(&filtered)
}

/// Narrowest hole no wider than `max_width`, measured on its bounding box
pub fn critical_hole_width(region: &MultiPolygon<f64>, max_width: f64) -> Option<f64> {
    region
        .0
        .iter()
        .flat_map(|p| p.interiors().iter())
        .filter(|ring| polygon::ring_polygon(&ring.0).unsigned_area() > 0.0)
        .filter_map(|ring| ring.bounding_rect())
        .map(|r| r.width().min(r.height()))
        .filter(|w| *w > 0.0 && *w <= max_width)
        .min_by(|a, b| a.total_cmp(b))
}
