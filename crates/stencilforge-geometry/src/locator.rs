//! Locator structures around the board outline
//!
//! A locator is a band offset from the board edge that registers the stencil
//! against the PCB. `ring` mode stands a wall on top of the stencil; `step`
//! mode adds a bridge in the stencil plane and a step hanging below it.

use crate::offset::buffer;
use crate::polygon::{self, rect_polygon};
use geo::BooleanOps;
use stencilforge_core::{MultiPolygon, Rect};
use stencilforge_settings::{LocatorMode, LocatorSettings, OpenSide};
use tracing::info;

/// Locator regions with their vertical placement
#[derive(Debug, Clone, Default)]
pub struct LocatorGeometry {
    /// Unioned into the stencil plane
    pub bridge: Option<MultiPolygon<f64>>,
    /// Extruded on top of the stencil, z in [thickness, thickness + height]
    pub ring: Option<MultiPolygon<f64>>,
    /// Extruded below the stencil, z in [-step height, 0]
    pub step: Option<MultiPolygon<f64>>,
}

impl LocatorGeometry {
    pub fn is_empty(&self) -> bool {
        self.bridge.is_none() && self.ring.is_none() && self.step.is_none()
    }
}

fn non_empty(mp: MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    (polygon::area(&mp) > 0.0).then_some(mp)
}

/// Builds locator regions from a board outline
pub struct LocatorBuilder<'a> {
    settings: &'a LocatorSettings,
    curve_resolution: usize,
}

impl<'a> LocatorBuilder<'a> {
    pub fn new(settings: &'a LocatorSettings, curve_resolution: usize) -> Self {
        Self {
            settings,
            curve_resolution,
        }
    }

    /// Band between `clearance` and `clearance + width` outside the outline
    fn band(&self, outline: &MultiPolygon<f64>, width: f64) -> Option<MultiPolygon<f64>> {
        if width <= 0.0 {
            return None;
        }
        let clearance = self.settings.clearance_mm;
        let inner = buffer(outline, clearance, self.curve_resolution);
        let outer = buffer(outline, clearance + width, self.curve_resolution);
        let band = outer.difference(&inner);
        self.finish(band, &outer, outline)
    }

    pub fn ring(&self, outline: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
        self.band(outline, self.settings.width_mm)
    }

    pub fn step(&self, outline: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
        self.band(outline, self.settings.step_width_mm)
    }

    /// Gap between the outline and the clearance offset
    pub fn bridge(&self, outline: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
        let clearance = self.settings.clearance_mm;
        if clearance <= 0.0 {
            return None;
        }
        let outer = buffer(outline, clearance, self.curve_resolution);
        let bridge = outer.difference(outline);
        self.finish(bridge, &outer, outline)
    }

    /// Open side cut, then the outline itself is excluded
    fn finish(
        &self,
        region: MultiPolygon<f64>,
        outer: &MultiPolygon<f64>,
        outline: &MultiPolygon<f64>,
    ) -> Option<MultiPolygon<f64>> {
        let region = match polygon::bounds(outer) {
            Some(bounds) => self.apply_open_side(region, bounds),
            None => region,
        };
        non_empty(polygon::repair(&region.difference(outline)))
    }

    /// Cut a strip of half-width `open_width_mm` along one side of `bounds`
    pub fn apply_open_side(&self, region: MultiPolygon<f64>, bounds: Rect<f64>) -> MultiPolygon<f64> {
        let w = self.settings.open_width_mm;
        if w <= 0.0 {
            return region;
        }
        let (min, max) = (bounds.min(), bounds.max());
        let cutter = match self.settings.open_side {
            OpenSide::None => return region,
            OpenSide::Top => rect_polygon(min.x - w, max.y - w, max.x + w, max.y + w),
            OpenSide::Bottom => rect_polygon(min.x - w, min.y - w, max.x + w, min.y + w),
            OpenSide::Left => rect_polygon(min.x - w, min.y - w, min.x + w, max.y + w),
            OpenSide::Right => rect_polygon(max.x - w, min.y - w, max.x + w, max.y + w),
        };
        region.difference(&MultiPolygon::new(vec![cutter]))
    }

    /// Every locator region the settings ask for
    ///
    /// Step mode without a usable step falls back to a ring.
    pub fn build(&self, outline: &MultiPolygon<f64>) -> LocatorGeometry {
        let s = self.settings;
        let mut geometry = LocatorGeometry::default();
        if !s.enabled || polygon::area(outline) <= 0.0 {
            return geometry;
        }

        if s.mode == LocatorMode::Step {
            geometry.bridge = self.bridge(outline);
            if geometry.bridge.is_some() {
                info!("Locator bridge: clearance={} open={}({})", s.clearance_mm, s.open_side, s.open_width_mm);
            }
            if s.step_height_mm > 0.0 {
                geometry.step = self.step(outline);
            }
            if geometry.step.is_some() {
                info!(
                    "Locator step: height={} width={} clearance={}",
                    s.step_height_mm, s.step_width_mm, s.clearance_mm
                );
                return geometry;
            }
        }

        if s.height_mm > 0.0 {
            geometry.ring = self.ring(outline);
            if geometry.ring.is_some() {
                info!(
                    "Locator wall: height={} width={} clearance={} open={}({})",
                    s.height_mm, s.width_mm, s.clearance_mm, s.open_side, s.open_width_mm
                );
            }
        }
        geometry
    }
}
