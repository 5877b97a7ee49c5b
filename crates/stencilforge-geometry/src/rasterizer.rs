//! Primitive rasterizer
//!
//! Turns normalized primitives into filled regions. Shapes are built as
//! `geo` multi-polygons; dark primitives union into the accumulated layer and
//! clear primitives are subtracted from it, in file order.

use crate::arc::ArcSpec;
use crate::polygon;
use crate::primitives::{Aperture, Edge, Polarity, Primitive, Shape};
use geo::{BooleanOps, ConvexHull, MultiPoint};
use std::f64::consts::PI;
use stencilforge_core::{distance, pt, MultiPolygon, Point2};
use tracing::debug;

/// Sampling controls for curved geometry
#[derive(Debug, Clone, Copy)]
pub struct RasterSettings {
    /// Points per stroked arc or region arc
    pub arc_steps: usize,
    /// Segments per quarter circle
    pub curve_resolution: usize,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            arc_steps: 64,
            curve_resolution: 16,
        }
    }
}

impl RasterSettings {
    fn circle_segments(&self) -> usize {
        (4 * self.curve_resolution).max(8)
    }

    fn arc_points(&self, arc: &ArcSpec) -> Vec<Point2> {
        arc.sample(self.arc_steps.max(8))
    }
}

fn circle_points(center: Point2, radius: f64, segments: usize) -> Vec<Point2> {
    (0..segments)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / segments as f64;
            pt(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

fn shape(points: &[Point2]) -> MultiPolygon<f64> {
    if points.len() < 3 {
        return polygon::empty();
    }
    let mut ring = points.to_vec();
    ring.push(points[0]);
    MultiPolygon::new(vec![polygon::ring_polygon(&ring)])
}

fn circle(center: Point2, radius: f64, settings: &RasterSettings) -> MultiPolygon<f64> {
    shape(&circle_points(center, radius, settings.circle_segments()))
}

fn centered_rectangle(center: Point2, width: f64, height: f64) -> MultiPolygon<f64> {
    let (hw, hh) = (width / 2.0, height / 2.0);
    MultiPolygon::new(vec![polygon::rect_polygon(
        center.x - hw,
        center.y - hh,
        center.x + hw,
        center.y + hh,
    )])
}

/// Aperture stamped at `at`, hole included
pub fn aperture_shape(aperture: &Aperture, at: Point2, settings: &RasterSettings) -> MultiPolygon<f64> {
    let body = match *aperture {
        Aperture::Circle { diameter, .. } => circle(at, diameter / 2.0, settings),
        Aperture::Rectangle { width, height, .. } => centered_rectangle(at, width, height),
        Aperture::Obround { width, height, .. } => {
            let radius = width.min(height) / 2.0;
            let (dx, dy) = if width >= height {
                (width / 2.0 - radius, 0.0)
            } else {
                (0.0, height / 2.0 - radius)
            };
            let c1 = circle(pt(at.x - dx, at.y - dy), radius, settings);
            if dx <= 0.0 && dy <= 0.0 {
                c1
            } else {
                let core = if dx > 0.0 {
                    centered_rectangle(at, 2.0 * dx, height)
                } else {
                    centered_rectangle(at, width, 2.0 * dy)
                };
                let c2 = circle(pt(at.x + dx, at.y + dy), radius, settings);
                core.union(&c1).union(&c2)
            }
        }
        Aperture::Polygon {
            diameter,
            vertices,
            rotation_deg,
            ..
        } => {
            let n = vertices.max(3);
            let radius = diameter / 2.0;
            let rotation = rotation_deg.to_radians();
            let points: Vec<Point2> = (0..n)
                .map(|i| {
                    let angle = rotation + 2.0 * PI * i as f64 / n as f64;
                    pt(at.x + radius * angle.cos(), at.y + radius * angle.sin())
                })
                .collect();
            shape(&points)
        }
    };
    match aperture.hole() {
        Some(hole) => body.difference(&circle(at, hole / 2.0, settings)),
        None => body,
    }
}

/// Straight stroke
///
/// Round apertures get round caps; rectangular apertures sweep their
/// rectangle along the segment; others sweep a circle of their larger side.
pub fn stroke_line(start: Point2, end: Point2, aperture: &Aperture, settings: &RasterSettings) -> MultiPolygon<f64> {
    match *aperture {
        Aperture::Rectangle { width, height, .. } => {
            let (hw, hh) = (width / 2.0, height / 2.0);
            let corners: Vec<(f64, f64)> = [start, end]
                .iter()
                .flat_map(|p| {
                    [
                        (p.x - hw, p.y - hh),
                        (p.x + hw, p.y - hh),
                        (p.x + hw, p.y + hh),
                        (p.x - hw, p.y + hh),
                    ]
                })
                .collect();
            let hull = MultiPoint::from(corners).convex_hull();
            MultiPolygon::new(vec![hull])
        }
        _ => {
            let width = stroke_width(aperture);
            create_thick_segment(start, end, width, settings)
        }
    }
}

fn stroke_width(aperture: &Aperture) -> f64 {
    match *aperture {
        Aperture::Circle { diameter, .. } => diameter,
        Aperture::Rectangle { width, height, .. } | Aperture::Obround { width, height, .. } => {
            width.max(height)
        }
        Aperture::Polygon { diameter, .. } => diameter,
    }
}

fn create_thick_segment(p1: Point2, p2: Point2, width: f64, settings: &RasterSettings) -> MultiPolygon<f64> {
    let half_w = width / 2.0;
    let len = distance(p1, p2);
    let c1 = circle(p1, half_w, settings);
    if len < 1e-9 {
        return c1;
    }
    // Unit normal to the segment, scaled to the half width
    let (nx, ny) = (-(p2.y - p1.y) / len * half_w, (p2.x - p1.x) / len * half_w);
    let rect = shape(&[
        pt(p1.x + nx, p1.y + ny),
        pt(p1.x - nx, p1.y - ny),
        pt(p2.x - nx, p2.y - ny),
        pt(p2.x + nx, p2.y + ny),
    ]);
    let c2 = circle(p2, half_w, settings);
    polygon::union_many([rect, c1, c2])
}

/// Arc stroke: the sampled arc as a chain of round-capped segments
pub fn stroke_arc(arc: &ArcSpec, aperture: &Aperture, settings: &RasterSettings) -> MultiPolygon<f64> {
    let width = stroke_width(aperture);
    let points = settings.arc_points(arc);
    polygon::union_many(
        points
            .windows(2)
            .map(|w| create_thick_segment(w[0], w[1], width, settings)),
    )
}

/// Boundary points of a region contour
pub fn region_points(edges: &[Edge], settings: &RasterSettings) -> Vec<Point2> {
    let mut points: Vec<Point2> = Vec::new();
    for edge in edges {
        match edge {
            Edge::Line(seg) => {
                if points.is_empty() {
                    points.push(seg.start);
                }
                points.push(seg.end);
            }
            Edge::Arc(arc) => {
                let arc_points = settings.arc_points(arc);
                let skip = usize::from(!points.is_empty());
                points.extend(arc_points.into_iter().skip(skip));
            }
        }
    }
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
        if first != last {
            points.push(first);
        }
    }
    points
}

/// Region fill, repaired
pub fn region_fill(edges: &[Edge], settings: &RasterSettings) -> MultiPolygon<f64> {
    let points = region_points(edges, settings);
    if points.len() < 4 {
        return polygon::empty();
    }
    polygon::repair(&MultiPolygon::new(vec![polygon::ring_polygon(&points)]))
}

/// Filled shape of a single primitive, polarity ignored
pub fn primitive_shape(primitive: &Primitive, settings: &RasterSettings) -> MultiPolygon<f64> {
    match &primitive.shape {
        Shape::Flash { at, aperture } => aperture_shape(aperture, *at, settings),
        Shape::Line {
            start,
            end,
            aperture,
        } => stroke_line(*start, *end, aperture, settings),
        Shape::Arc { arc, aperture } => stroke_arc(arc, aperture, settings),
        Shape::Region { edges } => region_fill(edges, settings),
    }
}

/// Rasterize primitives in order: dark unions, clear subtracts
pub fn rasterize(primitives: &[Primitive], settings: &RasterSettings) -> MultiPolygon<f64> {
    let mut layer = polygon::empty();
    let mut pending: Vec<MultiPolygon<f64>> = Vec::new();
    let mut clear_count = 0usize;

    for primitive in primitives {
        let filled = primitive_shape(primitive, settings);
        match primitive.polarity {
            Polarity::Dark => pending.push(filled),
            Polarity::Clear => {
                layer = merge_pending(layer, &mut pending);
                layer = layer.difference(&filled);
                clear_count += 1;
            }
        }
    }
    layer = merge_pending(layer, &mut pending);

    let region = polygon::repair(&layer);
    debug!(
        "Rasterized {} primitives ({} clear) into {} polygons",
        primitives.len(),
        clear_count,
        region.0.len()
    );
    region
}

/// Fold a run of dark shapes into the layer with a balanced union
fn merge_pending(layer: MultiPolygon<f64>, pending: &mut Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    if pending.is_empty() {
        return layer;
    }
    let run = polygon::union_many(std::mem::take(pending));
    if layer.0.is_empty() {
        run
    } else {
        layer.union(&run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::ArcDirection;
    use crate::polygon::area;
    use approx::assert_relative_eq;
    use stencilforge_core::Segment;

    fn settings() -> RasterSettings {
        RasterSettings::default()
    }

    #[test]
    fn test_rectangle_flash() {
        let prims = vec![Primitive::dark(Shape::Flash {
            at: pt(5.0, 5.0),
            aperture: Aperture::Rectangle {
                width: 2.0,
                height: 1.0,
                hole: None,
            },
        })];
        let region = rasterize(&prims, &settings());
        assert_relative_eq!(area(&region), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clear_subtracts() {
        let prims = vec![
            Primitive::dark(Shape::Flash {
                at: pt(0.0, 0.0),
                aperture: Aperture::Rectangle {
                    width: 4.0,
                    height: 4.0,
                    hole: None,
                },
            }),
            Primitive::clear(Shape::Flash {
                at: pt(0.0, 0.0),
                aperture: Aperture::Rectangle {
                    width: 2.0,
                    height: 2.0,
                    hole: None,
                },
            }),
        ];
        let region = rasterize(&prims, &settings());
        assert_relative_eq!(area(&region), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_circle_with_hole() {
        let region = aperture_shape(
            &Aperture::Circle {
                diameter: 2.0,
                hole: Some(1.0),
            },
            pt(0.0, 0.0),
            &settings(),
        );
        assert_relative_eq!(area(&region), 0.75 * PI, epsilon = 0.02);
    }

    #[test]
    fn test_obround_area() {
        let region = aperture_shape(
            &Aperture::Obround {
                width: 3.0,
                height: 1.0,
                hole: None,
            },
            pt(0.0, 0.0),
            &settings(),
        );
        assert_relative_eq!(area(&region), 2.0 + 0.25 * PI, epsilon = 0.01);
    }

    #[test]
    fn test_rectangular_stroke_sweeps() {
        let region = stroke_line(
            pt(0.0, 0.0),
            pt(10.0, 0.0),
            &Aperture::Rectangle {
                width: 1.0,
                height: 1.0,
                hole: None,
            },
            &settings(),
        );
        assert_relative_eq!(area(&region), 11.0, epsilon = 1e-9);
    }

    #[test]
    fn test_region_with_arc() {
        let edges = vec![
            Edge::Line(Segment::new(pt(-1.0, 0.0), pt(1.0, 0.0))),
            Edge::Arc(ArcSpec::from_points(
                pt(1.0, 0.0),
                pt(-1.0, 0.0),
                pt(0.0, 0.0),
                ArcDirection::CounterClockwise,
            )),
        ];
        let region = region_fill(&edges, &settings());
        assert_relative_eq!(area(&region), PI / 2.0, epsilon = 0.01);
    }
}
