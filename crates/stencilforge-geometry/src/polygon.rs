//! Polygon helpers on top of `geo`
//!
//! Boolean ops, repair, orientation and cleanup for the multi-polygons that
//! flow between stages.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, BoundingRect, Simplify};
use stencilforge_core::{LineString, MultiPolygon, Point2, Polygon, Rect};

/// Empty multi-polygon
pub fn empty() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

/// Axis-aligned rectangle polygon
pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]),
        Vec::new(),
    )
}

/// Polygon from an open or closed point ring
pub fn ring_polygon(points: &[Point2]) -> Polygon<f64> {
    Polygon::new(LineString::new(points.to_vec()), Vec::new())
}

/// Total unsigned area
pub fn area(mp: &MultiPolygon<f64>) -> f64 {
    mp.unsigned_area()
}

pub fn bounds(mp: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    mp.bounding_rect()
}

/// Union of many polygons, merged pairwise to keep operands balanced
pub fn union_all<I>(polygons: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = Polygon<f64>>,
{
    let mut layer: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();
    if layer.is_empty() {
        return empty();
    }
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len() / 2 + 1);
        let mut iter = layer.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        layer = next;
    }
    layer.pop().unwrap_or_else(empty)
}

/// Union of several multi-polygons
pub fn union_many<I>(parts: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = MultiPolygon<f64>>,
{
    union_all(parts.into_iter().flat_map(|mp| mp.0))
}

/// Zero-width self-union: resolves self-intersections and overlaps
pub fn repair(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if mp.0.is_empty() {
        return empty();
    }
    let cleaned: Vec<Polygon<f64>> = mp
        .0
        .iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .cloned()
        .collect();
    MultiPolygon::new(cleaned).union(&empty())
}

/// Exterior counter-clockwise, holes clockwise
pub fn orient(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.orient(Direction::Default)
}

/// Drop polygons and holes below the given areas
pub fn drop_small(mp: &MultiPolygon<f64>, min_polygon_area: f64, min_hole_area: f64) -> MultiPolygon<f64> {
    if min_polygon_area <= 0.0 && min_hole_area <= 0.0 {
        return mp.clone();
    }
    let kept = mp
        .0
        .iter()
        .filter(|p| p.unsigned_area() >= min_polygon_area)
        .map(|p| {
            let holes = p
                .interiors()
                .iter()
                .filter(|ring| ring_polygon(&ring.0).unsigned_area() >= min_hole_area)
                .cloned()
                .collect();
            Polygon::new(p.exterior().clone(), holes)
        })
        .collect();
    MultiPolygon::new(kept)
}

/// Douglas-Peucker simplification followed by repair
pub fn simplify(mp: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return mp.clone();
    }
    repair(&mp.simplify(&tolerance))
}

/// Every ring of every polygon, exteriors first
pub fn rings(mp: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    mp.0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors().iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stencilforge_core::pt;

    #[test]
    fn test_union_all_overlapping() {
        let merged = union_all(vec![
            rect_polygon(0.0, 0.0, 2.0, 2.0),
            rect_polygon(1.0, 0.0, 3.0, 2.0),
            rect_polygon(10.0, 0.0, 11.0, 1.0),
        ]);
        assert_eq!(merged.0.len(), 2);
        assert_relative_eq!(area(&merged), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_repair_bowtie() {
        let bowtie = ring_polygon(&[
            pt(0.0, 0.0),
            pt(2.0, 2.0),
            pt(2.0, 0.0),
            pt(0.0, 2.0),
            pt(0.0, 0.0),
        ]);
        let fixed = repair(&MultiPolygon::new(vec![bowtie]));
        assert_relative_eq!(area(&fixed), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_drop_small_holes() {
        let outer = rect_polygon(0.0, 0.0, 10.0, 10.0);
        let mp = MultiPolygon::new(vec![outer])
            .difference(&MultiPolygon::new(vec![rect_polygon(1.0, 1.0, 1.1, 1.1)]))
            .difference(&MultiPolygon::new(vec![rect_polygon(4.0, 4.0, 6.0, 6.0)]));
        let filtered = drop_small(&mp, 0.0, 0.5);
        assert_eq!(filtered.0[0].interiors().len(), 1);
        assert_relative_eq!(area(&filtered), 96.0, epsilon = 1e-9);
    }

    #[test]
    fn test_orient_default() {
        let cw = ring_polygon(&[pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0), pt(1.0, 0.0)]);
        let oriented = orient(&MultiPolygon::new(vec![cw]));
        assert!(oriented.0[0].signed_area() > 0.0);
    }
}
