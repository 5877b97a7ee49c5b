//! Shared 2D value types
//!
//! Points are `geo` coordinates in millimeters; polygons and multi-polygons
//! are the `geo` types re-exported here so every crate speaks the same
//! vocabulary.

pub use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};

/// A point in the board plane, millimeters
pub type Point2 = Coord<f64>;

/// Shorthand constructor for [`Point2`]
#[inline]
pub fn pt(x: f64, y: f64) -> Point2 {
    Coord { x, y }
}

/// Euclidean distance between two points
#[inline]
pub fn distance(a: Point2, b: Point2) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// An ordered pair of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point2,
    pub end: Point2,
}

impl Segment {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        distance(self.start, self.end)
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.end, self.start)
    }

    pub fn midpoint(&self) -> Point2 {
        pt(
            (self.start.x + self.end.x) * 0.5,
            (self.start.y + self.end.y) * 0.5,
        )
    }

    /// Unit direction from start to end, `None` for zero length
    pub fn direction(&self) -> Option<Point2> {
        let len = self.length();
        if len <= f64::EPSILON {
            return None;
        }
        Some(pt(
            (self.end.x - self.start.x) / len,
            (self.end.y - self.start.y) / len,
        ))
    }
}

/// Axis-aligned bounds of a point cloud, `None` when empty
pub fn bounds_of<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Rect<f64>> {
    let mut iter = points.into_iter();
    let first = *iter.next()?;
    let (mut min, mut max) = (first, first);
    for p in iter {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some(Rect::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_basics() {
        let s = Segment::new(pt(0.0, 0.0), pt(3.0, 4.0));
        assert_eq!(s.length(), 5.0);
        assert_eq!(s.midpoint(), pt(1.5, 2.0));
        assert_eq!(s.reversed().start, pt(3.0, 4.0));
        let d = s.direction().unwrap();
        assert!((d.x - 0.6).abs() < 1e-12 && (d.y - 0.8).abs() < 1e-12);
        assert!(Segment::new(pt(1.0, 1.0), pt(1.0, 1.0)).direction().is_none());
    }

    #[test]
    fn test_bounds() {
        let pts = [pt(1.0, 5.0), pt(-2.0, 3.0), pt(4.0, -1.0)];
        let r = bounds_of(pts.iter()).unwrap();
        assert_eq!(r.min(), pt(-2.0, -1.0));
        assert_eq!(r.max(), pt(4.0, 5.0));
        assert!(bounds_of(std::iter::empty()).is_none());
    }
}
