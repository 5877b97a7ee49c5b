//! Polygon buffering
//!
//! Rings are offset with `cavalier_contours`. The kernel can panic on
//! degenerate input, so every call runs under `catch_unwind`; a failed or
//! empty offset falls back to an exact capsule sweep built with `geo`.

use crate::polygon::{self, empty, ring_polygon, union_all};
use cavalier_contours::polyline::{PlineSource, PlineSourceMut, PlineVertex, Polyline};
use geo::{Area, BooleanOps};
use std::f64::consts::PI;
use std::panic;
use stencilforge_core::{pt, MultiPolygon, Point2, Polygon, Segment};
use tracing::{debug, warn};

/// Remove repeated points and the closing duplicate
pub fn clean_polyline(mut pline: Polyline<f64>) -> Polyline<f64> {
    pline.remove_repeat_pos(1e-5);
    if pline.is_closed() && pline.vertex_count() > 1 {
        if let (Some(first), Some(last)) = (pline.get(0), pline.get(pline.vertex_count() - 1)) {
            if (first.x - last.x).abs() < 1e-5 && (first.y - last.y).abs() < 1e-5 {
                pline.remove(pline.vertex_count() - 1);
            }
        }
    }
    pline
}

/// Closed polyline from a ring, counter-clockwise
fn ring_to_pline(points: &[Point2]) -> Polyline<f64> {
    let mut pline = Polyline::new();
    for p in points {
        pline.add_vertex(PlineVertex::new(p.x, p.y, 0.0));
    }
    pline.set_is_closed(true);
    let mut pline = clean_polyline(pline);
    if pline.area() < 0.0 {
        pline.invert_direction_mut();
    }
    pline
}

/// Ring points of a closed polyline with bulges expanded into arcs
pub fn pline_to_points(pline: &Polyline<f64>, curve_resolution: usize) -> Vec<Point2> {
    let count = pline.vertex_count();
    let mut points = Vec::with_capacity(count);
    for i in 0..count {
        let v1 = pline.at(i);
        let v2 = pline.at((i + 1) % count);
        points.push(pt(v1.x, v1.y));

        if v1.bulge.abs() <= 1e-5 {
            continue;
        }
        let theta = 4.0 * v1.bulge.atan();
        let chord_len = (v2.x - v1.x).hypot(v2.y - v1.y);
        if chord_len <= 1e-5 {
            continue;
        }
        let radius = chord_len / (2.0 * (theta / 2.0).sin());
        let dist_to_center = radius.abs() * (theta.abs() / 2.0).cos();
        let (mx, my) = ((v1.x + v2.x) / 2.0, (v1.y + v2.y) / 2.0);
        let (nx, ny) = (-(v2.y - v1.y) / chord_len, (v2.x - v1.x) / chord_len);
        let sign = if v1.bulge > 0.0 { 1.0 } else { -1.0 };
        let cx = mx + nx * dist_to_center * sign;
        let cy = my + ny * dist_to_center * sign;
        let start_angle = (v1.y - cy).atan2(v1.x - cx);
        let mut end_angle = (v2.y - cy).atan2(v2.x - cx);
        if v1.bulge > 0.0 {
            if end_angle <= start_angle {
                end_angle += 2.0 * PI;
            }
        } else if end_angle >= start_angle {
            end_angle -= 2.0 * PI;
        }
        let sweep = end_angle - start_angle;
        let segments = ((sweep.abs() / (PI / 2.0)) * curve_resolution as f64)
            .ceil()
            .max(2.0) as usize;
        for j in 1..segments {
            let angle = start_angle + sweep * (j as f64 / segments as f64);
            points.push(pt(cx + radius.abs() * angle.cos(), cy + radius.abs() * angle.sin()));
        }
    }
    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    points
}

/// Stadium around a segment; a circle when the segment is degenerate
pub fn capsule(seg: &Segment, radius: f64, curve_resolution: usize) -> Polygon<f64> {
    let per_half = (2 * curve_resolution).max(4);
    let (a, b) = (seg.start, seg.end);
    let mut points = Vec::with_capacity(2 * per_half + 3);
    match seg.direction() {
        Some(dir) => {
            let theta = dir.y.atan2(dir.x);
            for i in 0..=per_half {
                let angle = theta - PI / 2.0 + PI * i as f64 / per_half as f64;
                points.push(pt(b.x + radius * angle.cos(), b.y + radius * angle.sin()));
            }
            for i in 0..=per_half {
                let angle = theta + PI / 2.0 + PI * i as f64 / per_half as f64;
                points.push(pt(a.x + radius * angle.cos(), a.y + radius * angle.sin()));
            }
        }
        None => {
            for i in 0..(2 * per_half) {
                let angle = PI * i as f64 / per_half as f64;
                points.push(pt(a.x + radius * angle.cos(), a.y + radius * angle.sin()));
            }
        }
    }
    ring_polygon(&points)
}

/// Union of capsules around every segment
pub fn buffer_segments(segments: &[Segment], radius: f64, curve_resolution: usize) -> MultiPolygon<f64> {
    if radius <= 0.0 {
        return empty();
    }
    union_all(segments.iter().map(|s| capsule(s, radius, curve_resolution)))
}

fn ring_segments(points: &[Point2]) -> Vec<Segment> {
    points
        .windows(2)
        .map(|w| Segment::new(w[0], w[1]))
        .collect()
}

fn run_offset(pline: &Polyline<f64>, value: f64) -> Option<Vec<Polyline<f64>>> {
    match panic::catch_unwind(panic::AssertUnwindSafe(|| pline.parallel_offset(value))) {
        Ok(result) => Some(result),
        Err(_) => {
            warn!("Panic during parallel offset by {:.4} mm", value);
            None
        }
    }
}

fn plines_to_region(plines: &[Polyline<f64>], curve_resolution: usize) -> MultiPolygon<f64> {
    union_all(
        plines
            .iter()
            .filter(|p| p.vertex_count() >= 2)
            .map(|p| ring_polygon(&pline_to_points(p, curve_resolution))),
    )
}

/// Filled ring grown (`grow > 0`) or shrunk (`grow < 0`)
fn offset_ring(points: &[Point2], grow: f64, curve_resolution: usize) -> MultiPolygon<f64> {
    let base = ring_polygon(points);
    let base_area = base.unsigned_area();
    let pline = ring_to_pline(points);

    if pline.vertex_count() >= 3 {
        // Which sign grows a counter-clockwise ring depends on the kernel,
        // so try one and check the area moved the right way.
        for value in [-grow, grow] {
            let Some(result) = run_offset(&pline, value) else {
                break;
            };
            let region = plines_to_region(&result, curve_resolution);
            let new_area = polygon::area(&region);
            let moved_right_way = if grow > 0.0 {
                new_area > base_area
            } else {
                new_area < base_area
            };
            if moved_right_way {
                return region;
            }
        }
    }

    debug!("Offset kernel unusable for ring, sweeping capsules instead");
    let sweep = buffer_segments(&ring_segments(points), grow.abs(), curve_resolution);
    let base = MultiPolygon::new(vec![base]);
    if grow > 0.0 {
        base.union(&sweep)
    } else {
        base.difference(&sweep)
    }
}

/// Buffer a region by `distance` (negative shrinks)
pub fn buffer(mp: &MultiPolygon<f64>, distance: f64, curve_resolution: usize) -> MultiPolygon<f64> {
    let mp = polygon::orient(&polygon::repair(mp));
    if distance.abs() < 1e-12 || mp.0.is_empty() {
        return mp;
    }
    let parts = mp.0.iter().map(|poly| {
        let outer = offset_ring(&poly.exterior().0, distance, curve_resolution);
        let holes = polygon::union_many(
            poly.interiors()
                .iter()
                .map(|ring| offset_ring(&ring.0, -distance, curve_resolution)),
        );
        if holes.0.is_empty() {
            outer
        } else {
            outer.difference(&holes)
        }
    });
    polygon::repair(&polygon::union_many(parts))
}
