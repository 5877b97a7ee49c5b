//! Candidate face selection

use crate::polygon::{self, union_all};
use geo::{Area, BooleanOps, Contains, InteriorPoint};
use stencilforge_core::{MultiPolygon, Polygon};
use stencilforge_settings::FillRule;

/// Resolve candidate faces into one filled region
pub fn select(candidates: Vec<Polygon<f64>>, rule: FillRule) -> MultiPolygon<f64> {
    let region = match rule {
        FillRule::Legacy => largest(candidates),
        FillRule::EvenOdd => even_odd(candidates),
    };
    polygon::repair(&region)
}

fn largest(candidates: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    candidates
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
        .map(|p| MultiPolygon::new(vec![p]))
        .unwrap_or_else(polygon::empty)
}

/// Nesting depth of each candidate, candidates sorted by descending area
///
/// The parent of a candidate is the smallest larger candidate containing
/// its interior point.
fn depths(sorted: &[Polygon<f64>]) -> Vec<usize> {
    let mut depth = vec![0usize; sorted.len()];
    for i in 0..sorted.len() {
        let Some(probe) = sorted[i].interior_point() else {
            continue;
        };
        if let Some(parent) = (0..i).rev().find(|&j| sorted[j].contains(&probe)) {
            depth[i] = depth[parent] + 1;
        }
    }
    depth
}

/// Even depths add material, odd depths cut it, shallowest level first
fn even_odd(candidates: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut sorted: Vec<(f64, Polygon<f64>)> = candidates
        .into_iter()
        .map(|p| (p.unsigned_area(), p))
        .filter(|(a, _)| *a > 0.0)
        .collect();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    let sorted: Vec<Polygon<f64>> = sorted.into_iter().map(|(_, p)| p).collect();

    let depth = depths(&sorted);
    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut region = polygon::empty();
    for level in 0..=max_depth {
        let layer = union_all(
            sorted
                .iter()
                .zip(&depth)
                .filter(|(_, d)| **d == level)
                .map(|(p, _)| p.clone()),
        );
        region = if level % 2 == 0 {
            region.union(&layer)
        } else {
            region.difference(&layer)
        };
    }
    region
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::{area, rect_polygon};
    use approx::assert_relative_eq;

    fn centered_square(half: f64) -> Polygon<f64> {
        rect_polygon(-half, -half, half, half)
    }

    #[test]
    fn test_nested_squares_even_odd() {
        let region = select(
            vec![centered_square(1.0), centered_square(5.0), centered_square(3.0)],
            FillRule::EvenOdd,
        );
        assert_relative_eq!(area(&region), 100.0 - 36.0 + 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_two_islands_in_one_hole() {
        let region = select(
            vec![
                centered_square(5.0),
                centered_square(4.0),
                rect_polygon(-3.0, -1.0, -1.0, 1.0),
                rect_polygon(1.0, -1.0, 3.0, 1.0),
            ],
            FillRule::EvenOdd,
        );
        assert_relative_eq!(area(&region), 100.0 - 64.0 + 8.0, epsilon = 1e-9);
        assert_eq!(region.0.len(), 3);
    }

    #[test]
    fn test_legacy_keeps_largest() {
        let region = select(
            vec![centered_square(1.0), centered_square(5.0), centered_square(3.0)],
            FillRule::Legacy,
        );
        assert_relative_eq!(area(&region), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_candidates_all_kept() {
        let region = select(
            vec![rect_polygon(0.0, 0.0, 1.0, 1.0), rect_polygon(5.0, 0.0, 7.0, 1.0)],
            FillRule::EvenOdd,
        );
        assert_relative_eq!(area(&region), 3.0, epsilon = 1e-9);
    }
}
