//! Planar line network on a snap grid
//!
//! Every endpoint is snapped to an integer lattice of pitch `eps`, so vertex
//! identity, duplicate detection and face traversal are exact and the same
//! input always yields the same faces.

use std::collections::{BTreeMap, HashMap, HashSet};
use stencilforge_core::{pt, Point2, Segment};

/// Lattice point
pub type GridPt = (i64, i64);

/// Segment between two lattice points
pub type GridSeg = (GridPt, GridPt);

fn undirected(seg: &GridSeg) -> GridSeg {
    if seg.0 <= seg.1 {
        *seg
    } else {
        (seg.1, seg.0)
    }
}

fn grid_len(seg: &GridSeg) -> f64 {
    ((seg.1 .0 - seg.0 .0) as f64).hypot((seg.1 .1 - seg.0 .1) as f64)
}

fn grid_dist(a: GridPt, b: GridPt) -> f64 {
    ((b.0 - a.0) as f64).hypot((b.1 - a.1) as f64)
}

/// Lattice with pitch `eps` millimeters
#[derive(Debug, Clone, Copy)]
pub struct SnapGrid {
    pub eps: f64,
}

impl SnapGrid {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    pub fn snap(&self, p: Point2) -> GridPt {
        ((p.x / self.eps).round() as i64, (p.y / self.eps).round() as i64)
    }

    pub fn to_mm(&self, g: GridPt) -> Point2 {
        pt(g.0 as f64 * self.eps, g.1 as f64 * self.eps)
    }

    pub fn snap_segments(&self, segments: &[Segment]) -> Vec<GridSeg> {
        segments
            .iter()
            .map(|s| (self.snap(s.start), self.snap(s.end)))
            .collect()
    }

    pub fn segment_to_mm(&self, seg: &GridSeg) -> Segment {
        Segment::new(self.to_mm(seg.0), self.to_mm(seg.1))
    }
}

/// Drop segments shorter than `min_len` grid units and undirected duplicates
///
/// First occurrence wins, so the output order follows the input order.
pub fn dedupe(segments: &[GridSeg], min_len: f64) -> Vec<GridSeg> {
    let mut seen = HashSet::with_capacity(segments.len());
    segments
        .iter()
        .filter(|s| s.0 != s.1 && grid_len(s) >= min_len)
        .filter(|s| seen.insert(undirected(s)))
        .copied()
        .collect()
}

fn degrees(segments: &[GridSeg]) -> BTreeMap<GridPt, usize> {
    let mut deg = BTreeMap::new();
    for s in segments {
        *deg.entry(s.0).or_insert(0) += 1;
        *deg.entry(s.1).or_insert(0) += 1;
    }
    deg
}

/// Join mutually nearest dangling endpoints within `max_gap` grid units
///
/// Runs in rounds until no pair qualifies or `max_links` bridges exist.
/// Returns the bridge segments; the caller appends them.
pub fn bridge_gaps(segments: &[GridSeg], max_gap: f64, max_links: usize) -> Vec<GridSeg> {
    let mut bridges: Vec<GridSeg> = Vec::new();
    if max_gap <= 0.0 || max_links == 0 {
        return bridges;
    }
    let mut deg = degrees(segments);
    let mut edges: HashSet<GridSeg> = segments.iter().map(undirected).collect();

    while bridges.len() < max_links {
        let dangling: Vec<GridPt> = deg
            .iter()
            .filter(|(_, d)| **d == 1)
            .map(|(p, _)| *p)
            .collect();
        if dangling.len() < 2 {
            break;
        }

        let nearest: Vec<Option<(usize, f64)>> = dangling
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                let mut best: Option<(usize, f64)> = None;
                for (j, &b) in dangling.iter().enumerate() {
                    if i == j || edges.contains(&undirected(&(a, b))) {
                        continue;
                    }
                    let d = grid_dist(a, b);
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((j, d));
                    }
                }
                best
            })
            .collect();

        let mut pairs: Vec<(f64, usize, usize)> = nearest
            .iter()
            .enumerate()
            .filter_map(|(i, n)| {
                let (j, d) = (*n)?;
                let mutual = nearest[j].map(|(k, _)| k) == Some(i);
                (i < j && mutual && d <= max_gap).then_some((d, i, j))
            })
            .collect();
        if pairs.is_empty() {
            break;
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, i, j) in pairs {
            if bridges.len() >= max_links {
                break;
            }
            let seg = (dangling[i], dangling[j]);
            edges.insert(undirected(&seg));
            *deg.entry(seg.0).or_insert(0) += 1;
            *deg.entry(seg.1).or_insert(0) += 1;
            bridges.push(seg);
        }
    }
    bridges
}

fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Split every segment at every crossing and collinear overlap
///
/// Crossing points are snapped back onto the lattice.
pub fn node(segments: &[GridSeg]) -> Vec<GridSeg> {
    let n = segments.len();
    let f = |p: GridPt| (p.0 as f64, p.1 as f64);
    let mut splits: Vec<Vec<GridPt>> = vec![Vec::new(); n];

    let bbox = |s: &GridSeg| {
        (
            s.0 .0.min(s.1 .0),
            s.0 .0.max(s.1 .0),
            s.0 .1.min(s.1 .1),
            s.0 .1.max(s.1 .1),
        )
    };
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (bbox(&segments[i]).0, i));

    for (oi, &i) in order.iter().enumerate() {
        let (_, ax_max, ay_min, ay_max) = bbox(&segments[i]);
        for &j in &order[oi + 1..] {
            let (bx_min, _, by_min, by_max) = bbox(&segments[j]);
            if bx_min > ax_max {
                break;
            }
            if by_min > ay_max || by_max < ay_min {
                continue;
            }
            let (a, b) = (segments[i], segments[j]);
            let (p, p2) = (f(a.0), f(a.1));
            let (q, q2) = (f(b.0), f(b.1));
            let r = (p2.0 - p.0, p2.1 - p.1);
            let s = (q2.0 - q.0, q2.1 - q.1);
            let qp = (q.0 - p.0, q.1 - p.1);
            let denom = cross(r.0, r.1, s.0, s.1);

            if denom != 0.0 {
                let t = cross(qp.0, qp.1, s.0, s.1) / denom;
                let u = cross(qp.0, qp.1, r.0, r.1) / denom;
                if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
                    let hit = (
                        (p.0 + t * r.0).round() as i64,
                        (p.1 + t * r.1).round() as i64,
                    );
                    splits[i].push(hit);
                    splits[j].push(hit);
                }
            } else if cross(qp.0, qp.1, r.0, r.1) == 0.0 {
                // Collinear: each segment splits at the other's endpoints
                for end in [b.0, b.1] {
                    if within(a, end) {
                        splits[i].push(end);
                    }
                }
                for end in [a.0, a.1] {
                    if within(b, end) {
                        splits[j].push(end);
                    }
                }
            }
        }
    }

    let mut pieces = Vec::with_capacity(n);
    for (seg, mut points) in segments.iter().zip(splits) {
        let (o, d) = (f(seg.0), f(seg.1));
        let dir = (d.0 - o.0, d.1 - o.1);
        let param = |g: &GridPt| (g.0 as f64 - o.0) * dir.0 + (g.1 as f64 - o.1) * dir.1;
        points.push(seg.0);
        points.push(seg.1);
        points.sort_by(|a, b| param(a).total_cmp(&param(b)).then(a.cmp(b)));
        points.dedup();
        for w in points.windows(2) {
            if w[0] != w[1] {
                pieces.push((w[0], w[1]));
            }
        }
    }
    dedupe(&pieces, 0.0)
}

/// Whether lattice point `p` lies strictly inside collinear segment `seg`
fn within(seg: GridSeg, p: GridPt) -> bool {
    let (a, b) = seg;
    p != a
        && p != b
        && p.0 >= a.0.min(b.0)
        && p.0 <= a.0.max(b.0)
        && p.1 >= a.1.min(b.1)
        && p.1 <= a.1.max(b.1)
}

/// Repeatedly remove edges hanging off degree-1 vertices
pub fn prune_dangles(segments: &[GridSeg]) -> Vec<GridSeg> {
    let mut alive = vec![true; segments.len()];
    let mut incident: HashMap<GridPt, Vec<usize>> = HashMap::new();
    for (i, s) in segments.iter().enumerate() {
        incident.entry(s.0).or_default().push(i);
        incident.entry(s.1).or_default().push(i);
    }
    let mut deg: HashMap<GridPt, usize> = incident.iter().map(|(p, e)| (*p, e.len())).collect();
    let mut queue: Vec<GridPt> = {
        let mut q: Vec<GridPt> = deg.iter().filter(|(_, d)| **d == 1).map(|(p, _)| *p).collect();
        q.sort();
        q
    };

    while let Some(v) = queue.pop() {
        if deg.get(&v).copied() != Some(1) {
            continue;
        }
        let Some(edge) = incident
            .get(&v)
            .and_then(|es| es.iter().copied().find(|&e| alive[e]))
        else {
            continue;
        };
        alive[edge] = false;
        let s = segments[edge];
        for end in [s.0, s.1] {
            if let Some(d) = deg.get_mut(&end) {
                *d = d.saturating_sub(1);
                if *d == 1 {
                    queue.push(end);
                }
            }
        }
    }

    segments
        .iter()
        .zip(alive)
        .filter(|(_, a)| *a)
        .map(|(s, _)| *s)
        .collect()
}

fn signed_area(ring: &[GridPt]) -> f64 {
    let n = ring.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        sum += a.0 as f64 * b.1 as f64 - b.0 as f64 * a.1 as f64;
    }
    sum / 2.0
}

/// Bounded faces of a noded planar network, counter-clockwise rings
///
/// Half-edge walk: from `u→v` continue with the outgoing edge of `v` that
/// is next clockwise from `v→u`. Bounded faces come out counter-clockwise;
/// the unbounded face of each component comes out clockwise and is dropped.
pub fn faces(segments: &[GridSeg]) -> Vec<Vec<GridPt>> {
    let half: Vec<GridSeg> = segments
        .iter()
        .flat_map(|s| [(s.0, s.1), (s.1, s.0)])
        .collect();

    let mut outgoing: BTreeMap<GridPt, Vec<usize>> = BTreeMap::new();
    for (h, e) in half.iter().enumerate() {
        outgoing.entry(e.0).or_default().push(h);
    }
    let angle = |h: usize| {
        let (a, b) = half[h];
        ((b.1 - a.1) as f64).atan2((b.0 - a.0) as f64)
    };
    let mut slot = vec![0usize; half.len()];
    for list in outgoing.values_mut() {
        list.sort_by(|&x, &y| angle(x).total_cmp(&angle(y)));
        for (k, &h) in list.iter().enumerate() {
            slot[h] = k;
        }
    }

    let next = |h: usize| -> usize {
        let twin = h ^ 1;
        let v = half[h].1;
        match outgoing.get(&v) {
            Some(list) => {
                let k = slot[twin];
                list[(k + list.len() - 1) % list.len()]
            }
            None => twin,
        }
    };

    let mut visited = vec![false; half.len()];
    let mut result = Vec::new();
    for start in 0..half.len() {
        if visited[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut h = start;
        let mut closed = false;
        for _ in 0..=half.len() {
            visited[h] = true;
            ring.push(half[h].0);
            h = next(h);
            if h == start {
                closed = true;
                break;
            }
            if visited[h] {
                break;
            }
        }
        if closed && ring.len() >= 3 && signed_area(&ring) > 0.0 {
            result.push(ring);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: i64, y0: i64, size: i64) -> Vec<GridSeg> {
        let (x1, y1) = (x0 + size, y0 + size);
        vec![
            ((x0, y0), (x1, y0)),
            ((x1, y0), (x1, y1)),
            ((x1, y1), (x0, y1)),
            ((x0, y1), (x0, y0)),
        ]
    }

    #[test]
    fn test_snap_and_dedupe() {
        let grid = SnapGrid::new(0.001);
        let segs = grid.snap_segments(&[
            Segment::new(pt(0.0, 0.0), pt(1.0, 0.0)),
            Segment::new(pt(1.0004, 0.0), pt(0.0, 0.0002)),
            Segment::new(pt(2.0, 2.0), pt(2.0003, 2.0)),
        ]);
        let deduped = dedupe(&segs, 0.5);
        assert_eq!(deduped, vec![((0, 0), (1000, 0))]);
    }

    #[test]
    fn test_bridge_mutual_nearest_only_within_gap() {
        // Square with one corner opened by 50 units and a stray segment 500 away
        let mut segs = square(0, 0, 10_000);
        segs[0] = ((50, 0), (10_000, 0));
        segs.push(((20_000, 0), (30_000, 0)));
        let bridges = bridge_gaps(&segs, 100.0, 200);
        assert_eq!(bridges, vec![((0, 0), (50, 0))]);
    }

    #[test]
    fn test_bridge_cap() {
        let segs = vec![((0, 0), (100, 0)), ((110, 0), (200, 0)), ((210, 0), (300, 0))];
        let bridges = bridge_gaps(&segs, 20.0, 1);
        assert_eq!(bridges.len(), 1);
    }

    #[test]
    fn test_node_crossing() {
        let segs = vec![((0, 0), (10, 10)), ((0, 10), (10, 0))];
        let noded = node(&segs);
        assert_eq!(noded.len(), 4);
        assert!(noded.iter().all(|s| s.0 == (5, 5) || s.1 == (5, 5)));
    }

    #[test]
    fn test_node_collinear_overlap() {
        let segs = vec![((0, 0), (10, 0)), ((5, 0), (15, 0))];
        let noded = node(&segs);
        assert_eq!(noded.len(), 3);
    }

    #[test]
    fn test_faces_of_square_with_diagonal() {
        let mut segs = square(0, 0, 10);
        segs.push(((0, 0), (10, 10)));
        let found = faces(&node(&segs));
        assert_eq!(found.len(), 2);
        for ring in &found {
            assert_eq!(signed_area(ring), 50.0);
        }
    }

    #[test]
    fn test_prune_dangles() {
        let mut segs = square(0, 0, 10);
        segs.push(((10, 10), (20, 20)));
        segs.push(((20, 20), (30, 20)));
        let pruned = prune_dangles(&segs);
        assert_eq!(pruned.len(), 4);
    }

    #[test]
    fn test_nested_components_yield_separate_faces() {
        let mut segs = square(0, 0, 100);
        segs.extend(square(25, 25, 50));
        let found = faces(&segs);
        let mut areas: Vec<f64> = found.iter().map(|r| signed_area(r)).collect();
        areas.sort_by(f64::total_cmp);
        assert_eq!(areas, vec![2500.0, 10000.0]);
    }
}
