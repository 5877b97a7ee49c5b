//! Heuristic loop builders for outlines the planar network cannot close
//!
//! These walk the drawn segments instead of noding them, which tolerates
//! sloppy joins better but depends on drawing order.

use stencilforge_core::{distance, pt, Point2, Segment};

/// Parallel within one degree
const COLINEAR_COS: f64 = 0.999_847_695_156_391_2;

fn dot(a: Point2, b: Point2) -> f64 {
    a.x * b.x + a.y * b.y
}

/// Merge `b` into `a` when they are near-parallel, near-coincident and
/// overlap or touch along the shared direction
fn try_merge(a: &Segment, b: &Segment, tol: f64) -> Option<Segment> {
    let (da, db) = (a.direction()?, b.direction()?);
    if dot(da, db).abs() < COLINEAR_COS {
        return None;
    }
    let off_line = |p: Point2| {
        let v = pt(p.x - a.start.x, p.y - a.start.y);
        (v.x * da.y - v.y * da.x).abs()
    };
    if off_line(b.start) > tol || off_line(b.end) > tol {
        return None;
    }

    let param = |p: Point2| dot(pt(p.x - a.start.x, p.y - a.start.y), da);
    let (ta0, ta1) = (0.0, a.length());
    let (tb0, tb1) = {
        let (s, e) = (param(b.start), param(b.end));
        (s.min(e), s.max(e))
    };
    if tb0 > ta1 + tol || tb1 < ta0 - tol {
        return None;
    }
    let (lo, hi) = (ta0.min(tb0), ta1.max(tb1));
    let at = |t: f64| pt(a.start.x + t * da.x, a.start.y + t * da.y);
    Some(Segment::new(at(lo), at(hi)))
}

/// Collapse chains of near-colinear pieces into single segments
pub fn merge_near_colinear(segments: &[Segment], tol: f64) -> Vec<Segment> {
    let mut segs: Vec<Segment> = segments
        .iter()
        .filter(|s| s.length() > f64::EPSILON)
        .copied()
        .collect();
    loop {
        let mut merged_any = false;
        let mut removed = vec![false; segs.len()];
        for i in 0..segs.len() {
            if removed[i] {
                continue;
            }
            for j in (i + 1)..segs.len() {
                if removed[j] {
                    continue;
                }
                if let Some(m) = try_merge(&segs[i], &segs[j], tol) {
                    segs[i] = m;
                    removed[j] = true;
                    merged_any = true;
                }
            }
        }
        segs = segs
            .into_iter()
            .zip(removed)
            .filter(|(_, r)| !*r)
            .map(|(s, _)| s)
            .collect();
        if !merged_any {
            return segs;
        }
    }
}

/// Stitch segments into loops in drawing order
///
/// The running chain grows while the next segment starts (or, reversed,
/// ends) within `close_tol` of its tail. A chain that returns to its start
/// is emitted as a loop; any mismatch ends the chain and starts a new one
/// at the offending segment. Loops with fewer than four points are dropped.
pub fn ordered_path_loops(segments: &[Segment], close_tol: f64) -> Vec<Vec<Point2>> {
    let mut loops = Vec::new();
    let mut path: Vec<Point2> = Vec::new();

    for s in segments.iter().filter(|s| s.length() > f64::EPSILON) {
        let Some(&tail) = path.last() else {
            path = vec![s.start, s.end];
            continue;
        };
        if distance(tail, s.start) <= close_tol {
            path.push(s.end);
        } else if distance(tail, s.end) <= close_tol {
            path.push(s.start);
        } else {
            close_path(std::mem::take(&mut path), close_tol, &mut loops);
            path = vec![s.start, s.end];
            continue;
        }
        if path.len() > 3 && distance(path[path.len() - 1], path[0]) <= close_tol {
            close_path(std::mem::take(&mut path), close_tol, &mut loops);
        }
    }
    close_path(path, close_tol, &mut loops);
    loops
}

fn close_path(mut path: Vec<Point2>, close_tol: f64, loops: &mut Vec<Vec<Point2>>) {
    let Some(&first) = path.first() else {
        return;
    };
    let Some(last) = path.last_mut() else {
        return;
    };
    if distance(*last, first) > close_tol {
        return;
    }
    *last = first;
    if path.len() >= 4 {
        loops.push(path);
    }
}

/// Endpoint graph with nodes merged within a tolerance
struct JunctionGraph {
    nodes: Vec<Point2>,
    counts: Vec<usize>,
    edges: Vec<(usize, usize)>,
}

impl JunctionGraph {
    fn build(segments: &[Segment], tol: f64) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            counts: Vec::new(),
            edges: Vec::new(),
        };
        for s in segments {
            let a = graph.cluster(s.start, tol);
            let b = graph.cluster(s.end, tol);
            if a != b && !graph.edges.contains(&(a.min(b), a.max(b))) {
                graph.edges.push((a.min(b), a.max(b)));
            }
        }
        graph
    }

    /// Index of the node within `tol` of `p`, folding `p` into its running mean
    fn cluster(&mut self, p: Point2, tol: f64) -> usize {
        if let Some(i) = self.nodes.iter().position(|n| distance(*n, p) <= tol) {
            let c = self.counts[i] as f64;
            let n = self.nodes[i];
            self.nodes[i] = pt((n.x * c + p.x) / (c + 1.0), (n.y * c + p.y) / (c + 1.0));
            self.counts[i] += 1;
            return i;
        }
        self.nodes.push(p);
        self.counts.push(1);
        self.nodes.len() - 1
    }

    fn neighbors(&self, v: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().enumerate().filter_map(move |(e, &(a, b))| {
            if a == v {
                Some((e, b))
            } else if b == v {
                Some((e, a))
            } else {
                None
            }
        })
    }

    fn unit(&self, from: usize, to: usize) -> Option<Point2> {
        Segment::new(self.nodes[from], self.nodes[to]).direction()
    }

    /// Walk from every unused edge, always taking the straightest exit
    fn loops(&self) -> Vec<Vec<Point2>> {
        let mut used = vec![false; self.edges.len()];
        let mut loops = Vec::new();
        for start in 0..self.edges.len() {
            if used[start] {
                continue;
            }
            used[start] = true;
            let (origin, mut current) = self.edges[start];
            let mut prev = origin;
            let mut path = vec![origin, current];

            while current != origin {
                let Some(incoming) = self.unit(prev, current) else {
                    break;
                };
                let exit = self
                    .neighbors(current)
                    .filter(|(e, _)| !used[*e])
                    .filter_map(|(e, next)| {
                        let out = self.unit(current, next)?;
                        Some((e, next, 1.0 - dot(incoming, out)))
                    })
                    .min_by(|a, b| a.2.total_cmp(&b.2));
                let Some((e, next, _)) = exit else {
                    break;
                };
                used[e] = true;
                prev = current;
                current = next;
                path.push(current);
            }

            if current == origin && path.len() >= 4 {
                loops.push(path.iter().map(|&i| self.nodes[i]).collect());
            }
        }
        loops
    }
}

/// Loops found by traversing the clustered endpoint graph
pub fn junction_graph_loops(segments: &[Segment], tol: f64) -> Vec<Vec<Point2>> {
    JunctionGraph::build(segments, tol).loops()
}
