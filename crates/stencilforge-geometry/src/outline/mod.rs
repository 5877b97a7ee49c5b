//! Board outline reconstruction
//!
//! Builds one closed, filled board polygon from the outline layer. A closed
//! region primitive is trusted as-is; otherwise the drawn segments go
//! through an ordered chain of strategies, and every attempt is recorded in
//! the returned [`OutlineTrace`].

pub mod fill;
pub mod legacy;
pub mod network;

use crate::offset::buffer_segments;
use crate::polygon::{self, ring_polygon};
use crate::primitives::{Edge, Polarity, Primitive, Shape};
use crate::rasterizer::{rasterize, region_fill, RasterSettings};
use network::SnapGrid;
use geo::BooleanOps;
use stencilforge_core::{
    AttemptOutcome, Error, GeometryError, MultiPolygon, OutlineSource, OutlineTrace, Point2, Polygon, Result,
    Segment, StrategyAttempt,
};
use stencilforge_settings::{CloseStrategy, OutlineSettings};
use tracing::{debug, info, warn};

/// Reconstructed outline with its diagnostics
#[derive(Debug, Clone)]
pub struct BoardOutline {
    pub region: MultiPolygon<f64>,
    pub trace: OutlineTrace,
}

impl BoardOutline {
    pub fn area(&self) -> f64 {
        polygon::area(&self.region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    RobustPolygonize,
    OrderedPath,
    JunctionGraph,
    Rasterized,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::RobustPolygonize => "robust_polygonize",
            Strategy::OrderedPath => "ordered_path",
            Strategy::JunctionGraph => "junction_graph",
            Strategy::Rasterized => "rasterized",
        }
    }

    fn source(self) -> OutlineSource {
        match self {
            Strategy::RobustPolygonize => OutlineSource::RobustPolygonize,
            Strategy::OrderedPath => OutlineSource::OrderedPath,
            Strategy::JunctionGraph => OutlineSource::JunctionGraph,
            Strategy::Rasterized => OutlineSource::Rasterized,
        }
    }
}

/// Outline reconstructor
pub struct OutlineReconstructor<'a> {
    settings: &'a OutlineSettings,
    raster: RasterSettings,
}

impl<'a> OutlineReconstructor<'a> {
    pub fn new(settings: &'a OutlineSettings, raster: RasterSettings) -> Self {
        Self { settings, raster }
    }

    fn strategies(&self, with_raster: bool) -> Vec<Strategy> {
        let mut chain = Vec::with_capacity(4);
        if self.settings.close_strategy == CloseStrategy::RobustPolygonize {
            chain.push(Strategy::RobustPolygonize);
        }
        chain.push(Strategy::OrderedPath);
        chain.push(Strategy::JunctionGraph);
        if with_raster {
            chain.push(Strategy::Rasterized);
        }
        chain
    }

    fn new_trace(&self) -> OutlineTrace {
        OutlineTrace {
            eps_mm: self.settings.snap_eps_mm,
            arc_chord_error_mm: self.settings.arc_max_chord_error_mm,
            ..Default::default()
        }
    }

    /// Reconstruct the outline from millimeter primitives
    pub fn reconstruct(&self, primitives: &[Primitive]) -> Result<BoardOutline> {
        let mut trace = self.new_trace();

        if primitives.iter().any(Primitive::is_region) {
            let region = self.region_fast_path(primitives);
            let area = polygon::area(&region);
            if area > 0.0 {
                info!("Outline source: region ({:.3} mm2)", area);
                trace.attempts.push(StrategyAttempt::succeeded("region"));
                trace.source = OutlineSource::Region;
                trace.candidate_count = region.0.len();
                trace.chosen_area_mm2 = area;
                return Ok(BoardOutline { region, trace });
            }
            trace
                .attempts
                .push(StrategyAttempt::failed("region", "region primitives enclose no area"));
        }

        let segments = self.segments(primitives);
        self.run_chain(&segments, Some(primitives), trace)
    }

    /// Reconstruct from bare segments; the raster strategy is unavailable
    pub fn reconstruct_segments(&self, segments: &[Segment]) -> Result<BoardOutline> {
        self.run_chain(segments, None, self.new_trace())
    }

    fn run_chain(
        &self,
        segments: &[Segment],
        primitives: Option<&[Primitive]>,
        mut trace: OutlineTrace,
    ) -> Result<BoardOutline> {
        let chain = self.strategies(primitives.is_some());
        let mut merged: Option<Vec<Segment>> = None;

        for strategy in &chain {
            let outcome = match strategy {
                Strategy::RobustPolygonize => self.robust(segments, &mut trace),
                Strategy::OrderedPath | Strategy::JunctionGraph => {
                    let merged = merged.get_or_insert_with(|| {
                        let m = legacy::merge_near_colinear(segments, self.settings.merge_tol_mm);
                        debug!("Near-colinear merge: {} -> {} segments", segments.len(), m.len());
                        m
                    });
                    let loops = if *strategy == Strategy::OrderedPath {
                        legacy::ordered_path_loops(merged, self.settings.close_tol_mm)
                    } else {
                        legacy::junction_graph_loops(merged, self.settings.close_tol_mm)
                    };
                    self.loops_region(loops, &mut trace)
                }
                Strategy::Rasterized => self.rasterized(primitives.unwrap_or(&[])),
            };

            match outcome {
                Ok(region) => {
                    let area = polygon::area(&region);
                    info!("Outline source: {} ({:.3} mm2)", strategy.name(), area);
                    trace.attempts.push(StrategyAttempt::succeeded(strategy.name()));
                    trace.source = strategy.source();
                    trace.chosen_area_mm2 = area;
                    return Ok(BoardOutline { region, trace });
                }
                Err(e) => {
                    warn!("Outline strategy {} failed: {}", strategy.name(), e);
                    trace.attempts.push(StrategyAttempt::failed(strategy.name(), &e));
                }
            }
        }

        let summary = trace
            .attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Failed(reason) => {
                    Some(format!("{}: {}", a.strategy, reason))
                }
                AttemptOutcome::Succeeded => None,
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(GeometryError::OutlineExhausted {
            attempts: trace.attempts.len(),
            summary,
        }
        .into())
    }

    /// Dark region fills minus clear region fills
    fn region_fast_path(&self, primitives: &[Primitive]) -> MultiPolygon<f64> {
        let mut dark = Vec::new();
        let mut clear = Vec::new();
        for p in primitives {
            if let Shape::Region { edges } = &p.shape {
                let fill = region_fill(edges, &self.raster);
                match p.polarity {
                    Polarity::Dark => dark.push(fill),
                    Polarity::Clear => clear.push(fill),
                }
            }
        }
        let region = polygon::union_many(dark);
        if clear.is_empty() {
            return region;
        }
        polygon::repair(&region.difference(&polygon::union_many(clear)))
    }

    /// Stroke centerlines and region boundaries as segments, arcs discretized
    pub fn segments(&self, primitives: &[Primitive]) -> Vec<Segment> {
        let chord = self.settings.arc_max_chord_error_mm;
        let mut segments = Vec::new();
        for p in primitives {
            match &p.shape {
                Shape::Line { start, end, .. } => segments.push(Segment::new(*start, *end)),
                Shape::Arc { arc, .. } => segments.extend(arc.segments(chord)),
                Shape::Region { edges } => {
                    for edge in edges {
                        match edge {
                            Edge::Line(s) => segments.push(*s),
                            Edge::Arc(arc) => segments.extend(arc.segments(chord)),
                        }
                    }
                }
                Shape::Flash { .. } => {}
            }
        }
        segments
    }

    fn robust_error(&self, reason: &str, trace: &OutlineTrace) -> Error {
        GeometryError::OutlineReconstruction {
            reason: reason.to_string(),
            eps_mm: self.settings.snap_eps_mm,
            arc_err_mm: self.settings.arc_max_chord_error_mm,
            raw_segments: trace.raw_segments,
            deduped_segments: trace.deduped_segments,
            buffer_fallback: self.settings.buffer_fallback,
        }
        .into()
    }

    /// Snap, dedupe, bridge, node and polygonize
    fn robust(&self, segments: &[Segment], trace: &mut OutlineTrace) -> Result<MultiPolygon<f64>> {
        let s = self.settings;
        let grid = SnapGrid::new(s.snap_eps_mm);
        trace.raw_segments = segments.len();

        let snapped = grid.snap_segments(segments);
        trace.snapped_segments = snapped.len();
        let mut net = network::dedupe(&snapped, s.min_seg_len_scale);
        trace.deduped_segments = net.len();
        if net.is_empty() {
            return Err(self.robust_error("no segments left after snapping", trace));
        }

        let bridges = network::bridge_gaps(&net, s.gap_bridge_mm / s.snap_eps_mm, s.gap_bridge_max_links);
        trace.bridged_segments = bridges.len();
        net.extend(bridges);

        let noded = network::prune_dangles(&network::node(&net));
        let faces = network::faces(&noded);
        debug!(
            "Robust outline: raw={} deduped={} bridged={} noded={} faces={}",
            trace.raw_segments,
            trace.deduped_segments,
            trace.bridged_segments,
            noded.len(),
            faces.len()
        );

        let mut candidates: Vec<Polygon<f64>> = faces
            .iter()
            .flat_map(|ring| {
                let points: Vec<Point2> = ring.iter().map(|g| grid.to_mm(*g)).collect();
                polygon::repair(&MultiPolygon::new(vec![ring_polygon(&points)])).0
            })
            .collect();

        if candidates.is_empty() && s.buffer_fallback {
            let radius = s.snap_eps_mm * s.buffer_scale;
            let mm: Vec<Segment> = net.iter().map(|g| grid.segment_to_mm(g)).collect();
            candidates = buffer_segments(&mm, radius, self.raster.curve_resolution).0;
            trace.used_buffer_fallback = true;
            warn!("No closed faces; buffered network by {:.4} mm", radius);
        }
        if candidates.is_empty() {
            return Err(self.robust_error("no closed faces", trace));
        }
        trace.candidate_count = candidates.len();

        let region = fill::select(candidates, s.fill_rule);
        let area = polygon::area(&region);
        if area <= 0.0 {
            return Err(self.robust_error(&format!("filled area {area} is not positive"), trace));
        }
        Ok(region)
    }

    fn loops_region(&self, loops: Vec<Vec<Point2>>, trace: &mut OutlineTrace) -> Result<MultiPolygon<f64>> {
        let candidates: Vec<Polygon<f64>> = loops
            .iter()
            .flat_map(|l| polygon::repair(&MultiPolygon::new(vec![ring_polygon(l)])).0)
            .collect();
        if candidates.is_empty() {
            return Err(Error::other("no closed loops"));
        }
        trace.candidate_count = candidates.len();
        let region = fill::select(candidates, self.settings.fill_rule);
        let area = polygon::area(&region);
        if area <= 0.0 {
            return Err(GeometryError::ZeroArea {
                stage: "outline loops".to_string(),
                area,
            }
            .into());
        }
        Ok(region)
    }

    /// Rasterized outline strokes with their enclosed holes filled
    fn rasterized(&self, primitives: &[Primitive]) -> Result<MultiPolygon<f64>> {
        let strokes = rasterize(primitives, &self.raster);
        let filled = polygon::union_all(
            strokes
                .0
                .iter()
                .map(|p| Polygon::new(p.exterior().clone(), Vec::new())),
        );
        let area = polygon::area(&filled);
        if area <= 0.0 {
            return Err(GeometryError::EmptyLayer {
                layer: "outline".to_string(),
            }
            .into());
        }
        Ok(filled)
    }
}
