//! Diagnostic trace returned alongside a generated stencil
//!
//! Each stage fills in its own section. Nothing here is global; the
//! orchestrator owns one [`StencilTrace`] per request and hands it back to
//! the caller with the result.

use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Outcome of one strategy in an ordered fallback chain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
}

/// One entry of a fallback chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub outcome: AttemptOutcome,
}

impl StrategyAttempt {
    pub fn succeeded(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            outcome: AttemptOutcome::Succeeded,
        }
    }

    pub fn failed(strategy: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            strategy: strategy.into(),
            outcome: AttemptOutcome::Failed(reason.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

/// Where the outline polygon came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlineSource {
    /// Closed region primitive, used as-is
    Region,
    /// Robust snap/polygonize pipeline
    RobustPolygonize,
    /// Ordered-path stitcher
    OrderedPath,
    /// Junction-graph traversal
    JunctionGraph,
    /// Rasterized outline primitives
    Rasterized,
    /// Paste bounding box grown by the outline margin
    #[default]
    PasteBounds,
}

/// Counters and choices made while reconstructing the outline
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutlineTrace {
    pub source: OutlineSource,
    pub attempts: Vec<StrategyAttempt>,
    pub eps_mm: f64,
    pub arc_chord_error_mm: f64,
    pub raw_segments: usize,
    pub snapped_segments: usize,
    pub deduped_segments: usize,
    pub bridged_segments: usize,
    pub candidate_count: usize,
    pub chosen_area_mm2: f64,
    pub used_buffer_fallback: bool,
}

/// QFN detection and regeneration summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct QfnReport {
    pub candidates: usize,
    pub score: Option<f64>,
    pub regenerated_sides: Vec<String>,
    pub center_pad_windows: usize,
    pub skipped_reason: Option<String>,
}

impl QfnReport {
    pub fn regenerated(&self) -> bool {
        !self.regenerated_sides.is_empty() || self.center_pad_windows > 0
    }
}

/// Which watertight rebuild ran, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RebuildKind {
    #[default]
    None,
    Single,
    Chunked,
    ChunkedResealed,
}

/// Mesh statistics after post-processing
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeshReport {
    pub extrusion_attempts: Vec<StrategyAttempt>,
    pub rebuild: RebuildKind,
    pub pitch_mm: Option<f64>,
    pub critical_hole_width_mm: Option<f64>,
    pub faces: usize,
    pub vertices: usize,
    pub watertight: bool,
    pub euler_number: i64,
}

/// A subsystem failure that was absorbed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub stage: String,
    pub reason: String,
}

/// Complete per-request trace
#[derive(Debug, Clone, Default, Serialize)]
pub struct StencilTrace {
    pub paste_files: Vec<String>,
    pub outline_file: Option<String>,
    pub outline: Option<OutlineTrace>,
    pub qfn: Option<QfnReport>,
    pub mesh: Option<MeshReport>,
    pub degradations: Vec<Degradation>,
    pub stl_bytes: u64,
    pub stl_faces: usize,
}

impl StencilTrace {
    /// Record and log a best-effort degradation
    pub fn degrade(&mut self, stage: impl Into<String>, reason: impl fmt::Display) {
        let stage = stage.into();
        let reason = reason.to_string();
        warn!("{} degraded: {}", stage, reason);
        self.degradations.push(Degradation { stage, reason });
    }

    /// Pretty JSON rendering for `--trace` output
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrade_records() {
        let mut trace = StencilTrace::default();
        trace.degrade("qfn", "no candidates");
        assert_eq!(trace.degradations.len(), 1);
        assert_eq!(trace.degradations[0].stage, "qfn");
    }

    #[test]
    fn test_attempt_json() {
        let mut trace = StencilTrace::default();
        trace.outline = Some(OutlineTrace {
            attempts: vec![
                StrategyAttempt::failed("robust_polygonize", "no faces"),
                StrategyAttempt::succeeded("ordered_path"),
            ],
            source: OutlineSource::OrderedPath,
            ..Default::default()
        });
        let json = trace.to_json().unwrap();
        assert!(json.contains("\"ordered_path\""));
        assert!(json.contains("\"failed\""));
        assert!(!trace.outline.unwrap().attempts[0].is_success());
    }
}
