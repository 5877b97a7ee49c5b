//! Arc discretization
//!
//! Converts circular arcs into point chains, either with a fixed number of
//! samples (rasterization) or with a chord-error bound (outline
//! reconstruction).

use std::f64::consts::{PI, TAU};
use stencilforge_core::{pt, Point2, Segment};

/// Sweep direction of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// A circular arc, angles in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSpec {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub direction: ArcDirection,
}

impl ArcSpec {
    /// Build an arc from its endpoints and center
    ///
    /// The radius is taken from the start point.
    pub fn from_points(start: Point2, end: Point2, center: Point2, direction: ArcDirection) -> Self {
        let radius = (start.x - center.x).hypot(start.y - center.y);
        Self {
            center,
            radius,
            start_angle: (start.y - center.y).atan2(start.x - center.x),
            end_angle: (end.y - center.y).atan2(end.x - center.x),
            direction,
        }
    }

    pub fn start(&self) -> Point2 {
        self.point_at(self.start_angle)
    }

    pub fn end(&self) -> Point2 {
        self.point_at(self.start_angle + self.sweep())
    }

    fn point_at(&self, angle: f64) -> Point2 {
        pt(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    /// Signed sweep angle, positive counter-clockwise
    ///
    /// Coincident start and end angles describe a full circle.
    pub fn sweep(&self) -> f64 {
        let mut delta = self.end_angle - self.start_angle;
        match self.direction {
            ArcDirection::CounterClockwise => {
                while delta <= 1e-12 {
                    delta += TAU;
                }
                while delta > TAU + 1e-12 {
                    delta -= TAU;
                }
            }
            ArcDirection::Clockwise => {
                while delta >= -1e-12 {
                    delta -= TAU;
                }
                while delta < -TAU - 1e-12 {
                    delta += TAU;
                }
            }
        }
        delta
    }

    /// Evenly spaced points, endpoints included
    pub fn sample(&self, count: usize) -> Vec<Point2> {
        let count = count.max(2);
        let sweep = self.sweep();
        (0..count)
            .map(|i| {
                let fraction = i as f64 / (count - 1) as f64;
                self.point_at(self.start_angle + sweep * fraction)
            })
            .collect()
    }

    /// Number of points needed to keep every chord within `max_chord_error`
    ///
    /// `max_angle = 2·acos(1 − err/r)`, points `max(2, ceil(sweep/max_angle) + 1)`.
    pub fn points_for_chord_error(&self, max_chord_error: f64) -> usize {
        if self.radius <= 0.0 || max_chord_error <= 0.0 {
            return 2;
        }
        let ratio = (1.0 - max_chord_error / self.radius).clamp(-1.0, 1.0);
        let max_angle = (2.0 * ratio.acos()).clamp(1e-6, PI);
        let steps = (self.sweep().abs() / max_angle).ceil() as usize + 1;
        steps.max(2)
    }

    /// Points bounded by chord error
    pub fn discretize(&self, max_chord_error: f64) -> Vec<Point2> {
        self.sample(self.points_for_chord_error(max_chord_error))
    }

    /// Consecutive segments bounded by chord error
    pub fn segments(&self, max_chord_error: f64) -> Vec<Segment> {
        self.discretize(max_chord_error)
            .windows(2)
            .map(|w| Segment::new(w[0], w[1]))
            .collect()
    }

    /// Same arc with every length multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            center: pt(self.center.x * factor, self.center.y * factor),
            radius: self.radius * factor,
            ..*self
        }
    }
}
