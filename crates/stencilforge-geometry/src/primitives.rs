//! Normalized Gerber primitives
//!
//! The Gerber adapter produces a [`Layer`] of these records; everything
//! downstream works on them in millimeters.

use crate::arc::ArcSpec;
use stencilforge_core::{pt, LengthUnit, Point2, Segment};

/// Dark adds material, clear removes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

/// Aperture shape, optionally with a concentric round hole
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aperture {
    Circle {
        diameter: f64,
        hole: Option<f64>,
    },
    Rectangle {
        width: f64,
        height: f64,
        hole: Option<f64>,
    },
    Obround {
        width: f64,
        height: f64,
        hole: Option<f64>,
    },
    /// Regular polygon inscribed in `diameter`
    Polygon {
        diameter: f64,
        vertices: u32,
        rotation_deg: f64,
        hole: Option<f64>,
    },
}

impl Aperture {
    pub fn hole(&self) -> Option<f64> {
        match *self {
            Aperture::Circle { hole, .. }
            | Aperture::Rectangle { hole, .. }
            | Aperture::Obround { hole, .. }
            | Aperture::Polygon { hole, .. } => hole.filter(|d| *d > 0.0),
        }
    }

    fn scaled(&self, f: f64) -> Self {
        let hole = |h: Option<f64>| h.map(|d| d * f);
        match *self {
            Aperture::Circle { diameter, hole: h } => Aperture::Circle {
                diameter: diameter * f,
                hole: hole(h),
            },
            Aperture::Rectangle {
                width,
                height,
                hole: h,
            } => Aperture::Rectangle {
                width: width * f,
                height: height * f,
                hole: hole(h),
            },
            Aperture::Obround {
                width,
                height,
                hole: h,
            } => Aperture::Obround {
                width: width * f,
                height: height * f,
                hole: hole(h),
            },
            Aperture::Polygon {
                diameter,
                vertices,
                rotation_deg,
                hole: h,
            } => Aperture::Polygon {
                diameter: diameter * f,
                vertices,
                rotation_deg,
                hole: hole(h),
            },
        }
    }
}

/// One edge of a region boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    Line(Segment),
    Arc(ArcSpec),
}

impl Edge {
    pub fn start(&self) -> Point2 {
        match self {
            Edge::Line(s) => s.start,
            Edge::Arc(a) => a.start(),
        }
    }

    pub fn end(&self) -> Point2 {
        match self {
            Edge::Line(s) => s.end,
            Edge::Arc(a) => a.end(),
        }
    }
}

/// Geometry of a primitive
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Aperture stamped at a point
    Flash { at: Point2, aperture: Aperture },
    /// Straight stroke
    Line {
        start: Point2,
        end: Point2,
        aperture: Aperture,
    },
    /// Circular stroke
    Arc { arc: ArcSpec, aperture: Aperture },
    /// Filled contour (G36/G37)
    Region { edges: Vec<Edge> },
}

/// A shape with its polarity
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub shape: Shape,
    pub polarity: Polarity,
}

impl Primitive {
    pub fn dark(shape: Shape) -> Self {
        Self {
            shape,
            polarity: Polarity::Dark,
        }
    }

    pub fn clear(shape: Shape) -> Self {
        Self {
            shape,
            polarity: Polarity::Clear,
        }
    }

    pub fn is_region(&self) -> bool {
        matches!(self.shape, Shape::Region { .. })
    }

    fn scaled(&self, f: f64) -> Self {
        let p = |c: Point2| pt(c.x * f, c.y * f);
        let shape = match &self.shape {
            Shape::Flash { at, aperture } => Shape::Flash {
                at: p(*at),
                aperture: aperture.scaled(f),
            },
            Shape::Line {
                start,
                end,
                aperture,
            } => Shape::Line {
                start: p(*start),
                end: p(*end),
                aperture: aperture.scaled(f),
            },
            Shape::Arc { arc, aperture } => Shape::Arc {
                arc: arc.scaled(f),
                aperture: aperture.scaled(f),
            },
            Shape::Region { edges } => Shape::Region {
                edges: edges
                    .iter()
                    .map(|e| match e {
                        Edge::Line(s) => Edge::Line(Segment::new(p(s.start), p(s.end))),
                        Edge::Arc(a) => Edge::Arc(a.scaled(f)),
                    })
                    .collect(),
            },
        };
        Self {
            shape,
            polarity: self.polarity,
        }
    }
}

/// Primitives of one Gerber file in its declared unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    pub unit: LengthUnit,
    pub primitives: Vec<Primitive>,
}

impl Layer {
    pub fn new(unit: LengthUnit, primitives: Vec<Primitive>) -> Self {
        Self { unit, primitives }
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Normalize every coordinate and size to millimeters
    pub fn into_millimeters(self) -> Self {
        let factor = self.unit.mm_scale();
        if factor == 1.0 {
            return Self {
                unit: LengthUnit::Millimeters,
                ..self
            };
        }
        Self {
            unit: LengthUnit::Millimeters,
            primitives: self.primitives.iter().map(|p| p.scaled(factor)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::ArcDirection;
    use approx::assert_relative_eq;

    #[test]
    fn test_inch_layer_to_mm() {
        let layer = Layer::new(
            LengthUnit::Inches,
            vec![
                Primitive::dark(Shape::Flash {
                    at: pt(1.0, 2.0),
                    aperture: Aperture::Rectangle {
                        width: 0.1,
                        height: 0.05,
                        hole: Some(0.02),
                    },
                }),
                Primitive::clear(Shape::Arc {
                    arc: ArcSpec {
                        center: pt(0.0, 0.0),
                        radius: 1.0,
                        start_angle: 0.0,
                        end_angle: 1.0,
                        direction: ArcDirection::Clockwise,
                    },
                    aperture: Aperture::Circle {
                        diameter: 0.01,
                        hole: None,
                    },
                }),
            ],
        );
        let mm = layer.into_millimeters();
        assert_eq!(mm.unit, LengthUnit::Millimeters);
        match &mm.primitives[0].shape {
            Shape::Flash { at, aperture } => {
                assert_relative_eq!(at.y, 50.8);
                assert_eq!(aperture.hole(), Some(0.02 * 25.4));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &mm.primitives[1].shape {
            Shape::Arc { arc, .. } => {
                assert_relative_eq!(arc.radius, 25.4);
                assert_eq!(arc.end_angle, 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(mm.primitives[1].polarity, Polarity::Clear);
    }

    #[test]
    fn test_zero_hole_is_none() {
        let ap = Aperture::Circle {
            diameter: 1.0,
            hole: Some(0.0),
        };
        assert_eq!(ap.hole(), None);
    }
}
