//! Gerber adapter
//!
//! Raw file in, normalized [`Layer`] out. Parser quirks stay here: duplicate
//! format headers are stripped before parsing, a partially parsed document
//! is used with a warning, and coordinates are decoded with the declared
//! format specification.

use crate::arc::{ArcDirection, ArcSpec};
use crate::primitives::{Aperture, Edge, Layer, Polarity, Primitive, Shape};
use gerber_parser::parse;
use gerber_types::{
    Aperture as GAperture, Command, CoordinateNumber, DCode, ExtendedCode, FunctionCode, GCode,
    InterpolationMode, Operation, Polarity as GPolarity, QuadrantMode, Unit,
};
use regex::Regex;
use std::f64::consts::FRAC_PI_2;
use std::io::BufReader;
use std::path::Path;
use stencilforge_core::{distance, pt, Error, LengthUnit, Point2, Result, Segment};
use tracing::{debug, warn};

/// Stroke width used when a draw references an undefined aperture, mm
const FALLBACK_STROKE_MM: f64 = 0.1;

/// Keep only the first match of `pattern`
fn keep_first(content: &str, pattern: &str) -> Result<String> {
    let re = Regex::new(pattern).map_err(|e| Error::other(format!("invalid pattern: {}", e)))?;
    let mut count = 0;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            count += 1;
            if count > 1 {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .to_string())
}

/// Strip repeated `%FS…*%` and `%MO…*%` headers
pub fn sanitize(content: &str) -> Result<String> {
    let sanitized = keep_first(content, r"%FS.*?\*%")?;
    keep_first(&sanitized, r"%MO.*?\*%")
}

/// Read and normalize one Gerber file
pub fn read_layer(path: &Path) -> Result<Layer> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Gerber {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let layer = parse_layer(&content).map_err(|e| match e {
        Error::Other(reason) => Error::Gerber {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;
    debug!(
        "Read {} primitives from {} ({})",
        layer.primitives.len(),
        path.display(),
        layer.unit.label()
    );
    Ok(layer)
}

/// Parse Gerber text into primitives in the file's declared unit
pub fn parse_layer(content: &str) -> Result<Layer> {
    let sanitized = sanitize(content)?;
    let reader = BufReader::new(sanitized.as_bytes());
    let doc = match parse(reader) {
        Ok(d) => d,
        Err((d, e)) => {
            warn!(
                "Gerber parser returned error, attempting to use partial document. Error: {:?}",
                e
            );
            d
        }
    };

    let unit = match &doc.units {
        Some(Unit::Inches) => LengthUnit::Inches,
        Some(Unit::Millimeters) => LengthUnit::Millimeters,
        None => {
            warn!("No Units found, assuming Millimeters");
            LengthUnit::Millimeters
        }
    };
    let decimals = match &doc.format_specification {
        Some(fmt) => fmt.decimal,
        None => {
            warn!("No Format Specification found, assuming 2.4");
            4
        }
    };

    let mut state = ParseState::new(unit, 10f64.powi(decimals as i32));
    for command in doc.commands() {
        match command {
            Command::FunctionCode(FunctionCode::DCode(dcode)) => match dcode {
                DCode::Operation(op) => match op {
                    Operation::Interpolate(coord, offset) => {
                        let target = state.point(
                            coord.as_ref().and_then(|c| c.x.as_ref()),
                            coord.as_ref().and_then(|c| c.y.as_ref()),
                        );
                        let center_offset = (
                            offset
                                .as_ref()
                                .and_then(|c| c.x.as_ref())
                                .map(|v| state.decode(v))
                                .unwrap_or(0.0),
                            offset
                                .as_ref()
                                .and_then(|c| c.y.as_ref())
                                .map(|v| state.decode(v))
                                .unwrap_or(0.0),
                        );
                        state.interpolate(target, center_offset, doc.apertures.get(&state.aperture));
                    }
                    Operation::Move(coord) => {
                        let target = state.point(
                            coord.as_ref().and_then(|c| c.x.as_ref()),
                            coord.as_ref().and_then(|c| c.y.as_ref()),
                        );
                        state.move_to(target);
                    }
                    Operation::Flash(coord) => {
                        let target = state.point(
                            coord.as_ref().and_then(|c| c.x.as_ref()),
                            coord.as_ref().and_then(|c| c.y.as_ref()),
                        );
                        state.flash(target, doc.apertures.get(&state.aperture));
                    }
                },
                DCode::SelectAperture(code) => {
                    state.aperture = *code;
                }
            },
            Command::FunctionCode(FunctionCode::GCode(gcode)) => match gcode {
                GCode::InterpolationMode(mode) => {
                    state.interpolation = *mode;
                }
                GCode::QuadrantMode(mode) => {
                    state.quadrant = *mode;
                }
                GCode::RegionMode(enabled) => state.set_region_mode(*enabled),
                _ => {}
            },
            Command::ExtendedCode(ExtendedCode::LoadPolarity(polarity)) => {
                state.close_contour();
                state.polarity = match polarity {
                    GPolarity::Clear => Polarity::Clear,
                    GPolarity::Dark => Polarity::Dark,
                };
            }
            _ => {}
        }
    }
    state.close_contour();

    if state.skipped_macro_flashes > 0 {
        warn!(
            "Skipped {} flashes of macro apertures",
            state.skipped_macro_flashes
        );
    }
    Ok(Layer::new(unit, state.primitives))
}

fn convert_aperture(ap: &GAperture) -> Option<Aperture> {
    match ap {
        GAperture::Circle(c) => Some(Aperture::Circle {
            diameter: c.diameter,
            hole: c.hole_diameter,
        }),
        GAperture::Rectangle(r) => Some(Aperture::Rectangle {
            width: r.x,
            height: r.y,
            hole: r.hole_diameter,
        }),
        GAperture::Obround(o) => Some(Aperture::Obround {
            width: o.x,
            height: o.y,
            hole: o.hole_diameter,
        }),
        GAperture::Polygon(p) => Some(Aperture::Polygon {
            diameter: p.diameter,
            vertices: u32::from(p.vertices),
            rotation_deg: p.rotation.unwrap_or(0.0),
            hole: p.hole_diameter,
        }),
        _ => None,
    }
}

/// Graphics state while walking the command stream
struct ParseState {
    unit: LengthUnit,
    divisor: f64,
    current: Point2,
    aperture: i32,
    interpolation: InterpolationMode,
    quadrant: QuadrantMode,
    polarity: Polarity,
    region_mode: bool,
    contour: Vec<Edge>,
    primitives: Vec<Primitive>,
    skipped_macro_flashes: usize,
}

impl ParseState {
    fn new(unit: LengthUnit, divisor: f64) -> Self {
        Self {
            unit,
            divisor,
            current: pt(0.0, 0.0),
            aperture: 0,
            interpolation: InterpolationMode::Linear,
            quadrant: QuadrantMode::Multi,
            polarity: Polarity::Dark,
            region_mode: false,
            contour: Vec::new(),
            primitives: Vec::new(),
            skipped_macro_flashes: 0,
        }
    }

    /// Decode a coordinate from the digits the parser stored
    fn decode(&self, c: &CoordinateNumber) -> f64 {
        let s = format!("{:?}", c);
        let val = if let Some(start) = s.find("nano: ") {
            let tail = &s[start + 6..];
            let end = tail.find([' ', '}']).unwrap_or(tail.len());
            tail[..end].parse::<f64>().unwrap_or(0.0)
        } else {
            s.trim_start_matches("CoordinateNumber(")
                .trim_end_matches(')')
                .trim_start_matches("CoordinateNumber {")
                .trim_end_matches('}')
                .trim()
                .parse::<f64>()
                .unwrap_or(0.0)
        };
        val / self.divisor
    }

    /// Modal coordinates: missing axes keep the current value
    fn point(&self, x: Option<&CoordinateNumber>, y: Option<&CoordinateNumber>) -> Point2 {
        pt(
            x.map(|v| self.decode(v)).unwrap_or(self.current.x),
            y.map(|v| self.decode(v)).unwrap_or(self.current.y),
        )
    }

    fn stroke_aperture(&self, ap: Option<&GAperture>) -> Aperture {
        ap.and_then(convert_aperture).unwrap_or(Aperture::Circle {
            diameter: self.unit.from_mm(FALLBACK_STROKE_MM),
            hole: None,
        })
    }

    fn arc_to(&self, target: Point2, offset: (f64, f64)) -> ArcSpec {
        let direction = match self.interpolation {
            InterpolationMode::ClockwiseCircular => ArcDirection::Clockwise,
            _ => ArcDirection::CounterClockwise,
        };
        let start = self.current;
        let center = match self.quadrant {
            QuadrantMode::Multi => pt(start.x + offset.0, start.y + offset.1),
            QuadrantMode::Single => single_quadrant_center(start, target, offset, direction),
        };
        ArcSpec::from_points(start, target, center, direction)
    }

    fn interpolate(&mut self, target: Point2, offset: (f64, f64), ap: Option<&GAperture>) {
        let edge = match self.interpolation {
            InterpolationMode::Linear => Edge::Line(Segment::new(self.current, target)),
            _ => Edge::Arc(self.arc_to(target, offset)),
        };
        if self.region_mode {
            self.contour.push(edge);
        } else {
            let aperture = self.stroke_aperture(ap);
            let shape = match edge {
                Edge::Line(seg) => Shape::Line {
                    start: seg.start,
                    end: seg.end,
                    aperture,
                },
                Edge::Arc(arc) => Shape::Arc { arc, aperture },
            };
            self.push(shape);
        }
        self.current = target;
    }

    fn move_to(&mut self, target: Point2) {
        if self.region_mode {
            self.close_contour();
        }
        self.current = target;
    }

    fn flash(&mut self, target: Point2, ap: Option<&GAperture>) {
        self.current = target;
        match ap.and_then(convert_aperture) {
            Some(aperture) => self.push(Shape::Flash {
                at: target,
                aperture,
            }),
            None => self.skipped_macro_flashes += 1,
        }
    }

    fn set_region_mode(&mut self, enabled: bool) {
        if !enabled {
            self.close_contour();
        }
        self.region_mode = enabled;
    }

    fn close_contour(&mut self) {
        if self.contour.is_empty() {
            return;
        }
        let edges = std::mem::take(&mut self.contour);
        self.push(Shape::Region { edges });
    }

    fn push(&mut self, shape: Shape) {
        self.primitives.push(Primitive {
            shape,
            polarity: self.polarity,
        });
    }
}

/// Single-quadrant mode: offsets are unsigned, pick the sign combination
/// that puts both endpoints on one circle with a sweep of at most 90°
fn single_quadrant_center(
    start: Point2,
    end: Point2,
    offset: (f64, f64),
    direction: ArcDirection,
) -> Point2 {
    let (i, j) = (offset.0.abs(), offset.1.abs());
    let mut best: Option<(f64, Point2)> = None;
    for (sx, sy) in [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)] {
        let center = pt(start.x + sx * i, start.y + sy * j);
        let arc = ArcSpec::from_points(start, end, center, direction);
        if arc.sweep().abs() > FRAC_PI_2 + 1e-6 {
            continue;
        }
        let mismatch = (distance(start, center) - distance(end, center)).abs();
        if best.map_or(true, |(m, _)| mismatch < m) {
            best = Some((mismatch, center));
        }
    }
    best.map(|(_, c)| c)
        .unwrap_or_else(|| pt(start.x + offset.0, start.y + offset.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::area;
    use crate::rasterizer::{rasterize, RasterSettings};
    use approx::assert_relative_eq;
    use geo::BoundingRect;

    const HEADER: &str = "%FSLAX46Y46*%\n%MOMM*%\n";

    fn region_rect(w: f64, h: f64) -> String {
        let c = |v: f64| format!("{}", (v * 1e6).round() as i64);
        format!(
            "{HEADER}%LPD*%\nG36*\nX{0}Y{0}D02*\nG01*\nX{1}Y{0}D01*\nX{1}Y{2}D01*\nX{0}Y{2}D01*\nX{0}Y{0}D01*\nG37*\nM02*\n",
            c(0.0),
            c(w),
            c(h)
        )
    }

    #[test]
    fn test_sanitize_keeps_first_header() {
        let text = "%FSLAX46Y46*%\n%FSLAX24Y24*%\n%MOMM*%\n%MOIN*%\nM02*\n";
        let cleaned = sanitize(text).unwrap();
        assert_eq!(cleaned.matches("%FS").count(), 1);
        assert!(cleaned.contains("%FSLAX46Y46*%"));
        assert_eq!(cleaned.matches("%MO").count(), 1);
        assert!(cleaned.contains("%MOMM*%"));
    }

    #[test]
    fn test_region_becomes_one_primitive() {
        let layer = parse_layer(&region_rect(40.0, 24.0)).unwrap();
        assert_eq!(layer.unit, LengthUnit::Millimeters);
        assert_eq!(layer.primitives.len(), 1);
        match &layer.primitives[0].shape {
            Shape::Region { edges } => assert_eq!(edges.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_region_aspect_ratio() {
        let layer = parse_layer(&region_rect(40.0, 24.0)).unwrap().into_millimeters();
        let region = rasterize(&layer.primitives, &RasterSettings::default());
        let rect = region.bounding_rect().unwrap();
        assert_relative_eq!(rect.width() / rect.height(), 40.0 / 24.0, epsilon = 1e-9);
        assert_relative_eq!(area(&region), rect.width() * rect.height(), max_relative = 1e-9);
    }

    #[test]
    fn test_flash_uses_aperture_and_polarity() {
        let text = format!(
            "{HEADER}%ADD10R,1.000000X0.500000*%\n%ADD11C,0.300000*%\nD10*\nX1000000Y1000000D03*\n%LPC*%\nD11*\nX1000000Y1000000D03*\nM02*\n"
        );
        let layer = parse_layer(&text).unwrap();
        assert_eq!(layer.primitives.len(), 2);
        match &layer.primitives[0].shape {
            Shape::Flash { aperture, .. } => assert_eq!(
                *aperture,
                Aperture::Rectangle {
                    width: 1.0,
                    height: 0.5,
                    hole: None
                }
            ),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(layer.primitives[0].polarity, Polarity::Dark);
        assert_eq!(layer.primitives[1].polarity, Polarity::Clear);
    }

    #[test]
    fn test_single_quadrant_center() {
        let c = single_quadrant_center(
            pt(1.0, 0.0),
            pt(0.0, 1.0),
            (1.0, 0.0),
            ArcDirection::CounterClockwise,
        );
        assert_relative_eq!(c.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, 0.0, epsilon = 1e-12);
    }
}
