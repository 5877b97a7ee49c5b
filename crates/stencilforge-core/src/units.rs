//! Unit conversion utilities
//!
//! Gerber layers declare either millimeters or inches. Every reconstruction
//! step works in millimeters, so layers are normalized on entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Declared layer unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Metric (mm)
    Millimeters,
    /// Imperial (inch)
    Inches,
}

impl Default for LengthUnit {
    fn default() -> Self {
        Self::Millimeters
    }
}

impl LengthUnit {
    /// Scale factor from this unit to millimeters
    pub fn mm_scale(self) -> f64 {
        match self {
            Self::Millimeters => 1.0,
            Self::Inches => MM_PER_INCH,
        }
    }

    /// Convert a value in this unit to millimeters
    pub fn to_mm(self, value: f64) -> f64 {
        value * self.mm_scale()
    }

    /// Convert a millimeter value into this unit
    pub fn from_mm(self, value_mm: f64) -> f64 {
        value_mm / self.mm_scale()
    }

    /// Short label ("mm" or "in")
    pub fn label(self) -> &'static str {
        match self {
            Self::Millimeters => "mm",
            Self::Inches => "in",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millimeters => write!(f, "millimeters"),
            Self::Inches => write!(f, "inches"),
        }
    }
}

impl FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" | "metric" | "millimeters" | "millimeter" => Ok(Self::Millimeters),
            "in" | "inch" | "inches" | "imperial" => Ok(Self::Inches),
            _ => Err(format!("Unknown length unit: {}", s)),
        }
    }
}

/// Format a millimeter length for log output
pub fn format_length(value_mm: f64, unit: LengthUnit) -> String {
    format!("{:.4} {}", unit.from_mm(value_mm), unit.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inch_scale() {
        assert_eq!(LengthUnit::Inches.to_mm(1.0), 25.4);
        assert_eq!(LengthUnit::Millimeters.to_mm(1.0), 1.0);
        assert!((LengthUnit::Inches.from_mm(12.7) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse() {
        assert_eq!("inch".parse::<LengthUnit>(), Ok(LengthUnit::Inches));
        assert_eq!(" MM ".parse::<LengthUnit>(), Ok(LengthUnit::Millimeters));
        assert!("furlong".parse::<LengthUnit>().is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_length(25.4, LengthUnit::Inches), "1.0000 in");
        assert_eq!(format_length(0.12, LengthUnit::Millimeters), "0.1200 mm");
    }
}
