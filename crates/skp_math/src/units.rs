//! Length conversion between the kernel's native unit and canonical units.
//!
//! The native kernel stores every length in inches. Documents use a
//! canonical unit (meters unless configured otherwise). Conversion happens
//! exactly once, at the boundary between the two.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Canonical length units a document can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthUnit {
    #[default]
    Meters,
    Centimeters,
    Millimeters,
    Feet,
    Inches,
}

impl LengthUnit {
    /// Length of one native inch expressed in this unit.
    pub fn per_inch(self) -> f64 {
        match self {
            LengthUnit::Meters => 0.0254,
            LengthUnit::Centimeters => 2.54,
            LengthUnit::Millimeters => 25.4,
            LengthUnit::Feet => 1.0 / 12.0,
            LengthUnit::Inches => 1.0,
        }
    }
}

/// Bidirectional scalar conversion with a fixed factor `K`.
///
/// `to_canonical(x) = x * K` and `from_canonical(x) = x / K`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    factor: f64,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::INCHES_TO_METERS
    }
}

impl UnitConverter {
    /// Native inches to canonical meters.
    pub const INCHES_TO_METERS: UnitConverter = UnitConverter { factor: 0.0254 };

    /// Converter that leaves lengths untouched.
    pub const IDENTITY: UnitConverter = UnitConverter { factor: 1.0 };

    /// Create a converter from an explicit native-to-canonical factor.
    ///
    /// Non-finite or non-positive factors fall back to the identity.
    pub fn new(factor: f64) -> Self {
        if factor.is_finite() && factor > 0.0 {
            Self { factor }
        } else {
            Self::IDENTITY
        }
    }

    /// Converter from native inches to the given canonical unit.
    pub fn for_unit(unit: LengthUnit) -> Self {
        Self::new(unit.per_inch())
    }

    /// The native-to-canonical factor `K`.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn to_canonical(&self, native: f64) -> f64 {
        native * self.factor
    }

    pub fn from_canonical(&self, canonical: f64) -> f64 {
        canonical / self.factor
    }

    pub fn point_to_canonical(&self, native: DVec3) -> DVec3 {
        native * self.factor
    }

    pub fn point_from_canonical(&self, canonical: DVec3) -> DVec3 {
        canonical / self.factor
    }

    /// Areas scale with the square of the length factor.
    pub fn area_to_canonical(&self, native: f64) -> f64 {
        native * self.factor * self.factor
    }
}

impl From<LengthUnit> for UnitConverter {
    fn from(unit: LengthUnit) -> Self {
        Self::for_unit(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let units = UnitConverter::INCHES_TO_METERS;
        for x in [0.0, 1.0, -123.456, 1e6] {
            let back = units.from_canonical(units.to_canonical(x));
            assert!((back - x).abs() <= 4.0 * f64::EPSILON * x.abs().max(1.0));
        }
    }

    #[test]
    fn test_inch_is_2_54_centimeters() {
        let units = UnitConverter::for_unit(LengthUnit::Centimeters);
        assert!((units.to_canonical(1.0) - 2.54).abs() < 1e-12);
        assert!((units.from_canonical(254.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_conversion() {
        let units = UnitConverter::default();
        let p = units.point_to_canonical(DVec3::new(100.0, 0.0, -50.0));
        assert!((p - DVec3::new(2.54, 0.0, -1.27)).length() < 1e-12);
        let back = units.point_from_canonical(p);
        assert!((back - DVec3::new(100.0, 0.0, -50.0)).length() < 1e-9);
    }

    #[test]
    fn test_invalid_factor_falls_back_to_identity() {
        assert_eq!(UnitConverter::new(0.0), UnitConverter::IDENTITY);
        assert_eq!(UnitConverter::new(f64::NAN), UnitConverter::IDENTITY);
    }
}
