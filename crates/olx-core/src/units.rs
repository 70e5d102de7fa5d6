//! Unit newtypes for quantities that cross the engine boundary.
//!
//! The engine speaks raw `f64`. Wrapping the values that carry a unit keeps
//! kilovolts from being mixed with per-unit voltages, and line-span percentages
//! from being mixed with impedances.
//!
//! ```
//! use olx_core::units::{Kilovolts, Percent, PerUnit};
//!
//! let base = Kilovolts(132.0);
//! assert!((PerUnit(1.05).to_kilovolts(base).value() - 138.6).abs() < 1e-9);
//! assert_eq!(Percent(30.0).complement(), Percent(70.0));
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Voltage magnitude in per-unit (pu)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

/// Voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

impl PerUnit {
    /// Convert to kilovolts given base voltage
    #[inline]
    pub fn to_kilovolts(self, base_kv: Kilovolts) -> Kilovolts {
        Kilovolts(self.0 * base_kv.0)
    }
}

impl Kilovolts {
    /// Convert to per-unit given base voltage
    #[inline]
    pub fn to_per_unit(self, base_kv: Kilovolts) -> PerUnit {
        if base_kv.0.abs() < 1e-12 {
            PerUnit(0.0)
        } else {
            PerUnit(self.0 / base_kv.0)
        }
    }

    /// Nameplate form used in display strings: `132`, `13.8`.
    pub fn label(self) -> String {
        let rounded = (self.0 * 1000.0).round() / 1000.0;
        if rounded.fract() == 0.0 {
            format!("{}", rounded as i64)
        } else {
            format!("{rounded}")
        }
    }
}

/// Position along a line in percent of its length, measured from its bus 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Percent(pub f64);

impl_unit_ops!(Percent, "%");

impl Percent {
    /// Same point measured from the other end of the line.
    #[inline]
    pub fn complement(self) -> Self {
        Percent(100.0 - self.0)
    }

    /// Strictly inside the line (0 < p < 100).
    #[inline]
    pub fn is_interior(self) -> bool {
        self.0 > 0.0 && self.0 < 100.0
    }
}

/// Time in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Seconds(pub f64);

impl_unit_ops!(Seconds, "s");

/// Apparent power in megavolt-amperes (MVA)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_conversion() {
        let base_kv = Kilovolts(138.0);
        let v_pu = PerUnit(1.05);
        let v_kv = v_pu.to_kilovolts(base_kv);

        assert!((v_kv.value() - 144.9).abs() < 1e-10);
        assert!((v_kv.to_per_unit(base_kv).value() - 1.05).abs() < 1e-10);
    }

    #[test]
    fn test_kv_label_trims_trailing_zeros() {
        assert_eq!(Kilovolts(132.0).label(), "132");
        assert_eq!(Kilovolts(13.8).label(), "13.8");
        assert_eq!(Kilovolts(0.48).label(), "0.48");
    }

    #[test]
    fn test_percent_complement_is_involution() {
        let p = Percent(37.5);
        assert_eq!(p.complement().complement(), p);
        assert!(p.is_interior());
        assert!(!Percent(100.0).is_interior());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PerUnit(1.0)), "1.0000 pu");
        assert_eq!(format!("{}", Seconds(0.25)), "0.2500 s");
    }
}
