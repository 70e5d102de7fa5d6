//! End-orientation of mutually coupled line pairs.
//!
//! A coupling record stores its two lines in a fixed order, each measured
//! from its own bus 1. A caller who named the pair as `[lineA, lineB]`, with
//! each line's buses in the caller's preferred order, sees the geometry in a
//! different frame. The frame difference is one of 8 [`OrientationCase`]s:
//! pair order swapped or not, times first line reversed or not, times second
//! line reversed or not.
//!
//! | case | swapped | first reversed | second reversed | spans | R, X |
//! |---|---|---|---|---|---|
//! | 0 | no | no | no | as given | as given |
//! | 1 | no | no | yes | line 2 complemented | negated |
//! | 2 | no | yes | no | line 1 complemented | negated |
//! | 3 | no | yes | yes | both complemented | as given |
//! | 4 | yes | no | no | slots exchanged | as given |
//! | 5 | yes | no | yes | line B complemented, exchanged | negated |
//! | 6 | yes | yes | no | line A complemented, exchanged | negated |
//! | 7 | yes | yes | yes | both complemented, exchanged | as given |
//!
//! "Complemented" maps a span end `p` to `100 - p`. Cases 0 to 4 and 7 are
//! involutions; cases 5 and 6 undo each other (see [`OrientationCase::inverse`]).

use serde::{Deserialize, Serialize};

use crate::units::Percent;

/// Geometry fields of a coupling record, in order of the field table.
pub const GEOMETRY_FIELDS: [&str; 6] = ["FROM1", "TO1", "FROM2", "TO2", "R", "X"];

pub fn is_geometry_field(name: &str) -> bool {
    GEOMETRY_FIELDS.contains(&name)
}

/// Relative orientation between a caller's view of a pair and the stored pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OrientationCase {
    /// The caller's first line is the stored second line
    pub swapped: bool,
    /// The caller named its first line with bus order opposite to storage
    pub first_reversed: bool,
    pub second_reversed: bool,
}

/// Coupled spans and mutual impedance in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CouplingGeometry {
    pub from1: Percent,
    pub to1: Percent,
    pub from2: Percent,
    pub to2: Percent,
    pub r: f64,
    pub x: f64,
}

impl CouplingGeometry {
    /// Build from values in [`GEOMETRY_FIELDS`] order.
    pub fn from_values(values: [f64; 6]) -> Self {
        let [from1, to1, from2, to2, r, x] = values;
        Self {
            from1: Percent(from1),
            to1: Percent(to1),
            from2: Percent(from2),
            to2: Percent(to2),
            r,
            x,
        }
    }

    pub fn values(&self) -> [f64; 6] {
        [
            self.from1.value(),
            self.to1.value(),
            self.from2.value(),
            self.to2.value(),
            self.r,
            self.x,
        ]
    }

    /// Value of one geometry field by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        GEOMETRY_FIELDS
            .iter()
            .position(|field| *field == name)
            .map(|i| self.values()[i])
    }

    pub fn set(&mut self, name: &str, value: f64) -> bool {
        let Some(i) = GEOMETRY_FIELDS.iter().position(|field| *field == name) else {
            return false;
        };
        let mut values = self.values();
        values[i] = value;
        *self = Self::from_values(values);
        true
    }
}

impl OrientationCase {
    pub const IDENTITY: OrientationCase = OrientationCase {
        swapped: false,
        first_reversed: false,
        second_reversed: false,
    };

    pub const ALL: [OrientationCase; 8] = [
        Self::case(false, false, false),
        Self::case(false, false, true),
        Self::case(false, true, false),
        Self::case(false, true, true),
        Self::case(true, false, false),
        Self::case(true, false, true),
        Self::case(true, true, false),
        Self::case(true, true, true),
    ];

    const fn case(swapped: bool, first_reversed: bool, second_reversed: bool) -> Self {
        Self {
            swapped,
            first_reversed,
            second_reversed,
        }
    }

    /// Case number, as in the module table.
    pub fn number(&self) -> u8 {
        (self.swapped as u8) << 2 | (self.first_reversed as u8) << 1 | self.second_reversed as u8
    }

    /// R and X change sign when exactly one line is reversed.
    pub fn flips_sign(&self) -> bool {
        self.first_reversed != self.second_reversed
    }

    /// Map geometry from the caller's frame into the stored frame.
    pub fn apply(&self, caller: CouplingGeometry) -> CouplingGeometry {
        let span = |from: Percent, to: Percent, reversed: bool| {
            if reversed {
                (from.complement(), to.complement())
            } else {
                (from, to)
            }
        };
        let first = span(caller.from1, caller.to1, self.first_reversed);
        let second = span(caller.from2, caller.to2, self.second_reversed);
        let ((from1, to1), (from2, to2)) = if self.swapped {
            (second, first)
        } else {
            (first, second)
        };
        let sign = if self.flips_sign() { -1.0 } else { 1.0 };
        CouplingGeometry {
            from1,
            to1,
            from2,
            to2,
            r: sign * caller.r,
            x: sign * caller.x,
        }
    }

    /// The case mapping the stored frame back into the caller's frame.
    pub fn inverse(&self) -> OrientationCase {
        if self.swapped {
            Self::case(true, self.second_reversed, self.first_reversed)
        } else {
            *self
        }
    }

    pub fn is_involution(&self) -> bool {
        self.inverse() == *self
    }
}

impl std::fmt::Display for OrientationCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "case {}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CouplingGeometry {
        CouplingGeometry::from_values([10.0, 60.0, 25.0, 90.0, 0.012, 0.047])
    }

    fn close(a: CouplingGeometry, b: CouplingGeometry) -> bool {
        a.values()
            .iter()
            .zip(b.values())
            .all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_identity_is_a_no_op() {
        assert_eq!(OrientationCase::IDENTITY.apply(sample()), sample());
        assert_eq!(OrientationCase::IDENTITY.number(), 0);
    }

    #[test]
    fn test_inverse_restores_values_for_every_case() {
        for case in OrientationCase::ALL {
            let there = case.apply(sample());
            let back = case.inverse().apply(there);
            assert!(close(back, sample()), "{case} does not round-trip");
        }
    }

    #[test]
    fn test_involutive_cases_are_self_inverse() {
        let involutions: Vec<u8> = OrientationCase::ALL
            .iter()
            .filter(|c| c.is_involution())
            .map(OrientationCase::number)
            .collect();
        assert_eq!(involutions, vec![0, 1, 2, 3, 4, 7]);
        for case in OrientationCase::ALL.iter().filter(|c| c.is_involution()) {
            assert!(close(case.apply(case.apply(sample())), sample()), "{case}");
        }
    }

    #[test]
    fn test_mixed_swapped_cases_invert_each_other() {
        let five = OrientationCase::ALL[5];
        let six = OrientationCase::ALL[6];
        assert_eq!(five.inverse(), six);
        assert_eq!(six.inverse(), five);
    }

    #[test]
    fn test_table_rows_match() {
        let g = sample();
        let c1 = OrientationCase::ALL[1].apply(g);
        assert_eq!((c1.from1, c1.to1), (g.from1, g.to1));
        assert_eq!((c1.from2, c1.to2), (Percent(75.0), Percent(10.0)));
        assert_eq!((c1.r, c1.x), (-g.r, -g.x));

        let c4 = OrientationCase::ALL[4].apply(g);
        assert_eq!((c4.from1, c4.to1, c4.from2, c4.to2), (g.from2, g.to2, g.from1, g.to1));
        assert_eq!(c4.r, g.r);

        let c6 = OrientationCase::ALL[6].apply(g);
        assert_eq!((c6.from1, c6.to1), (g.from2, g.to2));
        assert_eq!((c6.from2, c6.to2), (Percent(90.0), Percent(40.0)));
        assert_eq!(c6.x, -g.x);

        let c7 = OrientationCase::ALL[7].apply(g);
        assert_eq!(c7.r, g.r);
        assert_eq!(c7.from2, Percent(90.0));
    }

    #[test]
    fn test_geometry_field_access() {
        let mut g = sample();
        assert_eq!(g.get("TO2"), Some(90.0));
        assert!(g.set("R", 0.5));
        assert_eq!(g.r, 0.5);
        assert!(!g.set("LINE1", 1.0));
        assert!(is_geometry_field("FROM1"));
    }
}
