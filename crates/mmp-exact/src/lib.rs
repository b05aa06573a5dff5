#![forbid(unsafe_code)]

//! Exact binary64 helpers that never route through the unit under test.
//!
//! Everything here is built from bit patterns or from host operations whose
//! result is exactly representable, so the values can serve as independent
//! expectations for a multiply-accumulate unit.

pub mod sum;

pub use sum::{ExactSum, ExactSumError, FloatFormat, RoundingMode};

use std::fmt;

const SIGN_MASK: u64 = 1 << 63;
const FRACTION_BITS: u32 = 52;
const FRACTION_MASK: u64 = (1 << FRACTION_BITS) - 1;
const EXPONENT_FIELD_MAX: u64 = 0x7ff;

/// Smallest exponent `e` for which 2^e is a (subnormal) binary64 value.
pub const MIN_POW2_EXP: i32 = -1074;
/// Largest exponent `e` for which 2^e is a finite binary64 value.
pub const MAX_POW2_EXP: i32 = 1023;
/// Exponent of the smallest normal binary64 value.
pub const MIN_NORMAL_EXP: i32 = -1022;

/// Exact 2^exp, or `None` when it is not a finite nonzero binary64 value.
#[must_use]
pub fn checked_pow2(exp: i32) -> Option<f64> {
    if !(MIN_POW2_EXP..=MAX_POW2_EXP).contains(&exp) {
        return None;
    }
    let bits = if exp >= MIN_NORMAL_EXP {
        u64::from((exp + 1023).unsigned_abs()) << FRACTION_BITS
    } else {
        1u64 << (exp - MIN_POW2_EXP).unsigned_abs()
    };
    Some(f64::from_bits(bits))
}

/// Exact 2^exp, saturating to `0.0` below the subnormal range and to
/// `+inf` above the finite range.
#[must_use]
pub fn pow2(exp: i32) -> f64 {
    checked_pow2(exp).unwrap_or(if exp < 0 { 0.0 } else { f64::INFINITY })
}

/// Least binary64 value strictly greater than `x`.
#[must_use]
pub fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Greatest binary64 value strictly less than `x`.
#[must_use]
pub fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// Gap between `|x|` and the next representable magnitude above it. For
/// `f64::MAX` the gap below is returned.
#[must_use]
pub fn ulp(x: f64) -> f64 {
    let magnitude = x.abs();
    if !magnitude.is_finite() {
        return f64::NAN;
    }
    let above = next_up(magnitude);
    if above.is_finite() {
        above - magnitude
    } else {
        magnitude - next_down(magnitude)
    }
}

/// A finite binary64 value split as `(-1)^negative * significand * 2^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposed {
    pub negative: bool,
    pub significand: u64,
    pub exponent: i32,
}

/// Splits a finite value into sign, integer significand and exponent.
/// Subnormals keep their reduced significand; zeros have significand 0.
#[must_use]
pub fn decompose(x: f64) -> Option<Decomposed> {
    let bits = x.to_bits();
    let negative = bits & SIGN_MASK != 0;
    let biased = (bits >> FRACTION_BITS) & EXPONENT_FIELD_MAX;
    let fraction = bits & FRACTION_MASK;
    if biased == EXPONENT_FIELD_MAX {
        return None;
    }
    let (significand, exponent) = if biased == 0 {
        (fraction, MIN_POW2_EXP)
    } else {
        // biased fits in 11 bits
        (fraction | (1 << FRACTION_BITS), biased as i32 - 1075)
    };
    Some(Decomposed {
        negative,
        significand,
        exponent,
    })
}

/// Fixed-width hexadecimal rendering of the bit pattern, e.g.
/// `0x3ff0000000000000` for `1.0`.
#[must_use]
pub fn hex_bits(x: f64) -> String {
    format!("0x{:016x}", x.to_bits())
}

/// Parses the output of [`hex_bits`]; the `0x` prefix is optional.
#[must_use]
pub fn parse_hex_bits(raw: &str) -> Option<f64> {
    let digits = raw.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    u64::from_str_radix(digits, 16).ok().map(f64::from_bits)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupError {
    ConstantMismatch {
        constant: &'static str,
        expected: f64,
        actual: f64,
    },
    PropertyViolated {
        constant: &'static str,
        property: &'static str,
    },
}

impl SetupError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ConstantMismatch { .. } => "exact_constant_mismatch",
            Self::PropertyViolated { .. } => "exact_constant_property_violated",
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstantMismatch {
                constant,
                expected,
                actual,
            } => write!(
                f,
                "{constant} self-check failed: expected {} got {}",
                hex_bits(*expected),
                hex_bits(*actual)
            ),
            Self::PropertyViolated { constant, property } => {
                write!(f, "{constant} self-check failed: {property}")
            }
        }
    }
}

impl std::error::Error for SetupError {}

/// Boundary constants every probe expectation is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactConstants {
    pub smallest_subnormal: f64,
    pub min_normal: f64,
    pub one_pred: f64,
    pub one_succ: f64,
    pub two_pred: f64,
}

impl ExactConstants {
    /// Builds the constants from power-of-two scaling and
    /// successor/predecessor steps.
    #[must_use]
    pub fn derive() -> Self {
        let min_normal = pow2(MIN_NORMAL_EXP);
        Self {
            smallest_subnormal: min_normal * pow2(-52),
            min_normal,
            one_pred: next_down(1.0),
            one_succ: next_up(1.0),
            two_pred: next_down(2.0),
        }
    }

    /// Re-derives every constant along an independent route. Any
    /// disagreement makes all downstream expectations unreliable.
    pub fn verify(&self) -> Result<(), SetupError> {
        check_bits("smallest_subnormal", f64::from_bits(1), self.smallest_subnormal)?;
        check_property(
            "smallest_subnormal",
            "must be positive and subnormal",
            self.smallest_subnormal > 0.0 && self.smallest_subnormal.is_subnormal(),
        )?;
        check_property(
            "smallest_subnormal",
            "halving must round to zero",
            self.smallest_subnormal / 2.0 == 0.0,
        )?;

        check_bits("min_normal", pow2(MIN_NORMAL_EXP), self.min_normal)?;
        check_property(
            "min_normal",
            "predecessor must be subnormal",
            self.min_normal.is_normal() && next_down(self.min_normal).is_subnormal(),
        )?;

        check_bits("one_pred", 1.0 - pow2(-53), self.one_pred)?;
        check_property(
            "one_pred",
            "successor must be 1.0",
            next_up(self.one_pred) == 1.0,
        )?;

        check_bits("one_succ", 1.0 + pow2(-52), self.one_succ)?;
        check_property(
            "one_succ",
            "predecessor must be 1.0",
            next_down(self.one_succ) == 1.0,
        )?;

        check_bits("two_pred", 2.0 - pow2(-52), self.two_pred)?;
        check_property(
            "two_pred",
            "successor must be 2.0",
            next_up(self.two_pred) == 2.0,
        )?;
        Ok(())
    }

    /// Gap between 1.0 and its predecessor (2^-53).
    #[must_use]
    pub fn one_gap_below(&self) -> f64 {
        1.0 - self.one_pred
    }
}

impl Default for ExactConstants {
    fn default() -> Self {
        Self::derive()
    }
}

fn check_bits(constant: &'static str, expected: f64, actual: f64) -> Result<(), SetupError> {
    if expected.to_bits() == actual.to_bits() {
        Ok(())
    } else {
        Err(SetupError::ConstantMismatch {
            constant,
            expected,
            actual,
        })
    }
}

fn check_property(
    constant: &'static str,
    property: &'static str,
    holds: bool,
) -> Result<(), SetupError> {
    if holds {
        Ok(())
    } else {
        Err(SetupError::PropertyViolated { constant, property })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Decomposed, ExactConstants, SetupError, checked_pow2, decompose, hex_bits, next_down,
        next_up, parse_hex_bits, pow2, ulp,
    };

    #[test]
    fn pow2_covers_normal_and_subnormal_range() {
        assert_eq!(pow2(0), 1.0);
        assert_eq!(pow2(-1), 0.5);
        assert_eq!(pow2(52), 4_503_599_627_370_496.0);
        assert_eq!(pow2(-1022), f64::MIN_POSITIVE);
        assert_eq!(pow2(-1074).to_bits(), 1);
        assert_eq!(pow2(1023) * 2.0, f64::INFINITY);
        assert_eq!(checked_pow2(-1075), None);
        assert_eq!(checked_pow2(1024), None);
        assert_eq!(pow2(-2000), 0.0);
        assert_eq!(pow2(2000), f64::INFINITY);
    }

    #[test]
    fn successor_and_predecessor_step_one_bit() {
        assert_eq!(next_up(1.0), 1.0 + f64::EPSILON);
        assert_eq!(next_down(1.0), 1.0 - f64::EPSILON / 2.0);
        assert_eq!(next_up(0.0).to_bits(), 1);
        assert_eq!(next_up(-0.0).to_bits(), 1);
        assert_eq!(next_down(0.0), -f64::from_bits(1));
        assert_eq!(next_up(-f64::from_bits(1)).to_bits(), (-0.0f64).to_bits());
        assert_eq!(next_up(f64::MAX), f64::INFINITY);
        assert_eq!(next_down(f64::INFINITY), f64::MAX);
        assert!(next_up(f64::NAN).is_nan());
    }

    #[test]
    fn ulp_matches_binade_spacing() {
        assert_eq!(ulp(1.0), pow2(-52));
        assert_eq!(ulp(2.0), pow2(-51));
        assert_eq!(ulp(-3.0), pow2(-51));
        assert_eq!(ulp(0.0), pow2(-1074));
        assert_eq!(ulp(f64::MAX), pow2(971));
        assert!(ulp(f64::INFINITY).is_nan());
    }

    #[test]
    fn decompose_normal_subnormal_and_zero() {
        assert_eq!(
            decompose(1.0),
            Some(Decomposed {
                negative: false,
                significand: 1 << 52,
                exponent: -52,
            })
        );
        assert_eq!(
            decompose(-pow2(-1074)),
            Some(Decomposed {
                negative: true,
                significand: 1,
                exponent: -1074,
            })
        );
        let zero = decompose(-0.0).expect("zero is finite");
        assert!(zero.negative);
        assert_eq!(zero.significand, 0);
        assert_eq!(decompose(f64::INFINITY), None);
        assert_eq!(decompose(f64::NAN), None);
    }

    #[test]
    fn hex_bits_round_trip() {
        assert_eq!(hex_bits(1.0), "0x3ff0000000000000");
        assert_eq!(parse_hex_bits("0x3ff0000000000000"), Some(1.0));
        assert_eq!(parse_hex_bits("8000000000000000").map(f64::to_bits), Some(1 << 63));
        assert_eq!(parse_hex_bits("0x"), None);
        assert_eq!(parse_hex_bits("0x10000000000000000"), None);
        assert_eq!(parse_hex_bits("zz"), None);
    }

    #[test]
    fn derived_constants_pass_self_check() {
        let constants = ExactConstants::derive();
        constants.verify().expect("host constants should verify");
        assert_eq!(constants.one_pred, 1.0 - pow2(-53));
        assert_eq!(constants.one_succ, 1.0 + pow2(-52));
        assert_eq!(constants.two_pred, 2.0 - pow2(-52));
        assert_eq!(constants.smallest_subnormal.to_bits(), 1);
        assert_eq!(constants.one_gap_below(), pow2(-53));
    }

    #[test]
    fn corrupted_constant_is_rejected() {
        let constants = ExactConstants {
            one_pred: 1.0,
            ..ExactConstants::derive()
        };
        let err = constants.verify().expect_err("corrupted one_pred must fail");
        assert!(matches!(
            err,
            SetupError::ConstantMismatch {
                constant: "one_pred",
                ..
            }
        ));
        assert_eq!(err.reason_code(), "exact_constant_mismatch");

        let constants = ExactConstants {
            smallest_subnormal: pow2(-1073),
            ..ExactConstants::derive()
        };
        assert!(constants.verify().is_err());
    }
}
