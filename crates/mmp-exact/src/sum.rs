//! Exact accumulation of binary64 sums and products.
//!
//! [`ExactSum`] is a two's-complement fixed-point register whose least
//! significant bit weighs 2^-2148, the smallest possible magnitude of a
//! product of two binary64 values, and whose width leaves carry headroom
//! above the largest product (2^2048). Any finite sum of products is
//! therefore held without error and rounded exactly once, on request, into a
//! target [`FloatFormat`].

use crate::{decompose, pow2};
use std::fmt;

const LIMBS: usize = 68;
const LIMB_BITS: usize = 64;
/// Bit index holding the weight 2^0.
const ORIGIN: i32 = 2148;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    NearestEven,
    NearestAway,
    TowardZero,
    TowardPositive,
    TowardNegative,
}

impl RoundingMode {
    pub const ALL: [Self; 5] = [
        Self::NearestEven,
        Self::NearestAway,
        Self::TowardZero,
        Self::TowardPositive,
        Self::TowardNegative,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NearestEven => "nearest_even",
            Self::NearestAway => "nearest_away",
            Self::TowardZero => "toward_zero",
            Self::TowardPositive => "toward_positive",
            Self::TowardNegative => "toward_negative",
        }
    }
}

/// Binary interchange format parameters: significand precision (including
/// the implicit bit) and the normal exponent range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    pub precision: u32,
    pub min_exponent: i32,
    pub max_exponent: i32,
}

impl FloatFormat {
    pub const BINARY64: Self = Self {
        precision: 53,
        min_exponent: -1022,
        max_exponent: 1023,
    };

    pub const BINARY32: Self = Self {
        precision: 24,
        min_exponent: -126,
        max_exponent: 127,
    };

    /// Largest finite magnitude of the format, as a binary64 value.
    #[must_use]
    pub fn max_finite(self) -> f64 {
        let significand = (1u64 << self.precision) - 1;
        significand as f64 * pow2(self.max_exponent - (self.precision as i32 - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExactSumError {
    NonFinite(f64),
}

impl fmt::Display for ExactSumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite(value) => write!(f, "non-finite addend {value}"),
        }
    }
}

impl std::error::Error for ExactSumError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactSum {
    limbs: [u64; LIMBS],
    addends: usize,
    negative_zero_addends: usize,
    positive_zero_addends: usize,
}

impl Default for ExactSum {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactSum {
    #[must_use]
    pub fn new() -> Self {
        Self {
            limbs: [0; LIMBS],
            addends: 0,
            negative_zero_addends: 0,
            positive_zero_addends: 0,
        }
    }

    pub fn add(&mut self, value: f64) -> Result<(), ExactSumError> {
        let parts = decompose(value).ok_or(ExactSumError::NonFinite(value))?;
        self.addends += 1;
        if parts.significand == 0 {
            self.count_zero(parts.negative);
            return Ok(());
        }
        self.add_scaled(u128::from(parts.significand), parts.exponent, parts.negative);
        Ok(())
    }

    /// Adds the exact (unrounded) product `lhs * rhs`.
    pub fn add_product(&mut self, lhs: f64, rhs: f64) -> Result<(), ExactSumError> {
        let l = decompose(lhs).ok_or(ExactSumError::NonFinite(lhs))?;
        let r = decompose(rhs).ok_or(ExactSumError::NonFinite(rhs))?;
        let negative = l.negative != r.negative;
        self.addends += 1;
        let significand = u128::from(l.significand) * u128::from(r.significand);
        if significand == 0 {
            self.count_zero(negative);
            return Ok(());
        }
        self.add_scaled(significand, l.exponent + r.exponent, negative);
        Ok(())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.limbs[LIMBS - 1] >> 63 == 1
    }

    /// Rounds the exact sum once into `format` under `mode`. Results of
    /// narrower formats are returned as the (exactly representable)
    /// binary64 value.
    #[must_use]
    pub fn round(&self, format: FloatFormat, mode: RoundingMode) -> f64 {
        let negative = self.is_negative();
        let magnitude = if negative {
            negate(&self.limbs)
        } else {
            self.limbs
        };
        let Some(top) = highest_set_bit(&magnitude) else {
            return self.exact_zero(mode);
        };

        let precision = format.precision as i32;
        let leading_exp = top as i32 - ORIGIN;
        let lsb_exp = (leading_exp - (precision - 1)).max(format.min_exponent - (precision - 1));
        // lsb_exp >= -1074 for every supported format, so the index is positive
        let lsb = (lsb_exp + ORIGIN) as usize;

        let mut kept = extract_bits(&magnitude, lsb, top);
        let round_bit = bit(&magnitude, lsb - 1);
        let sticky = any_bit_below(&magnitude, lsb - 1);
        let increment = match mode {
            RoundingMode::NearestEven => round_bit && (sticky || kept & 1 == 1),
            RoundingMode::NearestAway => round_bit,
            RoundingMode::TowardZero => false,
            RoundingMode::TowardPositive => !negative && (round_bit || sticky),
            RoundingMode::TowardNegative => negative && (round_bit || sticky),
        };
        if increment {
            kept += 1;
        }

        if kept == 0 {
            return if negative { -0.0 } else { 0.0 };
        }
        let result_exp = (63 - kept.leading_zeros()) as i32 + lsb_exp;
        if result_exp > format.max_exponent {
            return overflow(format, mode, negative);
        }
        let value = kept as f64 * pow2(lsb_exp);
        if negative { -value } else { value }
    }

    fn count_zero(&mut self, negative: bool) {
        if negative {
            self.negative_zero_addends += 1;
        } else {
            self.positive_zero_addends += 1;
        }
    }

    /// Sign of an exact zero sum: -0 when every addend is -0, or under
    /// `TowardNegative` when anything but +0 took part.
    fn exact_zero(&self, mode: RoundingMode) -> f64 {
        if self.addends > 0 && self.negative_zero_addends == self.addends {
            return -0.0;
        }
        if mode == RoundingMode::TowardNegative && self.addends > self.positive_zero_addends {
            -0.0
        } else {
            0.0
        }
    }

    fn add_scaled(&mut self, magnitude: u128, exponent: i32, negative: bool) {
        // exponent >= -2148 for any product of finite binary64 values
        let position = (exponent + ORIGIN) as usize;
        let start = position / LIMB_BITS;
        let shift = position % LIMB_BITS;
        let lo = magnitude as u64;
        let hi = (magnitude >> 64) as u64;
        let words = if shift == 0 {
            [lo, hi, 0]
        } else {
            [
                lo << shift,
                (lo >> (LIMB_BITS - shift)) | (hi << shift),
                hi >> (LIMB_BITS - shift),
            ]
        };

        let mut carry = false;
        for (offset, limb) in self.limbs[start..].iter_mut().enumerate() {
            let word = words.get(offset).copied().unwrap_or(0);
            if offset >= words.len() && !carry {
                break;
            }
            let (partial, first) = if negative {
                limb.overflowing_sub(word)
            } else {
                limb.overflowing_add(word)
            };
            let (next, second) = if negative {
                partial.overflowing_sub(u64::from(carry))
            } else {
                partial.overflowing_add(u64::from(carry))
            };
            *limb = next;
            carry = first || second;
        }
    }
}

fn negate(limbs: &[u64; LIMBS]) -> [u64; LIMBS] {
    let mut out = [0u64; LIMBS];
    let mut carry = true;
    for (dst, &src) in out.iter_mut().zip(limbs.iter()) {
        let (value, overflowed) = (!src).overflowing_add(u64::from(carry));
        *dst = value;
        carry = overflowed;
    }
    out
}

fn highest_set_bit(limbs: &[u64; LIMBS]) -> Option<usize> {
    limbs
        .iter()
        .enumerate()
        .rev()
        .find(|(_, limb)| **limb != 0)
        .map(|(index, limb)| index * LIMB_BITS + (63 - limb.leading_zeros() as usize))
}

fn bit(limbs: &[u64; LIMBS], index: usize) -> bool {
    limbs
        .get(index / LIMB_BITS)
        .is_some_and(|limb| (limb >> (index % LIMB_BITS)) & 1 == 1)
}

fn any_bit_below(limbs: &[u64; LIMBS], index: usize) -> bool {
    let full = index / LIMB_BITS;
    let partial = index % LIMB_BITS;
    if limbs[..full].iter().any(|&limb| limb != 0) {
        return true;
    }
    partial > 0 && limbs[full] & ((1u64 << partial) - 1) != 0
}

/// Bits `lo..=hi` as an integer; empty when `hi < lo`. Callers keep the
/// span within one binary64 significand.
fn extract_bits(limbs: &[u64; LIMBS], lo: usize, hi: usize) -> u64 {
    if hi < lo {
        return 0;
    }
    (lo..=hi)
        .rev()
        .fold(0u64, |acc, index| (acc << 1) | u64::from(bit(limbs, index)))
}

fn overflow(format: FloatFormat, mode: RoundingMode, negative: bool) -> f64 {
    let to_infinity = match mode {
        RoundingMode::NearestEven | RoundingMode::NearestAway => true,
        RoundingMode::TowardZero => false,
        RoundingMode::TowardPositive => !negative,
        RoundingMode::TowardNegative => negative,
    };
    let magnitude = if to_infinity {
        f64::INFINITY
    } else {
        format.max_finite()
    };
    if negative { -magnitude } else { magnitude }
}
