//! Software multiply-accumulate unit with a configurable arithmetic model.
//!
//! Each output lane is computed from exact products; the model decides where
//! rounding happens, in which direction, and whether subnormals survive.
//! The presets cover a correctly rounded fused unit and the common ways a
//! real unit deviates from it.

use crate::{FragmentState, MmaUnit, UnitError, ensure_finite};
use mmp_exact::{ExactSum, FloatFormat, RoundingMode};
use mmp_tile::{MmaShape, OperandKind, OperandTile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulation {
    /// Exact dot product plus C, rounded once to binary64.
    Fused,
    /// Accumulator seeded with C and rounded to binary64 after every term.
    Sequential,
    /// Accumulator seeded with C and rounded to binary32 after every term.
    Binary32,
}

impl Accumulation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fused => "fused",
            Self::Sequential => "sequential",
            Self::Binary32 => "binary32",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitModel {
    pub rounding: RoundingMode,
    pub accumulation: Accumulation,
    pub flush_subnormals: bool,
}

impl UnitModel {
    pub const IEEE_FUSED: Self = Self {
        rounding: RoundingMode::NearestEven,
        accumulation: Accumulation::Fused,
        flush_subnormals: false,
    };

    pub const SEQUENTIAL_FMA: Self = Self {
        rounding: RoundingMode::NearestEven,
        accumulation: Accumulation::Sequential,
        flush_subnormals: false,
    };

    pub const BINARY32_ACCUMULATOR: Self = Self {
        rounding: RoundingMode::NearestEven,
        accumulation: Accumulation::Binary32,
        flush_subnormals: false,
    };

    pub const FLUSH_TO_ZERO: Self = Self {
        rounding: RoundingMode::NearestEven,
        accumulation: Accumulation::Fused,
        flush_subnormals: true,
    };

    pub const TRUNCATING: Self = Self {
        rounding: RoundingMode::TowardZero,
        accumulation: Accumulation::Fused,
        flush_subnormals: false,
    };

    pub const NEAREST_AWAY: Self = Self {
        rounding: RoundingMode::NearestAway,
        accumulation: Accumulation::Fused,
        flush_subnormals: false,
    };

    pub const PRESETS: [(&'static str, Self); 6] = [
        ("ieee-fused", Self::IEEE_FUSED),
        ("sequential-fma", Self::SEQUENTIAL_FMA),
        ("binary32-accumulator", Self::BINARY32_ACCUMULATOR),
        ("flush-to-zero", Self::FLUSH_TO_ZERO),
        ("truncating", Self::TRUNCATING),
        ("nearest-away", Self::NEAREST_AWAY),
    ];

    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        Self::PRESETS
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, model)| *model)
    }

    #[must_use]
    pub fn preset_names() -> Vec<&'static str> {
        Self::PRESETS.iter().map(|(name, _)| *name).collect()
    }

    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}/{}{}",
            self.accumulation.as_str(),
            self.rounding.as_str(),
            if self.flush_subnormals { "/ftz" } else { "" }
        )
    }

    fn flush(&self, value: f64) -> f64 {
        if self.flush_subnormals && value.is_subnormal() {
            0.0f64.copysign(value)
        } else {
            value
        }
    }

    /// One output lane: `c + sum(a_row[p] * b_col[p])`.
    pub fn lane(&self, a_row: &[f64], b_col: &[f64], c: f64) -> Result<f64, UnitError> {
        let terms = a_row
            .iter()
            .zip(b_col)
            .map(|(&a, &b)| (self.flush(a), self.flush(b)));
        let value = match self.accumulation {
            Accumulation::Fused => {
                let mut sum = ExactSum::new();
                sum.add(self.flush(c))?;
                for (a, b) in terms {
                    sum.add_product(a, b)?;
                }
                sum.round(FloatFormat::BINARY64, self.rounding)
            }
            Accumulation::Sequential => self.stepwise(terms, c, FloatFormat::BINARY64)?,
            Accumulation::Binary32 => self.stepwise(terms, c, FloatFormat::BINARY32)?,
        };
        Ok(self.flush(value))
    }

    fn stepwise(
        &self,
        terms: impl Iterator<Item = (f64, f64)>,
        c: f64,
        format: FloatFormat,
    ) -> Result<f64, UnitError> {
        let mut seed = ExactSum::new();
        seed.add(self.flush(c))?;
        let mut acc = self.flush(seed.round(format, self.rounding));
        for (a, b) in terms {
            let mut step = ExactSum::new();
            step.add(acc)?;
            step.add_product(a, b)?;
            acc = self.flush(step.round(format, self.rounding));
        }
        Ok(acc)
    }
}

impl Default for UnitModel {
    fn default() -> Self {
        Self::IEEE_FUSED
    }
}

#[derive(Debug, Clone)]
pub struct EmulatedUnit {
    name: String,
    model: UnitModel,
    state: FragmentState,
}

impl EmulatedUnit {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: MmaShape, model: UnitModel) -> Self {
        Self {
            name: name.into(),
            model,
            state: FragmentState::new(shape),
        }
    }

    #[must_use]
    pub fn from_preset(preset: &str, shape: MmaShape) -> Option<Self> {
        UnitModel::preset(preset).map(|model| Self::new(preset, shape, model))
    }

    #[must_use]
    pub fn model(&self) -> UnitModel {
        self.model
    }
}

impl MmaUnit for EmulatedUnit {
    fn name(&self) -> String {
        format!("emulated:{} ({})", self.name, self.model.describe())
    }

    fn shape(&self) -> MmaShape {
        self.state.shape()
    }

    fn load_a(&mut self, a: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::A, a)
    }

    fn load_b(&mut self, b: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::B, b)
    }

    fn load_c(&mut self, c: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::C, c)
    }

    fn init_to_zero(&mut self) {
        self.state.init_to_zero();
    }

    fn multiply_accumulate(&mut self) -> Result<(), UnitError> {
        let shape = self.state.shape();
        let (a, b, c) = self.state.operands()?;
        ensure_finite(OperandKind::A, a)?;
        ensure_finite(OperandKind::B, b)?;
        if let Some(c) = c {
            ensure_finite(OperandKind::C, c)?;
        }

        let mut d = OperandTile::for_operand(shape, OperandKind::C);
        let mut b_col = vec![0.0; shape.k];
        for j in 0..shape.n {
            for (p, slot) in b_col.iter_mut().enumerate() {
                *slot = b.get(p, j)?;
            }
            for i in 0..shape.m {
                let a_row = &a.as_slice()[i * shape.k..(i + 1) * shape.k];
                let seed = match c {
                    Some(c) => c.get(i, j)?,
                    None => 0.0,
                };
                d.set(i, j, self.model.lane(a_row, &b_col, seed)?)?;
            }
        }
        self.state.set_result(d)
    }

    fn store(&self, out: &mut OperandTile) -> Result<(), UnitError> {
        self.state.store(out)
    }
}
