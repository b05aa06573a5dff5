#![forbid(unsafe_code)]

//! The multiply-accumulate unit contract.
//!
//! A unit computes `D = round(A·B + C)` (or `round(A·B)` after
//! [`MmaUnit::init_to_zero`]) over one fixed [`MmaShape`]. How it rounds is
//! exactly what the conformance probes measure, so nothing here assumes it.

pub mod emulated;
pub mod process;
pub mod wire;

pub use emulated::{Accumulation, EmulatedUnit, UnitModel};
pub use process::ProcessUnit;
pub use wire::{UnitRequest, UnitResponse, WireShape, serve_request};

use mmp_exact::ExactSumError;
use mmp_tile::{MmaShape, OperandKind, OperandTile, ShapeError};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum UnitError {
    Shape(ShapeError),
    MissingOperand(OperandKind),
    NonFiniteOperand {
        operand: OperandKind,
        row: usize,
        col: usize,
    },
    Arithmetic(ExactSumError),
    Protocol(String),
}

impl UnitError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Shape(_) => "unit_shape_mismatch",
            Self::MissingOperand(_) => "unit_operand_not_loaded",
            Self::NonFiniteOperand { .. } => "unit_non_finite_operand",
            Self::Arithmetic(_) => "unit_arithmetic_rejected",
            Self::Protocol(_) => "unit_protocol_failure",
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(err) => write!(f, "{err}"),
            Self::MissingOperand(operand) => {
                write!(f, "operand {} was not loaded before compute", operand.as_str())
            }
            Self::NonFiniteOperand { operand, row, col } => write!(
                f,
                "operand {} has a non-finite entry at ({row}, {col})",
                operand.as_str()
            ),
            Self::Arithmetic(err) => write!(f, "{err}"),
            Self::Protocol(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for UnitError {}

impl From<ShapeError> for UnitError {
    fn from(err: ShapeError) -> Self {
        Self::Shape(err)
    }
}

impl From<ExactSumError> for UnitError {
    fn from(err: ExactSumError) -> Self {
        Self::Arithmetic(err)
    }
}

/// A fixed-shape matrix multiply-accumulate primitive driven through
/// load / compute / store.
pub trait MmaUnit {
    fn name(&self) -> String;

    fn shape(&self) -> MmaShape;

    fn load_a(&mut self, a: &OperandTile) -> Result<(), UnitError>;

    fn load_b(&mut self, b: &OperandTile) -> Result<(), UnitError>;

    /// Seeds the accumulator with `c`.
    fn load_c(&mut self, c: &OperandTile) -> Result<(), UnitError>;

    /// Seeds the accumulator with zeros instead of a loaded C.
    fn init_to_zero(&mut self);

    /// Replaces the accumulator with `A·B + accumulator` under the unit's
    /// own rounding rule.
    fn multiply_accumulate(&mut self) -> Result<(), UnitError>;

    /// Copies the accumulator into `out`.
    fn store(&self, out: &mut OperandTile) -> Result<(), UnitError>;
}

#[derive(Debug, Clone, PartialEq)]
enum AccumulatorState {
    Unset,
    Zero,
    Loaded(OperandTile),
}

/// Operand fragments held by a unit between load and compute.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentState {
    shape: MmaShape,
    a: Option<OperandTile>,
    b: Option<OperandTile>,
    accumulator: AccumulatorState,
}

impl FragmentState {
    #[must_use]
    pub fn new(shape: MmaShape) -> Self {
        Self {
            shape,
            a: None,
            b: None,
            accumulator: AccumulatorState::Unset,
        }
    }

    #[must_use]
    pub fn shape(&self) -> MmaShape {
        self.shape
    }

    pub fn load(&mut self, operand: OperandKind, tile: &OperandTile) -> Result<(), UnitError> {
        tile.check_dims(self.shape.dims(operand))?;
        match operand {
            OperandKind::A => self.a = Some(tile.clone()),
            OperandKind::B => self.b = Some(tile.clone()),
            OperandKind::C => self.accumulator = AccumulatorState::Loaded(tile.clone()),
        }
        Ok(())
    }

    pub fn init_to_zero(&mut self) {
        self.accumulator = AccumulatorState::Zero;
    }

    /// The loaded operands, or the first one missing. A zero-initialized
    /// accumulator is reported as `None`.
    pub fn operands(
        &self,
    ) -> Result<(&OperandTile, &OperandTile, Option<&OperandTile>), UnitError> {
        let a = self
            .a
            .as_ref()
            .ok_or(UnitError::MissingOperand(OperandKind::A))?;
        let b = self
            .b
            .as_ref()
            .ok_or(UnitError::MissingOperand(OperandKind::B))?;
        let c = match &self.accumulator {
            AccumulatorState::Unset => return Err(UnitError::MissingOperand(OperandKind::C)),
            AccumulatorState::Zero => None,
            AccumulatorState::Loaded(tile) => Some(tile),
        };
        Ok((a, b, c))
    }

    /// Installs a computed result as the new accumulator.
    pub fn set_result(&mut self, d: OperandTile) -> Result<(), UnitError> {
        d.check_dims(self.shape.dims(OperandKind::C))?;
        self.accumulator = AccumulatorState::Loaded(d);
        Ok(())
    }

    pub fn store(&self, out: &mut OperandTile) -> Result<(), UnitError> {
        out.check_dims(self.shape.dims(OperandKind::C))?;
        match &self.accumulator {
            AccumulatorState::Unset => Err(UnitError::MissingOperand(OperandKind::C)),
            AccumulatorState::Zero => {
                out.fill_zero();
                Ok(())
            }
            AccumulatorState::Loaded(tile) => Ok(out.copy_from(tile)?),
        }
    }
}

/// Rejects NaN and infinite operands with their coordinates.
pub fn ensure_finite(operand: OperandKind, tile: &OperandTile) -> Result<(), UnitError> {
    let cols = tile.cols();
    match tile.as_slice().iter().position(|value| !value.is_finite()) {
        Some(index) => Err(UnitError::NonFiniteOperand {
            operand,
            row: index / cols,
            col: index % cols,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{FragmentState, UnitError, ensure_finite};
    use mmp_tile::{MmaShape, OperandKind, OperandTile};

    #[test]
    fn compute_requires_all_operands() {
        let shape = MmaShape::M8N8K4;
        let mut state = FragmentState::new(shape);
        assert_eq!(
            state.operands().map(|_| ()),
            Err(UnitError::MissingOperand(OperandKind::A))
        );
        state
            .load(OperandKind::A, &OperandTile::for_operand(shape, OperandKind::A))
            .expect("A fits");
        state
            .load(OperandKind::B, &OperandTile::for_operand(shape, OperandKind::B))
            .expect("B fits");
        assert_eq!(
            state.operands().map(|_| ()),
            Err(UnitError::MissingOperand(OperandKind::C))
        );
        state.init_to_zero();
        let (_, _, c) = state.operands().expect("all operands present");
        assert!(c.is_none());
    }

    #[test]
    fn load_rejects_wrong_tile_dims() {
        let mut state = FragmentState::new(MmaShape::M8N8K4);
        let err = state
            .load(OperandKind::A, &OperandTile::zeros(4, 8))
            .expect_err("A is 8x4");
        assert_eq!(err.reason_code(), "unit_shape_mismatch");
    }

    #[test]
    fn store_reads_back_accumulator() {
        let shape = MmaShape::new(2, 2, 2).expect("shape");
        let mut state = FragmentState::new(shape);
        let mut out = OperandTile::zeros(2, 2);
        assert!(state.store(&mut out).is_err());

        let mut c = OperandTile::zeros(2, 2);
        c.set(1, 0, 7.0).expect("in range");
        state.load(OperandKind::C, &c).expect("C fits");
        state.store(&mut out).expect("store");
        assert_eq!(out.get(1, 0), Ok(7.0));

        state.init_to_zero();
        state.store(&mut out).expect("store");
        assert!(out.is_all_zero());
    }

    #[test]
    fn ensure_finite_reports_coordinates() {
        let mut tile = OperandTile::zeros(2, 3);
        tile.set(1, 2, f64::NAN).expect("in range");
        assert_eq!(
            ensure_finite(OperandKind::B, &tile),
            Err(UnitError::NonFiniteOperand {
                operand: OperandKind::B,
                row: 1,
                col: 2
            })
        );
    }
}
