#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    ZeroDimension,
    InvalidShapeSpec(String),
    EntryOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    TileMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    ElementCountMismatch {
        expected: usize,
        actual: usize,
    },
    InsufficientDepth {
        required: usize,
        available: usize,
    },
}

impl ShapeError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ZeroDimension => "shape_zero_dimension",
            Self::InvalidShapeSpec(_) => "shape_spec_invalid",
            Self::EntryOutOfRange { .. } => "shape_entry_out_of_range",
            Self::TileMismatch { .. } => "shape_tile_mismatch",
            Self::ElementCountMismatch { .. } => "shape_element_count_mismatch",
            Self::InsufficientDepth { .. } => "shape_insufficient_depth",
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension => write!(f, "shape dimensions must be > 0"),
            Self::InvalidShapeSpec(raw) => {
                write!(f, "invalid shape spec {raw:?}, expected MxNxK")
            }
            Self::EntryOutOfRange {
                row,
                col,
                rows,
                cols,
            } => write!(f, "entry ({row}, {col}) outside {rows}x{cols} tile"),
            Self::TileMismatch { expected, actual } => write!(
                f,
                "tile is {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Self::ElementCountMismatch { expected, actual } => {
                write!(f, "element count mismatch expected={expected} actual={actual}")
            }
            Self::InsufficientDepth {
                required,
                available,
            } => write!(
                f,
                "reduction depth k={available} is smaller than the {required} terms required"
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// Dimensions of one multiply-accumulate: A is m×k, B is k×n, C and D are
/// m×n.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmaShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl MmaShape {
    /// The binary64 tensor-core tile.
    pub const M8N8K4: Self = Self { m: 8, n: 8, k: 4 };

    pub fn new(m: usize, n: usize, k: usize) -> Result<Self, ShapeError> {
        if m == 0 || n == 0 || k == 0 {
            return Err(ShapeError::ZeroDimension);
        }
        Ok(Self { m, n, k })
    }

    pub fn square(size: usize) -> Result<Self, ShapeError> {
        Self::new(size, size, size)
    }

    /// Parses `MxNxK`, e.g. `8x8x4`.
    pub fn parse(raw: &str) -> Result<Self, ShapeError> {
        let invalid = || ShapeError::InvalidShapeSpec(raw.to_string());
        let dims = raw
            .trim()
            .split(['x', 'X'])
            .map(|part| part.trim().parse::<usize>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match dims.as_slice() {
            [m, n, k] => Self::new(*m, *n, *k),
            _ => Err(invalid()),
        }
    }

    #[must_use]
    pub fn dims(self, operand: OperandKind) -> (usize, usize) {
        match operand {
            OperandKind::A => (self.m, self.k),
            OperandKind::B => (self.k, self.n),
            OperandKind::C => (self.m, self.n),
        }
    }

    #[must_use]
    pub fn label(self) -> String {
        format!("m{}n{}k{}", self.m, self.n, self.k)
    }
}

impl Default for MmaShape {
    fn default() -> Self {
        Self::M8N8K4
    }
}

impl fmt::Display for MmaShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.m, self.n, self.k)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    A,
    B,
    C,
}

impl OperandKind {
    pub const ALL: [Self; 3] = [Self::A, Self::B, Self::C];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

/// Row-major binary64 matrix of fixed dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandTile {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl OperandTile {
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    #[must_use]
    pub fn for_operand(shape: MmaShape, operand: OperandKind) -> Self {
        let (rows, cols) = shape.dims(operand);
        Self::zeros(rows, cols)
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        if data.len() != rows * cols {
            return Err(ShapeError::ElementCountMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f64, ShapeError> {
        let index = self.index(row, col)?;
        Ok(self.data[index])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), ShapeError> {
        let index = self.index(row, col)?;
        self.data[index] = value;
        Ok(())
    }

    /// Resets every element to `+0.0`.
    pub fn fill_zero(&mut self) {
        self.data.fill(0.0);
    }

    /// True when every element is exactly `+0.0` (bit pattern zero).
    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|value| value.to_bits() == 0)
    }

    pub fn check_dims(&self, expected: (usize, usize)) -> Result<(), ShapeError> {
        if self.dims() == expected {
            Ok(())
        } else {
            Err(ShapeError::TileMismatch {
                expected,
                actual: self.dims(),
            })
        }
    }

    /// Overwrites this tile with `other`, which must have the same dimensions.
    pub fn copy_from(&mut self, other: &Self) -> Result<(), ShapeError> {
        other.check_dims(self.dims())?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    fn index(&self, row: usize, col: usize) -> Result<usize, ShapeError> {
        if row >= self.rows || col >= self.cols {
            return Err(ShapeError::EntryOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }
}
