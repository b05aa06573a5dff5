use mmp_tile::{MmaShape, OperandKind, OperandTile, ShapeError};

/// Scratch operand matrices reused by every probe of a run.
///
/// Entries can only be written through the [`CaseEncoder`] returned by
/// [`OperandBuilder::reset`], so each probe starts from all-zero operands.
#[derive(Debug, Clone)]
pub struct OperandBuilder {
    shape: MmaShape,
    a: OperandTile,
    b: OperandTile,
    c: OperandTile,
}

impl OperandBuilder {
    #[must_use]
    pub fn new(shape: MmaShape) -> Self {
        Self {
            shape,
            a: OperandTile::for_operand(shape, OperandKind::A),
            b: OperandTile::for_operand(shape, OperandKind::B),
            c: OperandTile::for_operand(shape, OperandKind::C),
        }
    }

    #[must_use]
    pub fn shape(&self) -> MmaShape {
        self.shape
    }

    /// Zero-fills A, B and C and opens them for encoding.
    pub fn reset(&mut self) -> CaseEncoder<'_> {
        self.a.fill_zero();
        self.b.fill_zero();
        self.c.fill_zero();
        CaseEncoder { builder: self }
    }

    #[must_use]
    pub fn tile(&self, operand: OperandKind) -> &OperandTile {
        match operand {
            OperandKind::A => &self.a,
            OperandKind::B => &self.b,
            OperandKind::C => &self.c,
        }
    }
}

pub struct CaseEncoder<'a> {
    builder: &'a mut OperandBuilder,
}

impl CaseEncoder<'_> {
    pub fn set_entry(
        &mut self,
        operand: OperandKind,
        row: usize,
        col: usize,
        value: f64,
    ) -> Result<&mut Self, ShapeError> {
        let tile = match operand {
            OperandKind::A => &mut self.builder.a,
            OperandKind::B => &mut self.builder.b,
            OperandKind::C => &mut self.builder.c,
        };
        tile.set(row, col, value)?;
        Ok(self)
    }
}
