//! JSON wire format between the harness and an external device helper.
//!
//! Operands travel as fixed-width hexadecimal bit patterns so that signed
//! zeros and subnormals cross the process boundary unchanged.

use crate::{MmaUnit, UnitError};
use mmp_exact::{hex_bits, parse_hex_bits};
use mmp_tile::{MmaShape, OperandKind, OperandTile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl From<MmaShape> for WireShape {
    fn from(shape: MmaShape) -> Self {
        Self {
            m: shape.m,
            n: shape.n,
            k: shape.k,
        }
    }
}

/// One multiply-accumulate request. `c == None` asks the device to
/// initialize its accumulator to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRequest {
    pub shape: WireShape,
    pub a: Vec<String>,
    pub b: Vec<String>,
    #[serde(default)]
    pub c: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResponse {
    pub d: Vec<String>,
}

#[must_use]
pub fn encode_tile(tile: &OperandTile) -> Vec<String> {
    tile.as_slice().iter().copied().map(hex_bits).collect()
}

pub fn decode_tile(
    shape: MmaShape,
    operand: OperandKind,
    raw: &[String],
) -> Result<OperandTile, UnitError> {
    let (rows, cols) = shape.dims(operand);
    let values = raw
        .iter()
        .map(|item| {
            parse_hex_bits(item).ok_or_else(|| {
                UnitError::Protocol(format!(
                    "operand {} has malformed bit pattern {item:?}",
                    operand.as_str()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    OperandTile::from_vec(rows, cols, values).map_err(|err| {
        UnitError::Protocol(format!("operand {} payload: {err}", operand.as_str()))
    })
}

impl UnitRequest {
    #[must_use]
    pub fn new(
        shape: MmaShape,
        a: &OperandTile,
        b: &OperandTile,
        c: Option<&OperandTile>,
    ) -> Self {
        Self {
            shape: shape.into(),
            a: encode_tile(a),
            b: encode_tile(b),
            c: c.map(encode_tile),
        }
    }

    pub fn mma_shape(&self) -> Result<MmaShape, UnitError> {
        Ok(MmaShape::new(self.shape.m, self.shape.n, self.shape.k)?)
    }
}

impl UnitResponse {
    pub fn into_tile(self, shape: MmaShape) -> Result<OperandTile, UnitError> {
        decode_tile(shape, OperandKind::C, &self.d)
    }
}

/// Runs one request through `unit`, as a device helper process does.
pub fn serve_request(
    unit: &mut dyn MmaUnit,
    request: &UnitRequest,
) -> Result<UnitResponse, UnitError> {
    let shape = request.mma_shape()?;
    if shape != unit.shape() {
        return Err(UnitError::Protocol(format!(
            "request shape {shape} does not match unit shape {}",
            unit.shape()
        )));
    }
    unit.load_a(&decode_tile(shape, OperandKind::A, &request.a)?)?;
    unit.load_b(&decode_tile(shape, OperandKind::B, &request.b)?)?;
    match &request.c {
        Some(c) => unit.load_c(&decode_tile(shape, OperandKind::C, c)?)?,
        None => unit.init_to_zero(),
    }
    unit.multiply_accumulate()?;
    let mut d = OperandTile::for_operand(shape, OperandKind::C);
    unit.store(&mut d)?;
    Ok(UnitResponse {
        d: encode_tile(&d),
    })
}

#[cfg(test)]
mod tests {
    use super::{UnitRequest, UnitResponse, decode_tile, serve_request};
    use crate::{EmulatedUnit, UnitError, UnitModel};
    use mmp_exact::pow2;
    use mmp_tile::{MmaShape, OperandKind, OperandTile};

    #[test]
    fn request_json_keeps_signed_zero_and_subnormals() {
        let shape = MmaShape::new(1, 1, 2).expect("shape");
        let a = OperandTile::from_vec(1, 2, vec![-0.0, pow2(-1074)]).expect("A");
        let b = OperandTile::zeros(2, 1);
        let request = UnitRequest::new(shape, &a, &b, None);
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"c\":null"));
        let parsed: UnitRequest = serde_json::from_str(&json).expect("deserialize");
        let decoded = decode_tile(shape, OperandKind::A, &parsed.a).expect("decode");
        assert_eq!(decoded.as_slice()[0].to_bits(), (-0.0f64).to_bits());
        assert_eq!(decoded.as_slice()[1].to_bits(), 1);
    }

    #[test]
    fn serve_request_runs_the_unit() {
        let shape = MmaShape::new(1, 1, 2).expect("shape");
        let mut unit = EmulatedUnit::new("reference", shape, UnitModel::IEEE_FUSED);
        let a = OperandTile::from_vec(1, 2, vec![1.0, 1.0]).expect("A");
        let b = OperandTile::from_vec(2, 1, vec![2.0, pow2(-52)]).expect("B");
        let c = OperandTile::from_vec(1, 1, vec![0.5]).expect("C");
        let response = serve_request(&mut unit, &UnitRequest::new(shape, &a, &b, Some(&c)))
            .expect("serve");
        let d = response.into_tile(shape).expect("decode");
        assert_eq!(d.get(0, 0), Ok(2.5));
    }

    #[test]
    fn malformed_payloads_are_protocol_errors() {
        let shape = MmaShape::new(1, 1, 1).expect("shape");
        let err = decode_tile(shape, OperandKind::A, &["0xzz".to_string()])
            .expect_err("bad hex");
        assert!(matches!(err, UnitError::Protocol(_)));

        let response = UnitResponse {
            d: vec!["0x0".to_string(), "0x0".to_string()],
        };
        assert!(matches!(
            response.into_tile(shape),
            Err(UnitError::Protocol(_))
        ));

        let mut unit = EmulatedUnit::new("reference", shape, UnitModel::IEEE_FUSED);
        let other = MmaShape::new(2, 1, 1).expect("shape");
        let request = UnitRequest::new(
            other,
            &OperandTile::zeros(2, 1),
            &OperandTile::zeros(1, 1),
            None,
        );
        assert!(matches!(
            serve_request(&mut unit, &request),
            Err(UnitError::Protocol(_))
        ));
    }
}
