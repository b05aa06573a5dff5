//! The probe catalog.
//!
//! Every probe touches one output lane: reduction term `p` goes to
//! `A[row][p]` and `B[p][col]`, an optional seed to `C[row][col]`, and all
//! other entries stay `+0.0`. Expected values are built from
//! [`ExactConstants`] and exactly representable host arithmetic only.

use crate::builder::CaseEncoder;
use mmp_exact::{ExactConstants, hex_bits, next_down, next_up, pow2};
use mmp_tile::{MmaShape, OperandKind, ShapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeCategory {
    SubnormalSupport,
    AccumulationPrecision,
    RoundingMode,
    AccumulatorInternals,
}

impl ProbeCategory {
    pub const ALL: [Self; 4] = [
        Self::SubnormalSupport,
        Self::AccumulationPrecision,
        Self::RoundingMode,
        Self::AccumulatorInternals,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubnormalSupport => "subnormal_support",
            Self::AccumulationPrecision => "accumulation_precision",
            Self::RoundingMode => "rounding_mode",
            Self::AccumulatorInternals => "accumulator_internals",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::SubnormalSupport => "A. Subnormal support",
            Self::AccumulationPrecision => "B. Dot-product accumulation precision",
            Self::RoundingMode => "C. Rounding mode",
            Self::AccumulatorInternals => "D. Accumulator internal behavior",
        }
    }
}

/// Output element a probe is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lane {
    pub row: usize,
    pub col: usize,
}

impl Lane {
    pub const ORIGIN: Self = Self { row: 0, col: 0 };

    /// Every output element of `shape`, row-major.
    #[must_use]
    pub fn all(shape: MmaShape) -> Vec<Self> {
        (0..shape.m)
            .flat_map(|row| (0..shape.n).map(move |col| Self { row, col }))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccumulatorInit {
    Zero,
    Seed(f64),
}

/// One reduction term `a * b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub a: f64,
    pub b: f64,
}

#[must_use]
pub fn term(a: f64, b: f64) -> Term {
    Term { a, b }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeEncoding {
    pub init: AccumulatorInit,
    pub terms: Vec<Term>,
}

impl ProbeEncoding {
    #[must_use]
    pub fn zero_init(terms: Vec<Term>) -> Self {
        Self {
            init: AccumulatorInit::Zero,
            terms,
        }
    }

    #[must_use]
    pub fn seeded(seed: f64, terms: Vec<Term>) -> Self {
        Self {
            init: AccumulatorInit::Seed(seed),
            terms,
        }
    }

    /// Number of reduction positions the encoding occupies.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.terms.len()
    }

    /// Same encoding with the seed and every B entry negated, which negates
    /// the exact result.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            init: match self.init {
                AccumulatorInit::Zero => AccumulatorInit::Zero,
                AccumulatorInit::Seed(seed) => AccumulatorInit::Seed(-seed),
            },
            terms: self.terms.iter().map(|t| term(t.a, -t.b)).collect(),
        }
    }

    /// Same encoding with the B factor of term `index` replaced.
    #[must_use]
    pub fn with_b(&self, index: usize, b: f64) -> Self {
        let mut out = self.clone();
        if let Some(slot) = out.terms.get_mut(index) {
            slot.b = b;
        }
        out
    }

    pub fn encode(&self, encoder: &mut CaseEncoder<'_>, lane: Lane) -> Result<(), ShapeError> {
        for (p, t) in self.terms.iter().enumerate() {
            encoder
                .set_entry(OperandKind::A, lane.row, p, t.a)?
                .set_entry(OperandKind::B, p, lane.col, t.b)?;
        }
        if let AccumulatorInit::Seed(seed) = self.init {
            encoder.set_entry(OperandKind::C, lane.row, lane.col, seed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Result must have exactly this bit pattern.
    Exact(f64),
    /// Result must have the bit pattern of one of the candidates.
    OneOf(Vec<f64>),
    /// Result must be `>=` the result of `baseline`, which runs first.
    NotBelow { baseline: ProbeEncoding },
}

impl Expectation {
    #[must_use]
    pub fn negated(&self) -> Self {
        match self {
            Self::Exact(value) => Self::Exact(-value),
            Self::OneOf(values) => Self::OneOf(values.iter().map(|v| -v).collect()),
            Self::NotBelow { baseline } => Self::NotBelow {
                baseline: baseline.negated(),
            },
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Exact(value) => format!("== {} ({value:e})", hex_bits(*value)),
            Self::OneOf(values) => {
                let rendered: Vec<String> = values
                    .iter()
                    .map(|v| format!("{} ({v:e})", hex_bits(*v)))
                    .collect();
                format!("one of [{}]", rendered.join(", "))
            }
            Self::NotBelow { .. } => ">= baseline result".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCase {
    pub id: &'static str,
    pub category: ProbeCategory,
    pub description: &'static str,
    pub encoding: ProbeEncoding,
    pub expectation: Expectation,
}

impl ProbeCase {
    /// Reduction depth needed to encode this probe, baseline included.
    #[must_use]
    pub fn depth(&self) -> usize {
        let baseline = match &self.expectation {
            Expectation::NotBelow { baseline } => baseline.depth(),
            _ => 0,
        };
        self.encoding.depth().max(baseline)
    }

    fn mirrored(&self, id: &'static str, description: &'static str) -> Self {
        Self {
            id,
            category: self.category,
            description,
            encoding: self.encoding.negated(),
            expectation: self.expectation.negated(),
        }
    }
}

/// Smallest reduction depth `k` able to hold every probe of `catalog`.
#[must_use]
pub fn required_depth(catalog: &[ProbeCase]) -> usize {
    catalog.iter().map(ProbeCase::depth).max().unwrap_or(0)
}

pub fn validate_shape(shape: MmaShape, catalog: &[ProbeCase]) -> Result<(), ShapeError> {
    let required = required_depth(catalog);
    if shape.k < required {
        return Err(ShapeError::InsufficientDepth {
            required,
            available: shape.k,
        });
    }
    Ok(())
}

/// The full ordered catalog, grouped by category.
#[must_use]
pub fn probe_catalog(constants: &ExactConstants) -> Vec<ProbeCase> {
    let mut catalog = subnormal_probes(constants);
    catalog.extend(accumulation_probes(constants));
    catalog.extend(rounding_probes());
    catalog.extend(accumulator_probes(constants));
    catalog
}

fn subnormal_probes(k: &ExactConstants) -> Vec<ProbeCase> {
    let category = ProbeCategory::SubnormalSupport;
    vec![
        ProbeCase {
            id: "subnormal_input",
            category,
            description: "Subnormal operand: 2^-1074 * 2^52",
            encoding: ProbeEncoding::zero_init(vec![term(k.smallest_subnormal, pow2(52))]),
            expectation: Expectation::Exact(k.min_normal),
        },
        ProbeCase {
            id: "subnormal_product",
            category,
            description: "Subnormal product of normals: 2^-537 * 3*2^-537",
            encoding: ProbeEncoding::zero_init(vec![term(pow2(-537), 3.0 * pow2(-537))]),
            expectation: Expectation::Exact(3.0 * k.smallest_subnormal),
        },
        ProbeCase {
            id: "subnormal_sum",
            category,
            description: "Subnormal sum: 1.5*2^-1022 - 2^-1022",
            encoding: ProbeEncoding::zero_init(vec![
                term(1.0, 1.5 * k.min_normal),
                term(1.0, -k.min_normal),
            ]),
            expectation: Expectation::Exact(pow2(-1023)),
        },
        ProbeCase {
            id: "subnormal_cancellation",
            category,
            description: "Subnormal output: 2^-1022 - pred(2^-1022)",
            encoding: ProbeEncoding::seeded(
                k.min_normal,
                vec![term(1.0, -next_down(k.min_normal))],
            ),
            expectation: Expectation::Exact(k.smallest_subnormal),
        },
    ]
}

fn accumulation_probes(k: &ExactConstants) -> Vec<ProbeCase> {
    let category = ProbeCategory::AccumulationPrecision;
    // each term is 3/8 ULP of 1.0, their sum 3/4 ULP
    let sub_ulp = 3.0 * pow2(-55);
    let combine = ProbeCase {
        id: "sub_ulp_terms_combine",
        category,
        description: "Sub-ULP terms combine: 1 + 3*2^-55 + 3*2^-55",
        encoding: ProbeEncoding::seeded(1.0, vec![term(1.0, sub_ulp), term(1.0, sub_ulp)]),
        expectation: Expectation::Exact(k.one_succ),
    };
    let negative = combine.mirrored(
        "sub_ulp_terms_combine_negative",
        "Sub-ULP terms combine (negative)",
    );
    vec![
        combine,
        negative,
        ProbeCase {
            id: "wide_exponent_product",
            category,
            description: "Wide exponent range: 2^-300 * 2^-300",
            encoding: ProbeEncoding::zero_init(vec![term(pow2(-300), pow2(-300))]),
            expectation: Expectation::Exact(pow2(-600)),
        },
    ]
}

fn rounding_probes() -> Vec<ProbeCase> {
    let category = ProbeCategory::RoundingMode;
    let two_succ = next_up(2.0);
    let cases = [
        (
            ProbeCase {
                id: "nearest_above_midpoint",
                category,
                description: "2 + 3/4 ULP rounds up to 2 + 2^-51",
                encoding: ProbeEncoding::zero_init(vec![
                    term(1.0, 2.0),
                    term(1.0, pow2(-52) + pow2(-53)),
                ]),
                expectation: Expectation::Exact(two_succ),
            },
            "nearest_above_midpoint_negative",
            "-(2 + 3/4 ULP) rounds to -(2 + 2^-51)",
        ),
        (
            ProbeCase {
                id: "nearest_below_midpoint",
                category,
                description: "2 + 1/4 ULP rounds down to 2",
                encoding: ProbeEncoding::zero_init(vec![term(1.0, 2.0), term(1.0, pow2(-53))]),
                expectation: Expectation::Exact(2.0),
            },
            "nearest_below_midpoint_negative",
            "-(2 + 1/4 ULP) rounds to -2",
        ),
        (
            ProbeCase {
                id: "tie_to_even_down",
                category,
                description: "Tie 2 + 1/2 ULP goes to even 2",
                encoding: ProbeEncoding::zero_init(vec![term(1.0, 2.0), term(1.0, pow2(-52))]),
                expectation: Expectation::Exact(2.0),
            },
            "tie_to_even_down_negative",
            "Tie -(2 + 1/2 ULP) goes to even -2",
        ),
        (
            ProbeCase {
                id: "tie_to_even_up",
                category,
                description: "Tie 2 + 3/2 ULP goes to even 2 + 2^-50",
                encoding: ProbeEncoding::zero_init(vec![
                    term(1.0, two_succ),
                    term(1.0, pow2(-52)),
                ]),
                expectation: Expectation::Exact(next_up(two_succ)),
            },
            "tie_to_even_up_negative",
            "Tie -(2 + 3/2 ULP) goes to even -(2 + 2^-50)",
        ),
    ];

    let mut probes = Vec::with_capacity(cases.len() * 2);
    for (case, _, _) in &cases {
        probes.push(case.clone());
    }
    for (case, id, description) in &cases {
        probes.push(case.mirrored(*id, *description));
    }
    probes
}

fn accumulator_probes(k: &ExactConstants) -> Vec<ProbeCase> {
    let category = ProbeCategory::AccumulatorInternals;
    let gap = k.one_gap_below();
    let tie_baseline = ProbeEncoding::zero_init(vec![term(1.0, 2.0), term(1.0, pow2(-52))]);
    let binade_baseline = ProbeEncoding::seeded(k.two_pred, vec![term(1.0, pow2(-53))]);
    vec![
        ProbeCase {
            id: "alignment_guard_bits",
            category,
            description: "Alignment guard bits: -pred(1) + 1*1",
            encoding: ProbeEncoding::seeded(-k.one_pred, vec![term(1.0, 1.0)]),
            expectation: Expectation::Exact(gap),
        },
        ProbeCase {
            id: "per_step_normalization",
            category,
            description: "Per-step normalization: pred(1) + 2^-53 + 2^-53",
            encoding: ProbeEncoding::seeded(k.one_pred, vec![term(1.0, gap), term(1.0, gap)]),
            expectation: Expectation::Exact(1.0),
        },
        ProbeCase {
            id: "subtraction_normalization",
            category,
            description: "Subtraction normalization: pred(1) - 1/2 - (1/2 - 2^-53)",
            encoding: ProbeEncoding::seeded(
                k.one_pred,
                vec![term(1.0, -0.5), term(1.0, -(0.5 - gap))],
            ),
            expectation: Expectation::Exact(0.0),
        },
        ProbeCase {
            id: "carry_out_bound",
            category,
            description: "Carry-out bound: pred(2) + pred(2) + 2^-52",
            encoding: ProbeEncoding::seeded(
                k.two_pred,
                vec![term(1.0, k.two_pred), term(1.0, pow2(-52))],
            ),
            expectation: Expectation::OneOf(vec![4.0, next_down(4.0)]),
        },
        ProbeCase {
            id: "monotonic_tie_increment",
            category,
            description: "Monotonicity: tie term raised by 2^-60",
            encoding: tie_baseline.with_b(1, pow2(-52) + pow2(-60)),
            expectation: Expectation::NotBelow {
                baseline: tie_baseline,
            },
        },
        ProbeCase {
            id: "monotonic_binade_crossing",
            category,
            description: "Monotonicity: pred(2) + term raised by 2^-54",
            encoding: binade_baseline.with_b(0, pow2(-53) + pow2(-54)),
            expectation: Expectation::NotBelow {
                baseline: binade_baseline,
            },
        },
    ]
}
