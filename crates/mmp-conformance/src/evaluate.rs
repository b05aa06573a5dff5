//! Drives probes through a unit and compares the stored lane bit-for-bit.

use crate::HarnessError;
use crate::builder::OperandBuilder;
use crate::catalog::{
    AccumulatorInit, Expectation, Lane, ProbeCase, ProbeCategory, ProbeEncoding, probe_catalog,
    validate_shape,
};
use crate::evidence::{ProbeLogEntry, maybe_append_probe_log, operand_fingerprint};
use mmp_exact::{ExactConstants, hex_bits};
use mmp_tile::{OperandKind, OperandTile};
use mmp_unit::MmaUnit;

pub const PROBE_SUITE: &str = "mma_probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneSelection {
    /// Every probe on output element (0, 0).
    #[default]
    Origin,
    /// Every probe repeated on every output element.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub lanes: LaneSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub category: ProbeCategory,
    pub id: &'static str,
    pub description: &'static str,
    pub lane: Lane,
    pub expected: String,
    pub observed: f64,
    pub baseline: Option<f64>,
    pub passed: bool,
    pub reason_code: &'static str,
    pub operand_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub category: ProbeCategory,
    pub results: Vec<ProbeResult>,
}

impl CategoryReport {
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.results.iter().filter(|result| result.passed).count()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|result| result.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|result| !result.passed)
    }
}

/// Owns the operand scratch space for one unit and runs probes on it.
pub struct ProbeHarness<'u> {
    builder: OperandBuilder,
    output: OperandTile,
    unit: &'u mut dyn MmaUnit,
}

impl<'u> ProbeHarness<'u> {
    pub fn new(unit: &'u mut dyn MmaUnit) -> Self {
        let shape = unit.shape();
        Self {
            builder: OperandBuilder::new(shape),
            output: OperandTile::for_operand(shape, OperandKind::C),
            unit,
        }
    }

    #[must_use]
    pub fn unit_name(&self) -> String {
        self.unit.name()
    }

    pub fn run_probe(&mut self, case: &ProbeCase, lane: Lane) -> Result<ProbeResult, HarnessError> {
        let baseline = match &case.expectation {
            Expectation::NotBelow { baseline } => Some(self.execute(baseline, lane)?.0),
            _ => None,
        };
        let (observed, operand_fingerprint) = self.execute(&case.encoding, lane)?;

        let (passed, reason_code) = match &case.expectation {
            Expectation::Exact(expected) => (
                observed.to_bits() == expected.to_bits(),
                "probe_value_mismatch",
            ),
            Expectation::OneOf(candidates) => (
                candidates
                    .iter()
                    .any(|candidate| candidate.to_bits() == observed.to_bits()),
                "probe_candidate_mismatch",
            ),
            Expectation::NotBelow { .. } => (
                baseline.is_some_and(|baseline| observed >= baseline),
                "probe_monotonicity_violation",
            ),
        };
        let expected = match baseline {
            Some(baseline) => format!(">= {} ({baseline:e})", hex_bits(baseline)),
            None => case.expectation.describe(),
        };

        Ok(ProbeResult {
            category: case.category,
            id: case.id,
            description: case.description,
            lane,
            expected,
            observed,
            baseline,
            passed,
            reason_code: if passed { "probe_passed" } else { reason_code },
            operand_fingerprint,
        })
    }

    /// reset, encode, load, compute, store, read back lane `(row, col)`.
    fn execute(
        &mut self,
        encoding: &ProbeEncoding,
        lane: Lane,
    ) -> Result<(f64, String), HarnessError> {
        encoding.encode(&mut self.builder.reset(), lane)?;
        let fingerprint = operand_fingerprint(&self.builder, encoding.init);

        self.unit.load_a(self.builder.tile(OperandKind::A))?;
        self.unit.load_b(self.builder.tile(OperandKind::B))?;
        match encoding.init {
            AccumulatorInit::Zero => self.unit.init_to_zero(),
            AccumulatorInit::Seed(_) => self.unit.load_c(self.builder.tile(OperandKind::C))?,
        }
        self.unit.multiply_accumulate()?;
        self.unit.store(&mut self.output)?;
        let observed = self.output.get(lane.row, lane.col)?;
        Ok((observed, fingerprint))
    }
}

fn log_result(result: &ProbeResult, unit: &str, shape: &str) -> Result<(), HarnessError> {
    let entry = ProbeLogEntry {
        suite: PROBE_SUITE.to_string(),
        probe_id: result.id.to_string(),
        category: result.category.as_str().to_string(),
        lane: [result.lane.row, result.lane.col],
        unit: unit.to_string(),
        shape: shape.to_string(),
        expected: result.expected.clone(),
        observed_bits: hex_bits(result.observed),
        baseline_bits: result.baseline.map(hex_bits),
        passed: result.passed,
        reason_code: result.reason_code.to_string(),
        operand_fingerprint: result.operand_fingerprint.clone(),
    };
    maybe_append_probe_log(&entry).map_err(HarnessError::Log)
}

/// Runs the whole catalog against `unit`, one report per category.
///
/// The boundary constants are checked before the unit is touched. Probe
/// mismatches are recorded in the reports; shape and unit failures abort.
pub fn run_catalog(
    constants: &ExactConstants,
    unit: &mut dyn MmaUnit,
    options: &RunOptions,
) -> Result<Vec<CategoryReport>, HarnessError> {
    constants.verify()?;
    let shape = unit.shape();
    let catalog = probe_catalog(constants);
    validate_shape(shape, &catalog)?;

    let lanes = match options.lanes {
        LaneSelection::Origin => vec![Lane::ORIGIN],
        LaneSelection::All => Lane::all(shape),
    };
    let shape_label = shape.label();
    let mut harness = ProbeHarness::new(unit);
    let unit_name = harness.unit_name();

    let mut reports = Vec::with_capacity(ProbeCategory::ALL.len());
    for category in ProbeCategory::ALL {
        let mut results = Vec::new();
        for case in catalog.iter().filter(|case| case.category == category) {
            for &lane in &lanes {
                let result = harness.run_probe(case, lane)?;
                log_result(&result, &unit_name, &shape_label)?;
                results.push(result);
            }
        }
        reports.push(CategoryReport { category, results });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::{CategoryReport, ProbeHarness, ProbeResult};
    use crate::catalog::{
        Expectation, Lane, ProbeCase, ProbeCategory, ProbeEncoding, probe_catalog, term,
    };
    use mmp_exact::{ExactConstants, pow2};
    use mmp_tile::MmaShape;
    use mmp_unit::{EmulatedUnit, UnitModel};

    fn case(id: &str, catalog: &[ProbeCase]) -> ProbeCase {
        catalog
            .iter()
            .find(|case| case.id == id)
            .cloned()
            .expect("probe present")
    }

    fn result(passed: bool) -> ProbeResult {
        ProbeResult {
            category: ProbeCategory::RoundingMode,
            id: "x",
            description: "x",
            lane: Lane::ORIGIN,
            expected: String::new(),
            observed: 0.0,
            baseline: None,
            passed,
            reason_code: "probe_passed",
            operand_fingerprint: String::new(),
        }
    }

    #[test]
    fn exact_probe_passes_on_fused_unit() {
        let catalog = probe_catalog(&ExactConstants::derive());
        let mut unit = EmulatedUnit::new("ref", MmaShape::M8N8K4, UnitModel::IEEE_FUSED);
        let mut harness = ProbeHarness::new(&mut unit);
        let outcome = harness
            .run_probe(&case("nearest_above_midpoint", &catalog), Lane::ORIGIN)
            .expect("unit call");
        assert!(outcome.passed);
        assert_eq!(outcome.reason_code, "probe_passed");
        assert_eq!(outcome.observed, 2.0 + pow2(-51));
    }

    #[test]
    fn mismatch_is_recorded_not_raised() {
        let catalog = probe_catalog(&ExactConstants::derive());
        let mut unit = EmulatedUnit::new("trunc", MmaShape::M8N8K4, UnitModel::TRUNCATING);
        let mut harness = ProbeHarness::new(&mut unit);
        let outcome = harness
            .run_probe(&case("nearest_above_midpoint", &catalog), Lane::ORIGIN)
            .expect("unit call");
        assert!(!outcome.passed);
        assert_eq!(outcome.reason_code, "probe_value_mismatch");
        assert_eq!(outcome.observed, 2.0);
    }

    #[test]
    fn signed_zero_is_compared_by_bits() {
        let probe = ProbeCase {
            id: "negative_zero",
            category: ProbeCategory::AccumulatorInternals,
            description: "1 - 1 rounds to -0",
            encoding: ProbeEncoding::zero_init(vec![term(1.0, 1.0), term(1.0, -1.0)]),
            expectation: Expectation::Exact(-0.0),
        };
        let mut unit = EmulatedUnit::new("ref", MmaShape::M8N8K4, UnitModel::IEEE_FUSED);
        let mut harness = ProbeHarness::new(&mut unit);
        let outcome = harness.run_probe(&probe, Lane::ORIGIN).expect("unit call");
        assert!(!outcome.passed);
        assert_eq!(outcome.observed.to_bits(), 0);
    }

    #[test]
    fn monotonic_probe_reports_baseline() {
        let catalog = probe_catalog(&ExactConstants::derive());
        let mut unit = EmulatedUnit::new("ref", MmaShape::M8N8K4, UnitModel::IEEE_FUSED);
        let mut harness = ProbeHarness::new(&mut unit);
        let outcome = harness
            .run_probe(&case("monotonic_tie_increment", &catalog), Lane { row: 3, col: 6 })
            .expect("unit call");
        assert!(outcome.passed);
        assert_eq!(outcome.baseline, Some(2.0));
        assert_eq!(outcome.observed, 2.0 + pow2(-51));
        assert!(outcome.expected.starts_with(">= 0x4000000000000000"));
    }

    #[test]
    fn every_lane_sees_only_its_own_probe() {
        let catalog = probe_catalog(&ExactConstants::derive());
        let probe = case("subnormal_cancellation", &catalog);
        let shape = MmaShape::new(3, 2, 2).expect("shape");
        let mut unit = EmulatedUnit::new("ref", shape, UnitModel::IEEE_FUSED);
        let mut harness = ProbeHarness::new(&mut unit);
        for lane in Lane::all(shape) {
            let outcome = harness.run_probe(&probe, lane).expect("unit call");
            assert!(outcome.passed, "lane ({}, {})", lane.row, lane.col);
        }
    }

    #[test]
    fn category_report_counts() {
        let report = CategoryReport {
            category: ProbeCategory::RoundingMode,
            results: vec![result(true), result(false), result(true)],
        };
        assert_eq!(report.case_count(), 3);
        assert_eq!(report.pass_count(), 2);
        assert!(!report.all_passed());
        assert_eq!(report.failures().count(), 1);
    }
}
