use mmp_conformance::{
    CategoryReport, HarnessConfig, HarnessError, RunOptions, UnitSelection, run_catalog,
    run_configured,
};
use mmp_exact::ExactConstants;
use mmp_tile::MmaShape;
use mmp_unit::{EmulatedUnit, ProcessUnit, UnitError};

const EMULATOR: &str = env!("CARGO_BIN_EXE_mma_unit_emulator");

fn observed_bits(reports: &[CategoryReport]) -> Vec<(&'static str, u64, bool)> {
    reports
        .iter()
        .flat_map(|report| report.results.iter())
        .map(|result| (result.id, result.observed.to_bits(), result.passed))
        .collect()
}

#[test]
fn bridge_reproduces_in_process_results() {
    for preset in ["ieee-fused", "truncating", "flush-to-zero"] {
        let mut local = EmulatedUnit::from_preset(preset, MmaShape::M8N8K4).expect("preset");
        let expected = run_catalog(
            &ExactConstants::derive(),
            &mut local,
            &RunOptions::default(),
        )
        .expect("in-process run");

        let mut bridged = ProcessUnit::new(
            EMULATOR,
            vec!["--unit".to_string(), preset.to_string()],
            MmaShape::M8N8K4,
        );
        let actual = run_catalog(
            &ExactConstants::derive(),
            &mut bridged,
            &RunOptions::default(),
        )
        .expect("bridged run");

        assert_eq!(observed_bits(&actual), observed_bits(&expected), "{preset}");
    }
}

#[test]
fn configured_process_unit_passes_catalog() {
    let config = HarnessConfig {
        unit: UnitSelection::Process {
            program: EMULATOR.into(),
            args: Vec::new(),
        },
        ..HarnessConfig::default()
    };
    let outcome = run_configured(&config).expect("bridged run");
    assert!(outcome.unit.starts_with("process:"));
    assert!(outcome.all_passed(), "{:?}", outcome.failures());
}

#[test]
fn helper_failure_is_fatal() {
    let mut bridged = ProcessUnit::new(
        EMULATOR,
        vec!["--unit".to_string(), "no-such-preset".to_string()],
        MmaShape::M8N8K4,
    );
    let err = run_catalog(
        &ExactConstants::derive(),
        &mut bridged,
        &RunOptions::default(),
    )
    .expect_err("helper exits non-zero");
    assert!(matches!(err, HarnessError::Unit(UnitError::Protocol(_))));
    assert_eq!(err.reason_code(), "unit_protocol_failure");
}
