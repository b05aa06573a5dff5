#![forbid(unsafe_code)]

pub mod builder;
pub mod catalog;
pub mod evaluate;
pub mod evidence;
pub mod report;

pub use builder::{CaseEncoder, OperandBuilder};
pub use catalog::{
    AccumulatorInit, Expectation, Lane, ProbeCase, ProbeCategory, ProbeEncoding, Term,
    probe_catalog, required_depth,
};
pub use evaluate::{
    CategoryReport, LaneSelection, ProbeHarness, ProbeResult, RunOptions, run_catalog,
};
pub use evidence::{ProbeLogEntry, set_probe_log_path};
pub use report::write_report;

use mmp_exact::{ExactConstants, SetupError};
use mmp_tile::{MmaShape, ShapeError};
use mmp_unit::{EmulatedUnit, MmaUnit, ProcessUnit, UnitError, UnitModel};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSelection {
    /// Software unit built from a named [`UnitModel`] preset.
    Emulated(String),
    /// External helper speaking the JSON unit protocol.
    Process { program: PathBuf, args: Vec<String> },
}

impl Default for UnitSelection {
    fn default() -> Self {
        Self::Emulated("ieee-fused".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub shape: MmaShape,
    pub unit: UnitSelection,
    pub lanes: LaneSelection,
    pub strict_mode: bool,
    pub verbose: bool,
    pub log_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            shape: MmaShape::M8N8K4,
            unit: UnitSelection::default(),
            lanes: LaneSelection::Origin,
            strict_mode: false,
            verbose: false,
            log_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarnessError {
    Setup(SetupError),
    Shape(ShapeError),
    Unit(UnitError),
    UnknownUnit(String),
    Log(String),
}

impl HarnessError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Setup(err) => err.reason_code(),
            Self::Shape(err) => err.reason_code(),
            Self::Unit(err) => err.reason_code(),
            Self::UnknownUnit(_) => "harness_unknown_unit",
            Self::Log(_) => "harness_log_write_failed",
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(err) => write!(f, "boundary constant self-check failed: {err}"),
            Self::Shape(err) => write!(f, "{err}"),
            Self::Unit(err) => write!(f, "unit failure: {err}"),
            Self::UnknownUnit(name) => write!(
                f,
                "unknown unit preset {name:?} (known: {})",
                UnitModel::preset_names().join(", ")
            ),
            Self::Log(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for HarnessError {}

impl From<SetupError> for HarnessError {
    fn from(err: SetupError) -> Self {
        Self::Setup(err)
    }
}

impl From<ShapeError> for HarnessError {
    fn from(err: ShapeError) -> Self {
        Self::Shape(err)
    }
}

impl From<UnitError> for HarnessError {
    fn from(err: UnitError) -> Self {
        Self::Unit(err)
    }
}

/// Outcome of one configured run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessRun {
    pub unit: String,
    pub shape: MmaShape,
    pub reports: Vec<CategoryReport>,
}

impl HarnessRun {
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.reports.iter().map(CategoryReport::case_count).sum()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.reports.iter().map(CategoryReport::pass_count).sum()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(CategoryReport::all_passed)
    }

    /// `category/probe_id@row,col` for every failing result.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.reports
            .iter()
            .flat_map(CategoryReport::failures)
            .map(|result| {
                format!(
                    "{}/{}@{},{}",
                    result.category.as_str(),
                    result.id,
                    result.lane.row,
                    result.lane.col
                )
            })
            .collect()
    }
}

pub fn build_unit(config: &HarnessConfig) -> Result<Box<dyn MmaUnit>, HarnessError> {
    match &config.unit {
        UnitSelection::Emulated(preset) => EmulatedUnit::from_preset(preset, config.shape)
            .map(|unit| Box::new(unit) as Box<dyn MmaUnit>)
            .ok_or_else(|| HarnessError::UnknownUnit(preset.clone())),
        UnitSelection::Process { program, args } => Ok(Box::new(ProcessUnit::new(
            program.clone(),
            args.clone(),
            config.shape,
        ))),
    }
}

/// Builds the configured unit and runs the catalog against it.
pub fn run_configured(config: &HarnessConfig) -> Result<HarnessRun, HarnessError> {
    if config.log_path.is_some() {
        set_probe_log_path(config.log_path.clone());
    }
    let mut unit = build_unit(config)?;
    let options = RunOptions {
        lanes: config.lanes,
    };
    let reports = run_catalog(&ExactConstants::derive(), unit.as_mut(), &options)?;
    Ok(HarnessRun {
        unit: unit.name(),
        shape: config.shape,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::{HarnessConfig, HarnessError, UnitSelection, build_unit};
    use mmp_tile::MmaShape;

    #[test]
    fn default_config_targets_fused_emulator() {
        let config = HarnessConfig::default();
        assert_eq!(config.shape, MmaShape::M8N8K4);
        assert!(!config.strict_mode);
        let unit = build_unit(&config).expect("default preset exists");
        assert!(unit.name().starts_with("emulated:ieee-fused"));
        assert_eq!(unit.shape(), MmaShape::M8N8K4);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let config = HarnessConfig {
            unit: UnitSelection::Emulated("fp8".to_string()),
            ..HarnessConfig::default()
        };
        let err = build_unit(&config).err().expect("preset missing");
        assert_eq!(err, HarnessError::UnknownUnit("fp8".to_string()));
        assert_eq!(err.reason_code(), "harness_unknown_unit");
        assert!(err.to_string().contains("ieee-fused"));
    }

    #[test]
    fn process_selection_builds_bridge() {
        let config = HarnessConfig {
            unit: UnitSelection::Process {
                program: "mma-helper".into(),
                args: vec!["--device".to_string(), "0".to_string()],
            },
            ..HarnessConfig::default()
        };
        let unit = build_unit(&config).expect("bridge");
        assert_eq!(unit.name(), "process:mma-helper --device 0");
    }
}
