#![forbid(unsafe_code)]

use mmp_conformance::{HarnessConfig, LaneSelection, UnitSelection, run_configured, write_report};
use mmp_tile::MmaShape;
use std::io::Write;
use std::path::PathBuf;

const USAGE: &str = "Usage: cargo run -p mmp-conformance --bin run_mma_probe -- \
[--unit <preset>] [--unit-cmd <program> [--unit-arg <arg>]...] [--shape MxNxK] \
[--all-lanes] [--strict] [--verbose] [--log-path <path>]";

fn main() {
    if let Err(err) = run() {
        eprintln!("run_mma_probe failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(config) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        println!(
            "Presets: {}",
            mmp_unit::UnitModel::preset_names().join(", ")
        );
        return Ok(());
    };

    let outcome = run_configured(&config).map_err(|err| format!("{err}"))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &outcome.unit, &outcome.reports, config.verbose)
        .map_err(|err| format!("failed writing report: {err}"))?;
    out.flush()
        .map_err(|err| format!("failed flushing report: {err}"))?;

    if config.strict_mode && !outcome.all_passed() {
        eprintln!("failing probes: {}", outcome.failures().join(" "));
        std::process::exit(2);
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<HarnessConfig>, String> {
    let mut config = HarnessConfig::default();
    let mut preset: Option<String> = None;
    let mut program: Option<PathBuf> = None;
    let mut unit_args = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--unit" => {
                preset = Some(
                    args.next()
                        .ok_or_else(|| "--unit requires a value".to_string())?,
                );
            }
            "--unit-cmd" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--unit-cmd requires a value".to_string())?;
                program = Some(PathBuf::from(value));
            }
            "--unit-arg" => {
                unit_args.push(
                    args.next()
                        .ok_or_else(|| "--unit-arg requires a value".to_string())?,
                );
            }
            "--shape" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--shape requires a value".to_string())?;
                config.shape = MmaShape::parse(&value).map_err(|err| format!("{err}"))?;
            }
            "--all-lanes" => config.lanes = LaneSelection::All,
            "--strict" => config.strict_mode = true,
            "--verbose" | "-v" => config.verbose = true,
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                config.log_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Ok(None),
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    config.unit = match (preset, program) {
        (Some(_), Some(_)) => {
            return Err("--unit and --unit-cmd are mutually exclusive".to_string());
        }
        (Some(preset), None) => UnitSelection::Emulated(preset),
        (None, Some(program)) => UnitSelection::Process {
            program,
            args: unit_args,
        },
        (None, None) if !unit_args.is_empty() => {
            return Err("--unit-arg requires --unit-cmd".to_string());
        }
        (None, None) => UnitSelection::default(),
    };
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::parse_args;
    use mmp_conformance::{LaneSelection, UnitSelection};
    use mmp_tile::MmaShape;
    use std::path::PathBuf;

    fn parse(raw: &[&str]) -> Result<Option<mmp_conformance::HarnessConfig>, String> {
        parse_args(raw.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        let config = parse(&[]).expect("parse").expect("config");
        assert_eq!(config.unit, UnitSelection::default());
        assert_eq!(config.shape, MmaShape::M8N8K4);
        assert!(!config.strict_mode);
    }

    #[test]
    fn process_unit_with_arguments() {
        let config = parse(&[
            "--unit-cmd",
            "./helper",
            "--unit-arg",
            "--device=1",
            "--shape",
            "16x8x4",
            "--all-lanes",
            "--strict",
        ])
        .expect("parse")
        .expect("config");
        assert_eq!(
            config.unit,
            UnitSelection::Process {
                program: PathBuf::from("./helper"),
                args: vec!["--device=1".to_string()],
            }
        );
        assert_eq!(config.shape, MmaShape::new(16, 8, 4).expect("shape"));
        assert_eq!(config.lanes, LaneSelection::All);
        assert!(config.strict_mode);
    }

    #[test]
    fn rejects_conflicting_or_unknown_flags() {
        assert!(parse(&["--unit", "truncating", "--unit-cmd", "x"]).is_err());
        assert!(parse(&["--unit-arg", "x"]).is_err());
        assert!(parse(&["--shape"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert_eq!(parse(&["--help"]), Ok(None));
    }
}
