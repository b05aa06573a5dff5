#![forbid(unsafe_code)]

//! Device-helper stand-in: answers one JSON unit request on stdin with one
//! JSON response on stdout, computed by an emulated unit.

use mmp_unit::{EmulatedUnit, UnitModel, UnitRequest, serve_request};
use std::io::{Read, Write};

fn main() {
    if let Err(err) = run() {
        eprintln!("mma_unit_emulator failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut preset = "ieee-fused".to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--unit" => {
                preset = args
                    .next()
                    .ok_or_else(|| "--unit requires a value".to_string())?;
            }
            "--help" | "-h" => {
                println!(
                    "Usage: mma_unit_emulator [--unit <preset>] < request.json\nPresets: {}",
                    UnitModel::preset_names().join(", ")
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|err| format!("failed reading request: {err}"))?;
    let request: UnitRequest =
        serde_json::from_str(&raw).map_err(|err| format!("invalid request: {err}"))?;
    let shape = request.mma_shape().map_err(|err| format!("{err}"))?;

    let mut unit = EmulatedUnit::from_preset(&preset, shape)
        .ok_or_else(|| format!("unknown unit preset {preset:?}"))?;
    let response = serve_request(&mut unit, &request).map_err(|err| format!("{err}"))?;

    let payload = serde_json::to_string(&response)
        .map_err(|err| format!("failed serializing response: {err}"))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{payload}").map_err(|err| format!("failed writing response: {err}"))
}
