//! Optional JSONL evidence log, one line per probe result.

use crate::builder::OperandBuilder;
use crate::catalog::AccumulatorInit;
use mmp_tile::OperandKind;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

pub const PROBE_LOG_ENV: &str = "MMP_PROBE_LOG_PATH";

static PROBE_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeLogEntry {
    pub suite: String,
    pub probe_id: String,
    pub category: String,
    pub lane: [usize; 2],
    pub unit: String,
    pub shape: String,
    pub expected: String,
    pub observed_bits: String,
    pub baseline_bits: Option<String>,
    pub passed: bool,
    pub reason_code: String,
    pub operand_fingerprint: String,
}

pub fn set_probe_log_path(path: Option<PathBuf>) {
    let cell = PROBE_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

fn resolve_probe_log_path() -> Option<PathBuf> {
    let configured = PROBE_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    configured.or_else(|| std::env::var_os(PROBE_LOG_ENV).map(PathBuf::from))
}

pub fn maybe_append_probe_log(entry: &ProbeLogEntry) -> Result<(), String> {
    let Some(path) = resolve_probe_log_path() else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing probe log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending probe log {}: {err}", path.display()))
}

/// SHA-256 over the bit patterns of A, B and C followed by the init flag.
#[must_use]
pub fn operand_fingerprint(builder: &OperandBuilder, init: AccumulatorInit) -> String {
    let mut hasher = Sha256::new();
    for operand in OperandKind::ALL {
        for value in builder.tile(operand).as_slice() {
            hasher.update(value.to_bits().to_le_bytes());
        }
    }
    hasher.update(match init {
        AccumulatorInit::Zero => [0u8],
        AccumulatorInit::Seed(_) => [1u8],
    });
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
