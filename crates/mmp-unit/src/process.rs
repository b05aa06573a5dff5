//! Bridge to a unit that lives behind an external helper program, e.g. a
//! small device-side binary that owns buffer transfer and kernel launch.
//!
//! Every compute spawns the helper once, writes one [`UnitRequest`] as JSON
//! on its stdin and reads one [`UnitResponse`] from its stdout.

use crate::wire::{UnitRequest, UnitResponse};
use crate::{FragmentState, MmaUnit, UnitError};
use mmp_tile::{MmaShape, OperandKind, OperandTile};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct ProcessUnit {
    program: PathBuf,
    args: Vec<String>,
    state: FragmentState,
}

impl ProcessUnit {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, shape: MmaShape) -> Self {
        Self {
            program: program.into(),
            args,
            state: FragmentState::new(shape),
        }
    }

    fn exchange(&self, request: &UnitRequest) -> Result<UnitResponse, UnitError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| UnitError::Protocol(format!("failed serializing request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                UnitError::Protocol(format!(
                    "failed spawning {}: {err}",
                    self.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).map_err(|err| {
                UnitError::Protocol(format!(
                    "failed writing request to {}: {err}",
                    self.program.display()
                ))
            })?;
        }

        let output = child.wait_with_output().map_err(|err| {
            UnitError::Protocol(format!(
                "failed waiting for {}: {err}",
                self.program.display()
            ))
        })?;
        if !output.status.success() {
            return Err(UnitError::Protocol(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|err| {
            UnitError::Protocol(format!(
                "invalid response from {}: {err}",
                self.program.display()
            ))
        })
    }
}

impl MmaUnit for ProcessUnit {
    fn name(&self) -> String {
        if self.args.is_empty() {
            format!("process:{}", self.program.display())
        } else {
            format!("process:{} {}", self.program.display(), self.args.join(" "))
        }
    }

    fn shape(&self) -> MmaShape {
        self.state.shape()
    }

    fn load_a(&mut self, a: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::A, a)
    }

    fn load_b(&mut self, b: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::B, b)
    }

    fn load_c(&mut self, c: &OperandTile) -> Result<(), UnitError> {
        self.state.load(OperandKind::C, c)
    }

    fn init_to_zero(&mut self) {
        self.state.init_to_zero();
    }

    fn multiply_accumulate(&mut self) -> Result<(), UnitError> {
        let shape = self.state.shape();
        let (a, b, c) = self.state.operands()?;
        let request = UnitRequest::new(shape, a, b, c);
        let d = self.exchange(&request)?.into_tile(shape)?;
        self.state.set_result(d)
    }

    fn store(&self, out: &mut OperandTile) -> Result<(), UnitError> {
        self.state.store(out)
    }
}
