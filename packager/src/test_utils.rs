//! Shared test utilities for the packager crate.

use crate::error::Result;
use crate::packer::CommandExecutor;
use std::fs;
use std::process::{ExitStatus, Output};
use std::sync::{Mutex, PoisonError};

/// Magic number at the start of every CRX file.
pub const CRX_MAGIC: &[u8] = b"Cr24";

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The program that was run.
    pub cmd: String,
    /// Its arguments.
    pub args: Vec<String>,
}

impl RecordedCall {
    /// Value of the `--pack-extension=` argument, if present.
    #[must_use]
    pub fn staging_dir(&self) -> Option<&str> {
        self.args
            .iter()
            .find_map(|arg| arg.strip_prefix("--pack-extension="))
    }
}

/// A `CommandExecutor` standing in for a Chromium-based browser.
///
/// By default each `--pack-extension=<dir>` run writes `<dir>.crx` holding
/// the CRX magic followed by the staged manifest, and exits successfully.
#[derive(Debug, Default)]
pub struct FakeChromium {
    canned: Option<Output>,
    failures: Vec<(String, String)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeChromium {
    /// A browser that packs every directory it is given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A browser that writes nothing and returns `output` for every run.
    #[must_use]
    pub fn returning(output: Output) -> Self {
        Self {
            canned: Some(output),
            ..Self::default()
        }
    }

    /// Fail runs whose staging directory contains `fragment`, printing
    /// `stderr`.
    #[must_use]
    pub fn failing_for(mut self, fragment: &str, stderr: &str) -> Self {
        self.failures.push((fragment.to_owned(), stderr.to_owned()));
        self
    }

    /// Invocations so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for FakeChromium {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let call = RecordedCall {
            cmd: cmd.to_owned(),
            args: args.iter().map(|&arg| arg.to_owned()).collect(),
        };
        let staging_dir = call.staging_dir().map(str::to_owned);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        if let Some(output) = &self.canned {
            return Ok(output.clone());
        }
        let Some(dir) = staging_dir else {
            return Ok(failure_output("missing --pack-extension"));
        };
        if let Some((_, stderr)) = self.failures.iter().find(|(f, _)| dir.contains(f.as_str())) {
            return Ok(failure_output(stderr));
        }

        let mut archive = CRX_MAGIC.to_vec();
        archive.extend(fs::read(format!("{dir}/manifest.json")).unwrap_or_default());
        fs::write(format!("{dir}.crx"), archive)?;
        Ok(success_output())
    }
}
