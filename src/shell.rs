//! Typed invocation of external tools.
//!
//! Every git/docker/tmux call goes through [`run`], which captures the exit
//! status and both output streams into a structured value instead of leaving
//! callers to inspect raw `Output`. Removal-style operations share the
//! [`RemovalOutcome`] vocabulary so teardown code can distinguish
//! "already gone" from a hard failure.

use std::path::Path;
use std::process::Command;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CmdOutput {
    /// Stdout with surrounding whitespace trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Stderr with surrounding whitespace trimmed.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Runs an external command to completion, capturing its output.
///
/// Failure to spawn the process at all (binary missing, permission denied)
/// is surfaced as `Err`; a non-zero exit is a successful call with
/// `success == false`.
pub fn run(program: &str, args: &[&str], cwd: Option<&Path>) -> std::io::Result<CmdOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output()?;
    Ok(CmdOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Outcome of a removal-style operation against an external registry.
///
/// Teardown treats `AlreadyAbsent` as a warning, never a failure: repeated
/// removal of the same target must stay non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The target existed and was removed.
    Removed,
    /// The target was already gone.
    AlreadyAbsent,
    /// The tool refused or errored; the message names the reason.
    Failed(String),
}

impl RemovalOutcome {
    /// True unless the operation hard-failed.
    pub fn is_ok(&self) -> bool {
        !matches!(self, RemovalOutcome::Failed(_))
    }
}
