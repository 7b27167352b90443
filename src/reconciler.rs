//! Lifecycle reconciliation: the `clean` path.
//!
//! Enumerates workspaces (not execution contexts — a workspace outlives its
//! session), guards against live sandboxes, and drives teardown. Bulk
//! cleaning never aborts on one target's failure; each target gets its own
//! terminal report.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::git::GitWorktrees;
use crate::runtime::SandboxRuntime;
use crate::session::validate_full_name;
use crate::supervisor::{Multiplexer, Supervisor};
use crate::workspace::{CleanStatus, Provisioner, TeardownReport};

/// Outcome of cleaning one session.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub full_name: String,
    /// Whether a still-running sandbox was force-stopped first.
    pub stopped: bool,
    pub teardown: TeardownReport,
}

impl CleanReport {
    pub fn status(&self) -> CleanStatus {
        self.teardown.status()
    }
}

/// Drives teardown for one session or for every workspace on disk.
pub struct Reconciler<'a, G: GitWorktrees, M: Multiplexer, R: SandboxRuntime> {
    provisioner: &'a Provisioner<'a, G>,
    supervisor: &'a Supervisor<M, R>,
}

impl<'a, G: GitWorktrees, M: Multiplexer, R: SandboxRuntime> Reconciler<'a, G, M, R> {
    pub fn new(provisioner: &'a Provisioner<'a, G>, supervisor: &'a Supervisor<M, R>) -> Self {
        Self {
            provisioner,
            supervisor,
        }
    }

    /// Cleans a single session.
    ///
    /// Refuses with [`Error::SessionStillRunning`] — before any filesystem
    /// mutation — when the sandbox is live and `force` is unset. With
    /// `force`, the sandbox is stopped first.
    pub fn clean(&self, full_name: &str, force: bool) -> Result<CleanReport> {
        validate_full_name(full_name)?;
        let active = self.supervisor.is_active(full_name)?;
        if active && !force {
            return Err(Error::SessionStillRunning(full_name.to_string()));
        }

        let mut stopped = false;
        if active {
            let report = self.supervisor.stop(full_name)?;
            stopped = report.sandbox_stopped;
        } else {
            // A dead sandbox may still hold a context; clear it quietly.
            let _ = self.supervisor.stop(full_name);
        }

        let teardown = self.provisioner.teardown(full_name);
        Ok(CleanReport {
            full_name: full_name.to_string(),
            stopped,
            teardown,
        })
    }

    /// Cleans every workspace directory under the workspace root.
    ///
    /// Each target is processed independently; a failure (including a
    /// still-running sandbox without `force`) is recorded and does not stop
    /// the sweep.
    pub fn clean_all(&self, force: bool) -> Result<Vec<(String, Result<CleanReport>)>> {
        let root = self.provisioner.workspace_root();
        let mut results = Vec::new();

        for full_name in list_workspaces(root)? {
            let result = self.clean(&full_name, force);
            if let Err(e) = &result {
                tracing::warn!(target_session = %full_name, error = %e, "clean failed for target");
            }
            results.push((full_name, result));
        }

        Ok(results)
    }
}

/// Names of all workspace directories under `root`, sorted.
fn list_workspaces(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
