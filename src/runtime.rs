//! Sandbox runtime interface: container queries, stop, and removal.
//!
//! The orchestrator never caches container state; every check is a live
//! query against the runtime (the container registry is shared mutable
//! state owned by Docker, not by us).

use crate::error::Result;
use crate::shell::{run, RemovalOutcome};

/// Narrow interface over the container runtime.
pub trait SandboxRuntime {
    /// Whether a container with exactly this name is currently running.
    fn is_running(&self, name: &str) -> Result<bool>;

    /// Whether a container with this name exists in any state.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Requests the container to stop. Already-exited is not an error.
    fn stop(&self, name: &str) -> RemovalOutcome;

    /// Force-removes the container context. Already-gone is not an error.
    fn remove(&self, name: &str) -> RemovalOutcome;
}

/// [`SandboxRuntime`] implementation shelling out to the `docker` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }

    fn name_listed(&self, name: &str, all: bool) -> Result<bool> {
        // Anchored filter: `--filter name=` matches substrings otherwise.
        let filter = format!("name=^{name}$");
        let mut args: Vec<&str> = vec!["ps", "--format", "{{.Names}}", "--filter", &filter];
        if all {
            args.insert(1, "-a");
        }
        let out = run("docker", &args, None)?;
        if !out.success {
            return Err(crate::error::Error::Runtime(format!(
                "docker ps failed: {}",
                out.stderr_trimmed()
            )));
        }
        Ok(out.stdout.lines().any(|line| line.trim() == name))
    }
}

impl SandboxRuntime for DockerRuntime {
    fn is_running(&self, name: &str) -> Result<bool> {
        self.name_listed(name, false)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.name_listed(name, true)
    }

    fn stop(&self, name: &str) -> RemovalOutcome {
        match run("docker", &["stop", name], None) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => {
                let stderr = out.stderr_trimmed();
                if stderr.contains("No such container") {
                    RemovalOutcome::AlreadyAbsent
                } else {
                    RemovalOutcome::Failed(stderr.to_string())
                }
            }
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }

    fn remove(&self, name: &str) -> RemovalOutcome {
        match run("docker", &["rm", "-f", name], None) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => {
                let stderr = out.stderr_trimmed();
                if stderr.contains("No such container") {
                    RemovalOutcome::AlreadyAbsent
                } else {
                    RemovalOutcome::Failed(stderr.to_string())
                }
            }
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }
}
