//! Substrate - local orchestrator for sandboxed coding-agent sessions.
//!
//! This library provides the session lifecycle core: identity allocation,
//! branch-backed workspace provisioning, sandbox launch command
//! construction, reattachable session supervision, and best-effort teardown
//! with partial-failure reporting.

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod launch;
pub mod reconciler;
pub mod runtime;
pub mod session;
pub mod shell;
pub mod supervisor;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use error::{Error, Result};
pub use git::{CliGit, GitWorktrees};
pub use launch::{build_launch_command, host_identity, HostIdentity, LaunchCommand, ResourceLimits};
pub use reconciler::{CleanReport, Reconciler};
pub use runtime::{DockerRuntime, SandboxRuntime};
pub use session::{
    allocate_id, validate_full_name, validate_task_name, Session, BRANCH_PREFIX, HANDLE_PREFIX,
};
pub use shell::RemovalOutcome;
pub use supervisor::{Multiplexer, StopReport, Supervisor, TmuxMultiplexer};
pub use workspace::{CleanStatus, Provisioner, StepOutcome, TeardownReport, TeardownStep};
