//! Error types for the substrate orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for orchestrator operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid operator input, rejected before any resource is touched.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The given path is not a git repository.
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to create the branch-backed workspace.
    #[error("failed to create worktree for branch '{branch}': {reason}")]
    WorktreeCreation { branch: String, reason: String },

    /// Failed to launch the sandbox.
    #[error("failed to launch sandbox: {0}")]
    SandboxLaunch(String),

    /// No session with the given name exists.
    #[error("no session named '{0}' (run `substrate list` to see active sessions)")]
    SessionNotFound(String),

    /// The session's sandbox is still running.
    #[error("session '{0}' is still running (pass --force to stop it first)")]
    SessionStillRunning(String),

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// Sandbox runtime query failed.
    #[error("sandbox runtime error: {0}")]
    Runtime(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error during orchestrator operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
