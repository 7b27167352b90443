//! Session supervision: named, reattachable execution contexts.
//!
//! Each sandbox runs inside a detached tmux session named after the session
//! handle, so `run` returns immediately and the operator can attach, detach,
//! and reattach at will. The multiplexer is modeled as a narrow trait so the
//! lifecycle logic can be exercised against a fake registry.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::launch::LaunchCommand;
use crate::runtime::SandboxRuntime;
use crate::session::{handle_for, HANDLE_PREFIX};
use crate::shell::{run, RemovalOutcome};

/// Narrow interface over the terminal multiplexer.
pub trait Multiplexer {
    /// Creates a named detached context running `command` and returns
    /// without waiting for the command to finish.
    fn start_detached(&self, handle: &str, command: &str) -> Result<()>;

    /// Whether a context with exactly this handle exists.
    fn has_session(&self, handle: &str) -> bool;

    /// Transfers terminal control to the context, blocking until the
    /// operator detaches or the process ends.
    fn attach(&self, handle: &str) -> Result<()>;

    /// Names of all contexts whose handle starts with `prefix`. An absent
    /// server means an empty list, not an error.
    fn sessions(&self, prefix: &str) -> Result<Vec<String>>;

    /// Destroys the named context. Already-gone is not an error.
    fn kill(&self, handle: &str) -> RemovalOutcome;
}

/// [`Multiplexer`] implementation shelling out to the `tmux` CLI.
#[derive(Debug, Clone, Default)]
pub struct TmuxMultiplexer;

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self
    }

    /// Exact-match target spec ('=' disables tmux's prefix matching).
    fn target(handle: &str) -> String {
        format!("={handle}")
    }
}

impl Multiplexer for TmuxMultiplexer {
    fn start_detached(&self, handle: &str, command: &str) -> Result<()> {
        let out = run("tmux", &["new-session", "-d", "-s", handle, command], None)?;
        if !out.success {
            return Err(Error::SandboxLaunch(format!(
                "tmux new-session failed: {}",
                out.stderr_trimmed()
            )));
        }
        Ok(())
    }

    fn has_session(&self, handle: &str) -> bool {
        run("tmux", &["has-session", "-t", &Self::target(handle)], None)
            .map(|out| out.success)
            .unwrap_or(false)
    }

    fn attach(&self, handle: &str) -> Result<()> {
        // Inherit the terminal: attach is the one blocking, interactive call.
        let status = std::process::Command::new("tmux")
            .args(["attach-session", "-t", &Self::target(handle)])
            .status()?;
        if !status.success() {
            return Err(Error::SessionNotFound(handle.to_string()));
        }
        Ok(())
    }

    fn sessions(&self, prefix: &str) -> Result<Vec<String>> {
        let out = run("tmux", &["list-sessions", "-F", "#{session_name}"], None)?;
        if !out.success {
            // No server running yet means no sessions, not a failure.
            return Ok(Vec::new());
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with(prefix))
            .map(String::from)
            .collect())
    }

    fn kill(&self, handle: &str) -> RemovalOutcome {
        match run("tmux", &["kill-session", "-t", &Self::target(handle)], None) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => {
                let stderr = out.stderr_trimmed();
                if stderr.contains("can't find session") || stderr.contains("no server running") {
                    RemovalOutcome::AlreadyAbsent
                } else {
                    RemovalOutcome::Failed(stderr.to_string())
                }
            }
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }
}

/// What a `stop` actually did; both halves are best-effort.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StopReport {
    /// Whether a running sandbox process was stopped.
    pub sandbox_stopped: bool,
    /// Whether an execution context was destroyed.
    pub context_killed: bool,
}

/// Supervises sandbox processes through the multiplexer and runtime.
pub struct Supervisor<M: Multiplexer, R: SandboxRuntime> {
    mux: M,
    runtime: R,
}

impl<M: Multiplexer, R: SandboxRuntime> Supervisor<M, R> {
    pub fn new(mux: M, runtime: R) -> Self {
        Self { mux, runtime }
    }

    /// Starts the sandbox inside a new detached context. Non-blocking:
    /// returns once the context has been created, regardless of sandbox
    /// initialization.
    pub fn start(&self, full_name: &str, launch: &LaunchCommand) -> Result<()> {
        let handle = handle_for(full_name);
        let command = launch.shell_string()?;
        self.mux.start_detached(&handle, &command)?;
        tracing::info!(session = %full_name, %handle, "started sandbox session");
        Ok(())
    }

    /// Attaches the terminal to a session's context.
    pub fn attach(&self, full_name: &str) -> Result<()> {
        let handle = handle_for(full_name);
        if !self.mux.has_session(&handle) {
            return Err(Error::SessionNotFound(full_name.to_string()));
        }
        self.mux.attach(&handle)
    }

    /// Lists sessions with live contexts, handles stripped of the
    /// namespace marker. Empty list, not an error, when none exist.
    pub fn list(&self) -> Result<Vec<String>> {
        let names = self.mux.sessions(HANDLE_PREFIX)?;
        Ok(names
            .iter()
            .map(|name| name.strip_prefix(HANDLE_PREFIX).unwrap_or(name).to_string())
            .collect())
    }

    /// Live query: is this session's sandbox process currently running?
    pub fn is_active(&self, full_name: &str) -> Result<bool> {
        self.runtime.is_running(&handle_for(full_name))
    }

    /// Stops a session's sandbox and destroys its context, best-effort on
    /// both halves. `SessionNotFound` only when neither half exists.
    pub fn stop(&self, full_name: &str) -> Result<StopReport> {
        let handle = handle_for(full_name);
        let container_exists = self.runtime.exists(&handle)?;
        let context_exists = self.mux.has_session(&handle);

        if !container_exists && !context_exists {
            return Err(Error::SessionNotFound(full_name.to_string()));
        }

        let sandbox_stopped = if container_exists {
            match self.runtime.stop(&handle) {
                RemovalOutcome::Removed => true,
                RemovalOutcome::AlreadyAbsent => false,
                RemovalOutcome::Failed(reason) => {
                    tracing::warn!(session = %full_name, %reason, "failed to stop sandbox");
                    false
                }
            }
        } else {
            false
        };

        // --rm containers remove themselves on stop; clear any holdout.
        if container_exists {
            if let RemovalOutcome::Failed(reason) = self.runtime.remove(&handle) {
                tracing::warn!(session = %full_name, %reason, "failed to remove sandbox context");
            }
        }

        let context_killed = if context_exists {
            match self.mux.kill(&handle) {
                RemovalOutcome::Removed => true,
                RemovalOutcome::AlreadyAbsent => false,
                RemovalOutcome::Failed(reason) => {
                    tracing::warn!(session = %full_name, %reason, "failed to kill context");
                    false
                }
            }
        } else {
            false
        };

        tracing::info!(
            session = %full_name,
            sandbox_stopped,
            context_killed,
            "stopped session"
        );

        Ok(StopReport {
            sandbox_stopped,
            context_killed,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Fake registries for hermetic lifecycle tests.

    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use super::*;

    /// In-memory multiplexer registry.
    #[derive(Debug, Default)]
    pub struct FakeMux {
        pub sessions: RefCell<BTreeSet<String>>,
        pub attached: RefCell<Vec<String>>,
    }

    impl Multiplexer for FakeMux {
        fn start_detached(&self, handle: &str, _command: &str) -> Result<()> {
            self.sessions.borrow_mut().insert(handle.to_string());
            Ok(())
        }

        fn has_session(&self, handle: &str) -> bool {
            self.sessions.borrow().contains(handle)
        }

        fn attach(&self, handle: &str) -> Result<()> {
            self.attached.borrow_mut().push(handle.to_string());
            Ok(())
        }

        fn sessions(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .sessions
                .borrow()
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        }

        fn kill(&self, handle: &str) -> RemovalOutcome {
            if self.sessions.borrow_mut().remove(handle) {
                RemovalOutcome::Removed
            } else {
                RemovalOutcome::AlreadyAbsent
            }
        }
    }

    /// In-memory container registry.
    #[derive(Debug, Default)]
    pub struct FakeRuntime {
        pub running: RefCell<BTreeSet<String>>,
    }

    impl FakeRuntime {
        pub fn with_running(names: &[&str]) -> Self {
            Self {
                running: RefCell::new(names.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl SandboxRuntime for FakeRuntime {
        fn is_running(&self, name: &str) -> Result<bool> {
            Ok(self.running.borrow().contains(name))
        }

        fn exists(&self, name: &str) -> Result<bool> {
            self.is_running(name)
        }

        fn stop(&self, name: &str) -> RemovalOutcome {
            if self.running.borrow_mut().remove(name) {
                RemovalOutcome::Removed
            } else {
                RemovalOutcome::AlreadyAbsent
            }
        }

        fn remove(&self, name: &str) -> RemovalOutcome {
            self.stop(name)
        }
    }
}
