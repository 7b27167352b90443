//! Session identity: name allocation and derived resource names.
//!
//! A session's `full_name` ties together the three resources that must be
//! created and destroyed as a unit: the workspace directory, the git branch,
//! and the supervisor handle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix for supervisor (tmux session / container) handles.
pub const HANDLE_PREFIX: &str = "substrate-";

/// Prefix for per-session git branches.
pub const BRANCH_PREFIX: &str = "substrate/";

/// Length of the random session id suffix.
const ID_LEN: usize = 6;

/// Maximum accepted task name length.
const MAX_TASK_NAME_LEN: usize = 48;

/// Allocates a short random session id.
///
/// Collision-tolerant rather than collision-free: the namespace is one
/// host's ephemeral set of concurrent sessions.
pub fn allocate_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..ID_LEN].to_string()
}

/// Validates an operator-supplied task name.
///
/// The name is embedded into a git branch, a directory name, a tmux session
/// name, and a docker container name; only characters every one of those
/// accepts are allowed.
pub fn validate_task_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("task name cannot be empty".to_string()));
    }
    if name.len() > MAX_TASK_NAME_LEN {
        return Err(Error::Validation(format!(
            "task name '{name}' exceeds {MAX_TASK_NAME_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('-');
    if !first.is_ascii_alphanumeric() {
        return Err(Error::Validation(format!(
            "task name '{name}' must start with a letter or digit"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
    {
        return Err(Error::Validation(format!(
            "task name '{name}' contains unsupported character '{bad}' \
             (allowed: letters, digits, '-', '_')"
        )));
    }
    Ok(())
}

/// Validates a session full name (`<task>-<id>`) before it is used to
/// address resources.
///
/// `clean` and `teardown` take names straight from the CLI and end in a
/// forced directory delete; anything that is not a single well-formed path
/// component must be rejected before a workspace path is built from it.
pub fn validate_full_name(name: &str) -> Result<()> {
    let (task, id) = name.rsplit_once('-').ok_or_else(|| {
        Error::Validation(format!("'{name}' is not a session name (expected <task>-<id>)"))
    })?;
    if id.len() != ID_LEN || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!(
            "'{name}' is not a session name (expected <task>-<id>)"
        )));
    }
    validate_task_name(task)
}

/// The unit of work: one agent run in one isolated workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Operator-supplied label.
    pub task_name: String,
    /// Random suffix allocated at creation.
    pub id: String,
    /// Path to the originating repository, as given by the operator.
    pub source_repo: PathBuf,
    /// Task text handed to the agent.
    pub prompt: String,
}

impl Session {
    /// Creates a session with a freshly allocated id.
    ///
    /// Fails with [`Error::Validation`] on an unusable task name or an empty
    /// prompt; performs no side effects.
    pub fn new(
        task_name: impl Into<String>,
        source_repo: impl Into<PathBuf>,
        prompt: impl Into<String>,
    ) -> Result<Self> {
        let task_name = task_name.into();
        validate_task_name(&task_name)?;
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::Validation("prompt cannot be empty".to_string()));
        }
        Ok(Self {
            task_name,
            id: allocate_id(),
            source_repo: source_repo.into(),
            prompt,
        })
    }

    /// `<task-name>-<id>`, the unique name for this session's resources.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.task_name, self.id)
    }

    /// Supervisor / container handle for this session.
    pub fn handle(&self) -> String {
        handle_for(&self.full_name())
    }

    /// Git branch backing this session's workspace.
    pub fn branch(&self) -> String {
        branch_for(&self.full_name())
    }
}

/// Supervisor handle for a session full name.
pub fn handle_for(full_name: &str) -> String {
    format!("{HANDLE_PREFIX}{full_name}")
}

/// Branch name for a session full name.
pub fn branch_for(full_name: &str) -> String {
    format!("{BRANCH_PREFIX}{full_name}")
}
