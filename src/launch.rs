//! Sandbox launch command construction.
//!
//! Building the `docker run` invocation is a pure function of the session's
//! workspace, the configured limits, and the invoking user's identity. The
//! prompt is never embedded literally: the rendered command reads it from
//! the prompt file at invocation time, so multi-line prompts survive the
//! trip through the multiplexer's shell.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::workspace::{CREDENTIALS_DIR, PROMPT_FILE};

/// Mount point of the workspace inside the sandbox.
pub const SANDBOX_WORKDIR: &str = "/workspace";

/// Read-only mount point of the credential bundle inside the sandbox.
pub const SANDBOX_CREDENTIALS: &str = "/credentials";

/// CPU and memory limits applied to each sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Fractional CPUs (`docker run --cpus`).
    pub cpus: f64,
    /// Memory limit (`docker run --memory`), e.g. "4g".
    pub memory: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpus: 2.0,
            memory: "4g".to_string(),
        }
    }
}

/// Host identity of the invoking user, exported into the sandbox so the
/// entrypoint can remap its internal user and avoid bind-mount ownership
/// mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
}

/// Reads the owning uid/gid of `workspace`.
///
/// The workspace was created by the invoking user, so its owner is the
/// identity the sandbox must remap to.
#[cfg(unix)]
pub fn host_identity(workspace: &Path) -> Result<HostIdentity> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(workspace)?;
    Ok(HostIdentity {
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

/// Reads the owning uid/gid of `workspace`.
///
/// Unix owner metadata does not exist on this platform; the sandbox's user
/// remapping contract cannot be honored here.
#[cfg(not(unix))]
pub fn host_identity(_workspace: &Path) -> Result<HostIdentity> {
    Err(Error::SandboxLaunch(
        "host identity remapping requires a unix host".to_string(),
    ))
}

/// A fully-constructed sandbox launch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchCommand {
    /// Program to invoke (`docker`).
    pub program: String,
    /// Arguments up to and including the image and any fixed agent args.
    pub args: Vec<String>,
    /// Flag through which the prompt is delivered.
    pub prompt_flag: String,
    /// File the prompt is read from at invocation time.
    pub prompt_file: PathBuf,
}

impl LaunchCommand {
    /// Renders the command as a single shell line for the multiplexer.
    ///
    /// Everything except the prompt substitution is shell-quoted; the
    /// prompt is spliced in as `"$(cat <file>)"` so the shell reads the
    /// file when the sandbox actually starts.
    pub fn shell_string(&self) -> Result<String> {
        let mut words: Vec<&str> = Vec::with_capacity(self.args.len() + 1);
        words.push(&self.program);
        words.extend(self.args.iter().map(String::as_str));
        let quoted = shlex::try_join(words)
            .map_err(|e| Error::SandboxLaunch(format!("cannot quote launch command: {e}")))?;

        let prompt_path = self.prompt_file.to_string_lossy();
        let quoted_path = shlex::try_quote(&prompt_path)
            .map_err(|e| Error::SandboxLaunch(format!("cannot quote prompt path: {e}")))?;

        Ok(format!(
            "{quoted} {} \"$(cat {quoted_path})\"",
            self.prompt_flag
        ))
    }
}

/// Builds the launch command for a session. Pure: no filesystem access, no
/// retries; a bad image or missing daemon surfaces verbatim at start time.
pub fn build_launch_command(
    handle: &str,
    workspace: &Path,
    image: &str,
    limits: &ResourceLimits,
    host: HostIdentity,
) -> LaunchCommand {
    let workspace_str = workspace.to_string_lossy();
    let credentials = workspace.join(CREDENTIALS_DIR);

    let args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        handle.to_string(),
        "--cpus".to_string(),
        format!("{}", limits.cpus),
        "--memory".to_string(),
        limits.memory.clone(),
        "-v".to_string(),
        format!("{workspace_str}:{SANDBOX_WORKDIR}"),
        "-v".to_string(),
        format!("{}:{SANDBOX_CREDENTIALS}:ro", credentials.display()),
        "-e".to_string(),
        format!("HOST_UID={}", host.uid),
        "-e".to_string(),
        format!("HOST_GID={}", host.gid),
        "-w".to_string(),
        SANDBOX_WORKDIR.to_string(),
        image.to_string(),
    ];

    LaunchCommand {
        program: "docker".to_string(),
        args,
        prompt_flag: "--prompt".to_string(),
        prompt_file: workspace.join(PROMPT_FILE),
    }
}
