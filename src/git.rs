//! Version-control interface: branch-backed worktrees via the git CLI.
//!
//! Everything the orchestrator needs from git is expressed on the
//! [`GitWorktrees`] trait so teardown logic can be tested against a fake
//! repository registry. [`CliGit`] is the real implementation and shells out
//! to `git`, always running repo-scoped commands from the parent repository.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::shell::{run, RemovalOutcome};

/// Narrow interface over the version-control system.
///
/// All removal-style operations are idempotent from the caller's
/// perspective: repeating them against an already-absent target yields
/// [`RemovalOutcome::AlreadyAbsent`], not an error.
pub trait GitWorktrees {
    /// Whether `path` is inside a git repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// Creates branch `branch` at HEAD, materialized as a worktree at
    /// `workspace`. Hard error on branch collision or unwritable target.
    fn add_worktree(&self, repo: &Path, workspace: &Path, branch: &str) -> Result<()>;

    /// Forcibly removes the worktree at `workspace`, discarding uncommitted
    /// and untracked changes.
    fn remove_worktree(&self, repo: &Path, workspace: &Path) -> RemovalOutcome;

    /// Prunes stale worktree registrations on `repo`.
    fn prune_worktrees(&self, repo: &Path) -> RemovalOutcome;

    /// Forcibly deletes branch `branch` from `repo`.
    fn delete_branch(&self, repo: &Path, branch: &str) -> RemovalOutcome;

    /// Resolves the superproject working tree containing `workspace`, if any.
    fn superproject_of(&self, workspace: &Path) -> Option<PathBuf>;

    /// Resolves the shared object-storage (`--git-common-dir`) of
    /// `workspace`, if it is inside a repository.
    fn common_dir_of(&self, workspace: &Path) -> Option<PathBuf>;
}

/// [`GitWorktrees`] implementation shelling out to the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct CliGit;

impl CliGit {
    pub fn new() -> Self {
        Self
    }
}

impl GitWorktrees for CliGit {
    fn is_repository(&self, path: &Path) -> bool {
        run("git", &["rev-parse", "--git-dir"], Some(path))
            .map(|out| out.success)
            .unwrap_or(false)
    }

    fn add_worktree(&self, repo: &Path, workspace: &Path, branch: &str) -> Result<()> {
        let workspace_str = workspace.to_string_lossy();
        let out = run(
            "git",
            &["worktree", "add", "-b", branch, &workspace_str, "HEAD"],
            Some(repo),
        )?;
        if !out.success {
            return Err(Error::WorktreeCreation {
                branch: branch.to_string(),
                reason: out.stderr_trimmed().to_string(),
            });
        }
        Ok(())
    }

    fn remove_worktree(&self, repo: &Path, workspace: &Path) -> RemovalOutcome {
        let workspace_str = workspace.to_string_lossy();
        match run(
            "git",
            &["worktree", "remove", "--force", &workspace_str],
            Some(repo),
        ) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => {
                let stderr = out.stderr_trimmed();
                if stderr.contains("is not a working tree")
                    || stderr.contains("No such file or directory")
                {
                    RemovalOutcome::AlreadyAbsent
                } else {
                    RemovalOutcome::Failed(stderr.to_string())
                }
            }
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }

    fn prune_worktrees(&self, repo: &Path) -> RemovalOutcome {
        match run("git", &["worktree", "prune"], Some(repo)) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => RemovalOutcome::Failed(out.stderr_trimmed().to_string()),
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }

    fn delete_branch(&self, repo: &Path, branch: &str) -> RemovalOutcome {
        match run("git", &["branch", "-D", branch], Some(repo)) {
            Ok(out) if out.success => RemovalOutcome::Removed,
            Ok(out) => {
                let stderr = out.stderr_trimmed();
                if stderr.contains("not found") {
                    RemovalOutcome::AlreadyAbsent
                } else {
                    RemovalOutcome::Failed(stderr.to_string())
                }
            }
            Err(e) => RemovalOutcome::Failed(e.to_string()),
        }
    }

    fn superproject_of(&self, workspace: &Path) -> Option<PathBuf> {
        let out = run(
            "git",
            &["rev-parse", "--show-superproject-working-tree"],
            Some(workspace),
        )
        .ok()?;
        let path = out.stdout_trimmed();
        if out.success && !path.is_empty() {
            Some(PathBuf::from(path))
        } else {
            None
        }
    }

    fn common_dir_of(&self, workspace: &Path) -> Option<PathBuf> {
        let out = run("git", &["rev-parse", "--git-common-dir"], Some(workspace)).ok()?;
        let raw = out.stdout_trimmed();
        if !out.success || raw.is_empty() {
            return None;
        }
        // --git-common-dir may be relative to the queried directory
        let common = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            workspace.join(raw)
        };
        Some(common)
    }
}
