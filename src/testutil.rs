//! Shared helpers for unit tests.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Creates a temp git repo with an initial commit.
pub(crate) fn create_temp_git_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Command::new("git")
        .args(["init"])
        .current_dir(temp_dir.path())
        .output()
        .expect("failed to init git repo");

    Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(temp_dir.path())
        .output()
        .expect("failed to config git email");

    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(temp_dir.path())
        .output()
        .expect("failed to config git name");

    std::fs::write(temp_dir.path().join("README.md"), "# Test Repo\n")
        .expect("failed to write README");

    Command::new("git")
        .args(["add", "."])
        .current_dir(temp_dir.path())
        .output()
        .expect("failed to add files");

    Command::new("git")
        .args(["commit", "-m", "Initial commit"])
        .current_dir(temp_dir.path())
        .output()
        .expect("failed to create initial commit");

    temp_dir
}

/// Whether `branch` exists in `repo`.
pub(crate) fn branch_exists(repo: &Path, branch: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", &format!("refs/heads/{branch}")])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
