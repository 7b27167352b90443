//! Workspace provisioning and teardown.
//!
//! A workspace is a branch-backed git worktree, one per session, holding the
//! task prompt and a staged credential bundle. Teardown is an ordered
//! best-effort sequence: every sub-step that finds its target already gone
//! produces a warning, never a failure, so `clean` stays idempotent.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::git::GitWorktrees;
use crate::session::{branch_for, validate_full_name, Session};
use crate::shell::RemovalOutcome;

/// Session metadata directory inside a workspace.
pub const SESSION_DIR: &str = ".substrate";

/// Prompt file, relative to the workspace root.
pub const PROMPT_FILE: &str = ".substrate/PROMPT.md";

/// Session metadata file, relative to the workspace root.
pub const SESSION_FILE: &str = ".substrate/session.json";

/// Credential staging directory, relative to the workspace root.
pub const CREDENTIALS_DIR: &str = ".substrate/credentials";

/// Creates and destroys session workspaces.
pub struct Provisioner<'a, G: GitWorktrees> {
    git: &'a G,
    workspace_root: PathBuf,
    credential_paths: Vec<PathBuf>,
}

impl<'a, G: GitWorktrees> Provisioner<'a, G> {
    pub fn new(git: &'a G, workspace_root: PathBuf, credential_paths: Vec<PathBuf>) -> Self {
        Self {
            git,
            workspace_root,
            credential_paths,
        }
    }

    /// Workspace directory for a session full name.
    pub fn workspace_path(&self, full_name: &str) -> PathBuf {
        self.workspace_root.join(full_name)
    }

    /// Base directory holding all session workspaces.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Provisions an isolated workspace for `session`.
    ///
    /// Creates branch `substrate/<full_name>` forked from the repository's
    /// current HEAD as an independent worktree, writes the prompt file, and
    /// stages the credential bundle with read access loosened for the
    /// sandbox's remapped UID. No rollback on failure: partially created
    /// resources are left for `clean`.
    pub fn provision(&self, session: &Session) -> Result<PathBuf> {
        let source = &session.source_repo;
        if !source.exists() || !self.git.is_repository(source) {
            return Err(Error::NotARepository(source.clone()));
        }
        let source = source.canonicalize()?;

        fs::create_dir_all(&self.workspace_root).map_err(|e| Error::WorktreeCreation {
            branch: session.branch(),
            reason: format!(
                "cannot create workspace root {}: {e}",
                self.workspace_root.display()
            ),
        })?;

        let workspace = self.workspace_path(&session.full_name());
        self.git.add_worktree(&source, &workspace, &session.branch())?;

        // Prompt goes through a file so multi-line or special-character
        // prompts never pass through shell argument quoting.
        fs::create_dir_all(workspace.join(SESSION_DIR))?;
        fs::write(workspace.join(PROMPT_FILE), &session.prompt)?;

        // Session metadata for later inspection.
        let metadata = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Config(format!("failed to serialize session metadata: {e}")))?;
        fs::write(workspace.join(SESSION_FILE), metadata)?;

        self.stage_credentials(&workspace)?;

        tracing::info!(
            session = %session.full_name(),
            workspace = %workspace.display(),
            branch = %session.branch(),
            source = %source.display(),
            "provisioned workspace"
        );

        Ok(workspace)
    }

    /// Copies the credential bundle into the workspace staging directory.
    ///
    /// Files are made world-readable so the sandbox's UID-remapped user can
    /// read them across the bind mount. Missing sources are warned about and
    /// skipped; an agent without credentials can still be attached to.
    fn stage_credentials(&self, workspace: &Path) -> Result<()> {
        let staging = workspace.join(CREDENTIALS_DIR);
        fs::create_dir_all(&staging)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, fs::Permissions::from_mode(0o755))?;
        }

        for source in &self.credential_paths {
            if !source.is_file() {
                tracing::warn!(
                    path = %source.display(),
                    "credential source missing, skipping"
                );
                continue;
            }
            let file_name = match source.file_name() {
                Some(name) => name,
                None => continue,
            };
            let dest = staging.join(file_name);
            fs::copy(source, &dest)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&dest, fs::Permissions::from_mode(0o644))?;
            }
        }

        Ok(())
    }

    /// Tears down a session's workspace and branch, best-effort.
    ///
    /// Works from the workspace path alone: the originating repository is
    /// rediscovered by walking the worktree's version-control linkage. Every
    /// step records its outcome in the returned report; nothing here returns
    /// an error.
    pub fn teardown(&self, full_name: &str) -> TeardownReport {
        let workspace = self.workspace_path(full_name);
        let branch = branch_for(full_name);
        let mut report = TeardownReport::new(full_name, &workspace);

        // The name becomes a path component and that path is force-deleted;
        // a malformed name must never address anything outside the root.
        if let Err(e) = validate_full_name(full_name) {
            report.record(
                TeardownStep::ResolveSourceRepo,
                StepOutcome::Failed(e.to_string()),
            );
            return report;
        }

        let workspace_existed = workspace.exists();

        // (a) Rediscover the originating repository.
        let source_repo = if workspace_existed {
            match self.resolve_source_repo(&workspace) {
                Some(repo) => {
                    report.record(TeardownStep::ResolveSourceRepo, StepOutcome::Done);
                    Some(repo)
                }
                None => {
                    report.record(
                        TeardownStep::ResolveSourceRepo,
                        StepOutcome::Failed(
                            "could not determine source repository from workspace".to_string(),
                        ),
                    );
                    None
                }
            }
        } else {
            report.record(TeardownStep::ResolveSourceRepo, StepOutcome::AlreadyAbsent);
            None
        };

        // (b) Ask git to remove the worktree, discarding local changes.
        match &source_repo {
            Some(repo) => {
                let outcome = self.git.remove_worktree(repo, &workspace);
                report.record(TeardownStep::RemoveWorktree, StepOutcome::from(outcome));
            }
            None => report.record(
                TeardownStep::RemoveWorktree,
                StepOutcome::Skipped("source repository unknown".to_string()),
            ),
        }

        // (c) Force-delete whatever is still on disk.
        if workspace.exists() {
            match fs::remove_dir_all(&workspace) {
                Ok(()) => report.record(TeardownStep::DeleteDirectory, StepOutcome::Done),
                Err(e) => report.record(
                    TeardownStep::DeleteDirectory,
                    StepOutcome::Failed(e.to_string()),
                ),
            }
        } else {
            report.record(TeardownStep::DeleteDirectory, StepOutcome::AlreadyAbsent);
        }

        // (d) + (e) Prune stale registrations and delete the branch. Both
        // need the source repo; without it there is nowhere to delete from.
        match &source_repo {
            Some(repo) => {
                let outcome = self.git.prune_worktrees(repo);
                report.record(TeardownStep::PruneRegistry, StepOutcome::from(outcome));

                let outcome = self.git.delete_branch(repo, &branch);
                report.record(TeardownStep::DeleteBranch, StepOutcome::from(outcome));
            }
            None => {
                report.record(
                    TeardownStep::PruneRegistry,
                    StepOutcome::Skipped("source repository unknown".to_string()),
                );
                report.record(
                    TeardownStep::DeleteBranch,
                    StepOutcome::Skipped("source repository unknown".to_string()),
                );
            }
        }

        report
    }

    fn resolve_source_repo(&self, workspace: &Path) -> Option<PathBuf> {
        if let Some(superproject) = self.git.superproject_of(workspace) {
            return Some(superproject);
        }
        // Fall back to the shared object-storage directory; its parent is
        // the main working tree.
        let common = self.git.common_dir_of(workspace)?;
        let common = common.canonicalize().ok()?;
        common.parent().map(Path::to_path_buf)
    }
}

/// One named teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownStep {
    ResolveSourceRepo,
    RemoveWorktree,
    DeleteDirectory,
    PruneRegistry,
    DeleteBranch,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::ResolveSourceRepo => "resolve-source-repo",
            TeardownStep::RemoveWorktree => "remove-worktree",
            TeardownStep::DeleteDirectory => "delete-directory",
            TeardownStep::PruneRegistry => "prune-registry",
            TeardownStep::DeleteBranch => "delete-branch",
        };
        f.write_str(name)
    }
}

/// Outcome of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    /// The step ran and changed something.
    Done,
    /// The step's target was already gone.
    AlreadyAbsent,
    /// The step was not attempted; the message names why.
    Skipped(String),
    /// The step ran and failed; the message names the reason.
    Failed(String),
}

impl From<RemovalOutcome> for StepOutcome {
    fn from(outcome: RemovalOutcome) -> Self {
        match outcome {
            RemovalOutcome::Removed => StepOutcome::Done,
            RemovalOutcome::AlreadyAbsent => StepOutcome::AlreadyAbsent,
            RemovalOutcome::Failed(reason) => StepOutcome::Failed(reason),
        }
    }
}

/// Record of one step within a teardown.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: TeardownStep,
    pub outcome: StepOutcome,
}

/// Terminal status of a teardown, for the per-target summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanStatus {
    /// At least one resource was removed and nothing load-bearing failed.
    Removed,
    /// Everything was already gone.
    AlreadyAbsent,
    /// Something that matters for final state failed (unresolvable source
    /// repo, undeletable directory or branch).
    Failed,
}

impl fmt::Display for CleanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanStatus::Removed => "removed",
            CleanStatus::AlreadyAbsent => "already absent",
            CleanStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Aggregated outcome of one session's teardown.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub full_name: String,
    pub workspace: PathBuf,
    pub steps: Vec<StepReport>,
}

impl TeardownReport {
    fn new(full_name: &str, workspace: &Path) -> Self {
        Self {
            full_name: full_name.to_string(),
            workspace: workspace.to_path_buf(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: TeardownStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Failed(reason) => {
                tracing::warn!(target_session = %self.full_name, %step, %reason, "teardown step failed");
            }
            StepOutcome::AlreadyAbsent => {
                tracing::warn!(target_session = %self.full_name, %step, "teardown target already absent");
            }
            StepOutcome::Skipped(reason) => {
                tracing::warn!(target_session = %self.full_name, %step, %reason, "teardown step skipped");
            }
            StepOutcome::Done => {
                tracing::info!(target_session = %self.full_name, %step, "teardown step complete");
            }
        }
        self.steps.push(StepReport { step, outcome });
    }

    fn outcome_of(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    /// Terminal summary for this target.
    ///
    /// A worktree-remove refusal that the directory fallback recovered from
    /// stays a warning; what decides failure is the final state (directory
    /// or branch left behind, or a stranded branch because the source repo
    /// could not be found).
    pub fn status(&self) -> CleanStatus {
        let load_bearing = [
            TeardownStep::ResolveSourceRepo,
            TeardownStep::DeleteDirectory,
            TeardownStep::DeleteBranch,
        ];
        if load_bearing
            .iter()
            .any(|step| matches!(self.outcome_of(*step), Some(StepOutcome::Failed(_))))
        {
            return CleanStatus::Failed;
        }

        let removing_steps = [
            TeardownStep::RemoveWorktree,
            TeardownStep::DeleteDirectory,
            TeardownStep::DeleteBranch,
        ];
        if removing_steps
            .iter()
            .any(|step| matches!(self.outcome_of(*step), Some(StepOutcome::Done)))
        {
            CleanStatus::Removed
        } else {
            CleanStatus::AlreadyAbsent
        }
    }

    /// Human-readable notes for every non-`Done` step.
    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Done => None,
                StepOutcome::AlreadyAbsent => Some(format!("{}: already absent", s.step)),
                StepOutcome::Skipped(reason) => Some(format!("{}: skipped ({reason})", s.step)),
                StepOutcome::Failed(reason) => Some(format!("{}: failed ({reason})", s.step)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CliGit;
    use crate::testutil::{branch_exists, create_temp_git_repo};
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn provision_creates_workspace_branch_and_prompt() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        let workspace = provisioner.provision(&session).expect("provision failed");

        assert_eq!(workspace, root.path().join(session.full_name()));
        assert!(workspace.join("README.md").exists());
        assert_eq!(
            fs::read_to_string(workspace.join(PROMPT_FILE)).unwrap(),
            "do X"
        );
        assert!(branch_exists(repo.path(), &session.branch()));

        let metadata: Session =
            serde_json::from_str(&fs::read_to_string(workspace.join(SESSION_FILE)).unwrap())
                .unwrap();
        assert_eq!(metadata.full_name(), session.full_name());
    }

    #[test]
    fn provision_rejects_non_repository() {
        let not_a_repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", not_a_repo.path(), "do X").unwrap();
        let err = provisioner.provision(&session).unwrap_err();
        assert!(matches!(err, Error::NotARepository(_)));
    }

    #[test]
    fn provision_propagates_branch_collision() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();

        // Occupy the branch name ahead of provisioning.
        Command::new("git")
            .args(["branch", &session.branch()])
            .current_dir(repo.path())
            .output()
            .expect("failed to create branch");

        let err = provisioner.provision(&session).unwrap_err();
        assert!(matches!(err, Error::WorktreeCreation { .. }));
    }

    #[test]
    fn provision_stages_credentials_with_loosened_permissions() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let cred_dir = TempDir::new().unwrap();
        let cred_file = cred_dir.path().join("credentials.json");
        fs::write(&cred_file, "{\"token\":\"t\"}").unwrap();

        let git = CliGit::new();
        let provisioner =
            Provisioner::new(&git, root.path().to_path_buf(), vec![cred_file.clone()]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        let workspace = provisioner.provision(&session).unwrap();

        let staged = workspace.join(CREDENTIALS_DIR).join("credentials.json");
        assert!(staged.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&staged).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[test]
    fn provision_skips_missing_credential_sources() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(
            &git,
            root.path().to_path_buf(),
            vec![PathBuf::from("/nonexistent/credentials.json")],
        );

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        assert!(provisioner.provision(&session).is_ok());
    }

    #[test]
    fn teardown_removes_workspace_and_branch() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        let workspace = provisioner.provision(&session).unwrap();

        let report = provisioner.teardown(&session.full_name());

        assert_eq!(report.status(), CleanStatus::Removed);
        assert!(!workspace.exists());
        assert!(!branch_exists(repo.path(), &session.branch()));
    }

    #[test]
    fn teardown_removes_workspace_with_uncommitted_changes() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        let workspace = provisioner.provision(&session).unwrap();
        fs::write(workspace.join("scratch.txt"), "untracked").unwrap();
        fs::write(workspace.join("README.md"), "modified").unwrap();

        let report = provisioner.teardown(&session.full_name());
        assert_eq!(report.status(), CleanStatus::Removed);
        assert!(!workspace.exists());
    }

    #[test]
    fn teardown_is_idempotent() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        provisioner.provision(&session).unwrap();

        let first = provisioner.teardown(&session.full_name());
        assert_eq!(first.status(), CleanStatus::Removed);

        let second = provisioner.teardown(&session.full_name());
        assert_eq!(second.status(), CleanStatus::AlreadyAbsent);
        assert!(!second.warnings().is_empty());
    }

    #[test]
    fn teardown_of_unresolvable_workspace_reports_failure_but_deletes_dir() {
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        // A directory in the workspace root that is not a worktree: the
        // source repo cannot be discovered, so the branch is stranded.
        let orphan = root.path().join("orphan-abc123");
        fs::create_dir_all(&orphan).unwrap();
        fs::write(orphan.join("leftover.txt"), "x").unwrap();

        let report = provisioner.teardown("orphan-abc123");

        assert_eq!(report.status(), CleanStatus::Failed);
        assert!(!orphan.exists(), "directory fallback should still delete");
        assert!(report
            .warnings()
            .iter()
            .any(|w| w.contains("resolve-source-repo")));
    }

    #[test]
    fn teardown_rejects_names_that_escape_the_workspace_root() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("workspaces");
        fs::create_dir_all(&root).unwrap();
        let victim = parent.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("keep.txt"), "important").unwrap();

        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root, vec![]);

        let report = provisioner.teardown("../victim");

        assert_eq!(report.status(), CleanStatus::Failed);
        assert!(
            victim.join("keep.txt").exists(),
            "sibling of the workspace root must be untouched"
        );
    }

    #[test]
    fn teardown_after_out_of_band_workspace_removal_is_nonfatal() {
        let repo = create_temp_git_repo();
        let root = TempDir::new().unwrap();
        let git = CliGit::new();
        let provisioner = Provisioner::new(&git, root.path().to_path_buf(), vec![]);

        let session = Session::new("fix", repo.path(), "do X").unwrap();
        let workspace = provisioner.provision(&session).unwrap();

        // Delete the workspace out-of-band so only the branch remains;
        // teardown cannot resolve the repo but must stay non-fatal.
        fs::remove_dir_all(&workspace).unwrap();

        let report = provisioner.teardown(&session.full_name());
        assert_eq!(report.status(), CleanStatus::AlreadyAbsent);
    }
}
