//! Command-line surface.
//!
//! Thin plumbing over the lifecycle components: parse, validate, dispatch,
//! print status lines. All real state lives behind the provisioner,
//! supervisor, and reconciler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::CliGit;
use crate::launch::{build_launch_command, host_identity};
use crate::reconciler::Reconciler;
use crate::runtime::DockerRuntime;
use crate::session::Session;
use crate::supervisor::{Supervisor, TmuxMultiplexer};
use crate::workspace::{CleanStatus, Provisioner};

/// Local orchestrator for sandboxed coding-agent sessions.
#[derive(Debug, Parser)]
#[command(name = "substrate", version, about)]
pub struct Cli {
    /// Path to a config file (default: ~/.config/substrate/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new agent session in an isolated workspace and sandbox.
    Run {
        /// Source repository to branch from.
        #[arg(long)]
        repo: PathBuf,

        /// Task name; becomes part of the session name.
        #[arg(long)]
        name: String,

        /// Task prompt handed to the agent.
        #[arg(long)]
        prompt: String,

        /// Attach the terminal immediately after starting.
        #[arg(long)]
        attach: bool,
    },

    /// Attach the terminal to a session (detach leaves it running).
    Attach {
        /// Session name, e.g. fix-a1b2c3.
        name: String,
    },

    /// List sessions with live execution contexts.
    List,

    /// Stop a session's sandbox and destroy its execution context.
    Stop {
        /// Session name.
        name: String,
    },

    /// Remove a session's workspace, branch, and execution context.
    Clean {
        /// Session name (omit with --all).
        name: Option<String>,

        /// Clean every workspace under the workspace root.
        #[arg(long)]
        all: bool,

        /// Stop still-running sandboxes instead of refusing.
        #[arg(long)]
        force: bool,
    },
}

/// Runs one CLI invocation; returns the process exit code.
pub fn execute(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    let git = CliGit::new();
    let provisioner = Provisioner::new(
        &git,
        config.workspace_root.clone(),
        config.credential_paths.clone(),
    );
    let supervisor = Supervisor::new(TmuxMultiplexer::new(), DockerRuntime::new());

    match cli.command {
        Command::Run {
            repo,
            name,
            prompt,
            attach,
        } => {
            let session = Session::new(name, repo, prompt)?;
            let workspace = provisioner.provision(&session)?;
            let host = host_identity(&workspace)?;
            let launch = build_launch_command(
                &session.handle(),
                &workspace,
                &config.image,
                &config.limits,
                host,
            );
            supervisor.start(&session.full_name(), &launch)?;

            println!("started session {}", session.full_name());
            println!("  workspace: {}", workspace.display());
            println!("  branch:    {}", session.branch());
            if attach {
                supervisor.attach(&session.full_name())?;
            } else {
                println!("attach with: substrate attach {}", session.full_name());
            }
            Ok(0)
        }

        Command::Attach { name } => {
            supervisor.attach(&name)?;
            Ok(0)
        }

        Command::List => {
            for name in supervisor.list()? {
                println!("{name}");
            }
            Ok(0)
        }

        Command::Stop { name } => {
            let report = supervisor.stop(&name)?;
            println!(
                "{name}: sandbox {}, context {}",
                if report.sandbox_stopped {
                    "stopped"
                } else {
                    "already exited"
                },
                if report.context_killed {
                    "removed"
                } else {
                    "already gone"
                }
            );
            Ok(0)
        }

        Command::Clean { name, all, force } => {
            let reconciler = Reconciler::new(&provisioner, &supervisor);
            match (name, all) {
                (Some(_), true) => Err(Error::Validation(
                    "pass either a session name or --all, not both".to_string(),
                )),
                (None, false) => Err(Error::Validation(
                    "clean requires a session name or --all".to_string(),
                )),
                (Some(name), false) => {
                    let report = reconciler.clean(&name, force)?;
                    for warning in report.teardown.warnings() {
                        println!("  {warning}");
                    }
                    println!("{name}: {}", report.status());
                    Ok(exit_code_for(report.status()))
                }
                (None, true) => {
                    let mut code = 0;
                    for (target, result) in reconciler.clean_all(force)? {
                        match result {
                            Ok(report) => {
                                println!("{target}: {}", report.status());
                                code = code.max(exit_code_for(report.status()));
                            }
                            Err(e) => {
                                eprintln!("{target}: failed ({e})");
                                code = 1;
                            }
                        }
                    }
                    Ok(code)
                }
            }
        }
    }
}

fn exit_code_for(status: CleanStatus) -> i32 {
    match status {
        CleanStatus::Removed | CleanStatus::AlreadyAbsent => 0,
        CleanStatus::Failed => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_all_flags() {
        let cli = Cli::parse_from([
            "substrate", "run", "--repo", "/src/repo", "--name", "fix", "--prompt", "do X",
            "--attach",
        ]);
        match cli.command {
            Command::Run {
                repo,
                name,
                prompt,
                attach,
            } => {
                assert_eq!(repo, PathBuf::from("/src/repo"));
                assert_eq!(name, "fix");
                assert_eq!(prompt, "do X");
                assert!(attach);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn clean_parses_all_and_force() {
        let cli = Cli::parse_from(["substrate", "clean", "--all", "--force"]);
        match cli.command {
            Command::Clean { name, all, force } => {
                assert!(name.is_none());
                assert!(all);
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_is_accepted_after_subcommand() {
        let cli = Cli::parse_from(["substrate", "list", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
