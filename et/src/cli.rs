//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// envtree - multi-repository environment and worktree automation
#[derive(Parser)]
#[command(
    name = "et",
    about = "Multi-repository environment and worktree workflow automation for git",
    version,
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Abort conflicted merges immediately instead of prompting
    #[arg(long, global = true)]
    pub batch: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show an environment's workflow state
    Status {
        /// Environment as <project>/<environment>
        env: String,
    },

    /// Clone missing repositories and install hooks
    Clone {
        /// Environment as <project>/<environment>
        env: String,
    },

    /// Bring environment branches and feature branches up to date
    Sync {
        /// Environment as <project>/<environment>
        env: String,
    },

    /// Add missing worktrees at their environment branches
    Setup {
        /// Environment as <project>/<environment>
        env: String,
    },

    /// Remove worktrees, internal branches and the environment directory
    Remove {
        /// Environment as <project>/<environment>
        env: String,
    },

    /// Feature-branch operations across an environment's worktrees
    Feature {
        /// Environment as <project>/<environment>
        env: String,

        #[command(subcommand)]
        command: FeatureCommand,
    },
}

/// Feature-branch subcommands
#[derive(Debug, Subcommand)]
pub enum FeatureCommand {
    /// Fetch and check out the feature branch in every worktree
    Checkout {
        /// Feature branch name
        name: String,

        /// Feature branch provider to resolve the name with
        #[arg(short, long, default_value = "manual")]
        provider: String,
    },

    /// Merge each repository's environment branch into the feature branch
    Merge {
        /// Feature branch name
        name: String,
    },

    /// Pull every worktree whose branch can be brought up to date
    Pull {
        /// Feature branch name
        name: String,
    },

    /// Revert tracked changes and remove untracked files in every worktree
    Clean {
        /// Feature branch name
        name: String,
    },

    /// Remove the feature branch from every repository
    RemoveBranch {
        /// Feature branch name
        name: String,
    },
}
