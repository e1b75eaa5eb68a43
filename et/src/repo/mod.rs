//! Git repository/worktree model
//!
//! Caches remote/local branch and worktree state per repository and
//! emits the git subprocess invocations needed to mutate that state.
//! Caches are mutated only from command success hooks and read from the
//! query methods; running mutating commands for different repositories
//! concurrently is safe, running two against the same repository is the
//! caller's mistake.

pub mod builder;
pub mod cache;
pub mod hooks;
pub mod repository;
pub mod worktree;

pub use builder::{CommandBuilder, is_merge_conflict};
pub use cache::{Cache, CacheCell};
pub use hooks::build_install_hooks_command;
pub use repository::Repository;
pub use worktree::Worktree;

use std::path::PathBuf;

/// Errors raised when git state cannot satisfy a request.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("repository '{0}' is not cloned")]
    NotCloned(String),

    #[error("worktree '{0}' is not added")]
    WorktreeNotAdded(String),

    #[error("git exited with status {status}: {stderr}")]
    GitFailed { status: i32, stderr: String },

    #[error("merge conflict in '{0}'")]
    MergeConflict(String),

    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),

    #[error("environment branch for repository '{0}' is not configured")]
    BranchNotConfigured(String),

    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

/// Where to find the git binary. Supplied by configuration.
#[derive(Debug, Clone)]
pub struct GitContext {
    binary: PathBuf,
}

impl GitContext {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }
}

impl Default for GitContext {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}
