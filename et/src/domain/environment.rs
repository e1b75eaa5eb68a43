//! Environment domain type and the branch-name derivations

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Reserved prefix of every internal bookkeeping branch. Internal
/// branches must be filterable by this prefix alone.
pub const INTERNAL_BRANCH_PREFIX: &str = "internal/";

/// One repository pinned to an environment branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Repository identity, also the worktree directory name
    pub id: String,

    /// Remote URL or server path
    pub url: String,

    /// Environment branch this repository is pinned to
    pub branch: String,
}

/// A named, project-scoped bundle of repositories, each pinned to an
/// environment branch, plus the worktrees needed to work on it (one per
/// repository, under [`Environment::directory`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name, second segment of the derived branch prefix
    pub name: String,

    /// Owning project name. Filled in after configuration load so the
    /// file format does not repeat it per environment.
    #[serde(skip)]
    pub project: String,

    /// Container directory holding one worktree per repository
    pub directory: PathBuf,

    /// Repositories with their environment branches
    #[serde(default)]
    pub repositories: Vec<RepoSpec>,

    /// Marks an environment no longer eligible for clone or worktree
    /// setup, retained only so its worktrees can be torn down.
    #[serde(default)]
    pub obsolete: bool,
}

impl Environment {
    /// Unique branch prefix derived from the owning project and this
    /// environment's name.
    pub fn branch_prefix(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }

    /// Reserved branch name used when a feature branch's checkout target
    /// coincides with the environment branch. Fast-forward-only local
    /// bookkeeping, never pushed.
    pub fn internal_branch(&self) -> String {
        format!("{}{}", INTERNAL_BRANCH_PREFIX, self.branch_prefix())
    }

    /// Glob pattern matching every feature branch of this environment.
    pub fn feature_branch_pattern(&self) -> String {
        format!("{}/*", self.branch_prefix())
    }

    /// Environment branch the given repository is pinned to.
    pub fn branch_for(&self, repo_id: &str) -> Option<&str> {
        self.repositories
            .iter()
            .find(|r| r.id == repo_id)
            .map(|r| r.branch.as_str())
    }

    /// Conventional worktree destination for the given repository.
    pub fn worktree_path(&self, repo_id: &str) -> PathBuf {
        self.directory.join(repo_id)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Qualified `project/environment` label for display and lookup.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }
}
