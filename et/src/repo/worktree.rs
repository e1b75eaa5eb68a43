//! Worktree handle
//!
//! A worktree never owns state of its own beyond its destination path
//! and the branch it was last assigned; everything else delegates to the
//! owning repository's shared caches.

use std::path::{Path, PathBuf};

use super::builder::CommandBuilder;
use super::repository::Repository;
use super::RepoError;

/// A secondary working directory attached to a repository's object
/// store, identified by its destination path.
#[derive(Debug, Clone)]
pub struct Worktree {
    repo: Repository,
    dest: PathBuf,
    target_branch: String,
}

impl Worktree {
    pub(crate) fn new(repo: Repository, dest: PathBuf, target_branch: String) -> Self {
        Self {
            repo,
            dest,
            target_branch,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Short display name: the destination's final path segment.
    pub fn name(&self) -> String {
        self.dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dest.to_string_lossy().into_owned())
    }

    /// Branch the worktree is pinned to until it exists on disk.
    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    /// Added means present in the owning repository's worktree cache --
    /// membership there is the only source of truth.
    pub async fn is_added(&self) -> Result<bool, RepoError> {
        self.repo.is_worktree_added(&self.dest).await
    }

    /// Presence on disk, independent of the cache.
    pub fn is_present(&self) -> bool {
        self.dest.exists()
    }

    /// Current branch once the worktree exists, the assigned target
    /// branch otherwise.
    pub async fn branch(&self) -> Result<String, RepoError> {
        match self.repo.worktree_branch(&self.dest).await? {
            Some(branch) => Ok(branch),
            None => Ok(self.target_branch.clone()),
        }
    }

    /// No staged or unstaged diff and no untracked files in this
    /// worktree's directory.
    pub async fn is_clean(&self) -> Result<bool, RepoError> {
        self.require_added().await?;
        self.repo.is_clean_at(&self.dest).await
    }

    /// Command builder scoped to this worktree. Mutating operations
    /// require the worktree to be added.
    pub async fn builder(&self) -> Result<CommandBuilder, RepoError> {
        self.require_added().await?;
        Ok(CommandBuilder::for_worktree(self.repo.clone(), self.dest.clone()))
    }

    async fn require_added(&self) -> Result<(), RepoError> {
        if self.is_added().await? {
            Ok(())
        } else {
            Err(RepoError::WorktreeNotAdded(self.name()))
        }
    }
}
