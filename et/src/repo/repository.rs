//! Repository handle with shared branch/worktree caches

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::cache::CacheCell;
use super::worktree::Worktree;
use super::{GitContext, RepoError};

/// Normalized string form of a worktree destination, the cache key.
pub(crate) fn path_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

struct Shared {
    id: String,
    url: String,
    dest: PathBuf,
    git: GitContext,
    /// Local + remote-tracking branch names, remote HEAD excluded, sorted
    branches: CacheCell<BTreeSet<String>>,
    /// Worktree destination (normalized string) to checked-out branch
    worktrees: CacheCell<BTreeMap<String, String>>,
    /// Branch checked out in the repository's own working directory
    head: CacheCell<String>,
}

/// Cheap-to-clone handle over one repository's shared state.
///
/// The caches are the single source of truth for branch and worktree
/// state; [`Worktree`] handles delegate every query and mutation back
/// here so the two entities can never diverge.
#[derive(Clone)]
pub struct Repository {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.shared.id)
            .field("dest", &self.shared.dest)
            .finish()
    }
}

impl Repository {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        dest: impl Into<PathBuf>,
        git: GitContext,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: id.into(),
                url: url.into(),
                dest: dest.into(),
                git,
                branches: CacheCell::new(),
                worktrees: CacheCell::new(),
                head: CacheCell::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn dest(&self) -> &Path {
        &self.shared.dest
    }

    pub fn git(&self) -> &GitContext {
        &self.shared.git
    }

    /// Clone state, derived from the VCS metadata directory on disk.
    /// Deliberately not cached.
    pub fn is_cloned(&self) -> bool {
        self.shared.dest.join(".git").exists()
    }

    /// Worktree handle at the given destination, pinned to a target
    /// branch until the worktree exists.
    pub fn worktree(&self, dest: impl Into<PathBuf>, target_branch: impl Into<String>) -> Worktree {
        Worktree::new(self.clone(), dest.into(), target_branch.into())
    }

    /// Run git with the given arguments and return trimmed stdout.
    pub(crate) async fn git_output(&self, cwd: &Path, args: &[&str]) -> Result<String, RepoError> {
        let output = tokio::process::Command::new(self.shared.git.binary())
            .args(args)
            .current_dir(cwd)
            .output()
            .await?;
        if !output.status.success() {
            return Err(RepoError::GitFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    fn require_cloned(&self) -> Result<(), RepoError> {
        if self.is_cloned() {
            Ok(())
        } else {
            Err(RepoError::NotCloned(self.shared.id.clone()))
        }
    }

    /// Local + remote-tracking branches, lazily loaded and cached.
    pub async fn branches(&self) -> Result<BTreeSet<String>, RepoError> {
        self.require_cloned()?;
        if let Some(branches) = self.shared.branches.peek() {
            return Ok(branches);
        }
        self.shared.branches.begin_load();
        debug!(repo = %self.shared.id, "loading branch cache");
        let listing = self
            .git_output(
                &self.shared.dest,
                &["for-each-ref", "--format=%(refname:short)", "refs/heads", "refs/remotes"],
            )
            .await?;
        let branches: BTreeSet<String> = listing
            .lines()
            .map(str::trim)
            // the remote HEAD pointer shortens to the bare remote name
            .filter(|line| !line.is_empty() && *line != "origin" && !line.ends_with("/HEAD"))
            .map(str::to_string)
            .collect();
        self.shared.branches.store(branches.clone());
        Ok(branches)
    }

    /// Branch names currently in the cache, without triggering a load.
    pub fn cached_branches(&self) -> Option<BTreeSet<String>> {
        self.shared.branches.peek()
    }

    /// True when the name matches a local or remote-tracking branch.
    pub async fn contains_matching_branch(&self, name: &str) -> Result<bool, RepoError> {
        let branches = self.branches().await?;
        Ok(branches.contains(name) || branches.contains(&format!("origin/{}", name)))
    }

    /// True when the name has a remote-tracking counterpart.
    pub async fn contains_remote_branch(&self, name: &str) -> Result<bool, RepoError> {
        Ok(self.branches().await?.contains(&format!("origin/{}", name)))
    }

    /// Branch checked out in the repository's own working directory.
    pub async fn current_branch(&self) -> Result<String, RepoError> {
        self.require_cloned()?;
        if let Some(branch) = self.shared.head.peek() {
            return Ok(branch);
        }
        self.shared.head.begin_load();
        let branch = self
            .git_output(&self.shared.dest, &["branch", "--show-current"])
            .await?;
        if branch.is_empty() {
            return Err(RepoError::UnexpectedOutput(format!(
                "repository '{}' has a detached HEAD",
                self.shared.id
            )));
        }
        self.shared.head.store(branch.clone());
        Ok(branch)
    }

    /// Worktree destinations (normalized) to checked-out branches,
    /// excluding the repository's own working directory.
    pub async fn worktree_map(&self) -> Result<BTreeMap<String, String>, RepoError> {
        self.require_cloned()?;
        if let Some(map) = self.shared.worktrees.peek() {
            return Ok(map);
        }
        self.shared.worktrees.begin_load();
        debug!(repo = %self.shared.id, "loading worktree cache");
        let listing = self
            .git_output(&self.shared.dest, &["worktree", "list", "--porcelain"])
            .await?;
        let map = parse_worktree_listing(&listing, &path_key(&self.shared.dest))?;
        self.shared.worktrees.store(map.clone());
        Ok(map)
    }

    /// True when the destination is an added worktree of this repository.
    pub async fn is_worktree_added(&self, dest: &Path) -> Result<bool, RepoError> {
        Ok(self.worktree_map().await?.contains_key(&path_key(dest)))
    }

    /// Checked-out branch of the worktree at the destination, if added.
    pub async fn worktree_branch(&self, dest: &Path) -> Result<Option<String>, RepoError> {
        Ok(self.worktree_map().await?.get(&path_key(dest)).cloned())
    }

    /// No staged or unstaged diff against HEAD and no untracked files,
    /// evaluated in the given working directory.
    pub(crate) async fn is_clean_at(&self, cwd: &Path) -> Result<bool, RepoError> {
        self.require_cloned()?;
        let status = self.git_output(cwd, &["status", "--porcelain"]).await?;
        Ok(status.is_empty())
    }

    /// Cleanliness of the repository's own working directory.
    pub async fn is_clean(&self) -> Result<bool, RepoError> {
        self.is_clean_at(&self.shared.dest).await
    }

    /// Invalidate every cache; the next access reloads from git.
    pub fn refresh(&self) {
        debug!(repo = %self.shared.id, "invalidating caches");
        self.shared.branches.invalidate();
        self.shared.worktrees.invalidate();
        self.shared.head.invalidate();
    }

    // Cache maintenance, called from command success hooks.

    pub(crate) fn register_branch(&self, name: &str) {
        let name = name.to_string();
        self.shared.branches.mutate(|b| {
            b.insert(name);
        });
    }

    pub(crate) fn forget_branch(&self, name: &str) {
        self.shared.branches.mutate(|b| {
            b.remove(name);
            b.remove(&format!("origin/{}", name));
        });
    }

    pub(crate) fn invalidate_branches(&self) {
        self.shared.branches.invalidate();
    }

    pub(crate) fn record_head(&self, branch: &str) {
        self.shared.head.store(branch.to_string());
    }

    pub(crate) fn register_worktree(&self, dest: &Path, branch: &str) {
        let key = path_key(dest);
        let branch = branch.to_string();
        if !self.shared.worktrees.mutate(|m| {
            m.insert(key.clone(), branch.clone());
        }) {
            // Cache not loaded yet; the next query reloads the full truth.
            debug!(repo = %self.shared.id, "worktree cache unloaded, skipping in-place insert");
        }
    }

    pub(crate) fn forget_worktree(&self, dest: &Path) {
        let key = path_key(dest);
        self.shared.worktrees.mutate(|m| {
            m.remove(&key);
        });
    }

    pub(crate) fn record_worktree_branch(&self, dest: &Path, branch: &str) {
        let key = path_key(dest);
        let branch = branch.to_string();
        self.shared.worktrees.mutate(|m| {
            m.insert(key.clone(), branch.clone());
        });
    }
}

fn parse_worktree_listing(
    listing: &str,
    own_dest: &str,
) -> Result<BTreeMap<String, String>, RepoError> {
    let mut map = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in listing.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current = Some(path_key(Path::new(path)));
        } else if let Some(branch_ref) = line.strip_prefix("branch ") {
            let branch = branch_ref
                .strip_prefix("refs/heads/")
                .ok_or_else(|| RepoError::UnexpectedOutput(format!("worktree branch ref '{}'", branch_ref)))?;
            if let Some(path) = current.take()
                && path != own_dest
            {
                map.insert(path, branch.to_string());
            }
        } else if line == "detached" {
            // A detached worktree has no branch; keep it out of the map
            // so branch-dependent operations refuse to touch it.
            current = None;
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn git(cwd: &Path, args: &[&str]) {
        let status = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .unwrap();
        assert!(
            status.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&status.stderr)
        );
    }

    async fn setup_git_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@test.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        git(dir, &["commit", "--allow-empty", "-m", "initial"]).await;
    }

    #[tokio::test]
    async fn test_uncloned_repository_queries_fail() {
        let dir = tempdir().unwrap();
        let repo = Repository::new("core", "unused", dir.path().join("missing"), GitContext::default());
        assert!(!repo.is_cloned());
        assert!(matches!(repo.branches().await, Err(RepoError::NotCloned(_))));
        assert!(matches!(repo.current_branch().await, Err(RepoError::NotCloned(_))));
    }

    #[tokio::test]
    async fn test_branches_and_current_branch() {
        let dir = tempdir().unwrap();
        setup_git_repo(dir.path()).await;
        git(dir.path(), &["branch", "feature-a"]).await;

        let repo = Repository::new("core", "unused", dir.path(), GitContext::default());
        let branches = repo.branches().await.unwrap();
        assert!(branches.contains("main"));
        assert!(branches.contains("feature-a"));
        assert_eq!(repo.current_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_branches_are_cached_until_refresh() {
        let dir = tempdir().unwrap();
        setup_git_repo(dir.path()).await;

        let repo = Repository::new("core", "unused", dir.path(), GitContext::default());
        repo.branches().await.unwrap();

        // Created behind the cache's back; only refresh() reveals it.
        git(dir.path(), &["branch", "late"]).await;
        assert!(!repo.branches().await.unwrap().contains("late"));

        repo.refresh();
        assert!(repo.branches().await.unwrap().contains("late"));
    }

    #[tokio::test]
    async fn test_is_clean_reflects_untracked_files() {
        let dir = tempdir().unwrap();
        setup_git_repo(dir.path()).await;

        let repo = Repository::new("core", "unused", dir.path(), GitContext::default());
        assert!(repo.is_clean().await.unwrap());

        std::fs::write(dir.path().join("stray.txt"), "dirt").unwrap();
        assert!(!repo.is_clean().await.unwrap());
    }

    #[tokio::test]
    async fn test_worktree_map_excludes_own_working_directory() {
        let dir = tempdir().unwrap();
        let wt = tempdir().unwrap();
        setup_git_repo(dir.path()).await;

        let repo = Repository::new("core", "unused", dir.path(), GitContext::default());
        assert!(repo.worktree_map().await.unwrap().is_empty());

        let wt_path = wt.path().join("feature");
        git(
            dir.path(),
            &["worktree", "add", "-b", "feature-wt", wt_path.to_str().unwrap(), "main"],
        )
        .await;
        repo.refresh();

        let map = repo.worktree_map().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&path_key(&wt_path)).map(String::as_str), Some("feature-wt"));
        assert!(repo.is_worktree_added(&wt_path).await.unwrap());
    }

    #[test]
    fn test_parse_worktree_listing_skips_detached() {
        let listing = "worktree /repo\nHEAD aaaa\nbranch refs/heads/main\n\nworktree /wt1\nHEAD bbbb\ndetached\n\nworktree /wt2\nHEAD cccc\nbranch refs/heads/feature\n";
        let map = parse_worktree_listing(listing, "/repo").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("/wt2").map(String::as_str), Some("feature"));
    }

    #[test]
    fn test_parse_worktree_listing_rejects_foreign_refs() {
        let listing = "worktree /wt\nbranch refs/tags/v1\n";
        assert!(parse_worktree_listing(listing, "/repo").is_err());
    }
}
