//! Git command builder
//!
//! Produces `cmdflow` commands for one repository or one added worktree.
//! Every command that changes branch or worktree state carries a success
//! hook keeping the owning repository's caches in step, so queries after
//! a successful command see the new state without a fresh subprocess.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cmdflow::process::FailureRecast;
use cmdflow::{BoxCommand, CommandExt, Failure, ProcessCommand};

use crate::domain::Hook;

use super::hooks;
use super::repository::Repository;
use super::RepoError;

/// What the builder's commands operate on. Worktree-scoped builders run
/// git inside the worktree and record branch changes against the
/// worktree's cache entry instead of the repository HEAD.
#[derive(Debug, Clone)]
enum Scope {
    Repository,
    Worktree(PathBuf),
}

/// Builds git process commands for one repository or worktree.
pub struct CommandBuilder {
    repo: Repository,
    workdir: PathBuf,
    label: String,
    scope: Scope,
}

impl CommandBuilder {
    pub fn for_repository(repo: &Repository) -> Self {
        Self {
            workdir: repo.dest().to_path_buf(),
            label: repo.id().to_string(),
            scope: Scope::Repository,
            repo: repo.clone(),
        }
    }

    pub(crate) fn for_worktree(repo: Repository, dest: PathBuf) -> Self {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dest.to_string_lossy().into_owned());
        Self {
            label: format!("{}:{}", repo.id(), name),
            workdir: dest.clone(),
            scope: Scope::Worktree(dest),
            repo,
        }
    }

    fn git_command<I, S>(&self, args: I) -> ProcessCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let display = format!("{}: git {}", self.label, args.join(" "));
        ProcessCommand::new(
            display,
            self.repo.git().binary().to_string_lossy().into_owned(),
            &self.workdir,
        )
        .args(args)
    }

    /// Branch currently checked out in this builder's working directory.
    pub async fn current_branch(&self) -> Result<String, RepoError> {
        match &self.scope {
            Scope::Repository => self.repo.current_branch().await,
            Scope::Worktree(dest) => self
                .repo
                .worktree_branch(dest)
                .await?
                .ok_or_else(|| RepoError::WorktreeNotAdded(self.label.clone())),
        }
    }

    /// Clone the remote into the destination. Creates the destination's
    /// parent directory first; on success all caches are invalidated.
    pub fn build_clone_command(&self) -> BoxCommand {
        let repo = self.repo.clone();
        let dest = repo.dest().to_path_buf();
        let parent = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let display = format!("{}: prepare {}", self.label, parent.display());
        let prepare = cmdflow::CallableCommand::new(display.clone(), move || {
            let parent = parent.clone();
            let display = display.clone();
            async move {
                match tokio::fs::create_dir_all(&parent).await {
                    Ok(()) => cmdflow::Outcome::success(display),
                    Err(e) => cmdflow::Outcome::failure_with_cause(
                        display,
                        format!("failed to create '{}': {}", parent.display(), e),
                        Arc::new(e),
                    ),
                }
            }
        });

        let cwd = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let clone_display = format!("{}: git clone {}", self.label, repo.url());
        let on_refresh = repo.clone();
        let clone = ProcessCommand::new(
            clone_display,
            repo.git().binary().to_string_lossy().into_owned(),
            cwd,
        )
        .arg("clone")
        .arg(repo.url())
        .arg(dest.to_string_lossy().into_owned())
        .on_success(move || on_refresh.refresh());

        prepare.boxed().and(clone.boxed())
    }

    /// Install the given hooks into the repository's hook directory.
    pub fn build_install_hooks_command(&self, installed: &[Hook]) -> BoxCommand {
        hooks::build_install_hooks_command(&self.repo, installed)
    }

    /// Attach a worktree to an existing branch, or create the target
    /// branch from the base at the new worktree. A branch that only
    /// exists remote-tracking is materialized locally from its remote
    /// counterpart. Registers the branch and the worktree in the caches
    /// on success.
    pub async fn build_add_worktree_command(
        &self,
        dest: &Path,
        target_branch: &str,
        base_branch: &str,
    ) -> Result<BoxCommand, RepoError> {
        let branches = self.repo.branches().await?;
        let remote_ref = format!("origin/{}", target_branch);
        let dest_str = dest.to_string_lossy().into_owned();
        let command = if branches.contains(target_branch) {
            self.git_command(["worktree", "add", dest_str.as_str(), target_branch])
        } else if branches.contains(&remote_ref) {
            self.git_command(["worktree", "add", "-b", target_branch, dest_str.as_str(), remote_ref.as_str()])
        } else {
            self.git_command(["worktree", "add", "-b", target_branch, dest_str.as_str(), base_branch])
        };

        let repo = self.repo.clone();
        let dest = dest.to_path_buf();
        let target = target_branch.to_string();
        Ok(command
            .on_success(move || {
                repo.register_branch(&target);
                repo.register_worktree(&dest, &target);
            })
            .boxed())
    }

    /// Force-remove the worktree at the destination and drop it from the
    /// cache.
    pub fn build_remove_worktree_command(&self, dest: &Path) -> BoxCommand {
        let dest_str = dest.to_string_lossy().into_owned();
        let repo = self.repo.clone();
        let dest = dest.to_path_buf();
        self.git_command(["worktree", "remove", "--force", dest_str.as_str()])
            .on_success(move || repo.forget_worktree(&dest))
            .boxed()
    }

    /// Check out the target branch, creating it from the base when it
    /// matches no existing branch. Records the new current branch.
    pub async fn build_checkout_command(
        &self,
        target_branch: &str,
        base_branch: &str,
    ) -> Result<BoxCommand, RepoError> {
        let exists = self.repo.contains_matching_branch(target_branch).await?;
        let command = if exists {
            self.git_command(["checkout", target_branch])
        } else {
            self.git_command(["checkout", "-b", target_branch, base_branch])
        };

        let repo = self.repo.clone();
        let scope = self.scope.clone();
        let target = target_branch.to_string();
        Ok(command
            .on_success(move || {
                repo.register_branch(&target);
                match &scope {
                    Scope::Repository => repo.record_head(&target),
                    Scope::Worktree(dest) => repo.record_worktree_branch(dest, &target),
                }
            })
            .boxed())
    }

    /// Update the remote-tracking ref for one branch, pruning stale refs.
    pub fn build_fetch_command(&self, branch: &str) -> BoxCommand {
        let repo = self.repo.clone();
        let remote_ref = format!("origin/{}", branch);
        self.git_command(["fetch", "--prune", "origin", branch])
            .on_success(move || repo.register_branch(&remote_ref))
            .boxed()
    }

    /// Force-update remote-tracking refs for every branch matching the
    /// glob pattern. The match set is only known to git, so the whole
    /// branch cache is reloaded afterwards.
    pub fn build_fetch_command_pattern(&self, pattern: &str) -> BoxCommand {
        let refspec = format!("+refs/heads/{}:refs/remotes/origin/{}", pattern, pattern);
        let repo = self.repo.clone();
        self.git_command(["fetch", "origin", refspec.as_str()])
            .on_success(move || repo.invalidate_branches())
            .boxed()
    }

    fn conflict_recast(&self) -> Arc<dyn FailureRecast> {
        Arc::new(ConflictRecast {
            repo: self.repo.clone(),
            workdir: self.workdir.clone(),
            scope: self.label.clone(),
        })
    }

    /// Fast-forward-preferring pull without editor prompts. A bad exit
    /// while the working directory is dirty is reclassified as a merge
    /// conflict.
    pub fn build_pull_command(&self) -> BoxCommand {
        self.git_command(["pull", "--ff", "--no-edit"])
            .env("GIT_EDITOR", "true")
            .recast_failure(self.conflict_recast())
            .boxed()
    }

    /// Merge the given branch into the current one. Conflict-recast like
    /// pull.
    pub fn build_merge_command(&self, branch: &str) -> BoxCommand {
        self.git_command(["merge", "--ff", "--no-edit", branch])
            .env("GIT_EDITOR", "true")
            .recast_failure(self.conflict_recast())
            .boxed()
    }

    /// Continue an in-progress merge after conflicts were resolved.
    pub fn build_continue_merge_command(&self) -> BoxCommand {
        self.git_command(["merge", "--continue"])
            .env("GIT_EDITOR", "true")
            .recast_failure(self.conflict_recast())
            .boxed()
    }

    /// Abort an in-progress merge.
    pub fn build_abort_merge_command(&self) -> BoxCommand {
        self.git_command(["merge", "--abort"]).boxed()
    }

    /// Push the current branch: plain when a remote-tracking counterpart
    /// exists, with upstream setup otherwise.
    pub async fn build_push_command(&self) -> Result<BoxCommand, RepoError> {
        let branch = self.current_branch().await?;
        if self.repo.contains_remote_branch(&branch).await? {
            Ok(self.git_command(["push"]).boxed())
        } else {
            let repo = self.repo.clone();
            let remote_ref = format!("origin/{}", branch);
            Ok(self
                .git_command(["push", "--set-upstream", "origin", branch.as_str()])
                .on_success(move || repo.register_branch(&remote_ref))
                .boxed())
        }
    }

    /// Force-delete a local branch, tolerating a non-zero exit, and drop
    /// it and its remote-tracking counterpart from the cache.
    pub fn build_remove_branch_command(&self, name: &str) -> BoxCommand {
        let repo = self.repo.clone();
        let branch = name.to_string();
        self.git_command(["branch", "-D", name])
            .ignore_exit_status()
            .on_success(move || repo.forget_branch(&branch))
            .boxed()
    }

    /// Revert tracked files, then remove untracked files and
    /// directories. Ignored files are preserved.
    pub fn build_clean_command(&self) -> BoxCommand {
        self.git_command(["checkout", "--", "."])
            .boxed()
            .and(self.git_command(["clean", "-d", "--force"]).boxed())
    }

    /// Pull when the working directory is on the given branch, fetch the
    /// branch otherwise.
    pub async fn build_sync_command(&self, branch: &str) -> Result<BoxCommand, RepoError> {
        if self.current_branch().await? == branch {
            Ok(self.build_pull_command())
        } else {
            Ok(self.build_fetch_command(branch))
        }
    }
}

/// Reclassifies a generic bad-exit failure as a merge conflict when the
/// working directory is left dirty. A clean directory means the failure
/// had some other cause and is passed through untouched.
struct ConflictRecast {
    repo: Repository,
    workdir: PathBuf,
    scope: String,
}

#[async_trait]
impl FailureRecast for ConflictRecast {
    async fn recast(&self, failure: Failure) -> Failure {
        match self.repo.is_clean_at(&self.workdir).await {
            Ok(false) => {
                let message = format!("merge conflict in '{}': {}", self.scope, failure.message());
                failure.recast(message, Arc::new(RepoError::MergeConflict(self.scope.clone())))
            }
            _ => failure,
        }
    }
}

/// True when the outcome's cause marks a merge conflict.
pub fn is_merge_conflict(outcome: &cmdflow::Outcome) -> bool {
    matches!(outcome.cause_as::<RepoError>(), Some(RepoError::MergeConflict(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::GitContext;
    use cmdflow::Command;
    use tempfile::tempdir;

    async fn git(cwd: &Path, args: &[&str]) {
        let out = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .unwrap();
        assert!(out.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&out.stderr));
    }

    async fn setup_git_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@test.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        git(dir, &["commit", "--allow-empty", "-m", "initial"]).await;
    }

    async fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        git(dir, &["add", "."]).await;
        git(dir, &["commit", "-m", message]).await;
    }

    /// Bare upstream plus a clone, the fixture most builder tests need.
    async fn setup_remote_and_clone(root: &Path) -> (PathBuf, PathBuf) {
        let upstream = root.join("upstream");
        let seed = root.join("seed");
        let clone = root.join("clone");
        std::fs::create_dir_all(&seed).unwrap();
        setup_git_repo(&seed).await;
        commit_file(&seed, "README.md", "seed", "add readme").await;
        git(root, &["clone", "--bare", seed.to_str().unwrap(), upstream.to_str().unwrap()]).await;
        git(root, &["clone", upstream.to_str().unwrap(), clone.to_str().unwrap()]).await;
        git(&clone, &["config", "user.email", "test@test.com"]).await;
        git(&clone, &["config", "user.name", "Test"]).await;
        (upstream, clone)
    }

    #[tokio::test]
    async fn test_clone_command_clones_and_invalidates() {
        let root = tempdir().unwrap();
        let (upstream, _) = setup_remote_and_clone(root.path()).await;

        let dest = root.path().join("nested").join("fresh");
        let repo = Repository::new("core", upstream.to_string_lossy(), &dest, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let outcome = builder.build_clone_command().execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());
        assert!(repo.is_cloned());
        assert!(repo.branches().await.unwrap().contains("main"));
    }

    #[tokio::test]
    async fn test_add_worktree_creates_branch_and_updates_cache() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        // Load the caches first so the hook updates them in place.
        let before = repo.branches().await.unwrap();
        assert!(!before.contains("demo/main/T-1"));
        repo.worktree_map().await.unwrap();

        let wt_dest = root.path().join("wt-t1");
        let command = builder
            .build_add_worktree_command(&wt_dest, "demo/main/T-1", "main")
            .await
            .unwrap();
        let outcome = command.execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());

        // Cache was updated by the success hook, not by a reload.
        let cached = repo.cached_branches().expect("branch cache still loaded");
        assert!(cached.contains("demo/main/T-1"));
        assert!(repo.is_worktree_added(&wt_dest).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_worktree_attaches_to_existing_branch() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;
        git(&clone, &["branch", "existing"]).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let wt_dest = root.path().join("wt-existing");
        let command = builder
            .build_add_worktree_command(&wt_dest, "existing", "main")
            .await
            .unwrap();
        assert!(!command.execute().await.is_failed());
        assert_eq!(
            repo.worktree_branch(&wt_dest).await.unwrap().as_deref(),
            Some("existing")
        );
    }

    #[tokio::test]
    async fn test_remove_worktree_drops_cache_entry() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let wt_dest = root.path().join("wt-gone");
        builder
            .build_add_worktree_command(&wt_dest, "going", "main")
            .await
            .unwrap()
            .execute()
            .await;
        assert!(repo.is_worktree_added(&wt_dest).await.unwrap());

        let outcome = builder.build_remove_worktree_command(&wt_dest).execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());
        assert!(!repo.is_worktree_added(&wt_dest).await.unwrap());
    }

    #[tokio::test]
    async fn test_checkout_creates_from_base_and_records_head() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let command = builder.build_checkout_command("fresh-branch", "main").await.unwrap();
        assert!(!command.execute().await.is_failed());
        assert_eq!(repo.current_branch().await.unwrap(), "fresh-branch");
    }

    #[tokio::test]
    async fn test_push_sets_upstream_for_new_branch() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        builder
            .build_checkout_command("publishing", "main")
            .await
            .unwrap()
            .execute()
            .await;
        commit_file(&clone, "new.txt", "x", "new file").await;

        let outcome = builder.build_push_command().await.unwrap().execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());
        assert!(repo.contains_remote_branch("publishing").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_branch_tolerates_missing_branch() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let outcome = builder.build_remove_branch_command("never-existed").execute().await;
        assert!(!outcome.is_failed());
    }

    #[tokio::test]
    async fn test_clean_removes_untracked_preserves_ignored() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;
        commit_file(&clone, ".gitignore", "ignored.txt\n", "ignore").await;
        std::fs::write(clone.join("ignored.txt"), "keep me").unwrap();
        std::fs::write(clone.join("stray.txt"), "drop me").unwrap();
        std::fs::write(clone.join("README.md"), "modified").unwrap();

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let outcome = builder.build_clean_command().execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());
        assert!(clone.join("ignored.txt").exists());
        assert!(!clone.join("stray.txt").exists());
        assert_eq!(std::fs::read_to_string(clone.join("README.md")).unwrap(), "seed");
    }

    #[tokio::test]
    async fn test_merge_conflict_is_reclassified() {
        let root = tempdir().unwrap();
        let (upstream, clone) = setup_remote_and_clone(root.path()).await;

        // Diverge: upstream and clone both rewrite the same file.
        let other = root.path().join("other");
        git(root.path(), &["clone", upstream.to_str().unwrap(), other.to_str().unwrap()]).await;
        git(&other, &["config", "user.email", "test@test.com"]).await;
        git(&other, &["config", "user.name", "Test"]).await;
        commit_file(&other, "README.md", "upstream change", "upstream edit").await;
        git(&other, &["push"]).await;

        commit_file(&clone, "README.md", "local change", "local edit").await;
        git(&clone, &["fetch", "origin"]).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let outcome = builder.build_merge_command("origin/main").execute().await;
        assert!(outcome.is_failed());
        assert!(is_merge_conflict(&outcome), "cause: {:?}", outcome.cause());
    }

    #[tokio::test]
    async fn test_clean_repo_failure_stays_generic() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        // Merging a branch that does not exist fails without dirtying the
        // working directory, so the failure keeps its generic cause.
        let outcome = builder.build_merge_command("no-such-branch").execute().await;
        assert!(outcome.is_failed());
        assert!(!is_merge_conflict(&outcome));
        assert!(outcome.cause_as::<cmdflow::ExitError>().is_some());
    }

    #[tokio::test]
    async fn test_sync_command_prefers_pull_on_matching_branch() {
        let root = tempdir().unwrap();
        let (_, clone) = setup_remote_and_clone(root.path()).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let on_branch = builder.build_sync_command("main").await.unwrap();
        assert!(on_branch.description().contains("pull"));

        let off_branch = builder.build_sync_command("elsewhere").await.unwrap();
        assert!(off_branch.description().contains("fetch"));
    }

    #[tokio::test]
    async fn test_fetch_pattern_invalidates_branch_cache() {
        let root = tempdir().unwrap();
        let (upstream, clone) = setup_remote_and_clone(root.path()).await;

        // Publish a feature branch the clone has never fetched.
        let other = root.path().join("other");
        git(root.path(), &["clone", upstream.to_str().unwrap(), other.to_str().unwrap()]).await;
        git(&other, &["config", "user.email", "test@test.com"]).await;
        git(&other, &["config", "user.name", "Test"]).await;
        git(&other, &["checkout", "-b", "demo/main/T-9"]).await;
        git(&other, &["push", "--set-upstream", "origin", "demo/main/T-9"]).await;

        let repo = Repository::new("core", "unused", &clone, GitContext::default());
        let builder = CommandBuilder::for_repository(&repo);

        let before = repo.branches().await.unwrap();
        assert!(!before.contains("origin/demo/main/T-9"));

        let outcome = builder.build_fetch_command_pattern("demo/main/*").execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());

        // Cache was dropped wholesale; the reload sees the new ref.
        assert!(repo.cached_branches().is_none());
        assert!(repo.branches().await.unwrap().contains("origin/demo/main/T-9"));
    }
}
