//! Feature-branch workflow
//!
//! Obtained from an environment workflow only while it is `Ready`. Every
//! operation is guarded on the environment staying ready and on whether
//! the feature still needs a checkout; merge and pull wrap their
//! conflicting commands in the retry/abort policy.

use std::sync::Arc;

use async_trait::async_trait;
use cmdflow::{BoxCommand, CallableCommand, CommandExt, NoOpCommand, Outcome};
use tracing::debug;

use crate::domain::FeatureBranch;
use crate::repo::{CommandBuilder, RepoError, Repository, Worktree};

use super::conflict::{AbortDecision, ConflictRetryCommand};
use super::environment::EnvironmentWorkflow;
use super::launcher::Launcher;
use super::WorkflowError;

pub(crate) const GUARD_NOT_READY: &str = "the environment is not ready";
pub(crate) const GUARD_NO_CHECKOUT_NEEDED: &str =
    "every worktree is already on the feature's checkout branch";
pub(crate) const GUARD_CHECKOUT_REQUIRED: &str =
    "a checkout is still required before this operation";
pub(crate) const GUARD_NOTHING_TO_PULL: &str = "no worktree is mergeable or pullable";
pub(crate) const GUARD_NO_BRANCH_TO_REMOVE: &str =
    "cloning is unfinished, a worktree targets the internal branch, or no repository has the branch";

/// Per-feature operations across all worktrees of one environment.
#[derive(Clone)]
pub struct FeatureBranchWorkflow {
    wf: Arc<EnvironmentWorkflow>,
    feature: FeatureBranch,
    decision: Arc<dyn AbortDecision>,
}

impl FeatureBranchWorkflow {
    pub(crate) fn new(
        wf: Arc<EnvironmentWorkflow>,
        feature: FeatureBranch,
        decision: Arc<dyn AbortDecision>,
    ) -> Self {
        Self { wf, feature, decision }
    }

    pub fn feature(&self) -> &FeatureBranch {
        &self.feature
    }

    pub fn environment_workflow(&self) -> &Arc<EnvironmentWorkflow> {
        &self.wf
    }

    /// Branch this feature checks out for one repository.
    pub fn checkout_branch(&self, repo_id: &str) -> String {
        self.feature.checkout_branch(self.wf.environment(), repo_id)
    }

    /// True while any worktree's current branch differs from the branch
    /// this feature computes for it.
    pub async fn requires_checkout(&self) -> Result<bool, RepoError> {
        for (repo, worktree) in self.wf.entries() {
            if worktree.branch().await? != self.checkout_branch(repo.id()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn scope_label(&self) -> String {
        format!("{} @ {}", self.feature.name(), self.wf.environment().qualified_name())
    }

    /// Fails listing every dirty worktree by name; succeeds when all are
    /// clean. AND-prefixed to operations that must not touch dirty
    /// worktrees.
    fn clean_guard(&self) -> BoxCommand {
        let worktrees: Vec<Worktree> = self.wf.entries().iter().map(|(_, w)| w.clone()).collect();
        let display = format!("{}: check worktrees clean", self.scope_label());
        CallableCommand::new(display.clone(), move || {
            let worktrees = worktrees.clone();
            let display = display.clone();
            async move {
                let mut dirty = Vec::new();
                for worktree in &worktrees {
                    match worktree.is_clean().await {
                        Ok(true) => {}
                        Ok(false) => dirty.push(worktree.name()),
                        Err(e) => {
                            let message = format!("failed to check '{}': {}", worktree.name(), e);
                            return Outcome::failure_with_cause(display.clone(), message, Arc::new(e));
                        }
                    }
                }
                if dirty.is_empty() {
                    Outcome::success(display.clone())
                } else {
                    Outcome::failure(display.clone(), format!("worktrees are not clean: {}", dirty.join(", ")))
                }
            }
        })
        .boxed()
    }

    fn conflict_retry(&self, attempt: BoxCommand, builder: &CommandBuilder, worktree: &Worktree) -> BoxCommand {
        Box::new(ConflictRetryCommand::new(
            attempt,
            builder.build_continue_merge_command(),
            builder.build_abort_merge_command(),
            self.decision.clone(),
            worktree.name(),
        ))
    }

    pub fn checkout_launcher(&self) -> FetchAndCheckoutLauncher {
        FetchAndCheckoutLauncher { fb: self.clone() }
    }

    pub fn merge_launcher(&self) -> MergeBaseLauncher {
        MergeBaseLauncher { fb: self.clone() }
    }

    pub fn pull_launcher(&self) -> PullLauncher {
        PullLauncher { fb: self.clone() }
    }

    pub fn clean_launcher(&self) -> CleanWorktreeLauncher {
        CleanWorktreeLauncher { fb: self.clone() }
    }

    pub fn remove_branch_launcher(&self) -> RemoveBranchLauncher {
        RemoveBranchLauncher { fb: self.clone() }
    }

    /// All feature-level launchers, for presentation grouping.
    pub fn launchers(&self) -> Vec<Box<dyn Launcher>> {
        vec![
            Box::new(self.checkout_launcher()),
            Box::new(self.merge_launcher()),
            Box::new(self.pull_launcher()),
            Box::new(self.clean_launcher()),
            Box::new(self.remove_branch_launcher()),
        ]
    }
}

/// Fetch the environment branch and check out the feature branch in
/// every worktree that is not on it yet.
pub struct FetchAndCheckoutLauncher {
    fb: FeatureBranchWorkflow,
}

impl FetchAndCheckoutLauncher {
    async fn guard_reason(&self) -> Result<Option<&'static str>, WorkflowError> {
        if !self.fb.wf.is_ready().await? {
            return Ok(Some(GUARD_NOT_READY));
        }
        if !self.fb.requires_checkout().await? {
            return Ok(Some(GUARD_NO_CHECKOUT_NEEDED));
        }
        Ok(None)
    }
}

#[async_trait]
impl Launcher for FetchAndCheckoutLauncher {
    fn id(&self) -> &'static str {
        "fetch-checkout"
    }

    fn display_name(&self) -> String {
        "Fetch and checkout".into()
    }

    fn scope(&self) -> String {
        self.fb.scope_label()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.guard_reason().await?.is_none())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(reason) = self.guard_reason().await? {
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let env = self.fb.wf.environment();
        let internal = env.internal_branch();
        let mut commands = Vec::new();
        for (repo, worktree) in self.fb.wf.entries() {
            let target = self.fb.checkout_branch(repo.id());
            if worktree.branch().await? == target {
                continue;
            }
            let env_branch = self.fb.wf.branch_for(repo)?;
            let base = format!("origin/{}", env_branch);
            debug!(repo = %repo.id(), %target, "building checkout command");
            let builder = worktree.builder().await?;
            let mut chain = self.fb.clean_guard();
            if target != internal {
                chain = chain.and(builder.build_sync_command(&env_branch).await?);
            }
            chain = chain.and(builder.build_checkout_command(&target, &base).await?);
            if target == internal {
                // The internal branch mirrors the environment's base
                // branch, so bring it up to date right after checkout.
                chain = chain.and(builder.build_merge_command(&base));
            }
            commands.push(chain);
        }
        Ok(commands)
    }
}

/// Merge each repository's environment branch into the feature branch,
/// with conflict recovery.
pub struct MergeBaseLauncher {
    fb: FeatureBranchWorkflow,
}

impl MergeBaseLauncher {
    async fn guard_reason(&self) -> Result<Option<&'static str>, WorkflowError> {
        if !self.fb.wf.is_ready().await? {
            return Ok(Some(GUARD_NOT_READY));
        }
        if self.fb.requires_checkout().await? {
            return Ok(Some(GUARD_CHECKOUT_REQUIRED));
        }
        Ok(None)
    }
}

#[async_trait]
impl Launcher for MergeBaseLauncher {
    fn id(&self) -> &'static str {
        "merge-base"
    }

    fn display_name(&self) -> String {
        "Merge base branch".into()
    }

    fn scope(&self) -> String {
        self.fb.scope_label()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.guard_reason().await?.is_none())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(reason) = self.guard_reason().await? {
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let mut commands = Vec::new();
        for (repo, worktree) in self.fb.wf.entries() {
            let env_branch = self.fb.wf.branch_for(repo)?;
            let base = format!("origin/{}", env_branch);
            let builder = worktree.builder().await?;
            let merge = self.fb.conflict_retry(builder.build_merge_command(&base), &builder, worktree);
            let chain = self
                .fb
                .clean_guard()
                .and(builder.build_sync_command(&env_branch).await?)
                .and(merge);
            commands.push(chain);
        }
        Ok(commands)
    }
}

/// Pull (or, for the internal branch, merge the base) in every worktree
/// whose branch can be brought up to date; explains itself for the rest.
pub struct PullLauncher {
    fb: FeatureBranchWorkflow,
}

impl PullLauncher {
    async fn is_mergeable_or_pullable(&self, repo: &Repository) -> Result<bool, WorkflowError> {
        let target = self.fb.checkout_branch(repo.id());
        if target == self.fb.wf.environment().internal_branch() {
            return Ok(true);
        }
        Ok(repo.contains_remote_branch(&target).await?)
    }

    async fn guard_reason(&self) -> Result<Option<&'static str>, WorkflowError> {
        if !self.fb.wf.is_ready().await? {
            return Ok(Some(GUARD_NOT_READY));
        }
        if self.fb.requires_checkout().await? {
            return Ok(Some(GUARD_CHECKOUT_REQUIRED));
        }
        for (repo, _) in self.fb.wf.entries() {
            if self.is_mergeable_or_pullable(repo).await? {
                return Ok(None);
            }
        }
        Ok(Some(GUARD_NOTHING_TO_PULL))
    }
}

#[async_trait]
impl Launcher for PullLauncher {
    fn id(&self) -> &'static str {
        "pull"
    }

    fn display_name(&self) -> String {
        "Pull".into()
    }

    fn scope(&self) -> String {
        self.fb.scope_label()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.guard_reason().await?.is_none())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(reason) = self.guard_reason().await? {
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let env = self.fb.wf.environment();
        let internal = env.internal_branch();
        let mut commands = Vec::new();
        for (repo, worktree) in self.fb.wf.entries() {
            let target = self.fb.checkout_branch(repo.id());
            if !self.is_mergeable_or_pullable(repo).await? {
                let display = format!("{}: pull skipped", worktree.name());
                let message = format!(
                    "pull skipped for '{}': branch '{}' has no remote counterpart",
                    worktree.name(),
                    target
                );
                commands.push(NoOpCommand::with_message(display, message).boxed());
                continue;
            }
            let builder = worktree.builder().await?;
            let attempt = if target == internal {
                let env_branch = self.fb.wf.branch_for(repo)?;
                builder.build_merge_command(&format!("origin/{}", env_branch))
            } else {
                builder.build_pull_command()
            };
            commands.push(self.fb.conflict_retry(attempt, &builder, worktree));
        }
        Ok(commands)
    }
}

/// Revert and clean every worktree.
pub struct CleanWorktreeLauncher {
    fb: FeatureBranchWorkflow,
}

impl CleanWorktreeLauncher {
    async fn guard_reason(&self) -> Result<Option<&'static str>, WorkflowError> {
        if !self.fb.wf.is_ready().await? {
            return Ok(Some(GUARD_NOT_READY));
        }
        if self.fb.requires_checkout().await? {
            return Ok(Some(GUARD_CHECKOUT_REQUIRED));
        }
        Ok(None)
    }
}

#[async_trait]
impl Launcher for CleanWorktreeLauncher {
    fn id(&self) -> &'static str {
        "clean-worktree"
    }

    fn display_name(&self) -> String {
        "Clean worktrees".into()
    }

    fn scope(&self) -> String {
        self.fb.scope_label()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.guard_reason().await?.is_none())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(reason) = self.guard_reason().await? {
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let mut commands = Vec::new();
        for (_, worktree) in self.fb.wf.entries() {
            let builder = worktree.builder().await?;
            commands.push(builder.build_clean_command());
        }
        Ok(commands)
    }
}

/// Remove the feature branch from every repository that has it, leaving
/// any worktree currently on it parked on the internal branch.
pub struct RemoveBranchLauncher {
    fb: FeatureBranchWorkflow,
}

impl RemoveBranchLauncher {
    async fn guard_reason(&self) -> Result<Option<&'static str>, WorkflowError> {
        if self.fb.wf.requires_clone() {
            return Ok(Some(GUARD_NO_BRANCH_TO_REMOVE));
        }
        let env = self.fb.wf.environment();
        let internal = env.internal_branch();
        for (repo, _) in self.fb.wf.entries() {
            if self.fb.checkout_branch(repo.id()) == internal {
                return Ok(Some(GUARD_NO_BRANCH_TO_REMOVE));
            }
        }
        let branch = self.fb.feature.branch_name(env);
        for (repo, _) in self.fb.wf.entries() {
            if repo.contains_matching_branch(&branch).await? {
                return Ok(None);
            }
        }
        Ok(Some(GUARD_NO_BRANCH_TO_REMOVE))
    }
}

#[async_trait]
impl Launcher for RemoveBranchLauncher {
    fn id(&self) -> &'static str {
        "remove-branch"
    }

    fn display_name(&self) -> String {
        "Remove branch".into()
    }

    fn scope(&self) -> String {
        self.fb.scope_label()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.guard_reason().await?.is_none())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(reason) = self.guard_reason().await? {
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let env = self.fb.wf.environment();
        let branch = self.fb.feature.branch_name(env);
        let internal = env.internal_branch();
        let mut commands = Vec::new();
        for (repo, worktree) in self.fb.wf.entries() {
            if !repo.contains_matching_branch(&branch).await? {
                continue;
            }
            let repo_builder = CommandBuilder::for_repository(repo);
            let remove = repo_builder.build_remove_branch_command(&branch);
            let command = if worktree.is_added().await? && worktree.branch().await? == branch {
                // A branch cannot be deleted while checked out; park the
                // worktree on the internal branch first.
                let env_branch = self.fb.wf.branch_for(repo)?;
                let builder = worktree.builder().await?;
                builder
                    .build_checkout_command(&internal, &format!("origin/{}", env_branch))
                    .await?
                    .and(remove)
            } else {
                remove
            };
            commands.push(command);
        }
        Ok(commands)
    }
}
