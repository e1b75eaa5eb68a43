//! Environment workflow: NeedsClone -> NeedsWorktreeSetup -> Ready
//!
//! `NeedsClone` holds while any repository is not cloned,
//! `NeedsWorktreeSetup` while cloning is done but a worktree is missing,
//! `Ready` enables feature-branch operations. Worktree removal is a
//! parallel predicate, enabled even in `Ready` but never while cloning
//! is still required. The obsolete variant forbids clone and setup
//! permanently and always allows teardown.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cmdflow::{BoxCommand, CallableCommand, CommandExt, NoOpCommand, Outcome};
use tracing::debug;

use crate::domain::{Environment, FeatureBranch, Hook};
use crate::repo::{CommandBuilder, GitContext, RepoError, Repository, Worktree};

use super::conflict::AbortDecision;
use super::feature::FeatureBranchWorkflow;
use super::launcher::Launcher;
use super::WorkflowError;

pub(crate) const GUARD_ALREADY_CLONED: &str = "every repository is already cloned";
pub(crate) const GUARD_OBSOLETE: &str = "the environment is obsolete";
pub(crate) const GUARD_NOT_CLONED: &str = "the environment's repositories are not all cloned yet";
pub(crate) const GUARD_NO_WORKTREE_SETUP: &str = "no worktree is waiting to be set up";
pub(crate) const GUARD_NO_WORKTREE_TO_REMOVE: &str =
    "no worktree is added or present on disk, or cloning is still required";

/// One environment's repositories and expected worktrees, plus the
/// state predicates gating every launcher.
pub struct EnvironmentWorkflow {
    env: Environment,
    entries: Vec<(Repository, Worktree)>,
    hooks: Vec<Hook>,
    obsolete: bool,
}

impl EnvironmentWorkflow {
    /// Build the workflow for an environment. Repositories are cloned
    /// under `clones_root/<project>/<repo-id>`; worktrees live at the
    /// environment's conventional paths.
    pub fn new(env: Environment, git: GitContext, clones_root: &Path, hooks: Vec<Hook>) -> Self {
        let obsolete = env.obsolete;
        let entries = env
            .repositories
            .iter()
            .map(|spec| {
                let dest = clones_root.join(&env.project).join(&spec.id);
                let repo = Repository::new(&spec.id, &spec.url, dest, git.clone());
                let worktree = repo.worktree(env.worktree_path(&spec.id), &spec.branch);
                (repo, worktree)
            })
            .collect();
        Self {
            env,
            entries,
            hooks,
            obsolete,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn entries(&self) -> &[(Repository, Worktree)] {
        &self.entries
    }

    pub fn repository(&self, id: &str) -> Option<&Repository> {
        self.entries.iter().map(|(r, _)| r).find(|r| r.id() == id)
    }

    /// Environment branch for a repository, an error when the
    /// configuration does not pin one.
    pub(crate) fn branch_for(&self, repo: &Repository) -> Result<String, RepoError> {
        self.env
            .branch_for(repo.id())
            .map(str::to_string)
            .ok_or_else(|| RepoError::BranchNotConfigured(repo.id().to_string()))
    }

    /// `NeedsClone`: any repository is not cloned. Permanently false for
    /// obsolete environments (cloning them is forbidden).
    pub fn requires_clone(&self) -> bool {
        !self.obsolete && self.entries.iter().any(|(repo, _)| !repo.is_cloned())
    }

    /// `NeedsWorktreeSetup`: cloning is satisfied but an expected
    /// worktree is not yet added. Permanently false for obsolete
    /// environments.
    pub async fn requires_worktree_setup(&self) -> Result<bool, RepoError> {
        if self.obsolete || self.requires_clone() {
            return Ok(false);
        }
        for (_, worktree) in &self.entries {
            if !worktree.is_added().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `Ready`: feature-branch operations are enabled.
    pub async fn is_ready(&self) -> Result<bool, RepoError> {
        if self.obsolete || self.requires_clone() {
            return Ok(false);
        }
        Ok(!self.requires_worktree_setup().await?)
    }

    /// Worktree removal is enabled once any worktree is added or present
    /// on disk, but never while cloning is still required. Permanently
    /// true for obsolete environments.
    pub async fn can_remove_worktree(&self) -> Result<bool, RepoError> {
        if self.obsolete {
            return Ok(true);
        }
        if self.requires_clone() {
            return Ok(false);
        }
        for (_, worktree) in &self.entries {
            if worktree.is_present() || worktree.is_added().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Feature-branch workflow, only available when `Ready`.
    pub async fn feature_workflow(
        self: &Arc<Self>,
        feature: FeatureBranch,
        decision: Arc<dyn AbortDecision>,
    ) -> Result<FeatureBranchWorkflow, WorkflowError> {
        if self.obsolete {
            return Err(WorkflowError::Obsolete(self.env.qualified_name()));
        }
        if !self.is_ready().await? {
            return Err(WorkflowError::NotReady(self.env.qualified_name()));
        }
        Ok(FeatureBranchWorkflow::new(self.clone(), feature, decision))
    }

    pub fn clone_launcher(self: &Arc<Self>) -> CloneLauncher {
        CloneLauncher { wf: self.clone() }
    }

    pub fn synchronize_launcher(self: &Arc<Self>) -> SynchronizeLauncher {
        SynchronizeLauncher { wf: self.clone() }
    }

    pub fn setup_worktree_launcher(self: &Arc<Self>) -> SetupWorktreeLauncher {
        SetupWorktreeLauncher { wf: self.clone() }
    }

    pub fn remove_worktree_launcher(self: &Arc<Self>) -> RemoveWorktreeLauncher {
        RemoveWorktreeLauncher { wf: self.clone() }
    }

    /// All environment-level launchers, for presentation grouping.
    pub fn launchers(self: &Arc<Self>) -> Vec<Box<dyn Launcher>> {
        vec![
            Box::new(self.clone_launcher()),
            Box::new(self.synchronize_launcher()),
            Box::new(self.setup_worktree_launcher()),
            Box::new(self.remove_worktree_launcher()),
        ]
    }
}

/// Clones every not-yet-cloned repository, installing hooks after each
/// clone. One independent command per repository.
pub struct CloneLauncher {
    wf: Arc<EnvironmentWorkflow>,
}

#[async_trait]
impl Launcher for CloneLauncher {
    fn id(&self) -> &'static str {
        "clone"
    }

    fn display_name(&self) -> String {
        "Clone repositories".into()
    }

    fn scope(&self) -> String {
        self.wf.env.qualified_name()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.wf.requires_clone())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if !self.wf.requires_clone() {
            let reason = if self.wf.obsolete { GUARD_OBSOLETE } else { GUARD_ALREADY_CLONED };
            return Err(WorkflowError::guard(self.id(), reason));
        }
        let mut commands = Vec::new();
        for (repo, _) in &self.wf.entries {
            if repo.is_cloned() {
                continue;
            }
            debug!(repo = %repo.id(), "building clone command");
            let builder = CommandBuilder::for_repository(repo);
            let command = builder
                .build_clone_command()
                .and(builder.build_install_hooks_command(&self.wf.hooks));
            commands.push(command);
        }
        Ok(commands)
    }
}

/// Brings every repository's environment branch and the environment's
/// feature branches up to date. One command per repository.
pub struct SynchronizeLauncher {
    wf: Arc<EnvironmentWorkflow>,
}

#[async_trait]
impl Launcher for SynchronizeLauncher {
    fn id(&self) -> &'static str {
        "synchronize"
    }

    fn display_name(&self) -> String {
        "Synchronize".into()
    }

    fn scope(&self) -> String {
        self.wf.env.qualified_name()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(!self.wf.obsolete && !self.wf.requires_clone())
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if self.wf.obsolete {
            return Err(WorkflowError::guard(self.id(), GUARD_OBSOLETE));
        }
        if self.wf.requires_clone() {
            return Err(WorkflowError::guard(self.id(), GUARD_NOT_CLONED));
        }
        let pattern = self.wf.env.feature_branch_pattern();
        let mut commands = Vec::new();
        for (repo, _) in &self.wf.entries {
            let branch = self.wf.branch_for(repo)?;
            let builder = CommandBuilder::for_repository(repo);
            let command = builder
                .build_sync_command(&branch)
                .await?
                .and(builder.build_fetch_command_pattern(&pattern));
            commands.push(command);
        }
        Ok(commands)
    }
}

/// Adds every missing worktree at its environment branch. One command
/// per missing worktree.
pub struct SetupWorktreeLauncher {
    wf: Arc<EnvironmentWorkflow>,
}

#[async_trait]
impl Launcher for SetupWorktreeLauncher {
    fn id(&self) -> &'static str {
        "setup-worktree"
    }

    fn display_name(&self) -> String {
        "Set up worktrees".into()
    }

    fn scope(&self) -> String {
        self.wf.env.qualified_name()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.wf.requires_worktree_setup().await?)
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if !self.wf.requires_worktree_setup().await? {
            return Err(WorkflowError::guard(self.id(), GUARD_NO_WORKTREE_SETUP));
        }
        let mut commands = Vec::new();
        for (repo, worktree) in &self.wf.entries {
            if worktree.is_added().await? {
                continue;
            }
            let branch = self.wf.branch_for(repo)?;
            let base = format!("origin/{}", branch);
            debug!(repo = %repo.id(), worktree = %worktree.name(), "building worktree setup command");
            let builder = CommandBuilder::for_repository(repo);
            let command = builder
                .build_sync_command(&branch)
                .await?
                .and(builder.build_add_worktree_command(worktree.dest(), &branch, &base).await?);
            commands.push(command);
        }
        Ok(commands)
    }
}

/// Tears down every worktree and the environment's internal branches,
/// then deletes the worktree container directory. One sequenced command:
/// the container can only go after every worktree is gone.
pub struct RemoveWorktreeLauncher {
    wf: Arc<EnvironmentWorkflow>,
}

#[async_trait]
impl Launcher for RemoveWorktreeLauncher {
    fn id(&self) -> &'static str {
        "remove-worktree"
    }

    fn display_name(&self) -> String {
        "Remove worktrees".into()
    }

    fn scope(&self) -> String {
        self.wf.env.qualified_name()
    }

    async fn can_launch(&self) -> Result<bool, WorkflowError> {
        Ok(self.wf.can_remove_worktree().await?)
    }

    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError> {
        if !self.wf.can_remove_worktree().await? {
            return Err(WorkflowError::guard(self.id(), GUARD_NO_WORKTREE_TO_REMOVE));
        }
        let env = &self.wf.env;
        let internal = env.internal_branch();
        let mut chain: BoxCommand =
            NoOpCommand::new(format!("{}: remove worktrees", env.qualified_name())).boxed();
        for (repo, worktree) in &self.wf.entries {
            if !repo.is_cloned() {
                continue;
            }
            let builder = CommandBuilder::for_repository(repo);
            if worktree.is_added().await? {
                chain = chain.and(builder.build_remove_worktree_command(worktree.dest()));
            }
            // Dropping the internal branch keeps the environment from
            // resurfacing as obsolete after its worktrees are gone.
            chain = chain.and(builder.build_remove_branch_command(&internal));
        }

        let container = env.directory().to_path_buf();
        let display = format!("{}: remove {}", env.qualified_name(), container.display());
        let remove_container = CallableCommand::new(display.clone(), move || {
            let container = container.clone();
            let display = display.clone();
            async move {
                if !container.exists() {
                    return Outcome::success(display);
                }
                match tokio::fs::remove_dir_all(&container).await {
                    Ok(()) => Outcome::success(display),
                    Err(e) => Outcome::failure_with_cause(
                        display,
                        format!("failed to remove '{}': {}", container.display(), e),
                        Arc::new(e),
                    ),
                }
            }
        });
        Ok(vec![chain.and(remove_container.boxed())])
    }
}
