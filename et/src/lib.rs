//! envtree - multi-repository environment and worktree automation
//!
//! Automates a multi-repository git workflow: cloning a set of
//! repositories into a named environment, materializing per-repository
//! worktrees pinned to environment branches, and running a
//! feature-branch life-cycle (checkout, merge-from-base, pull, clean,
//! remove) across all worktrees of an environment as one logical,
//! partially-parallel operation with conflict recovery.
//!
//! # Modules
//!
//! - [`domain`] - projects, environments, feature branches, hooks
//! - [`repo`] - repository/worktree model and the git command builder
//! - [`workflow`] - environment and feature-branch state machines
//! - [`config`] - configuration types and loading
//! - [`scratch`] - session scratch directory with scoped teardown
//! - [`exec`] - concurrent command execution for the CLI
//! - [`cli`] - command-line interface
//!
//! Git itself is an opaque external tool invoked as a subprocess; the
//! command algebra the launchers build on lives in the `cmdflow` crate.

pub mod cli;
pub mod config;
pub mod domain;
pub mod exec;
pub mod repo;
pub mod scratch;
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, ConfigError, GitConfig, StorageConfig};
pub use domain::{Environment, FeatureBranch, Hook, HookScope, Project, RepoSpec};
pub use repo::{CommandBuilder, GitContext, RepoError, Repository, Worktree, is_merge_conflict};
pub use scratch::ScratchDir;
pub use workflow::{
    ABORTED_MERGE, AbortDecision, ConflictRetryCommand, EnvironmentWorkflow, FeatureBranchProvider,
    FeatureBranchWorkflow, FixedAbortDecision, LaunchParams, Launcher, ManualProvider,
    ProviderRegistry, WorkflowError,
};
