//! Workflow state machine
//!
//! Sequences the command algebra and the repository model into
//! environment- and feature-branch-level operations. Each operation is a
//! [`Launcher`]: a named, guarded action that builds the list of
//! commands to run. Launchers never execute anything themselves; the
//! caller decides whether to run the returned list concurrently.

pub mod conflict;
pub mod environment;
pub mod feature;
pub mod launcher;
pub mod provider;

pub use conflict::{ABORTED_MERGE, AbortDecision, ConflictRetryCommand, FixedAbortDecision};
pub use environment::EnvironmentWorkflow;
pub use feature::FeatureBranchWorkflow;
pub use launcher::{LaunchParams, Launcher};
pub use provider::{FeatureBranchProvider, ManualProvider, ProviderRegistry};

use crate::repo::RepoError;

/// Errors raised by the workflow layer: a guard was false when a
/// launcher was invoked, or the underlying repository state could not be
/// determined.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A launcher's guard was false at `launch()` time. Carries the
    /// fixed explanation of the missing precondition.
    #[error("cannot launch '{launcher}': {reason}")]
    GuardFailed { launcher: String, reason: String },

    #[error("environment '{0}' is obsolete; only worktree removal is available")]
    Obsolete(String),

    #[error("environment '{0}' is not ready; finish cloning and worktree setup first")]
    NotReady(String),

    #[error("unexpected launch parameter '{0}'")]
    UnexpectedParameter(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl WorkflowError {
    pub(crate) fn guard(launcher: &str, reason: &str) -> Self {
        Self::GuardFailed {
            launcher: launcher.to_string(),
            reason: reason.to_string(),
        }
    }
}
