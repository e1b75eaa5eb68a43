//! The launcher boundary consumed by front-ends

use std::collections::BTreeMap;

use async_trait::async_trait;
use cmdflow::BoxCommand;

use super::WorkflowError;

/// Validated named parameters for the parameterized launch variant.
#[derive(Debug, Clone, Default)]
pub struct LaunchParams {
    values: BTreeMap<String, String>,
}

impl LaunchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A guarded, named action producing a list of independent commands.
///
/// `launch()` is synchronous in effect: it only builds commands, it
/// never runs them. Invoking it while the guard is false is a workflow
/// error carrying the fixed explanation of the missing precondition.
/// Entries of the returned list may be run concurrently by the caller;
/// ordering within one entry is expressed structurally via the command
/// combinators.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Stable identifier, used in error messages and grouping.
    fn id(&self) -> &'static str;

    /// Name shown to the user.
    fn display_name(&self) -> String;

    /// Scope label for presentation grouping (environment or feature).
    fn scope(&self) -> String;

    /// Whether the guard currently holds.
    async fn can_launch(&self) -> Result<bool, WorkflowError>;

    /// Build the commands to run.
    async fn launch(&self) -> Result<Vec<BoxCommand>, WorkflowError>;

    /// Parameterized variant. Launchers that take no parameters reject
    /// any that are passed.
    async fn launch_with(&self, params: &LaunchParams) -> Result<Vec<BoxCommand>, WorkflowError> {
        if let Some(key) = params.keys().next() {
            return Err(WorkflowError::UnexpectedParameter(key.to_string()));
        }
        self.launch().await
    }
}
