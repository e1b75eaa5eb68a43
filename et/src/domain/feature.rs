//! Feature branch naming

use serde::{Deserialize, Serialize};

use super::environment::Environment;

/// A named unit of work scoped to one environment.
///
/// The branch actually checked out for a repository is computed per
/// repository: the feature name itself (when a provider supplied a fully
/// qualified name), the environment-prefixed name, or the environment's
/// internal branch when the computed name would collide with the
/// environment branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBranch {
    name: String,
    scoped: bool,
}

impl FeatureBranch {
    /// Feature whose branch name is prefixed by the environment's branch
    /// prefix (the usual case: ticket ids, manual entry).
    pub fn scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scoped: true,
        }
    }

    /// Feature whose provider already supplied the full branch name.
    pub fn qualified(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scoped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The feature's branch name within the given environment.
    pub fn branch_name(&self, env: &Environment) -> String {
        if self.scoped {
            format!("{}/{}", env.branch_prefix(), self.name)
        } else {
            self.name.clone()
        }
    }

    /// The branch to check out for one repository. Falls back to the
    /// environment's internal branch when the feature branch would
    /// collide with the repository's environment branch.
    pub fn checkout_branch(&self, env: &Environment, repo_id: &str) -> String {
        let name = self.branch_name(env);
        if env.branch_for(repo_id) == Some(name.as_str()) {
            env.internal_branch()
        } else {
            name
        }
    }
}
