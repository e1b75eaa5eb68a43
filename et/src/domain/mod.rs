//! Domain data model: projects, environments, feature branches, hooks
//!
//! These types are the read-only configuration boundary: the rest of the
//! system consumes them but never mutates them.

pub mod environment;
pub mod feature;
pub mod hook;
pub mod project;

pub use environment::{Environment, INTERNAL_BRANCH_PREFIX, RepoSpec};
pub use feature::FeatureBranch;
pub use hook::{Hook, HookScope};
pub use project::Project;
