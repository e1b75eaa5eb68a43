//! Hook descriptors
//!
//! A hook is a script plus the set of life-cycle scopes it must be
//! installed into. The core ships a fixed default set in addition to any
//! externally configured hooks; materializing the default scripts on
//! disk happens in the scratch directory (see `scratch`).

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Git hook life-cycle scopes a hook script can be installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookScope {
    PreCommit,
    CommitMsg,
    PostCommit,
    PostCheckout,
    PostMerge,
    PrePush,
}

impl HookScope {
    /// All scopes, in the order dispatchers are installed.
    pub const ALL: [HookScope; 6] = [
        HookScope::PreCommit,
        HookScope::CommitMsg,
        HookScope::PostCommit,
        HookScope::PostCheckout,
        HookScope::PostMerge,
        HookScope::PrePush,
    ];

    /// File name git expects for this scope.
    pub fn file_name(&self) -> &'static str {
        match self {
            HookScope::PreCommit => "pre-commit",
            HookScope::CommitMsg => "commit-msg",
            HookScope::PostCommit => "post-commit",
            HookScope::PostCheckout => "post-checkout",
            HookScope::PostMerge => "post-merge",
            HookScope::PrePush => "pre-push",
        }
    }
}

impl std::fmt::Display for HookScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A hook script and the scopes it is installed into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    /// Location of the script to copy
    pub script: PathBuf,

    /// Scopes whose dispatcher directories receive a copy
    pub scopes: BTreeSet<HookScope>,
}

impl Hook {
    pub fn new(script: impl Into<PathBuf>, scopes: impl IntoIterator<Item = HookScope>) -> Self {
        Self {
            script: script.into(),
            scopes: scopes.into_iter().collect(),
        }
    }

    /// File name of the script, used as the installed copy's name.
    pub fn file_name(&self) -> Option<&str> {
        self.script.file_name().and_then(|n| n.to_str())
    }
}
