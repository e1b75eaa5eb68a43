//! Project domain type

use serde::{Deserialize, Serialize};

use super::environment::Environment;

/// A named bundle of environments. Supplied by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project name, first segment of every derived branch prefix
    pub name: String,

    /// Environments belonging to this project
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl Project {
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }
}
