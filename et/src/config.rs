//! Configuration types and loading
//!
//! The configuration supplies the read-only project/environment/
//! repository tree, the git binary, and the storage locations. Loading
//! follows a fallback chain: explicit path, project-local file, user
//! config directory, built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Environment, Project};

/// Configuration errors. `is_fatal()` marks the ones that should end
/// the session instead of merely being reported.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown environment '{0}' (expected <project>/<environment>)")]
    UnknownEnvironment(String),

    #[error("failed to create scratch directory under {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Unrecoverable at startup; the caller should terminate the
    /// session after displaying the error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConfigError::Scratch { .. })
    }
}

/// Main envtree configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Git binary configuration
    pub git: GitConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// Projects with their environments and repositories
    pub projects: Vec<Project>,
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".envtree.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("envtree").join("envtree.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Log level from the config file, read before logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.wire();
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Fill in the owning-project back-references the file format does
    /// not repeat per environment.
    fn wire(&mut self) {
        for project in &mut self.projects {
            for env in &mut project.environments {
                env.project = project.name.clone();
            }
        }
    }

    /// Look up an environment by its qualified `project/environment`
    /// name.
    pub fn find_environment(&self, qualified: &str) -> Result<&Environment, ConfigError> {
        let Some((project_name, env_name)) = qualified.split_once('/') else {
            return Err(ConfigError::UnknownEnvironment(qualified.to_string()));
        };
        self.projects
            .iter()
            .find(|p| p.name == project_name)
            .and_then(|p| p.environment(env_name))
            .ok_or_else(|| ConfigError::UnknownEnvironment(qualified.to_string()))
    }
}

/// Git binary location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Path to the git binary
    pub binary: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory repositories are cloned under, per project
    #[serde(rename = "clones-dir")]
    pub clones_dir: PathBuf,

    /// Root for the session's scratch directory
    #[serde(rename = "scratch-dir")]
    pub scratch_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            clones_dir: data.join("envtree").join("repos"),
            scratch_dir: std::env::temp_dir().join("envtree"),
        }
    }
}
