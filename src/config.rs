use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::hash::HashAlgorithm;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for git-shallow-fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// User-Agent header sent with every request
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Object id format of the remote repository
    #[serde(default)]
    pub object_format: HashAlgorithm,
    /// Directory files are written to when no --output is given
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            request_timeout_secs: defaults::request_timeout_secs(),
            object_format: HashAlgorithm::default(),
            output_dir: None,
        }
    }
}

impl FetchConfig {
    /// Load configuration from the default config file (if present) and
    /// environment variables
    pub fn load() -> Result<Self> {
        let config = match Self::config_file_path() {
            Ok(path) if path.exists() => {
                tracing::debug!("loading git-shallow-fetch config from {:?}", path);
                Self::load_from_file(&path)?
            }
            _ => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `GIT_SHALLOW_FETCH_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(agent) = env::var("GIT_SHALLOW_FETCH_USER_AGENT") {
            self.user_agent = agent;
        }

        if let Ok(timeout) = env::var("GIT_SHALLOW_FETCH_TIMEOUT_SECS") {
            self.request_timeout_secs = timeout
                .parse()
                .context("Failed to parse GIT_SHALLOW_FETCH_TIMEOUT_SECS as u64")?;
        }

        if let Ok(format) = env::var("GIT_SHALLOW_FETCH_OBJECT_FORMAT") {
            self.object_format = format
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Failed to parse GIT_SHALLOW_FETCH_OBJECT_FORMAT")?;
        }

        if let Ok(path) = env::var("GIT_SHALLOW_FETCH_OUTPUT_DIR") {
            self.output_dir = Some(expand_tilde(&PathBuf::from(path)));
        }

        Ok(self)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: FetchConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(ref output_dir) = config.output_dir {
            config.output_dir = Some(expand_tilde(output_dir));
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/git-shallow-fetch/config.yaml"))
            .context("Could not determine home directory for config file")
    }
}

mod defaults {
    pub(crate) fn user_agent() -> String {
        format!("git/2.0 (git-shallow-fetch/{})", env!("CARGO_PKG_VERSION"))
    }

    pub(crate) fn request_timeout_secs() -> u64 {
        60
    }
}
