//! Configuration loading
//!
//! Configuration lives at `~/.picobot/config.json` (camelCase keys on the
//! wire). Missing files load as defaults; a handful of `PICOBOT_*`
//! environment variables override the common keys. Paths beginning with `~`
//! are expanded against the home directory.

mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::Result;

impl Config {
    /// The picobot configuration directory (`~/.picobot`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".picobot")
    }

    /// The default config file path (`~/.picobot/config.json`).
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load from a specific path with environment overrides.
    ///
    /// A missing file loads as the default configuration.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PICOBOT_WORKSPACE") {
            self.agents.defaults.workspace = val;
        }
        if let Ok(val) = std::env::var("PICOBOT_MODEL") {
            self.agents.defaults.model = val;
        }
        if let Ok(val) = std::env::var("PICOBOT_OPENAI_API_KEY") {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_key = val;
        }
        if let Ok(val) = std::env::var("PICOBOT_OPENAI_API_BASE") {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_base = val;
        }
        if let Ok(val) = std::env::var("PICOBOT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// The workspace path with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            if rest.is_empty() {
                return home;
            }
            if let Some(tail) = rest.strip_prefix('/') {
                return home.join(tail);
            }
        }
    }
    PathBuf::from(path)
}
