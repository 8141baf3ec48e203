// Client configuration file: `~/.config/tandem/config.toml`.
//
// Command-line flags override file values; the file overrides built-in
// defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8080";

/// Path to the config file, if a config directory can be determined.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tandem").join("config.toml"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Relay base URL, e.g. `http://relay.local:8080`.
    pub relay_url: Option<String>,
    /// Identity sent with every action.
    pub collaborator: Option<String>,
}

impl CliConfig {
    /// Loads the config file. A missing file yields defaults; a malformed one
    /// is an error.
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Effective connection settings after flags, file and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub relay_url: Url,
    pub collaborator: String,
}

impl Settings {
    pub fn resolve(
        relay_flag: Option<&str>,
        collaborator_flag: Option<&str>,
        file: &CliConfig,
    ) -> Result<Self> {
        Self::resolve_with_env(relay_flag, collaborator_flag, file, |key| std::env::var(key).ok())
    }

    fn resolve_with_env<F>(
        relay_flag: Option<&str>,
        collaborator_flag: Option<&str>,
        file: &CliConfig,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = relay_flag
            .map(ToOwned::to_owned)
            .or_else(|| file.relay_url.clone())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_owned());
        let relay_url =
            Url::parse(&raw_url).with_context(|| format!("invalid relay url `{raw_url}`"))?;

        let collaborator = collaborator_flag
            .map(ToOwned::to_owned)
            .or_else(|| file.collaborator.clone())
            .or_else(|| env("USER"))
            .or_else(|| env("USERNAME"))
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .context("no collaborator identity; pass --as <name> or set `collaborator` in the config file")?;

        Ok(Self {
            relay_url,
            collaborator,
        })
    }
}
