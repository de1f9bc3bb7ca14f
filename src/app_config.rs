//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file.

use thiserror::Error;
use tracing::debug;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn runtime_dir() -> Option<PathBuf> {
    if let Some(path) = dirs::runtime_dir() {
        return Some(path.join("fs-proxy"));
    }

    dirs::home_dir().map(|home| home.join(".local").join("share").join("fs-proxy"))
}

fn default_socket_path() -> PathBuf {
    runtime_dir().map_or_else(
        || PathBuf::from("/tmp/fs-proxy/fs-proxy.sock"),
        |rd| rd.join("fs-proxy.sock"),
    )
}

fn default_path_cache_capacity() -> usize {
    fs_proxy::cache::DEFAULT_CAPACITY
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Unix socket the service listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Maximum number of resolved paths kept in the path cache.
    #[serde(default = "default_path_cache_capacity")]
    pub path_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            path_cache_capacity: default_path_cache_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.socket_path.parent().is_none() {
            errors.push(format!(
                "Socket path '{}' has no parent directory.",
                self.socket_path.display()
            ));
        }

        if self.path_cache_capacity == 0 {
            errors.push("path-cache-capacity must be at least 1.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("fs-proxy").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("fs-proxy").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/fs-proxy/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads config from the external path if given, else the first file found on the search
    /// path, else the defaults.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = external_config_path
            .map(Path::to_path_buf)
            .or_else(Self::find_config_file);
        let config = match found {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.validate().map_err(ConfigError::ValidationErrors)?;
        Ok(config)
    }
}
