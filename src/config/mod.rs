//! Configuration management for ubiq480

pub mod schema;

pub use schema::Config;

use crate::error::{UbiqError, UbiqResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project-local config file name
pub const LOCAL_CONFIG: &str = "ubiq480.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Find the config file: `./ubiq480.toml`, then the user config dir
    pub fn new() -> Self {
        let local = PathBuf::from(LOCAL_CONFIG);
        let config_path = if local.exists() {
            Some(local)
        } else {
            Self::default_config_path().filter(|p| p.exists())
        };
        Self { config_path }
    }

    /// Use an explicit path; it must exist
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// `~/.config/ubiq480/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ubiq480").join("config.toml"))
    }

    /// Load configuration, falling back to defaults when no file was found
    pub async fn load(&self) -> UbiqResult<Config> {
        match &self.config_path {
            Some(path) => self.load_from_file(path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> UbiqResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            UbiqError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        debug!("Loaded config from {}", path.display());
        toml::from_str(&content).map_err(|e| UbiqError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Render the effective configuration as TOML
    pub fn render(config: &Config) -> UbiqResult<String> {
        Ok(toml::to_string_pretty(config)?)
    }

    /// Config file in use, if any
    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ubiq480.toml");
        std::fs::write(&path, "[general]\nassume_yes = true\n").unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert!(config.general.assume_yes);
        assert_eq!(config.rootfs.suite, "bookworm");
    }

    #[tokio::test]
    async fn malformed_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "[general\nassume_yes = ").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, UbiqError::ConfigInvalid { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn missing_explicit_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = ConfigManager::with_path(temp.path().join("nope.toml"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, UbiqError::ConfigInvalid { .. }));
    }

    #[test]
    fn render_roundtrips_through_toml() {
        let rendered = ConfigManager::render(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
