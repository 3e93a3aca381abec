//! Configuration module for the watch engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TW_` and use double underscores
//! to separate nested levels:
//! - `TW_WATCHER__ACTIVATION_TIMEOUT_MS=10000` sets `watcher.activation_timeout_ms`
//! - `TW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::{SubscriptionProps, WatchError};

const CONFIG_DIR: &str = ".treewatch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Engine settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Subscriptions started by `treewatch watch` when no path is given
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionProps>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherConfig {
    /// How long subscribe waits for the dispatch loop to come up
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `treewatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_activation_timeout_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
            subscriptions: Vec::new(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            activation_timeout_ms: default_activation_timeout_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn activation_timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file, still honoring `TW_` overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting levels; single underscores stay.
            .merge(
                Env::prefixed("TW_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
    }

    /// Find `.treewatch/settings.toml` in the current directory or an ancestor
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WatchError::io(parent, e))?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| WatchError::Config {
            reason: e.to_string(),
        })?;
        std::fs::write(path, toml_string).map_err(|e| WatchError::io(path, e))
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, WatchError> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err(WatchError::Config {
                reason: format!(
                    "{} already exists. Use --force to overwrite",
                    config_path.display()
                ),
            });
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watcher.activation_timeout_ms, 5_000);
        assert_eq!(
            settings.watcher.activation_timeout(),
            Duration::from_secs(5)
        );
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.subscriptions.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[watcher]
activation_timeout_ms = 250

[logging]
default = "info"

[logging.modules]
"treewatch::watcher" = "debug"

[[subscriptions]]
path = "/srv/data"
recursive = "true"
pattern = '.*\.csv$'
kinds = ["ENTRY_CREATE", "ENTRY_MODIFY"]

[[subscriptions]]
path = "/srv/inbox"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watcher.activation_timeout_ms, 250);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["treewatch::watcher"], "debug");
        assert_eq!(settings.subscriptions.len(), 2);

        let first = &settings.subscriptions[0];
        assert!(first.recursive);
        assert_eq!(first.pattern.as_deref(), Some(r".*\.csv$"));

        let second = settings.subscriptions[1].to_request().unwrap();
        assert!(!second.recursive);
        assert!(second.pattern.is_none());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.watcher.activation_timeout_ms = 1_234;
        settings
            .subscriptions
            .push(SubscriptionProps::new("/var/spool"));

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[logging]\ndefault = \"error\"\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        assert_eq!(settings.logging.default, "error");
        assert_eq!(settings.watcher.activation_timeout_ms, 5_000);
        assert_eq!(settings.version, 1);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
