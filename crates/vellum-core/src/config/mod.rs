//! Configuration management with file persistence

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::Manifest;
use crate::storage::database::default_database_path;

/// Vellum configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSettings {
    /// Run manifest reconciliation automatically at startup
    pub auto_bootstrap: bool,
    /// Optional manifest file overriding the built-in plugin set
    pub manifest_path: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            auto_bootstrap: true,
            manifest_path: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("VELLUM_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("vellum")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if the
    /// file does not exist. `VELLUM_DB` overrides the database path.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(db_path) = env::var("VELLUM_DB") {
            config.database.path = PathBuf::from(db_path);
        }
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Load the plugin manifest this configuration points at, or the
    /// built-in set when none is configured
    pub fn load_manifest(&self) -> anyhow::Result<Manifest> {
        match &self.bootstrap.manifest_path {
            Some(path) => Manifest::from_path(path)
                .with_context(|| format!("Failed to load manifest: {}", path.display())),
            None => Ok(Manifest::builtin()),
        }
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database.path.display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "bootstrap.auto_bootstrap" => Ok(self.bootstrap.auto_bootstrap.to_string()),
            "bootstrap.manifest_path" => Ok(self
                .bootstrap
                .manifest_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(builtin)".to_string())),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `vellum config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = PathBuf::from(value);
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }
            "bootstrap.auto_bootstrap" => {
                self.bootstrap.auto_bootstrap = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "bootstrap.manifest_path" => {
                self.bootstrap.manifest_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `vellum config list` to see available keys.",
                    key
                ))
            }
        }
        Ok(())
    }

    /// All (key, value) pairs, for `vellum config list`
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("database.path", self.database.path.display().to_string()),
            (
                "database.max_connections",
                self.database.max_connections.to_string(),
            ),
            (
                "bootstrap.auto_bootstrap",
                self.bootstrap.auto_bootstrap.to_string(),
            ),
            (
                "bootstrap.manifest_path",
                self.bootstrap
                    .manifest_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(builtin)".to_string()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert!(config.bootstrap.auto_bootstrap);
        assert!(config.bootstrap.manifest_path.is_none());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.bootstrap.auto_bootstrap);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("database.path", "/srv/vellum/vellum.db").unwrap();
        config.set("bootstrap.auto_bootstrap", "false").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.database.path, PathBuf::from("/srv/vellum/vellum.db"));
        assert!(!loaded.bootstrap.auto_bootstrap);
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[bootstrap]\nauto_bootstrap = false\nmanifest_path = \"/etc/vellum/manifest.toml\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.bootstrap.auto_bootstrap);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn get_set_reject_unknown_keys() {
        let mut config = Config::default();
        assert!(config.get("llm.api_key").is_err());
        assert!(config.set("nope", "x").is_err());
    }

    #[test]
    fn max_connections_must_be_positive() {
        let mut config = Config::default();
        assert!(config.set("database.max_connections", "0").is_err());
        assert!(config.set("database.max_connections", "abc").is_err());
        config.set("database.max_connections", "8").unwrap();
        assert_eq!(config.database.max_connections, 8);
    }

    #[test]
    fn load_manifest_defaults_to_builtin() {
        let config = Config::default();
        let manifest = config.load_manifest().unwrap();
        assert!(!manifest.is_empty());
    }
}
