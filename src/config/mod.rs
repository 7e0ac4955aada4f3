//! Configuration management for artifactd
//!
//! Configuration is loaded from `~/.artifactd/config.json` with environment
//! variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the artifactd configuration directory path (~/.artifactd)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".artifactd")
    }

    /// Returns the path to the config file (~/.artifactd/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `ARTIFACTD_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ARTIFACTD_HOME") {
            self.home = Some(val);
        }

        // Bootstrap scanner
        if let Ok(val) = std::env::var("ARTIFACTD_BOOTSTRAP_ENABLED") {
            if let Ok(v) = val.parse() {
                self.bootstrap.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("ARTIFACTD_BOOTSTRAP_WATCHED_DIR") {
            self.bootstrap.watched_dir = Some(val);
        }
        if let Ok(val) = std::env::var("ARTIFACTD_BOOTSTRAP_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.bootstrap.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("ARTIFACTD_BOOTSTRAP_INITIAL_DELAY_MS") {
            if let Ok(v) = val.parse() {
                self.bootstrap.initial_delay_ms = v;
            }
        }

        // Deployment scanner
        if let Ok(val) = std::env::var("ARTIFACTD_SCANNER_ENABLED") {
            if let Ok(v) = val.parse() {
                self.scanner.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("ARTIFACTD_SCANNER_WATCHED_DIR") {
            self.scanner.watched_dir = Some(val);
        }
        if let Ok(val) = std::env::var("ARTIFACTD_SCANNER_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.scanner.poll_interval_ms = v;
            }
        }

        if let Ok(val) = std::env::var("ARTIFACTD_DEPLOYER_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.deployer.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("ARTIFACTD_REGISTRY_DATA_DIR") {
            self.registry.data_dir = Some(val);
        }
        if let Ok(val) = std::env::var("ARTIFACTD_SHUTDOWN_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.shutdown_timeout_secs = v;
            }
        }

        // Logging
        if let Ok(val) = std::env::var("ARTIFACTD_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ARTIFACTD_LOGGING_FILE") {
            self.logging.file = Some(val);
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
