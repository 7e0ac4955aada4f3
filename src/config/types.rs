//! Configuration type definitions for artifactd
//!
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct for artifactd
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System home. Default watched and data directories derive from it.
    pub home: Option<String>,
    /// Early-startup scanner driving the registry directly
    pub bootstrap: BootstrapConfig,
    /// General directory scanner feeding the artifact deployer
    pub scanner: ScannerConfig,
    /// Artifact deployer poller
    pub deployer: DeployerConfig,
    /// Local module registry storage
    pub registry: RegistryConfig,
    /// Bounded join applied when stopping each background worker
    pub shutdown_timeout_secs: u64,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: None,
            bootstrap: BootstrapConfig::default(),
            scanner: ScannerConfig::default(),
            deployer: DeployerConfig::default(),
            registry: RegistryConfig::default(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
        }
    }
}

/// Default poll interval shared by every scanner.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default bounded join for background workers.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Scanner Configuration
// ============================================================================

/// Bootstrap scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory to watch (default `<home>/runtime/system`)
    pub watched_dir: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay before the first scan, 0 for none
    pub initial_delay_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watched_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            initial_delay_ms: 0,
        }
    }
}

/// Deployment scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory to watch (default `<home>/apps`)
    pub watched_dir: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watched_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Artifact deployer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Local registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Where modules.json, properties and module data live (default `<home>/cache`)
    pub data_dir: Option<String>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Append log lines to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Resolved system home (`home`, or the config directory when unset).
    pub fn home_dir(&self) -> PathBuf {
        match &self.home {
            Some(home) => PathBuf::from(home),
            None => Self::dir(),
        }
    }

    pub fn bootstrap_dir(&self) -> PathBuf {
        match &self.bootstrap.watched_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.home_dir().join("runtime").join("system"),
        }
    }

    pub fn scanner_dir(&self) -> PathBuf {
        match &self.scanner.watched_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.home_dir().join("apps"),
        }
    }

    pub fn registry_dir(&self) -> PathBuf {
        match &self.registry.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.home_dir().join("cache"),
        }
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }
}
