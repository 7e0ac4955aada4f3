//! JSON persistence for the local registry.
//!
//! Layout under the registry data directory:
//! - `modules.json`: installed-module table
//! - `properties/<sanitized location>.json`: deployment properties per module
//! - `modules/<id>/`: private per-module data area

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DeploymentProperties, Module, ModuleId, ModuleState};
use crate::error::{DeployError, Result};
use crate::utils::uri::sanitize;

/// A persisted module entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredModule {
    pub module: Module,
    pub state: ModuleState,
}

/// The persisted module table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ModuleTable {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub modules: Vec<StoredModule>,
}

impl ModuleTable {
    /// Load from a JSON file. Returns an empty table if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| DeployError::Registry(format!("{}: {}", path.display(), e)))
    }

    /// Save to a JSON file. Creates parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Paths of the registry's on-disk layout.
#[derive(Debug, Clone)]
pub(crate) struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table(&self) -> PathBuf {
        self.root.join("modules.json")
    }

    pub fn properties(&self, location: &str) -> PathBuf {
        self.root
            .join("properties")
            .join(format!("{}.json", sanitize(location)))
    }

    pub fn data_area(&self, id: ModuleId) -> PathBuf {
        self.root.join("modules").join(id.0.to_string())
    }
}

pub(crate) fn load_properties(path: &Path) -> Result<DeploymentProperties> {
    if !path.exists() {
        return Ok(DeploymentProperties::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub(crate) fn save_properties(path: &Path, props: &DeploymentProperties) -> Result<()> {
    write_json(path, props)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Remove a file or directory, ignoring "not found".
pub(crate) fn remove_quietly(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
