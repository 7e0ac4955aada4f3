//! Module registry: the collaborator that owns modules and their lifecycle.
//!
//! The deployment core never loads or runs modules itself. It asks a
//! [`ModuleRegistry`] to install, update, refresh, resolve, start, stop and
//! uninstall them, and listens to the registry's [`ModuleEvent`] stream for
//! asynchronous lifecycle changes.
//!
//! [`local::LocalRegistry`] is the in-process implementation used by the
//! `artifactd` binary.

pub mod local;
pub mod manifest;
mod store;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

pub use local::LocalRegistry;
pub use manifest::Manifest;

/// Properties stored alongside a deployed module.
pub type DeploymentProperties = BTreeMap<String, String>;

/// Well-known deployment property keys.
pub mod props {
    /// Location the artifact was deployed from.
    pub const SOURCE: &str = "artifact.source";
    /// Name of the engine that deployed the artifact.
    pub const DEPLOYMENT_ENGINE: &str = "artifact.deployment-engine";
    /// Location the registry installed the module from.
    pub const LOCATION: &str = "artifact.location";
    /// Source file modification time (ms since epoch) at the last install/update.
    pub const LAST_MODIFIED: &str = "artifact.last-modified";
    /// Lifecycle state at the last transition.
    pub const STATE: &str = "artifact.state";
}

/// Registry-assigned module identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Module lifecycle state, owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Stopping,
    Active,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "UNINSTALLED",
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::Starting => "STARTING",
            ModuleState::Stopping => "STOPPING",
            ModuleState::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a module as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    /// Identity declared by the package manifest.
    pub name: String,
    pub version: String,
    /// Location (URI) the module was installed from.
    pub location: String,
    /// Fragments resolve against a host module but are never started.
    pub fragment: bool,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.name, self.version, self.id)
    }
}

/// Asynchronous lifecycle notification published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    Installed(Module),
    Resolved(Module),
    Started(Module),
    Stopped(Module),
    Updated(Module),
    Uninstalled(Module),
    /// The hosting process is tearing down; no further events follow.
    HostStopping,
}

impl ModuleEvent {
    /// The module the event is about, if any.
    pub fn module(&self) -> Option<&Module> {
        match self {
            ModuleEvent::Installed(m)
            | ModuleEvent::Resolved(m)
            | ModuleEvent::Started(m)
            | ModuleEvent::Stopped(m)
            | ModuleEvent::Updated(m)
            | ModuleEvent::Uninstalled(m) => Some(m),
            ModuleEvent::HostStopping => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModuleEvent::Installed(_) => "INSTALLED",
            ModuleEvent::Resolved(_) => "RESOLVED",
            ModuleEvent::Started(_) => "STARTED",
            ModuleEvent::Stopped(_) => "STOPPED",
            ModuleEvent::Updated(_) => "UPDATED",
            ModuleEvent::Uninstalled(_) => "UNINSTALLED",
            ModuleEvent::HostStopping => "HOST_STOPPING",
        }
    }
}

/// Install/lifecycle primitives the deployment core drives.
///
/// `update`, `refresh` and `uninstall` are idempotent: on an unknown or
/// already-uninstalled module they return `Ok(false)` instead of failing.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// Install the module found at `location`, storing `properties` with it.
    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module>;

    /// Re-read the module from its location. Returns whether an update happened.
    async fn update(&self, id: ModuleId) -> Result<bool>;

    /// Update the module only if its source changed since the last install/update.
    async fn refresh(&self, id: ModuleId) -> Result<bool>;

    /// Remove the module. Returns `false` when it was already gone.
    async fn uninstall(&self, id: ModuleId) -> Result<bool>;

    /// Ask the registry to resolve an installed module.
    async fn resolve(&self, id: ModuleId) -> Result<()>;

    /// Start a resolved, non-fragment module.
    async fn start(&self, id: ModuleId) -> Result<()>;

    /// Stop an active module, leaving it resolved.
    async fn stop(&self, id: ModuleId) -> Result<()>;

    /// Current lifecycle state; unknown modules report `Uninstalled`.
    async fn state(&self, id: ModuleId) -> ModuleState;

    async fn module(&self, id: ModuleId) -> Option<Module>;

    async fn module_by_location(&self, location: &str) -> Option<Module>;

    async fn properties(&self, id: ModuleId) -> Option<DeploymentProperties>;

    /// Manifest of the package at `location`; `Ok(None)` when it has none.
    async fn manifest(&self, location: &str) -> Result<Option<Manifest>>;

    /// Path of a file inside the module's private data area.
    fn data_file(&self, id: ModuleId, name: &str) -> Result<PathBuf>;

    /// Subscribe to lifecycle notifications.
    fn subscribe(&self) -> broadcast::Receiver<ModuleEvent>;
}
