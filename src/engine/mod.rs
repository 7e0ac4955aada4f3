//! Deployment engines.
//!
//! An engine scores how well it can handle an artifact location and performs
//! install/update/refresh/uninstall by delegating to the module registry. The
//! artifact deployer picks the engine with the highest score for each new
//! artifact and keeps using it for that artifact's lifetime.

pub mod default;
pub mod package;

use async_trait::async_trait;

use crate::error::Result;
use crate::registry::{DeploymentProperties, Module, ModuleState};

pub use default::{DefaultEngine, DEFAULT_ENGINE_NAME};
pub use package::{PackageEngine, PACKAGE_ENGINE_NAME};

/// Pluggable strategy for one kind of artifact.
#[async_trait]
pub trait DeploymentEngine: Send + Sync {
    /// Unique engine name, stored in each deployed module's properties.
    fn name(&self) -> &str;

    /// 0 means "cannot handle"; higher means a more specific match.
    ///
    /// Must be free of side effects and give the same answer for the same
    /// location and content.
    async fn compatible_artifact(&self, location: &str) -> u32;

    /// Install the artifact. `InvalidArtifact` if the content turns out to be
    /// unusable despite a nonzero score.
    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module>;

    async fn state(&self, module: &Module) -> ModuleState;

    /// The following are idempotent: an already-uninstalled or up-to-date
    /// module is not an error.
    async fn update(&self, module: &Module) -> Result<bool>;

    async fn refresh(&self, module: &Module) -> Result<bool>;

    async fn uninstall(&self, module: &Module) -> Result<bool>;
}
