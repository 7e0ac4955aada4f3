//! Catch-all engine for generically well-formed packages.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::DeploymentEngine;
use crate::error::{DeployError, Result};
use crate::registry::{DeploymentProperties, Module, ModuleRegistry, ModuleState};
use crate::utils::uri::REFERENCE_PREFIX;

/// Name the default engine registers under.
pub const DEFAULT_ENGINE_NAME: &str = "default-engine(1)";

/// File suffix the default engine accepts (case-insensitive).
pub const PACKAGE_SUFFIX: &str = ".pkg";

/// `true` when `location` names a `.pkg` file, with or without the reference
/// prefix.
pub(crate) fn has_package_suffix(location: &str) -> bool {
    let location = location.strip_prefix(REFERENCE_PREFIX).unwrap_or(location);
    location.to_ascii_lowercase().ends_with(PACKAGE_SUFFIX)
}

/// Handles any `.pkg` archive whose manifest declares a module id, with the
/// lowest nonzero score so more specific engines win.
pub struct DefaultEngine {
    registry: Arc<dyn ModuleRegistry>,
}

impl DefaultEngine {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { registry }
    }

    async fn has_identity(&self, location: &str) -> Result<bool> {
        let manifest = self.registry.manifest(location).await?;
        Ok(manifest.is_some_and(|m| m.identity().is_some()))
    }

    fn wrap(err: DeployError) -> DeployError {
        DeployError::engine(DEFAULT_ENGINE_NAME, err)
    }
}

#[async_trait]
impl DeploymentEngine for DefaultEngine {
    fn name(&self) -> &str {
        DEFAULT_ENGINE_NAME
    }

    async fn compatible_artifact(&self, location: &str) -> u32 {
        if !has_package_suffix(location) {
            return 0;
        }
        match self.has_identity(location).await {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                debug!(location, error = %e, "Manifest unreadable, not compatible");
                0
            }
        }
    }

    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module> {
        let usable = has_package_suffix(location) && self.has_identity(location).await.unwrap_or(false);
        if !usable {
            return Err(DeployError::InvalidArtifact(format!(
                "{}: not a package with a module id",
                location
            )));
        }
        self.registry
            .install(location, properties)
            .await
            .map_err(Self::wrap)
    }

    async fn state(&self, module: &Module) -> ModuleState {
        self.registry.state(module.id).await
    }

    async fn update(&self, module: &Module) -> Result<bool> {
        self.registry.update(module.id).await.map_err(Self::wrap)
    }

    async fn refresh(&self, module: &Module) -> Result<bool> {
        self.registry.refresh(module.id).await.map_err(Self::wrap)
    }

    async fn uninstall(&self, module: &Module) -> Result<bool> {
        self.registry.uninstall(module.id).await.map_err(Self::wrap)
    }
}
