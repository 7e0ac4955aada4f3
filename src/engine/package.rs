//! Engine for application packages.
//!
//! A package is a regular `.pkg` archive whose manifest sets
//! `package = true`. It outranks the default engine for those archives and
//! leaves every other artifact alone.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::default::has_package_suffix;
use super::DeploymentEngine;
use crate::error::{DeployError, Result};
use crate::registry::{DeploymentProperties, Manifest, Module, ModuleRegistry, ModuleState};

/// Name the package engine registers under.
pub const PACKAGE_ENGINE_NAME: &str = "package-engine(50)";

/// Score for a marked package.
pub const PACKAGE_ENGINE_SCORE: u32 = 50;

pub struct PackageEngine {
    registry: Arc<dyn ModuleRegistry>,
}

impl PackageEngine {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { registry }
    }

    async fn package_manifest(&self, location: &str) -> Result<Option<Manifest>> {
        if !has_package_suffix(location) {
            return Ok(None);
        }
        let manifest = self.registry.manifest(location).await?;
        Ok(manifest.filter(|m| m.package && m.identity().is_some()))
    }

    fn wrap(err: DeployError) -> DeployError {
        DeployError::engine(PACKAGE_ENGINE_NAME, err)
    }
}

#[async_trait]
impl DeploymentEngine for PackageEngine {
    fn name(&self) -> &str {
        PACKAGE_ENGINE_NAME
    }

    async fn compatible_artifact(&self, location: &str) -> u32 {
        match self.package_manifest(location).await {
            Ok(Some(_)) => PACKAGE_ENGINE_SCORE,
            Ok(None) => 0,
            Err(e) => {
                debug!(location, error = %e, "Manifest unreadable, not a package");
                0
            }
        }
    }

    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module> {
        match self.package_manifest(location).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(DeployError::InvalidArtifact(format!(
                    "{}: not a marked package",
                    location
                )))
            }
            Err(e) => return Err(DeployError::InvalidArtifact(format!("{}: {}", location, e))),
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
