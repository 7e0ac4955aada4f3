//! Bookkeeping tying an artifact location to the module an engine produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{props, DeploymentProperties, Module};

/// One deployed artifact. At most one record exists per location and per module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub location: String,
    pub module: Module,
    /// Name of the engine that installed the artifact.
    pub engine: String,
    pub properties: DeploymentProperties,
    pub deployed_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(location: &str, module: Module, engine: &str, properties: DeploymentProperties) -> Self {
        Self {
            location: location.to_string(),
            module,
            engine: engine.to_string(),
            properties,
            deployed_at: Utc::now(),
        }
    }

    /// Location the artifact was deployed from, as stored in its properties.
    pub fn source(&self) -> &str {
        self.properties
            .get(props::SOURCE)
            .map(String::as_str)
            .unwrap_or(&self.location)
    }
}

/// Deployment properties handed to an engine for a new artifact.
pub(crate) fn deployment_properties(location: &str, engine: &str) -> DeploymentProperties {
    let mut properties = DeploymentProperties::new();
    properties.insert(props::DEPLOYMENT_ENGINE.to_string(), engine.to_string());
    properties.insert(props::SOURCE.to_string(), location.to_string());
    properties
}

/// Published when records appear or disappear.
#[derive(Debug, Clone)]
pub enum DeployerEvent {
    Deployed(std::sync::Arc<ArtifactRecord>),
    Undeployed(std::sync::Arc<ArtifactRecord>),
}

impl DeployerEvent {
    pub fn record(&self) -> &ArtifactRecord {
        match self {
            DeployerEvent::Deployed(r) | DeployerEvent::Undeployed(r) => r,
        }
    }
}
