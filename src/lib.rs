//! artifactd - pluggable artifact deployment on top of a module registry
//!
//! Files dropped into watched directories are turned into running modules:
//! the [`BootstrapScanner`] drives the system directory directly against the
//! [`ModuleRegistry`] while the host boots, and the [`DeploymentScanner`]
//! feeds application files to the [`ArtifactDeployer`], which hands each one
//! to the best-scoring [`DeploymentEngine`].

pub mod bootstrap;
pub mod config;
pub mod deployer;
pub mod engine;
pub mod error;
pub mod host;
pub mod registry;
pub mod scanner;
pub mod utils;
pub mod worker;

pub use bootstrap::BootstrapScanner;
pub use config::Config;
pub use deployer::{ArtifactDeployer, ArtifactRecord, DeployerEvent, PollReport};
pub use engine::{DefaultEngine, DeploymentEngine, PackageEngine};
pub use error::{DeployError, Result};
pub use host::{HostContext, HostHandle};
pub use registry::{
    DeploymentProperties, LocalRegistry, Manifest, Module, ModuleEvent, ModuleId, ModuleRegistry,
    ModuleState,
};
pub use scanner::{DeploymentScanner, ScanReport};
