//! Error types for artifactd
//!
//! This module defines the error taxonomy shared by the registry, the
//! deployment engines, the artifact deployer and the directory scanners.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

use crate::registry::ModuleId;

/// The primary error type for artifactd operations.
#[derive(Error, Debug)]
pub enum DeployError {
    /// The artifact location is missing, unreadable or not a file URI.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// No registered engine scored the artifact above zero.
    #[error("Deployment engine not found for: {0}")]
    NoCompatibleEngine(String),

    /// An engine failed to install/update/refresh/uninstall a module.
    #[error("Deployment engine '{engine}' failed: {message}")]
    EngineFailure { engine: String, message: String },

    /// The engine that deployed an artifact is no longer registered.
    #[error("Deployment engine not registered: {0}")]
    EngineNotFound(String),

    /// The location is already deployed through another module record.
    #[error("Artifact already deployed: {0}")]
    AlreadyDeployed(String),

    /// The registry no longer knows the module (concurrent uninstall).
    #[error("Module {0} is gone")]
    ModuleGone(ModuleId),

    /// Module registry errors (lifecycle transitions refused, state corruption).
    #[error("Registry error: {0}")]
    Registry(String),

    /// Package manifest missing or malformed.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Package archive errors
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl DeployError {
    /// Returns `true` when the error only says the module disappeared under us.
    ///
    /// Background pollers treat this as a race with a manual uninstall and
    /// stay quiet about it.
    pub fn is_module_gone(&self) -> bool {
        matches!(self, DeployError::ModuleGone(_))
    }

    /// Wrap any error as a failure of the named engine.
    ///
    /// `ModuleGone` passes through untouched so callers can still tolerate it.
    pub fn engine(engine: &str, err: DeployError) -> DeployError {
        match err {
            DeployError::ModuleGone(_) | DeployError::EngineFailure { .. } => err,
            other => DeployError::EngineFailure {
                engine: engine.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// A specialized `Result` type for artifactd operations.
pub type Result<T> = std::result::Result<T, DeployError>;
