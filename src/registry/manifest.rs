//! Package manifests.
//!
//! A deployable package is a zip archive with a `module.toml` entry at its
//! root:
//!
//! ```toml
//! [module]
//! id = "org.example.hello"
//! version = "1.0.0"
//! # fragment_host = "org.example.core"
//! # package = true
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// Archive entry holding the manifest.
pub const MANIFEST_ENTRY: &str = "module.toml";

/// Manifests larger than this are rejected.
const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

fn default_version() -> String {
    "0.0.0".to_string()
}

/// The `[module]` table of a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Module identity. Required for a package to be deployable.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Host module a fragment attaches to.
    #[serde(default)]
    pub fragment_host: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Marks an application package, claimed by the package engine.
    #[serde(default)]
    pub package: bool,
}

#[derive(Deserialize)]
struct ManifestFile {
    module: Option<Manifest>,
}

impl Manifest {
    /// Parse manifest text. A file without a `[module]` table has no identity.
    pub fn parse(content: &str) -> Result<Self> {
        let file: ManifestFile =
            toml::from_str(content).map_err(|e| DeployError::Manifest(e.to_string()))?;
        Ok(file.module.unwrap_or(Manifest {
            id: None,
            version: default_version(),
            fragment_host: None,
            description: None,
            package: false,
        }))
    }

    /// The declared identity, ignoring blank values.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_host
            .as_deref()
            .is_some_and(|host| !host.trim().is_empty())
    }
}

/// Read the manifest of the package at `path`.
///
/// Returns `Ok(None)` when the archive has no manifest entry, and an error when
/// the file is not a readable archive or the manifest does not parse.
pub fn read_manifest(path: &Path) -> Result<Option<Manifest>> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.size() > MAX_MANIFEST_BYTES {
        return Err(DeployError::Manifest(format!(
            "{} too large ({} bytes) in {}",
            MANIFEST_ENTRY,
            entry.size(),
            path.display()
        )));
    }
    let mut content = String::new();
    entry.take(MAX_MANIFEST_BYTES).read_to_string(&mut content)?;
    Manifest::parse(&content).map(Some)
}

/// Write a package archive with the given manifest text at `path`.
#[cfg(test)]
pub(crate) fn write_package(path: &Path, manifest: &str) {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file(MANIFEST_ENTRY, options).unwrap();
    zip.write_all(manifest.as_bytes()).unwrap();
    zip.start_file("payload.bin", options).unwrap();
    zip.write_all(b"payload").unwrap();
    zip.finish().unwrap();
}
