//! Package inspection.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use artifactd::config::Config;
use artifactd::registry::manifest::read_manifest;
use artifactd::utils::uri::path_to_uri;
use artifactd::{DefaultEngine, DeploymentEngine, LocalRegistry, ModuleRegistry, PackageEngine};

pub(crate) async fn cmd_inspect(file: PathBuf) -> Result<()> {
    let path = std::fs::canonicalize(&file)
        .with_context(|| format!("Cannot access {}", file.display()))?;
    let location = path_to_uri(&path);
    println!("Location: {}", location);

    match read_manifest(&path).context("Failed to read package manifest")? {
        Some(manifest) => {
            println!("Manifest:");
            println!("  id            {}", manifest.identity().unwrap_or("--"));
            println!("  version       {}", manifest.version);
            if let Some(host) = &manifest.fragment_host {
                println!("  fragment of   {}", host);
            }
            if let Some(description) = &manifest.description {
                println!("  description   {}", description);
            }
            if manifest.package {
                println!("  package       yes");
            }
        }
        None => println!("Manifest: none"),
    }

    let config = Config::load().context("Failed to load configuration")?;
    let registry: Arc<dyn ModuleRegistry> = Arc::new(
        LocalRegistry::open(config.registry_dir()).context("Failed to open module registry")?,
    );
    let engines: Vec<Arc<dyn DeploymentEngine>> = vec![
        Arc::new(DefaultEngine::new(registry.clone())),
        Arc::new(PackageEngine::new(registry)),
    ];

    println!();
    println!("Engines:");
    for engine in &engines {
        let score = engine.compatible_artifact(&location).await;
        println!("  {:<24} {}", engine.name(), score);
    }
    Ok(())
}
