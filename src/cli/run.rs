//! `artifactd run`: the long-running deployment host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use artifactd::config::Config;
use artifactd::{
    ArtifactDeployer, BootstrapScanner, DefaultEngine, DeploymentScanner, HostHandle,
    LocalRegistry, ModuleRegistry, PackageEngine,
};

/// How often to check whether bootstrap has finished.
const BOOTSTRAP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

pub(crate) async fn cmd_run() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let shutdown_timeout = config.shutdown_timeout();

    let host = Arc::new(HostHandle::new());
    let registry = Arc::new(
        LocalRegistry::open(config.registry_dir()).context("Failed to open module registry")?,
    );
    let registry_dyn: Arc<dyn ModuleRegistry> = registry.clone();

    let bootstrap = if config.bootstrap.enabled {
        let dir = config.bootstrap_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let scanner = Arc::new(
            BootstrapScanner::new(registry_dyn.clone(), host.clone(), dir)
                .with_poll_interval(Duration::from_millis(config.bootstrap.poll_interval_ms))
                .with_initial_delay(Duration::from_millis(config.bootstrap.initial_delay_ms))
                .with_shutdown_timeout(shutdown_timeout),
        );
        scanner.start().await;
        Some(scanner)
    } else {
        None
    };

    // The registry has restored its modules: the host is booted.
    host.mark_ready();

    let deployer = Arc::new(
        ArtifactDeployer::new(host.clone())
            .with_poll_interval(Duration::from_millis(config.deployer.poll_interval_ms))
            .with_shutdown_timeout(shutdown_timeout),
    );
    deployer
        .register_engine(Arc::new(DefaultEngine::new(registry_dyn.clone())))
        .await;
    deployer
        .register_engine(Arc::new(PackageEngine::new(registry_dyn)))
        .await;
    deployer.start().await;

    let scanner = if config.scanner.enabled {
        let dir = config.scanner_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let scanner = Arc::new(
            DeploymentScanner::new(deployer.clone(), host.clone(), dir)
                .with_poll_interval(Duration::from_millis(config.scanner.poll_interval_ms))
                .with_shutdown_timeout(shutdown_timeout),
        );
        scanner.start().await;
        Some(scanner)
    } else {
        None
    };

    println!("artifactd running. Press Ctrl+C to stop.");

    let mut bootstrap_reported = bootstrap.is_none();
    let mut check = tokio::time::interval(BOOTSTRAP_CHECK_INTERVAL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received shutdown signal");
                break;
            }
            _ = check.tick(), if !bootstrap_reported => {
                if bootstrap.as_ref().is_some_and(|b| b.is_bootstrap_finished()) {
                    bootstrap_reported = true;
                    println!("Bootstrap finished.");
                }
            }
        }
    }

    let mut clean = true;
    if let Some(scanner) = &scanner {
        clean &= scanner.stop().await;
    }
    clean &= deployer.stop().await;
    registry.shutdown().await;
    host.shutdown();
    if let Some(bootstrap) = &bootstrap {
        clean &= bootstrap.stop().await;
    }

    if clean {
        info!("Shutdown complete");
    } else {
        warn!("Shutdown complete, some workers did not stop in time");
    }
    Ok(())
}
