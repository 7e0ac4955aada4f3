//! Deployment scanner
//!
//! Watches one directory and hands every file the deployer does not know yet
//! to [`ArtifactDeployer::install_artifact`]. Failing artifacts are retried on
//! every tick; their error is logged at `warn` the first time (or when it
//! changes) and at `debug` afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use crate::deployer::ArtifactDeployer;
use crate::host::HostContext;
use crate::log_component;
use crate::utils::uri::path_to_uri;
use crate::worker::{Shutdown, Worker};

/// Outcome of one scan pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub installed: usize,
    pub failed: usize,
    /// Failures logged at `warn` this pass (new or changed errors).
    pub reported: usize,
}

/// Regular files directly inside `dir`, sorted. A missing directory is empty.
pub(crate) fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if std::fs::metadata(&path).is_ok_and(|m| m.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Directory watcher feeding the artifact deployer.
pub struct DeploymentScanner {
    deployer: Arc<ArtifactDeployer>,
    host: Arc<dyn HostContext>,
    watched_dir: PathBuf,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    troubled: Mutex<HashMap<String, String>>,
    worker: Mutex<Option<Worker>>,
}

impl DeploymentScanner {
    pub fn new(
        deployer: Arc<ArtifactDeployer>,
        host: Arc<dyn HostContext>,
        watched_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            deployer,
            host,
            watched_dir: watched_dir.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            troubled: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn watched_dir(&self) -> &Path {
        &self.watched_dir
    }

    /// Locations whose last install attempt failed, with the error message.
    pub async fn troubled(&self) -> HashMap<String, String> {
        self.troubled.lock().await.clone()
    }

    /// Run one scan pass.
    pub async fn scan_once(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let files = match list_files(&self.watched_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.watched_dir.display(), error = %e, "Cannot read watched directory");
                return report;
            }
        };

        let mut seen = HashSet::new();
        for path in files {
            let location = path_to_uri(&path);
            seen.insert(location.clone());
            if self.deployer.artifact_by_location(&location).await.is_some() {
                continue;
            }

            match self.deployer.install_artifact(&location).await {
                Ok(record) => {
                    report.installed += 1;
                    if self.troubled.lock().await.remove(&location).is_some() {
                        info!(location = %location, module = %record.module, "Previously failing artifact installed");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    let message = e.to_string();
                    let mut troubled = self.troubled.lock().await;
                    if troubled.get(&location) == Some(&message) {
                        debug!(location = %location, error = %message, "Artifact still failing");
                    } else {
                        log_component!(
                            warn,
                            "scanner",
                            "Artifact install failed",
                            location = location.as_str(),
                            error = message.as_str()
                        );
                        report.reported += 1;
                        troubled.insert(location, message);
                    }
                }
            }
        }

        self.troubled
            .lock()
            .await
            .retain(|location, _| seen.contains(location));
        report
    }

    /// Start the background scan loop.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            warn!("Deployment scanner already running");
            return;
        }
        let scanner = Arc::clone(self);
        *worker = Some(Worker::spawn("deployment-scanner", move |shutdown| {
            scanner.run(shutdown)
        }));
        info!(
            dir = %self.watched_dir.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Deployment scanner started"
        );
    }

    /// Stop the scan loop with a bounded join.
    pub async fn stop(&self) -> bool {
        let worker = self.worker.lock().await.take();
        match worker {
            Some(worker) => worker.stop(self.shutdown_timeout).await,
            None => true,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        loop {
            if !self.host.alive() {
                debug!("Host is gone, deployment scanner exiting");
                return;
            }
            self.scan_once().await;
            if shutdown.sleep(self.poll_interval).await {
                break;
            }
        }
        info!("Deployment scanner stopped");
    }
}
