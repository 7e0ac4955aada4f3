//! Artifact deployer
//!
//! Keeps a dynamic list of [`DeploymentEngine`]s, installs artifacts through
//! the best-scoring one, and runs a background poller that retires artifacts
//! whose backing file disappeared and refreshes the active ones.
//!
//! # Concurrency
//!
//! The engine list and both record indices are mutated by the poller and by
//! arbitrary callers of [`ArtifactDeployer::install_artifact`]. Engines are read
//! through snapshots cloned under a short read lock, so registration may happen
//! while a poll is in flight. When both indices are locked, `by_location` is
//! always taken before `by_module`.

mod record;

pub use record::{ArtifactRecord, DeployerEvent};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use crate::engine::DeploymentEngine;
use crate::error::{DeployError, Result};
use crate::host::HostContext;
use crate::registry::local::compare_versions;
use crate::registry::{ModuleId, ModuleState};
use crate::utils::uri::valid_file;
use crate::worker::{Shutdown, Worker};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Outcome of one poll pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Records retired because their file disappeared.
    pub removed: usize,
    /// Records whose module reported an update on refresh.
    pub refreshed: usize,
    /// Records dropped because the module was gone or failed to refresh.
    pub evicted: usize,
}

/// Orchestrates engines, artifact records and the background poller.
pub struct ArtifactDeployer {
    host: Arc<dyn HostContext>,
    engines: RwLock<Vec<Arc<dyn DeploymentEngine>>>,
    by_location: RwLock<HashMap<String, Arc<ArtifactRecord>>>,
    by_module: RwLock<HashMap<ModuleId, Arc<ArtifactRecord>>>,
    install_gate: Mutex<()>,
    events: broadcast::Sender<DeployerEvent>,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl ArtifactDeployer {
    pub fn new(host: Arc<dyn HostContext>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            host,
            engines: RwLock::new(Vec::new()),
            by_location: RwLock::new(HashMap::new()),
            by_module: RwLock::new(HashMap::new()),
            install_gate: Mutex::new(()),
            events,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
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

    // ------------------------------------------------------------------
    // Engines
    // ------------------------------------------------------------------

    /// Register an engine. An engine with the same name is replaced in place,
    /// keeping its position in the tie-break order.
    pub async fn register_engine(&self, engine: Arc<dyn DeploymentEngine>) {
        let mut engines = self.engines.write().await;
        let name = engine.name().to_string();
        match engines.iter().position(|e| e.name() == name) {
            Some(index) => {
                warn!(engine = %name, "Replacing already registered deployment engine");
                engines[index] = engine;
            }
            None => {
                info!(engine = %name, "Deployment engine registered");
                engines.push(engine);
            }
        }
    }

    /// Remove an engine. Artifacts it deployed stay recorded but are skipped
    /// by the poller until an engine with the same name returns.
    pub async fn unregister_engine(&self, name: &str) -> bool {
        let mut engines = self.engines.write().await;
        let before = engines.len();
        engines.retain(|e| e.name() != name);
        let removed = engines.len() != before;
        if removed {
            info!(engine = %name, "Deployment engine unregistered");
        }
        removed
    }

    /// Registered engine names, in registration order.
    pub async fn engines(&self) -> Vec<String> {
        let engines = self.engines.read().await;
        engines.iter().map(|e| e.name().to_string()).collect()
    }

    async fn engine_snapshot(&self) -> Vec<Arc<dyn DeploymentEngine>> {
        self.engines.read().await.clone()
    }

    async fn find_engine(&self, name: &str) -> Option<Arc<dyn DeploymentEngine>> {
        let engines = self.engines.read().await;
        engines.iter().find(|e| e.name() == name).cloned()
    }

    /// The engine with the strictly highest score; the first registered wins a tie.
    async fn select_engine(&self, location: &str) -> Option<Arc<dyn DeploymentEngine>> {
        let mut best: Option<(u32, Arc<dyn DeploymentEngine>)> = None;
        for engine in self.engine_snapshot().await {
            let score = engine.compatible_artifact(location).await;
            debug!(engine = engine.name(), location, score, "Engine compatibility");
            if score > best.as_ref().map_or(0, |(s, _)| *s) {
                best = Some((score, engine));
            }
        }
        best.map(|(_, engine)| engine)
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Install the artifact at `location` through the best-scoring engine.
    ///
    /// Returns the existing record when the location is already deployed.
    pub async fn install_artifact(&self, location: &str) -> Result<Arc<ArtifactRecord>> {
        let _gate = self.install_gate.lock().await;

        if valid_file(location).is_none() {
            return Err(DeployError::InvalidArtifact(location.to_string()));
        }
        if let Some(existing) = self.artifact_by_location(location).await {
            return Ok(existing);
        }
        let engine = self
            .select_engine(location)
            .await
            .ok_or_else(|| DeployError::NoCompatibleEngine(location.to_string()))?;

        let properties = record::deployment_properties(location, engine.name());
        let module = engine.install(location, properties.clone()).await?;

        let record = Arc::new(ArtifactRecord::new(
            location,
            module,
            engine.name(),
            properties,
        ));
        {
            let mut by_location = self.by_location.write().await;
            let mut by_module = self.by_module.write().await;
            if let Some(owner) = by_module.get(&record.module.id) {
                return Err(DeployError::AlreadyDeployed(format!(
                    "{} (module {} already deployed from {})",
                    location, record.module.id, owner.location
                )));
            }
            by_location.insert(record.location.clone(), Arc::clone(&record));
            by_module.insert(record.module.id, Arc::clone(&record));
        }

        info!(
            location,
            module = %record.module,
            engine = %record.engine,
            "Artifact deployed"
        );
        let _ = self.events.send(DeployerEvent::Deployed(Arc::clone(&record)));
        Ok(record)
    }

    /// Drop a record from both indices, unless it was already replaced.
    async fn evict(&self, record: &Arc<ArtifactRecord>) -> bool {
        let removed = {
            let mut by_location = self.by_location.write().await;
            let mut by_module = self.by_module.write().await;
            let owned = by_location
                .get(&record.location)
                .is_some_and(|r| Arc::ptr_eq(r, record));
            if owned {
                by_location.remove(&record.location);
                by_module.remove(&record.module.id);
            }
            owned
        };
        if removed {
            debug!(location = %record.location, module = %record.module.id, "Artifact record evicted");
            let _ = self.events.send(DeployerEvent::Undeployed(Arc::clone(record)));
        }
        removed
    }

    pub async fn artifact_by_location(&self, location: &str) -> Option<Arc<ArtifactRecord>> {
        self.by_location.read().await.get(location).cloned()
    }

    pub async fn artifact_by_module(&self, id: ModuleId) -> Option<Arc<ArtifactRecord>> {
        self.by_module.read().await.get(&id).cloned()
    }

    /// Look a record up by module id, optionally pinned to a version. Without
    /// a version the highest deployed version wins.
    pub async fn artifact_by_name(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Option<Arc<ArtifactRecord>> {
        let by_module = self.by_module.read().await;
        let candidates = by_module
            .values()
            .filter(|r| r.module.name == name)
            .filter(|r| version.map_or(true, |v| r.module.version == v));
        candidates
            .max_by(|a, b| compare_versions(&a.module.version, &b.module.version))
            .cloned()
    }

    /// Snapshot of every record, ordered by location.
    pub async fn artifacts(&self) -> Vec<Arc<ArtifactRecord>> {
        let mut records: Vec<_> = self.by_location.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.location.cmp(&b.location));
        records
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployerEvent> {
        self.events.subscribe()
    }

    async fn record_and_engine(
        &self,
        id: ModuleId,
    ) -> Result<Option<(Arc<ArtifactRecord>, Arc<dyn DeploymentEngine>)>> {
        let Some(record) = self.artifact_by_module(id).await else {
            return Ok(None);
        };
        let engine = self
            .find_engine(&record.engine)
            .await
            .ok_or_else(|| DeployError::EngineNotFound(record.engine.clone()))?;
        Ok(Some((record, engine)))
    }

    /// Lifecycle state through the record's engine; unknown modules read as
    /// `Uninstalled`.
    pub async fn artifact_state(&self, id: ModuleId) -> ModuleState {
        match self.record_and_engine(id).await {
            Ok(Some((record, engine))) => engine.state(&record.module).await,
            Ok(None) => ModuleState::Uninstalled,
            Err(e) => {
                debug!(module = %id, error = %e, "No engine to query state");
                ModuleState::Uninstalled
            }
        }
    }

    /// Update the artifact. A failed update evicts the stale record.
    pub async fn update_artifact(&self, id: ModuleId) -> Result<bool> {
        let Some((record, engine)) = self.record_and_engine(id).await? else {
            return Ok(false);
        };
        match engine.update(&record.module).await {
            Ok(updated) => Ok(updated),
            Err(e) if e.is_module_gone() => {
                self.evict(&record).await;
                Ok(false)
            }
            Err(e) => {
                warn!(location = %record.location, error = %e, "Update failed, dropping artifact record");
                self.evict(&record).await;
                Err(e)
            }
        }
    }

    /// Refresh the artifact. A failed refresh evicts the stale record.
    pub async fn refresh_artifact(&self, id: ModuleId) -> Result<bool> {
        let Some((record, engine)) = self.record_and_engine(id).await? else {
            return Ok(false);
        };
        match engine.refresh(&record.module).await {
            Ok(refreshed) => Ok(refreshed),
            Err(e) if e.is_module_gone() => {
                self.evict(&record).await;
                Ok(false)
            }
            Err(e) => {
                warn!(location = %record.location, error = %e, "Refresh failed, dropping artifact record");
                self.evict(&record).await;
                Err(e)
            }
        }
    }

    /// Uninstall the artifact. Unknown modules return `Ok(false)`.
    pub async fn uninstall_artifact(&self, id: ModuleId) -> Result<bool> {
        let Some((record, engine)) = self.record_and_engine(id).await? else {
            return Ok(false);
        };
        match engine.uninstall(&record.module).await {
            Ok(uninstalled) => {
                self.evict(&record).await;
                info!(location = %record.location, module = %record.module, "Artifact uninstalled");
                Ok(uninstalled)
            }
            Err(e) if e.is_module_gone() => {
                self.evict(&record).await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Poller
    // ------------------------------------------------------------------

    /// Start the background poller.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            warn!("Artifact deployer already running");
            return;
        }
        let deployer = Arc::clone(self);
        *worker = Some(Worker::spawn("artifact-deployer", move |shutdown| {
            deployer.run(shutdown)
        }));
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Artifact deployer started"
        );
    }

    /// Stop the poller with a bounded join. Returns `false` if it had to be
    /// left detached.
    pub async fn stop(&self) -> bool {
        let worker = self.worker.lock().await.take();
        match worker {
            Some(worker) => worker.stop(self.shutdown_timeout).await,
            None => true,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        loop {
            if shutdown.sleep(self.poll_interval).await {
                break;
            }
            if !self.host.alive() {
                debug!("Host is gone, artifact poller exiting");
                return;
            }
            self.poll_once().await;
        }
        info!("Artifact deployer stopped");
    }

    /// Run one poll pass over a snapshot of the records.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        let records: Vec<_> = self.by_location.read().await.values().cloned().collect();

        for record in records {
            if !self.host.alive() {
                return report;
            }
            // Without its engine nothing can retire the module, so keep the
            // record until the engine is registered again.
            let Some(engine) = self.find_engine(&record.engine).await else {
                debug!(location = %record.location, engine = %record.engine, "Engine not registered, skipping");
                continue;
            };

            if valid_file(&record.location).is_none() {
                match engine.uninstall(&record.module).await {
                    Ok(_) => {}
                    Err(e) if e.is_module_gone() => {}
                    Err(e) => {
                        warn!(location = %record.location, error = %e, "Uninstall of removed artifact failed")
                    }
                }
                if self.evict(&record).await {
                    info!(location = %record.location, module = %record.module, "Artifact removed");
                    report.removed += 1;
                }
                continue;
            }

            match engine.state(&record.module).await {
                ModuleState::Uninstalled => {
                    if self.evict(&record).await {
                        report.evicted += 1;
                    }
                }
                ModuleState::Active => match engine.refresh(&record.module).await {
                    Ok(true) => {
                        info!(location = %record.location, module = %record.module, "Artifact refreshed");
                        report.refreshed += 1;
                    }
                    Ok(false) => {}
                    Err(e) if e.is_module_gone() => {
                        if self.evict(&record).await {
                            report.evicted += 1;
                        }
                    }
                    Err(e) => {
                        if !self.host.alive() {
                            return report;
                        }
                        warn!(location = %record.location, error = %e, "Refresh failed, dropping artifact record");
                        if let Err(e) = engine.uninstall(&record.module).await {
                            debug!(location = %record.location, error = %e, "Cleanup uninstall failed");
                        }
                        if self.evict(&record).await {
                            report.evicted += 1;
                        }
                    }
                },
                _ => {}
            }
        }
        report
    }
}
