//! Bootstrap scanner
//!
//! Early-startup watcher that drives one directory straight against the
//! [`ModuleRegistry`], before any artifact deployer exists. Each tick:
//!
//! 1. retires modules whose file vanished and updates (or reinstalls) the ones
//!    whose file changed, using the persisted side-channel in [`timestamp`];
//! 2. installs new files, or links files the registry already knows from a
//!    previous run;
//! 3. nudges every installing module towards `Active` (fragments stop at
//!    `Resolved`).
//!
//! Bootstrap is finished once nothing is left installing or linked. A
//! `Started` notification settles a module immediately, and `HostStopping`
//! ends the scan loop.

mod state;
pub mod timestamp;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use crate::host::HostContext;
use crate::log_component;
use crate::registry::{DeploymentProperties, Module, ModuleEvent, ModuleId, ModuleRegistry, ModuleState};
use crate::scanner::list_files;
use crate::utils::uri::{modified_millis, path_to_uri, valid_file};
use crate::worker::{Canceller, Shutdown, Worker};

use state::ScanState;
use timestamp::TimestampStore;

/// A watched location and what the last attempt produced.
#[derive(Debug, Clone)]
struct Tracked {
    /// `None` when the last install attempt failed.
    module: Option<Module>,
    /// File modification time at the last install attempt.
    attempted_mtime: Option<i64>,
}

/// What [`BootstrapScanner::update_if_changed`] did with a tracked module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Unchanged,
    Updated,
    /// The module is gone: uninstalled after a failed update, or unknown to
    /// the registry.
    Dropped,
}

/// Directory scanner used while the host boots.
pub struct BootstrapScanner {
    registry: Arc<dyn ModuleRegistry>,
    host: Arc<dyn HostContext>,
    watched_dir: PathBuf,
    poll_interval: Duration,
    initial_delay: Duration,
    shutdown_timeout: Duration,
    timestamps: TimestampStore,
    tracked: Mutex<BTreeMap<String, Tracked>>,
    state: Mutex<ScanState>,
    finished: AtomicBool,
    ready_seen: AtomicBool,
    created: Instant,
    workers: Mutex<Vec<Worker>>,
}

impl BootstrapScanner {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        host: Arc<dyn HostContext>,
        watched_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            timestamps: TimestampStore::new(Arc::clone(&registry)),
            registry,
            host,
            watched_dir: watched_dir.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            initial_delay: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            tracked: Mutex::new(BTreeMap::new()),
            state: Mutex::new(ScanState::default()),
            finished: AtomicBool::new(false),
            ready_seen: AtomicBool::new(false),
            created: Instant::now(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait this long before the first scan.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn watched_dir(&self) -> &Path {
        &self.watched_dir
    }

    /// `true` once a tick ended with nothing installing or linked. Never
    /// goes back to `false`.
    pub fn is_bootstrap_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub async fn installing(&self) -> Vec<ModuleId> {
        self.state.lock().await.installing()
    }

    pub async fn linked(&self) -> Vec<ModuleId> {
        self.state.lock().await.linked()
    }

    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    /// Start the scan loop and the lifecycle listener.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            warn!("Bootstrap scanner already running");
            return;
        }
        // Subscribe before the first scan so no Started event is missed.
        let events = self.registry.subscribe();

        let scanner = Arc::clone(self);
        let scan = Worker::spawn("bootstrap-scanner", move |shutdown| scanner.run(shutdown));
        let canceller = scan.canceller();
        let listener = Arc::clone(self);
        let listen = Worker::spawn("bootstrap-listener", move |shutdown| {
            listener.listen(events, canceller, shutdown)
        });
        workers.push(scan);
        workers.push(listen);

        let dir = self.watched_dir.display().to_string();
        log_component!(
            info,
            "bootstrap",
            "Bootstrap scanner started",
            dir = dir.as_str(),
            interval_ms = self.poll_interval.as_millis() as u64
        );
    }

    /// Stop both workers, each with a bounded join.
    pub async fn stop(&self) -> bool {
        let workers = std::mem::take(&mut *self.workers.lock().await);
        let mut clean = true;
        for worker in workers {
            clean &= worker.stop(self.shutdown_timeout).await;
        }
        clean
    }

    pub async fn is_running(&self) -> bool {
        self.workers.lock().await.iter().any(|w| !w.is_finished())
    }

    async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        if !self.initial_delay.is_zero() && shutdown.sleep(self.initial_delay).await {
            return;
        }
        loop {
            if !self.host.alive() {
                debug!("Host is gone, bootstrap scanner exiting");
                return;
            }
            self.scan_once().await;
            if shutdown.sleep(self.poll_interval).await {
                break;
            }
        }
        info!("Bootstrap scanner stopped");
    }

    async fn listen(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ModuleEvent>,
        scan: Canceller,
        mut shutdown: Shutdown,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if !self.on_event(&event).await {
                        scan.cancel();
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Bootstrap listener lagged behind module events");
                }
                Err(RecvError::Closed) => {
                    scan.cancel();
                    break;
                }
            }
        }
    }

    /// React to a lifecycle notification. Returns `false` when scanning must end.
    async fn on_event(&self, event: &ModuleEvent) -> bool {
        match event {
            ModuleEvent::Started(module) => {
                if self.state.lock().await.settle(module.id) {
                    debug!(module = %module, "Bootstrap module active (notified)");
                }
                true
            }
            ModuleEvent::HostStopping => {
                info!("Host stopping, ending bootstrap scan");
                false
            }
            _ => true,
        }
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Run one tick. Returns `false` when skipped because the host is not
    /// ready yet.
    pub async fn scan_once(&self) -> bool {
        if !self.host.ready() {
            debug!(
                waited_ms = self.created.elapsed().as_millis() as u64,
                "Waiting for host to finish booting"
            );
            return false;
        }
        if !self.ready_seen.swap(true, Ordering::SeqCst) {
            info!(
                waited_ms = self.created.elapsed().as_millis() as u64,
                dir = %self.watched_dir.display(),
                "Host ready, bootstrap scanning"
            );
        }

        self.scan_removed_or_updated().await;
        self.scan_added().await;
        self.advance().await;

        let settled = self.state.lock().await.is_settled();
        if settled && !self.finished.swap(true, Ordering::SeqCst) {
            log_component!(info, "bootstrap", "Bootstrap finished");
        }
        true
    }

    async fn scan_removed_or_updated(&self) {
        let snapshot: Vec<(String, Tracked)> = self
            .tracked
            .lock()
            .await
            .iter()
            .map(|(location, tracked)| (location.clone(), tracked.clone()))
            .collect();

        for (location, tracked) in snapshot {
            match (valid_file(&location), tracked.module) {
                (None, Some(module)) => match self.registry.uninstall(module.id).await {
                    Ok(_) => {
                        info!(location = %location, module = %module, "Bootstrap module removed");
                        self.tracked.lock().await.remove(&location);
                        self.state.lock().await.settle(module.id);
                    }
                    Err(e) => {
                        warn!(location = %location, module = %module, error = %e, "Failed to uninstall removed module");
                    }
                },
                (None, None) => {
                    self.tracked.lock().await.remove(&location);
                }
                (Some(path), None) => {
                    if modified_millis(&path) != tracked.attempted_mtime {
                        self.install_fresh(&location, &path).await;
                    }
                }
                (Some(path), Some(module)) => {
                    if self.registry.state(module.id).await == ModuleState::Uninstalled {
                        info!(location = %location, module = %module, "Module was uninstalled, reinstalling");
                        self.state.lock().await.settle(module.id);
                        self.install_fresh(&location, &path).await;
                    } else {
                        self.update_if_changed(&location, &path, &module).await;
                    }
                }
            }
        }
    }

    async fn scan_added(&self) {
        let files = match list_files(&self.watched_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.watched_dir.display(), error = %e, "Cannot read bootstrap directory");
                return;
            }
        };

        for path in files {
            let location = path_to_uri(&path);
            if self.tracked.lock().await.contains_key(&location) {
                continue;
            }
            let Some(module) = self.registry.module_by_location(&location).await else {
                self.install_fresh(&location, &path).await;
                continue;
            };

            info!(location = %location, module = %module, "Linking");
            self.tracked.lock().await.insert(
                location.clone(),
                Tracked {
                    module: Some(module.clone()),
                    attempted_mtime: modified_millis(&path),
                },
            );
            if self.update_if_changed(&location, &path, &module).await == Change::Dropped {
                continue;
            }

            let active = self.registry.state(module.id).await == ModuleState::Active;
            let mut state = self.state.lock().await;
            if !active && !module.fragment && !state.is_installing(module.id) {
                state.mark_linked(module.id);
            }
        }
    }

    async fn install_fresh(&self, location: &str, path: &Path) {
        let mtime = modified_millis(path);
        match self
            .registry
            .install(location, DeploymentProperties::new())
            .await
        {
            Ok(module) => {
                if let Some(mtime) = mtime {
                    if let Err(e) = self.timestamps.write(&module, mtime) {
                        warn!(module = %module, error = %e, "Failed to persist module timestamp");
                    }
                }
                info!(location, module = %module, "Bootstrap module installed");
                self.state.lock().await.mark_installing(module.id);
                self.tracked.lock().await.insert(
                    location.to_string(),
                    Tracked {
                        module: Some(module),
                        attempted_mtime: mtime,
                    },
                );
            }
            Err(e) => {
                let message = e.to_string();
                log_component!(
                    warn,
                    "bootstrap",
                    "Bootstrap install failed",
                    location = location,
                    error = message.as_str()
                );
                self.tracked.lock().await.insert(
                    location.to_string(),
                    Tracked {
                        module: None,
                        attempted_mtime: mtime,
                    },
                );
            }
        }
    }

    /// Update `module` if its file changed since the persisted timestamp.
    async fn update_if_changed(&self, location: &str, path: &Path, module: &Module) -> Change {
        let Some(current) = modified_millis(path) else {
            return Change::Unchanged;
        };
        let stored = self.timestamps.read(module);
        if stored == Some(current) {
            return Change::Unchanged;
        }

        debug!(module = %module, ?stored, current, "Bootstrap module changed");
        if let Err(e) = self.timestamps.write(module, current) {
            warn!(module = %module, error = %e, "Failed to persist module timestamp");
        }
        self.state.lock().await.mark_installing(module.id);

        match self.registry.update(module.id).await {
            Ok(true) => {
                info!(location, module = %module, "Bootstrap module updated");
                Change::Updated
            }
            Ok(false) => {
                self.state.lock().await.settle(module.id);
                self.tracked.lock().await.insert(
                    location.to_string(),
                    Tracked {
                        module: None,
                        attempted_mtime: None,
                    },
                );
                Change::Dropped
            }
            Err(e) => {
                warn!(location, module = %module, error = %e, "Bootstrap update failed, uninstalling");
                if let Err(e) = self.registry.uninstall(module.id).await {
                    debug!(module = %module, error = %e, "Cleanup uninstall failed");
                }
                self.tracked.lock().await.remove(location);
                self.state.lock().await.settle(module.id);
                Change::Dropped
            }
        }
    }

    /// Push installing modules forward and drop linked ones that settled.
    async fn advance(&self) {
        let (installing, linked) = {
            let state = self.state.lock().await;
            (state.installing(), state.linked())
        };

        for id in installing {
            let Some(module) = self.registry.module(id).await else {
                self.state.lock().await.settle(id);
                continue;
            };
            match self.registry.state(id).await {
                ModuleState::Installed => {
                    if let Err(e) = self.registry.resolve(id).await {
                        debug!(module = %module, error = %e, "Resolve request failed");
                    }
                }
                ModuleState::Resolved if module.fragment => {
                    if self.state.lock().await.settle(id) {
                        debug!(module = %module, "Bootstrap fragment resolved");
                    }
                }
                ModuleState::Resolved => {
                    if !self.state.lock().await.request_start(id) {
                        continue;
                    }
                    if let Err(e) = self.registry.start(id).await {
                        warn!(module = %module, error = %e, "Bootstrap module failed to start");
                        self.state.lock().await.settle(id);
                    }
                }
                ModuleState::Active => {
                    if self.state.lock().await.settle(id) {
                        debug!(module = %module, "Bootstrap module active");
                    }
                }
                ModuleState::Uninstalled => {
                    self.state.lock().await.settle(id);
                }
                ModuleState::Starting | ModuleState::Stopping => {}
            }
        }

        for id in linked {
            match self.registry.state(id).await {
                ModuleState::Active | ModuleState::Uninstalled => {
                    self.state.lock().await.settle(id);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostHandle;
    use crate::registry::testing::{Call, FakeRegistry};
    use std::time::SystemTime;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        system: TempDir,
        _data: TempDir,
        host: Arc<HostHandle>,
        registry: Arc<FakeRegistry>,
        scanner: Arc<BootstrapScanner>,
    }

    impl Fixture {
        fn new() -> Self {
            let system = tempdir().unwrap();
            let data = tempdir().unwrap();
            let host = Arc::new(HostHandle::new());
            host.mark_ready();
            let registry = Arc::new(FakeRegistry::new(data.path()));
            let scanner = Arc::new(
                BootstrapScanner::new(registry.clone(), host.clone(), system.path())
                    .with_poll_interval(Duration::from_millis(10)),
            );
            Self {
                system,
                _data: data,
                host,
                registry,
                scanner,
            }
        }

        fn file(&self, name: &str) -> (PathBuf, String) {
            let path = self.system.path().join(name);
            std::fs::write(&path, b"module").unwrap();
            let location = path_to_uri(&path);
            (path, location)
        }

        fn touch(&self, path: &Path, ahead_secs: u64) {
            let file = std::fs::File::options().write(true).open(path).unwrap();
            file.set_modified(SystemTime::now() + Duration::from_secs(ahead_secs))
                .unwrap();
        }

        /// A module left active by a previous run, with its timestamp recorded.
        fn previous_run(&self, name: &str, state: ModuleState) -> Module {
            let (path, location) = self.file(name);
            let module = self.registry.preinstall(&location, state);
            self.scanner
                .timestamps
                .write(&module, modified_millis(&path).unwrap())
                .unwrap();
            module
        }

        async fn module_at(&self, location: &str) -> Module {
            self.registry.module_by_location(location).await.unwrap()
        }

        async fn ticks(&self, n: usize) {
            for _ in 0..n {
                assert!(self.scanner.scan_once().await);
            }
        }
    }

    #[tokio::test]
    async fn test_fresh_install_walks_to_active() {
        let fx = Fixture::new();
        let (_, location) = fx.file("a.pkg");

        fx.ticks(1).await;
        let module = fx.module_at(&location).await;
        assert_eq!(fx.scanner.installing().await, vec![module.id]);
        assert!(!fx.scanner.is_bootstrap_finished());

        fx.ticks(2).await;
        assert!(fx.scanner.is_bootstrap_finished());
        assert_eq!(
            fx.registry.calls(),
            vec![
                Call::Install(location),
                Call::Resolve(module.id),
                Call::Start(module.id)
            ]
        );
    }

    #[tokio::test]
    async fn test_untouched_file_is_not_updated_and_touch_updates_once() {
        let fx = Fixture::new();
        let (path, _) = fx.file("a.pkg");
        fx.ticks(3).await;
        let module = fx.module_at(&path_to_uri(&path)).await;
        let t1 = fx.scanner.timestamps.read(&module).unwrap();
        assert_eq!(Some(t1), modified_millis(&path));

        fx.ticks(3).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Update(_))), 0);

        fx.touch(&path, 5);
        let t2 = modified_millis(&path).unwrap();
        assert_ne!(t1, t2);
        fx.ticks(4).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Update(_))), 1);
        assert_eq!(fx.scanner.timestamps.read(&module), Some(t2));
        // The update starts a new cycle with exactly one more start request.
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Start(_))), 2);
        assert!(fx.scanner.is_bootstrap_finished());
    }

    #[tokio::test]
    async fn test_fragment_is_never_started() {
        let fx = Fixture::new();
        let path = fx.system.path().join("frag.pkg");
        let location = path_to_uri(&path);
        fx.registry.mark_fragment(&location);
        std::fs::write(&path, b"fragment").unwrap();

        fx.ticks(4).await;
        assert!(fx.scanner.is_bootstrap_finished());
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Start(_))), 0);
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Resolve(_))), 1);
    }

    #[tokio::test]
    async fn test_preexisting_and_new_modules_converge() {
        let fx = Fixture::new();
        let old_a = fx.previous_run("old-a.pkg", ModuleState::Active);
        let old_b = fx.previous_run("old-b.pkg", ModuleState::Active);
        fx.file("new-a.pkg");
        fx.file("new-b.pkg");

        let mut finished_at = None;
        for tick in 0..10 {
            fx.ticks(1).await;
            let finished = fx.scanner.is_bootstrap_finished();
            match finished_at {
                None if finished => finished_at = Some(tick),
                Some(_) => assert!(finished, "finished flag flapped at tick {tick}"),
                None => {}
            }
        }
        assert!(finished_at.unwrap() <= 3);
        assert!(fx.scanner.installing().await.is_empty());
        assert!(fx.scanner.linked().await.is_empty());
        for old in [old_a, old_b] {
            assert!(fx.registry.calls_for(old.id).is_empty());
        }
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Install(_))), 2);
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Start(_))), 2);
    }

    #[tokio::test]
    async fn test_linked_module_settles_on_notification() {
        let fx = Fixture::new();
        let old = fx.previous_run("old.pkg", ModuleState::Resolved);

        fx.ticks(1).await;
        assert_eq!(fx.scanner.linked().await, vec![old.id]);
        assert!(!fx.scanner.is_bootstrap_finished());

        fx.registry.set_state(old.id, ModuleState::Active);
        assert!(fx.scanner.on_event(&ModuleEvent::Started(old.clone())).await);
        assert!(fx.scanner.linked().await.is_empty());

        fx.ticks(1).await;
        assert!(fx.scanner.is_bootstrap_finished());
        assert!(fx.registry.calls_for(old.id).is_empty());
    }

    #[tokio::test]
    async fn test_linked_module_without_timestamp_is_updated_once() {
        let fx = Fixture::new();
        let (_, location) = fx.file("legacy.pkg");
        let module = fx.registry.preinstall(&location, ModuleState::Active);

        fx.ticks(3).await;
        assert_eq!(fx.registry.calls_for(module.id)[0], Call::Update(module.id));
        assert!(fx.scanner.timestamps.read(&module).is_some());
        fx.ticks(2).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Update(_))), 1);
        assert!(fx.scanner.is_bootstrap_finished());
    }

    #[tokio::test]
    async fn test_start_notification_settles_installing_module() {
        let fx = Fixture::new();
        fx.registry.hold_start(true);
        let (_, location) = fx.file("slow.pkg");

        fx.ticks(2).await;
        let module = fx.module_at(&location).await;
        assert_eq!(fx.registry.state(module.id).await, ModuleState::Starting);
        assert_eq!(fx.scanner.installing().await, vec![module.id]);

        fx.registry.activate(module.id);
        fx.scanner
            .on_event(&ModuleEvent::Started(module.clone()))
            .await;
        assert!(fx.scanner.installing().await.is_empty());

        fx.ticks(1).await;
        assert!(fx.scanner.is_bootstrap_finished());
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Start(_))), 1);
    }

    #[tokio::test]
    async fn test_removed_file_uninstalls() {
        let fx = Fixture::new();
        let (path, location) = fx.file("a.pkg");
        fx.ticks(3).await;
        let module = fx.module_at(&location).await;

        std::fs::remove_file(&path).unwrap();
        fx.ticks(1).await;
        assert_eq!(
            fx.registry.calls_for(module.id).last(),
            Some(&Call::Uninstall(module.id))
        );
        fx.ticks(1).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Uninstall(_))), 1);
    }

    #[tokio::test]
    async fn test_failed_update_uninstalls_and_forgets() {
        let fx = Fixture::new();
        let (path, location) = fx.file("a.pkg");
        fx.ticks(3).await;
        let module = fx.module_at(&location).await;

        fx.registry.fail_update(module.id);
        fx.touch(&path, 5);
        fx.ticks(1).await;
        let calls = fx.registry.calls_for(module.id);
        assert_eq!(
            &calls[calls.len() - 2..],
            &[Call::Update(module.id), Call::Uninstall(module.id)]
        );
        // The same pass picks the file up again as a new artifact.
        let again = fx.module_at(&location).await;
        assert_ne!(again.id, module.id);
        assert_eq!(fx.scanner.installing().await, vec![again.id]);
    }

    #[tokio::test]
    async fn test_dropped_module_is_not_linked() {
        let fx = Fixture::new();
        let (_, location) = fx.file("legacy.pkg");
        let module = fx.registry.preinstall(&location, ModuleState::Resolved);
        fx.registry.fail_update(module.id);

        fx.scanner.scan_added().await;
        assert_eq!(
            fx.registry.calls_for(module.id),
            vec![Call::Update(module.id), Call::Uninstall(module.id)]
        );
        assert!(fx.scanner.linked().await.is_empty());
        assert!(fx.scanner.installing().await.is_empty());
    }

    #[tokio::test]
    async fn test_externally_uninstalled_module_is_reinstalled() {
        let fx = Fixture::new();
        let (_, location) = fx.file("a.pkg");
        fx.ticks(3).await;
        let first = fx.module_at(&location).await;

        fx.registry.forget(first.id);
        fx.ticks(1).await;
        let second = fx.module_at(&location).await;
        assert_ne!(first.id, second.id);
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Install(_))), 2);
    }

    #[tokio::test]
    async fn test_failed_install_retried_only_after_change() {
        let fx = Fixture::new();
        let (path, location) = fx.file("bad.pkg");
        fx.registry.fail_install(&location, "corrupt package");

        fx.ticks(3).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Install(_))), 1);
        assert!(fx.scanner.is_bootstrap_finished());

        fx.registry.clear_install_failure(&location);
        fx.touch(&path, 5);
        fx.ticks(1).await;
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Install(_))), 2);
        assert!(fx.registry.module_by_location(&location).await.is_some());
    }

    #[tokio::test]
    async fn test_start_failure_does_not_block_finish() {
        let fx = Fixture::new();
        let (_, location) = fx.file("a.pkg");
        fx.ticks(1).await;
        let module = fx.module_at(&location).await;
        fx.registry.fail_start(module.id);

        fx.ticks(2).await;
        assert!(fx.scanner.is_bootstrap_finished());
        assert_eq!(fx.registry.count(|c| matches!(c, Call::Start(_))), 1);
    }

    #[tokio::test]
    async fn test_waits_for_host_ready() {
        let system = tempdir().unwrap();
        let data = tempdir().unwrap();
        std::fs::write(system.path().join("a.pkg"), b"module").unwrap();
        let host = Arc::new(HostHandle::new());
        let registry = Arc::new(FakeRegistry::new(data.path()));
        let scanner = BootstrapScanner::new(registry.clone(), host.clone(), system.path());

        assert!(!scanner.scan_once().await);
        assert!(registry.calls().is_empty());

        host.mark_ready();
        assert!(scanner.scan_once().await);
        assert_eq!(registry.count(|c| matches!(c, Call::Install(_))), 1);
    }

    #[tokio::test]
    async fn test_host_stopping_ends_workers() {
        let fx = Fixture::new();
        fx.file("a.pkg");
        fx.scanner.start().await;
        assert!(fx.scanner.is_running().await);

        let mut finished = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if fx.scanner.is_bootstrap_finished() {
                finished = true;
                break;
            }
        }
        assert!(finished);

        fx.registry.emit(ModuleEvent::HostStopping);
        let mut stopped = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !fx.scanner.is_running().await {
                stopped = true;
                break;
            }
        }
        assert!(stopped);
        assert!(fx.scanner.stop().await);
        assert!(fx.host.alive());
    }
}
