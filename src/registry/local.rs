//! In-process module registry backed by JSON files.
//!
//! Installed modules survive restarts: the table is written to
//! `<data_dir>/modules.json` after every transition and [`LocalRegistry::open`]
//! restores it, restarting the modules that were active when the previous
//! process exited.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::manifest::{read_manifest, Manifest};
use super::store::{self, ModuleTable, StorePaths, StoredModule};
use super::{props, DeploymentProperties, Module, ModuleEvent, ModuleId, ModuleRegistry, ModuleState};
use crate::error::{DeployError, Result};
use crate::utils::uri::{modified_millis, uri_to_path, valid_file, REFERENCE_PREFIX};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Entry {
    module: Module,
    state: ModuleState,
    properties: DeploymentProperties,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    modules: BTreeMap<ModuleId, Entry>,
}

impl Inner {
    fn find_location(&self, location: &str) -> Option<&Entry> {
        let location = normalize(location);
        self.modules
            .values()
            .find(|e| normalize(&e.module.location) == location)
    }

    fn table(&self) -> ModuleTable {
        ModuleTable {
            next_id: self.next_id,
            modules: self
                .modules
                .values()
                .map(|e| StoredModule {
                    module: e.module.clone(),
                    state: e.state,
                })
                .collect(),
        }
    }
}

fn normalize(location: &str) -> &str {
    location.strip_prefix(REFERENCE_PREFIX).unwrap_or(location)
}

/// Compare dotted versions numerically where both parts are numbers.
pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Read and check the manifest of the package at `path`.
fn load_identity(path: &Path) -> Result<(String, Manifest)> {
    let manifest = read_manifest(path)?.ok_or_else(|| {
        DeployError::InvalidArtifact(format!("{}: no module manifest", path.display()))
    })?;
    let name = manifest
        .identity()
        .ok_or_else(|| {
            DeployError::InvalidArtifact(format!("{}: manifest has no module id", path.display()))
        })?
        .to_string();
    Ok((name, manifest))
}

/// Local, file-backed [`ModuleRegistry`].
pub struct LocalRegistry {
    paths: StorePaths,
    inner: RwLock<Inner>,
    events: broadcast::Sender<ModuleEvent>,
}

impl LocalRegistry {
    /// Open (or create) a registry rooted at `data_dir`, restoring modules from
    /// a previous run.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let paths = StorePaths::new(data_dir);
        std::fs::create_dir_all(paths.root())?;
        let table = ModuleTable::load(&paths.table())?;

        let mut inner = Inner {
            next_id: table.next_id,
            modules: BTreeMap::new(),
        };
        for stored in table.modules {
            let module = stored.module;
            let state = match stored.state {
                ModuleState::Uninstalled => continue,
                ModuleState::Active | ModuleState::Starting if module.fragment => {
                    ModuleState::Resolved
                }
                ModuleState::Active | ModuleState::Starting => ModuleState::Active,
                ModuleState::Stopping => ModuleState::Resolved,
                other => other,
            };
            let mut properties = match store::load_properties(&paths.properties(&module.location))
            {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(module = %module, error = %e, "Discarding unreadable module properties");
                    DeploymentProperties::new()
                }
            };
            properties.insert(props::STATE.to_string(), state.to_string());
            inner.next_id = inner.next_id.max(module.id.0);
            debug!(module = %module, state = %state, "Restored module");
            inner.modules.insert(
                module.id,
                Entry {
                    module,
                    state,
                    properties,
                },
            );
        }
        info!(
            data_dir = %paths.root().display(),
            modules = inner.modules.len(),
            "Local registry opened"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            paths,
            inner: RwLock::new(inner),
            events,
        })
    }

    /// Root of the registry's on-disk storage.
    pub fn data_dir(&self) -> &Path {
        self.paths.root()
    }

    /// Announce host teardown to every subscriber.
    pub async fn shutdown(&self) {
        let inner = self.inner.read().await;
        if let Err(e) = inner.table().save(&self.paths.table()) {
            warn!(error = %e, "Failed to persist module table on shutdown");
        }
        drop(inner);
        self.emit(ModuleEvent::HostStopping);
    }

    /// All installed modules with their deployment properties.
    pub async fn modules(&self) -> Vec<(Module, DeploymentProperties)> {
        let inner = self.inner.read().await;
        inner
            .modules
            .values()
            .map(|e| (e.module.clone(), e.properties.clone()))
            .collect()
    }

    /// Modules whose deployment property `key` equals `value`.
    pub async fn by_property(&self, key: &str, value: &str) -> Vec<Module> {
        let inner = self.inner.read().await;
        inner
            .modules
            .values()
            .filter(|e| e.properties.get(key).is_some_and(|v| v == value))
            .map(|e| e.module.clone())
            .collect()
    }

    /// Look a module up by its declared id, optionally pinned to a version.
    /// Without a version the highest installed version wins.
    pub async fn by_description(&self, name: &str, version: Option<&str>) -> Option<Module> {
        let inner = self.inner.read().await;
        let candidates = inner.modules.values().filter(|e| e.module.name == name);
        match version {
            Some(version) => candidates
                .filter(|e| e.module.version == version)
                .map(|e| e.module.clone())
                .next(),
            None => candidates
                .max_by(|a, b| compare_versions(&a.module.version, &b.module.version))
                .map(|e| e.module.clone()),
        }
    }

    fn emit(&self, event: ModuleEvent) {
        debug!(event = event.kind(), "Module event");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Write the module's properties and the module table.
    fn persist(&self, inner: &Inner, id: Option<ModuleId>) -> Result<()> {
        if let Some(entry) = id.and_then(|id| inner.modules.get(&id)) {
            store::save_properties(
                &self.paths.properties(&entry.module.location),
                &entry.properties,
            )?;
        }
        inner.table().save(&self.paths.table())
    }

    fn set_state(entry: &mut Entry, state: ModuleState) {
        entry.state = state;
        entry
            .properties
            .insert(props::STATE.to_string(), state.to_string());
    }

    /// Resolve and start a module installed through a deployment engine.
    async fn activate(&self, id: ModuleId) {
        let managed = {
            let inner = self.inner.read().await;
            inner
                .modules
                .get(&id)
                .is_some_and(|e| e.properties.contains_key(props::DEPLOYMENT_ENGINE))
        };
        if !managed {
            return;
        }
        if let Err(e) = self.resolve(id).await {
            warn!(module = %id, error = %e, "Failed to resolve module");
            return;
        }
        let fragment = self.module(id).await.is_some_and(|m| m.fragment);
        if !fragment {
            if let Err(e) = self.start(id).await {
                warn!(module = %id, error = %e, "Failed to start module");
            }
        }
    }

    async fn remove(&self, id: ModuleId) -> Result<Option<Module>> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.modules.remove(&id) else {
            return Ok(None);
        };
        store::remove_quietly(&self.paths.properties(&entry.module.location))?;
        store::remove_quietly(&self.paths.data_area(id))?;
        self.persist(&inner, None)?;
        drop(inner);

        if entry.state == ModuleState::Active {
            self.emit(ModuleEvent::Stopped(entry.module.clone()));
        }
        info!(module = %entry.module, "Module uninstalled");
        self.emit(ModuleEvent::Uninstalled(entry.module.clone()));
        Ok(Some(entry.module))
    }
}

#[async_trait]
impl ModuleRegistry for LocalRegistry {
    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module> {
        let path = valid_file(location)
            .ok_or_else(|| DeployError::InvalidArtifact(location.to_string()))?;
        let (name, manifest) = load_identity(&path)?;

        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.find_location(location) {
            debug!(module = %existing.module, location, "Module already installed");
            return Ok(existing.module.clone());
        }
        if let Some(duplicate) = inner
            .modules
            .values()
            .find(|e| e.module.name == name && e.module.version == manifest.version)
        {
            return Err(DeployError::Registry(format!(
                "{} {} from {} is already installed from {}",
                name, manifest.version, location, duplicate.module.location
            )));
        }

        inner.next_id += 1;
        let id = ModuleId(inner.next_id);
        let module = Module {
            id,
            name,
            version: manifest.version.clone(),
            location: location.to_string(),
            fragment: manifest.is_fragment(),
        };
        let mut properties = properties;
        properties.insert(props::LOCATION.to_string(), location.to_string());
        if let Some(mtime) = modified_millis(&path) {
            properties.insert(props::LAST_MODIFIED.to_string(), mtime.to_string());
        }
        properties.insert(
            props::STATE.to_string(),
            ModuleState::Installed.to_string(),
        );
        inner.modules.insert(
            id,
            Entry {
                module: module.clone(),
                state: ModuleState::Installed,
                properties,
            },
        );
        if let Err(e) = self.persist(&inner, Some(id)) {
            inner.modules.remove(&id);
            return Err(e);
        }
        drop(inner);

        info!(module = %module, location, "Module installed");
        self.emit(ModuleEvent::Installed(module.clone()));
        self.activate(id).await;
        Ok(module)
    }

    async fn update(&self, id: ModuleId) -> Result<bool> {
        let Some(module) = self.module(id).await else {
            return Ok(false);
        };
        if !module.fragment {
            match self.stop(id).await {
                Err(e) if e.is_module_gone() => return Ok(false),
                other => other?,
            }
        }

        let reloaded = match valid_file(&module.location) {
            Some(path) => load_identity(&path).map(|(name, manifest)| (path, name, manifest)),
            None => Err(DeployError::InvalidArtifact(module.location.clone())),
        };
        let (path, name, manifest) = match reloaded {
            Ok(reloaded) => reloaded,
            Err(e) => {
                warn!(module = %module, error = %e, "Update failed, uninstalling module");
                self.remove(id).await?;
                return Err(DeployError::Registry(format!(
                    "update of {} failed: {}",
                    module, e
                )));
            }
        };

        let mut inner = self.inner.write().await;
        let Some(entry) = inner.modules.get_mut(&id) else {
            return Ok(false);
        };
        entry.module.name = name;
        entry.module.version = manifest.version.clone();
        entry.module.fragment = manifest.is_fragment();
        if let Some(mtime) = modified_millis(&path) {
            entry
                .properties
                .insert(props::LAST_MODIFIED.to_string(), mtime.to_string());
        }
        Self::set_state(entry, ModuleState::Installed);
        let updated = entry.module.clone();
        self.persist(&inner, Some(id))?;
        drop(inner);

        info!(module = %updated, "Module updated");
        self.emit(ModuleEvent::Updated(updated));
        self.activate(id).await;
        Ok(true)
    }

    async fn refresh(&self, id: ModuleId) -> Result<bool> {
        let (location, recorded) = {
            let inner = self.inner.read().await;
            let Some(entry) = inner.modules.get(&id) else {
                return Ok(false);
            };
            let recorded = entry
                .properties
                .get(props::LAST_MODIFIED)
                .and_then(|v| v.parse::<i64>().ok());
            (entry.module.location.clone(), recorded)
        };
        let Some(path) = valid_file(&location) else {
            return Ok(false);
        };
        let current = modified_millis(&path);
        if current.is_some() && current == recorded {
            return Ok(false);
        }
        debug!(module = %id, ?recorded, ?current, "Source changed, refreshing");
        self.update(id).await
    }

    async fn uninstall(&self, id: ModuleId) -> Result<bool> {
        Ok(self.remove(id).await?.is_some())
    }

    async fn resolve(&self, id: ModuleId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .modules
            .get_mut(&id)
            .ok_or(DeployError::ModuleGone(id))?;
        if entry.state != ModuleState::Installed {
            return Ok(());
        }
        Self::set_state(entry, ModuleState::Resolved);
        let module = entry.module.clone();
        self.persist(&inner, Some(id))?;
        drop(inner);

        self.emit(ModuleEvent::Resolved(module));
        Ok(())
    }

    async fn start(&self, id: ModuleId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .modules
            .get_mut(&id)
            .ok_or(DeployError::ModuleGone(id))?;
        if entry.module.fragment {
            return Err(DeployError::Registry(format!(
                "{} is a fragment and cannot be started",
                entry.module
            )));
        }
        let mut events = Vec::new();
        match entry.state {
            ModuleState::Active | ModuleState::Starting => return Ok(()),
            ModuleState::Installed => {
                Self::set_state(entry, ModuleState::Resolved);
                events.push(ModuleEvent::Resolved(entry.module.clone()));
            }
            _ => {}
        }
        Self::set_state(entry, ModuleState::Starting);
        Self::set_state(entry, ModuleState::Active);
        events.push(ModuleEvent::Started(entry.module.clone()));
        let module = entry.module.clone();
        self.persist(&inner, Some(id))?;
        drop(inner);

        info!(module = %module, "Module started");
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    async fn stop(&self, id: ModuleId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .modules
            .get_mut(&id)
            .ok_or(DeployError::ModuleGone(id))?;
        if entry.state != ModuleState::Active {
            return Ok(());
        }
        Self::set_state(entry, ModuleState::Stopping);
        Self::set_state(entry, ModuleState::Resolved);
        let module = entry.module.clone();
        self.persist(&inner, Some(id))?;
        drop(inner);

        info!(module = %module, "Module stopped");
        self.emit(ModuleEvent::Stopped(module));
        Ok(())
    }

    async fn state(&self, id: ModuleId) -> ModuleState {
        let inner = self.inner.read().await;
        inner
            .modules
            .get(&id)
            .map(|e| e.state)
            .unwrap_or(ModuleState::Uninstalled)
    }

    async fn module(&self, id: ModuleId) -> Option<Module> {
        let inner = self.inner.read().await;
        inner.modules.get(&id).map(|e| e.module.clone())
    }

    async fn module_by_location(&self, location: &str) -> Option<Module> {
        let inner = self.inner.read().await;
        inner.find_location(location).map(|e| e.module.clone())
    }

    async fn properties(&self, id: ModuleId) -> Option<DeploymentProperties> {
        let inner = self.inner.read().await;
        inner.modules.get(&id).map(|e| e.properties.clone())
    }

    async fn manifest(&self, location: &str) -> Result<Option<Manifest>> {
        let path = uri_to_path(location)
            .ok_or_else(|| DeployError::InvalidArtifact(location.to_string()))?;
        read_manifest(&path)
    }

    fn data_file(&self, id: ModuleId, name: &str) -> Result<PathBuf> {
        let area = self.paths.data_area(id);
        std::fs::create_dir_all(&area)?;
        Ok(area.join(name))
    }

    fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::write_package;
    use crate::utils::uri::path_to_uri;
    use tempfile::{tempdir, TempDir};

    fn package(dir: &TempDir, file: &str, id: &str, version: &str) -> String {
        let path = dir.path().join(file);
        write_package(
            &path,
            &format!("[module]\nid = \"{id}\"\nversion = \"{version}\"\n"),
        );
        path_to_uri(&path)
    }

    fn engine_props() -> DeploymentProperties {
        let mut p = DeploymentProperties::new();
        p.insert(props::DEPLOYMENT_ENGINE.into(), "default-engine(1)".into());
        p
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_install_is_installed_and_persists_properties() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");

        let module = registry
            .install(&loc, DeploymentProperties::new())
            .await
            .unwrap();
        assert_eq!(module.name, "org.example.a");
        assert_eq!(registry.state(module.id).await, ModuleState::Installed);

        let props = registry.properties(module.id).await.unwrap();
        assert_eq!(props.get(props::LOCATION), Some(&loc));
        assert!(props.contains_key(props::LAST_MODIFIED));
        assert!(data.path().join("modules.json").exists());
    }

    #[tokio::test]
    async fn test_install_same_location_is_idempotent() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");

        let first = registry.install(&loc, DeploymentProperties::new()).await.unwrap();
        let second = registry.install(&loc, DeploymentProperties::new()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.modules().await.len(), 1);
    }

    #[tokio::test]
    async fn test_install_same_identity_elsewhere_is_refused() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let first = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let copy = package(&apps, "b.pkg", "org.example.a", "1.0.0");

        let module = registry.install(&first, DeploymentProperties::new()).await.unwrap();
        let err = registry
            .install(&copy, DeploymentProperties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Registry(_)));
        assert_eq!(registry.modules().await.len(), 1);
        assert_eq!(registry.module_by_location(&first).await, Some(module));
        assert!(registry.module_by_location(&copy).await.is_none());
    }

    #[tokio::test]
    async fn test_install_rejects_package_without_identity() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let path = apps.path().join("anon.pkg");
        write_package(&path, "[module]\nversion = \"1.0\"\n");

        let err = registry
            .install(&path_to_uri(&path), DeploymentProperties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(_)));
    }

    #[tokio::test]
    async fn test_engine_managed_install_starts_module() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let mut events = registry.subscribe();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");

        let module = registry.install(&loc, engine_props()).await.unwrap();
        assert_eq!(registry.state(module.id).await, ModuleState::Active);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["INSTALLED", "RESOLVED", "STARTED"]);
    }

    #[tokio::test]
    async fn test_fragment_refuses_start() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let path = apps.path().join("frag.pkg");
        write_package(
            &path,
            "[module]\nid = \"org.example.frag\"\nfragment_host = \"org.example.a\"\n",
        );

        let module = registry
            .install(&path_to_uri(&path), engine_props())
            .await
            .unwrap();
        assert!(module.fragment);
        assert_eq!(registry.state(module.id).await, ModuleState::Resolved);
        tokio_test::assert_err!(registry.start(module.id).await);
    }

    #[tokio::test]
    async fn test_lifecycle_on_unknown_module() {
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let id = ModuleId(42);

        assert!(!registry.update(id).await.unwrap());
        assert!(!registry.refresh(id).await.unwrap());
        assert!(!registry.uninstall(id).await.unwrap());
        assert!(registry.resolve(id).await.unwrap_err().is_module_gone());
        assert!(registry.start(id).await.unwrap_err().is_module_gone());
        assert_eq!(registry.state(id).await, ModuleState::Uninstalled);
    }

    #[tokio::test]
    async fn test_uninstall_twice() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let module = registry.install(&loc, engine_props()).await.unwrap();
        let marker = registry.data_file(module.id, "marker").unwrap();
        std::fs::write(&marker, b"x").unwrap();

        assert!(registry.uninstall(module.id).await.unwrap());
        assert!(!registry.uninstall(module.id).await.unwrap());
        assert!(!marker.exists());
        assert!(registry.module_by_location(&loc).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_only_after_change() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let module = registry.install(&loc, engine_props()).await.unwrap();

        assert!(!registry.refresh(module.id).await.unwrap());

        let path = apps.path().join("a.pkg");
        write_package(&path, "[module]\nid = \"org.example.a\"\nversion = \"1.1.0\"\n");
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();

        assert!(registry.refresh(module.id).await.unwrap());
        assert!(!registry.refresh(module.id).await.unwrap());
        assert_eq!(registry.module(module.id).await.unwrap().version, "1.1.0");
        assert_eq!(registry.state(module.id).await, ModuleState::Active);
    }

    #[tokio::test]
    async fn test_failed_update_uninstalls() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let module = registry.install(&loc, engine_props()).await.unwrap();

        std::fs::write(apps.path().join("a.pkg"), b"corrupted").unwrap();
        tokio_test::assert_err!(registry.update(module.id).await);
        assert_eq!(registry.state(module.id).await, ModuleState::Uninstalled);
    }

    #[tokio::test]
    async fn test_reopen_restores_active_modules() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let loc_a = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let loc_b = package(&apps, "b.pkg", "org.example.b", "1.0.0");
        let (a, b) = {
            let registry = LocalRegistry::open(data.path()).unwrap();
            let a = registry.install(&loc_a, engine_props()).await.unwrap();
            let b = registry
                .install(&loc_b, DeploymentProperties::new())
                .await
                .unwrap();
            registry.shutdown().await;
            (a, b)
        };

        let registry = LocalRegistry::open(data.path()).unwrap();
        assert_eq!(registry.state(a.id).await, ModuleState::Active);
        assert_eq!(registry.state(b.id).await, ModuleState::Installed);
        assert_eq!(registry.module_by_location(&loc_b).await, Some(b.clone()));

        let loc_c = package(&apps, "c.pkg", "org.example.c", "1.0.0");
        let c = registry.install(&loc_c, DeploymentProperties::new()).await.unwrap();
        assert!(c.id > b.id);
    }

    #[tokio::test]
    async fn test_lookup_by_description_and_property() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let old = package(&apps, "a-1.pkg", "org.example.a", "1.9.0");
        let new = package(&apps, "a-2.pkg", "org.example.a", "1.10.0");
        registry.install(&old, engine_props()).await.unwrap();
        let latest = registry
            .install(&new, DeploymentProperties::new())
            .await
            .unwrap();

        assert_eq!(
            registry.by_description("org.example.a", None).await,
            Some(latest)
        );
        assert_eq!(
            registry
                .by_description("org.example.a", Some("1.9.0"))
                .await
                .map(|m| m.location),
            Some(old)
        );
        let managed = registry
            .by_property(props::DEPLOYMENT_ENGINE, "default-engine(1)")
            .await;
        assert_eq!(managed.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_emits_host_stopping() {
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let mut events = registry.subscribe();
        registry.shutdown().await;
        assert_eq!(events.recv().await.unwrap(), ModuleEvent::HostStopping);
    }

    #[tokio::test]
    async fn test_reference_prefix_matches_location() {
        let apps = tempdir().unwrap();
        let data = tempdir().unwrap();
        let registry = LocalRegistry::open(data.path()).unwrap();
        let loc = package(&apps, "a.pkg", "org.example.a", "1.0.0");
        let module = registry
            .install(&format!("reference:{loc}"), DeploymentProperties::new())
            .await
            .unwrap();
        assert_eq!(registry.module_by_location(&loc).await, Some(module));
    }
}
