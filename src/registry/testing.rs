//! In-memory [`ModuleRegistry`] double that records every call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    DeploymentProperties, Manifest, Module, ModuleEvent, ModuleId, ModuleRegistry, ModuleState,
};
use crate::error::{DeployError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Install(String),
    Update(ModuleId),
    Refresh(ModuleId),
    Uninstall(ModuleId),
    Resolve(ModuleId),
    Start(ModuleId),
    Stop(ModuleId),
}

impl Call {
    pub fn module(&self) -> Option<ModuleId> {
        match self {
            Call::Install(_) => None,
            Call::Update(id)
            | Call::Refresh(id)
            | Call::Uninstall(id)
            | Call::Resolve(id)
            | Call::Start(id)
            | Call::Stop(id) => Some(*id),
        }
    }
}

struct FakeModule {
    module: Module,
    state: ModuleState,
    properties: DeploymentProperties,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    modules: HashMap<ModuleId, FakeModule>,
    calls: Vec<Call>,
    fragments: HashSet<String>,
    install_failures: HashMap<String, String>,
    update_failures: HashSet<ModuleId>,
    start_failures: HashSet<ModuleId>,
    refresh_changes: HashSet<ModuleId>,
    refresh_failures: HashSet<ModuleId>,
    refresh_vanishes: HashSet<ModuleId>,
    hold_start: bool,
}

pub(crate) struct FakeRegistry {
    state: Mutex<FakeState>,
    events: broadcast::Sender<ModuleEvent>,
    data_dir: PathBuf,
}

fn name_of(location: &str) -> String {
    location
        .rsplit('/')
        .next()
        .unwrap_or(location)
        .trim_end_matches(".pkg")
        .to_string()
}

impl FakeRegistry {
    pub fn new(data_dir: &Path) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(FakeState::default()),
            events,
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn new_module(state: &mut FakeState, location: &str, initial: ModuleState) -> Module {
        state.next_id += 1;
        let module = Module {
            id: ModuleId(state.next_id),
            name: name_of(location),
            version: "1.0.0".into(),
            location: location.to_string(),
            fragment: state.fragments.contains(location),
        };
        state.modules.insert(
            module.id,
            FakeModule {
                module: module.clone(),
                state: initial,
                properties: DeploymentProperties::new(),
            },
        );
        module
    }

    /// A module left installed by a previous run. Not recorded as a call.
    pub fn preinstall(&self, location: &str, state: ModuleState) -> Module {
        self.with(|s| Self::new_module(s, location, state))
    }

    pub fn mark_fragment(&self, location: &str) {
        self.with(|s| s.fragments.insert(location.to_string()));
    }

    pub fn fail_install(&self, location: &str, message: &str) {
        self.with(|s| {
            s.install_failures
                .insert(location.to_string(), message.to_string())
        });
    }

    pub fn clear_install_failure(&self, location: &str) {
        self.with(|s| s.install_failures.remove(location));
    }

    pub fn fail_update(&self, id: ModuleId) {
        self.with(|s| s.update_failures.insert(id));
    }

    pub fn fail_start(&self, id: ModuleId) {
        self.with(|s| s.start_failures.insert(id));
    }

    /// The next refresh of `id` reports an update.
    pub fn change_on_refresh(&self, id: ModuleId) {
        self.with(|s| s.refresh_changes.insert(id));
    }

    /// Refreshing `id` fails with a non-gone error.
    pub fn fail_refresh(&self, id: ModuleId) {
        self.with(|s| s.refresh_failures.insert(id));
    }

    /// The next refresh of `id` races with an uninstall and finds it gone.
    pub fn vanish_on_refresh(&self, id: ModuleId) {
        self.with(|s| s.refresh_vanishes.insert(id));
    }

    /// Leave started modules in `Starting` until [`FakeRegistry::activate`].
    pub fn hold_start(&self, hold: bool) {
        self.with(|s| s.hold_start = hold);
    }

    pub fn set_state(&self, id: ModuleId, state: ModuleState) {
        self.with(|s| {
            if let Some(m) = s.modules.get_mut(&id) {
                m.state = state;
            }
        });
    }

    /// Drop a module without recording a call, as a concurrent uninstall would.
    pub fn forget(&self, id: ModuleId) {
        self.with(|s| s.modules.remove(&id));
    }

    /// Finish a held start and publish `Started`.
    pub fn activate(&self, id: ModuleId) {
        let module = self.with(|s| {
            s.modules.get_mut(&id).map(|m| {
                m.state = ModuleState::Active;
                m.module.clone()
            })
        });
        if let Some(module) = module {
            self.emit(ModuleEvent::Started(module));
        }
    }

    pub fn emit(&self, event: ModuleEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn calls_for(&self, id: ModuleId) -> Vec<Call> {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| c.module() == Some(id))
                .cloned()
                .collect()
        })
    }

    pub fn property(&self, id: ModuleId, key: &str) -> Option<String> {
        self.with(|s| {
            s.modules
                .get(&id)
                .and_then(|m| m.properties.get(key).cloned())
        })
    }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }
}

#[async_trait]
impl ModuleRegistry for FakeRegistry {
    async fn install(&self, location: &str, properties: DeploymentProperties) -> Result<Module> {
        self.record(Call::Install(location.to_string()));
        let module = self.with(|s| {
            if let Some(message) = s.install_failures.get(location) {
                return Err(DeployError::Registry(message.clone()));
            }
            if let Some(existing) = s.modules.values().find(|m| m.module.location == location) {
                return Ok(existing.module.clone());
            }
            let module = Self::new_module(s, location, ModuleState::Installed);
            if let Some(m) = s.modules.get_mut(&module.id) {
                m.properties = properties;
            }
            Ok(module)
        })?;
        self.emit(ModuleEvent::Installed(module.clone()));
        Ok(module)
    }

    async fn update(&self, id: ModuleId) -> Result<bool> {
        self.record(Call::Update(id));
        self.with(|s| {
            if s.update_failures.contains(&id) {
                return Err(DeployError::Registry(format!("update of {id} failed")));
            }
            match s.modules.get_mut(&id) {
                Some(m) => {
                    m.state = ModuleState::Installed;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn refresh(&self, id: ModuleId) -> Result<bool> {
        self.record(Call::Refresh(id));
        self.with(|s| {
            if s.refresh_vanishes.remove(&id) {
                s.modules.remove(&id);
                return Err(DeployError::ModuleGone(id));
            }
            if !s.modules.contains_key(&id) {
                return Ok(false);
            }
            if s.refresh_failures.contains(&id) {
                return Err(DeployError::Registry(format!("refresh of {id} failed")));
            }
            Ok(s.refresh_changes.remove(&id))
        })
    }

    async fn uninstall(&self, id: ModuleId) -> Result<bool> {
        self.record(Call::Uninstall(id));
        let removed = self.with(|s| s.modules.remove(&id));
        match removed {
            Some(m) => {
                self.emit(ModuleEvent::Uninstalled(m.module));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn resolve(&self, id: ModuleId) -> Result<()> {
        self.record(Call::Resolve(id));
        self.with(|s| {
            let m = s.modules.get_mut(&id).ok_or(DeployError::ModuleGone(id))?;
            if m.state == ModuleState::Installed {
                m.state = ModuleState::Resolved;
            }
            Ok(())
        })
    }

    async fn start(&self, id: ModuleId) -> Result<()> {
        self.record(Call::Start(id));
        let started = self.with(|s| {
            let hold = s.hold_start;
            let fail = s.start_failures.contains(&id);
            let m = s.modules.get_mut(&id).ok_or(DeployError::ModuleGone(id))?;
            if m.module.fragment {
                return Err(DeployError::Registry("fragments cannot be started".into()));
            }
            if fail {
                return Err(DeployError::Registry(format!("start of {id} failed")));
            }
            if hold {
                m.state = ModuleState::Starting;
                return Ok(None);
            }
            m.state = ModuleState::Active;
            Ok(Some(m.module.clone()))
        })?;
        if let Some(module) = started {
            self.emit(ModuleEvent::Started(module));
        }
        Ok(())
    }

    async fn stop(&self, id: ModuleId) -> Result<()> {
        self.record(Call::Stop(id));
        self.with(|s| {
            let m = s.modules.get_mut(&id).ok_or(DeployError::ModuleGone(id))?;
            if m.state == ModuleState::Active {
                m.state = ModuleState::Resolved;
            }
            Ok(())
        })
    }

    async fn state(&self, id: ModuleId) -> ModuleState {
        self.with(|s| {
            s.modules
                .get(&id)
                .map(|m| m.state)
                .unwrap_or(ModuleState::Uninstalled)
        })
    }

    async fn module(&self, id: ModuleId) -> Option<Module> {
        self.with(|s| s.modules.get(&id).map(|m| m.module.clone()))
    }

    async fn module_by_location(&self, location: &str) -> Option<Module> {
        self.with(|s| {
            s.modules
                .values()
                .find(|m| m.module.location == location)
                .map(|m| m.module.clone())
        })
    }

    async fn properties(&self, id: ModuleId) -> Option<DeploymentProperties> {
        self.with(|s| s.modules.get(&id).map(|m| m.properties.clone()))
    }

    async fn manifest(&self, location: &str) -> Result<Option<Manifest>> {
        Ok(Some(Manifest {
            id: Some(name_of(location)),
            version: "1.0.0".into(),
            fragment_host: None,
            description: None,
            package: false,
        }))
    }

    fn data_file(&self, id: ModuleId, name: &str) -> Result<PathBuf> {
        let area = self.data_dir.join(id.0.to_string());
        std::fs::create_dir_all(&area)?;
        Ok(area.join(name))
    }

    fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.events.subscribe()
    }
}
