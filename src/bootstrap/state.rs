//! Progress sets of the bootstrap scanner.

use std::collections::BTreeSet;

use crate::registry::ModuleId;

/// Modules the bootstrap scanner is still waiting on.
///
/// `installing` holds modules installed or updated this run; `linked` holds
/// modules found already installed from a previous run. A module is in at
/// most one of the two and leaves it exactly once, through [`ScanState::settle`].
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    installing: BTreeSet<ModuleId>,
    linked: BTreeSet<ModuleId>,
    start_requested: BTreeSet<ModuleId>,
}

impl ScanState {
    /// Start a new install/update cycle for `id`.
    pub fn mark_installing(&mut self, id: ModuleId) {
        self.linked.remove(&id);
        self.start_requested.remove(&id);
        self.installing.insert(id);
    }

    /// Wait for a pre-existing module. Ignored while it is installing.
    pub fn mark_linked(&mut self, id: ModuleId) -> bool {
        if self.installing.contains(&id) {
            return false;
        }
        self.linked.insert(id)
    }

    /// Take `id` out of whichever set holds it. Returns `false` if it was in neither.
    pub fn settle(&mut self, id: ModuleId) -> bool {
        self.start_requested.remove(&id);
        self.installing.remove(&id) || self.linked.remove(&id)
    }

    /// Record a start request. Returns `true` only for the first request of
    /// the current cycle.
    pub fn request_start(&mut self, id: ModuleId) -> bool {
        self.start_requested.insert(id)
    }

    pub fn is_installing(&self, id: ModuleId) -> bool {
        self.installing.contains(&id)
    }

    pub fn installing(&self) -> Vec<ModuleId> {
        self.installing.iter().copied().collect()
    }

    pub fn linked(&self) -> Vec<ModuleId> {
        self.linked.iter().copied().collect()
    }

    pub fn is_settled(&self) -> bool {
        self.installing.is_empty() && self.linked.is_empty()
    }
}
