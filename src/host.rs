//! Hosting-process context observed by the background loops.
//!
//! Every loop checks [`HostContext::alive`] at loop-top and on its error
//! paths. Once the host is gone the loop ends without logging, instead of
//! spinning on errors against a torn-down registry.

use std::sync::atomic::{AtomicBool, Ordering};

/// Liveness and readiness of the hosting process.
#[cfg_attr(test, mockall::automock)]
pub trait HostContext: Send + Sync {
    /// `false` once the host has been torn down.
    fn alive(&self) -> bool;

    /// `true` once the host finished booting. Defaults to [`HostContext::alive`].
    fn ready(&self) -> bool {
        self.alive()
    }
}

/// Flag-backed [`HostContext`] owned by whoever runs the host.
#[derive(Debug)]
pub struct HostHandle {
    alive: AtomicBool,
    ready: AtomicBool,
}

impl HostHandle {
    /// A live host that has not finished booting.
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Tear the host down. Irreversible.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Default for HostHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext for HostHandle {
    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn ready(&self) -> bool {
        self.alive() && self.ready.load(Ordering::SeqCst)
    }
}
