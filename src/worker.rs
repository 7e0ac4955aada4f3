//! Cancellable background workers with a bounded join.
//!
//! A [`Worker`] is a spawned task paired with a `watch` shutdown channel. The
//! task receives a [`Shutdown`] whose [`Shutdown::sleep`] returns early when a
//! stop is requested; [`Worker::stop`] signals and then waits at most the given
//! timeout before leaving the task detached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receiving side of a worker's stop signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether a stop has been requested (a dropped sender counts).
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop is requested.
    pub async fn cancelled(&mut self) {
        loop {
            let stop = *self.rx.borrow_and_update();
            if stop {
                return;
            }
            // Err means the sender is gone, which is a stop too.
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration`, waking early on a stop request.
    ///
    /// Returns `true` when the sleep was cut short by a stop.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancelled() => true,
        };
        cancelled || self.is_requested()
    }
}

/// Sending side of a worker's stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// A named background task.
#[derive(Debug)]
pub struct Worker {
    name: String,
    canceller: Canceller,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` on the tokio runtime.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(body(Shutdown { rx }));
        debug!(worker = %name, "Worker spawned");
        Self {
            name,
            canceller: Canceller { tx: Arc::new(tx) },
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle that can request the stop from elsewhere.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request a stop and wait up to `timeout` for the task to end.
    ///
    /// Returns `false` if the task was still running when the timeout hit; it
    /// is left detached and shutdown proceeds regardless.
    pub async fn stop(self, timeout: Duration) -> bool {
        self.canceller.cancel();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => {
                debug!(worker = %self.name, "Worker stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(worker = %self.name, error = %e, "Worker ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    worker = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker did not stop in time, leaving it detached"
                );
                false
            }
        }
    }
}
