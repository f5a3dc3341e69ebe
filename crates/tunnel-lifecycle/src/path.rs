//! Default-path observer bridge
//!
//! OS path-change callbacks are funnelled through a [`PathNotifier`] into a
//! single-slot queue served by a dedicated worker thread. The slot only
//! keeps the latest path: a burst of changes collapses into one delivery
//! and never competes with backend state events.

use crate::provider::{ProviderError, ProviderHandle};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, trace};

/// Platform-neutral network path status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    /// Path is not valid
    Invalid,
    /// Path is available to establish connections and send data
    Satisfied,
    /// Path is not available for use
    Unsatisfied,
    /// Path is not currently available, but establishing a new connection may activate it
    Satisfiable,
}

/// Snapshot of the OS default network path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPath {
    pub status: PathStatus,
    /// Path uses an interface considered expensive (e.g. cellular)
    pub is_expensive: bool,
    /// Path uses an interface in low data mode
    pub is_constrained: bool,
}

impl DefaultPath {
    pub fn new(status: PathStatus) -> Self {
        Self {
            status,
            is_expensive: false,
            is_constrained: false,
        }
    }

    /// Check if traffic can flow over this path
    pub fn is_usable(&self) -> bool {
        matches!(self.status, PathStatus::Satisfied)
    }
}

/// Receives default path changes
pub trait DefaultPathObserver: Send + Sync {
    fn on_default_path_change(&self, path: DefaultPath);
}

struct PathShared {
    latest: Mutex<Option<DefaultPath>>,
    observer: Mutex<Option<Arc<dyn DefaultPathObserver>>>,
    closed: AtomicBool,
}

impl PathShared {
    fn latest(&self) -> MutexGuard<'_, Option<DefaultPath>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> MutexGuard<'_, Option<Arc<dyn DefaultPathObserver>>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entry point for OS path-change callbacks. Callable from any thread.
#[derive(Clone)]
pub struct PathNotifier {
    shared: Arc<PathShared>,
    wake_tx: Sender<()>,
}

impl PathNotifier {
    /// Record the new path and wake the worker. Never blocks.
    pub fn notify(&self, path: DefaultPath) {
        if self.shared.closed.load(Ordering::Acquire) {
            trace!("Path bridge closed, dropping path change");
            return;
        }
        *self.shared.latest() = Some(path);

        match self.wake_tx.try_send(()) {
            // A full slot already guarantees a pending delivery.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                trace!("Path worker gone, dropping path change");
            }
        }
    }
}

impl DefaultPathObserver for PathNotifier {
    fn on_default_path_change(&self, path: DefaultPath) {
        self.notify(path);
    }
}

/// Owns the path worker thread and the observer registration
pub struct PathBridge {
    notifier: PathNotifier,
    worker: Option<thread::JoinHandle<()>>,
}

impl PathBridge {
    /// Spawn the path worker thread
    pub fn spawn(thread_name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(PathShared {
            latest: Mutex::new(None),
            observer: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let (wake_tx, wake_rx) = bounded(1);

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                debug!("Path bridge started");
                run_path_loop(&worker_shared, &wake_rx);
                debug!("Path bridge stopped");
            })?;

        Ok(Self {
            notifier: PathNotifier { shared, wake_tx },
            worker: Some(worker),
        })
    }

    /// Handle for OS callbacks
    pub fn notifier(&self) -> PathNotifier {
        self.notifier.clone()
    }

    /// Register (or clear) the observer receiving path changes.
    ///
    /// Only changes after registration are delivered.
    pub fn register_observer(&self, observer: Option<Arc<dyn DefaultPathObserver>>) {
        debug!(
            "{} default path observer",
            if observer.is_some() { "Registering" } else { "Clearing" }
        );
        *self.notifier.shared.observer() = observer;
    }

    /// Hook the bridge into the provider's default path observation
    pub fn attach(&self, provider: &ProviderHandle) -> Result<(), ProviderError> {
        let notifier: Arc<dyn DefaultPathObserver> = Arc::new(self.notifier());
        provider.set_default_path_observer(Some(notifier))
    }

    /// Stop the worker. Later notifications are dropped.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        info!("Shutting down path bridge");
        self.notifier.shared.closed.store(true, Ordering::Release);
        let _ = self.notifier.wake_tx.try_send(());
        let _ = worker.join();
        *self.notifier.shared.observer() = None;
    }
}

impl Drop for PathBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_path_loop(shared: &PathShared, wake_rx: &Receiver<()>) {
    while wake_rx.recv().is_ok() {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        let Some(path) = shared.latest().take() else {
            continue;
        };
        let observer = shared.observer().clone();

        match observer {
            Some(observer) => {
                debug!("Default path changed: {:?}", path.status);
                observer.on_default_path_change(path);
            }
            None => trace!("No path observer registered, dropping {:?}", path.status),
        }
    }
}
