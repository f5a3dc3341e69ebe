//! Event bridge
//!
//! Ties the ingestion point, the reducer thread, the published slots and
//! the default-path bridge into one handle owned by the tunnel host.
//!
//! # Usage
//!
//! ```rust,ignore
//! let bridge = EventBridge::spawn(BridgeConfig::default(), provider, notifier)?;
//!
//! // Hand the sender to the backend callbacks
//! let events = bridge.sender();
//! events.submit(BackendEvent::NewState(TunnelState::Disconnected));
//!
//! // Wait for the tunnel, with our own timeout
//! let state = bridge.wait_until_started_within(Duration::from_secs(10)).await?;
//!
//! bridge.shutdown();
//! ```

use crate::config::{BridgeConfig, ConfigError};
use crate::ingest::{self, EventSender};
use crate::notify::FailureNotifier;
use crate::path::{DefaultPathObserver, PathBridge, PathNotifier};
use crate::provider::{ProviderError, ProviderHandle, TunnelNetworkSettings, TunnelProvider};
use crate::publish::{self, FatalErrorFlag, Slot, StartError, Subscription};
use crate::reducer::{StateReducer, spawn_reducer};
use crate::state::TunnelState;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Event bridge errors
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Running tunnel lifecycle bridge
pub struct EventBridge {
    config: BridgeConfig,
    sender: EventSender,
    states: Slot<TunnelState>,
    fatal: FatalErrorFlag,
    provider: ProviderHandle,
    path: PathBridge,
    reducer: Option<JoinHandle<()>>,
}

impl EventBridge {
    /// Validate the config and start the reducer and path threads
    pub fn spawn(
        config: BridgeConfig,
        provider: Weak<dyn TunnelProvider>,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        info!("Starting tunnel event bridge");

        let provider = ProviderHandle::new(provider);
        let states = Slot::new();
        let fatal = FatalErrorFlag::new();

        let path = PathBridge::spawn(&config.path_thread_name)?;
        let (sender, queue) = ingest::channel();
        let reducer = StateReducer::new(
            &config,
            provider.clone(),
            notifier,
            states.clone(),
            fatal.clone(),
        );
        let reducer = spawn_reducer(&config.reducer_thread_name, reducer, queue)?;

        // Attach last: a failed spawn must not leave the provider holding a
        // dead notifier.
        if provider.is_attached() {
            if let Err(e) = path.attach(&provider) {
                warn!("Failed to observe default path: {}", e);
            }
        }

        Ok(Self {
            config,
            sender,
            states,
            fatal,
            provider,
            path,
            reducer: Some(reducer),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Ingestion handle for backend callbacks
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Latest published state
    pub fn current_state(&self) -> Option<TunnelState> {
        self.states.current()
    }

    /// Stream of published states, starting at the current one
    pub fn subscribe(&self) -> Subscription<TunnelState> {
        self.states.subscribe()
    }

    pub fn fatal_error_flag(&self) -> FatalErrorFlag {
        self.fatal.clone()
    }

    /// Report that the backend died before emitting any state
    pub fn raise_fatal_error(&self) {
        self.fatal.raise();
    }

    /// Handle for OS default-path callbacks
    pub fn path_notifier(&self) -> PathNotifier {
        self.path.notifier()
    }

    pub fn register_path_observer(&self, observer: Option<Arc<dyn DefaultPathObserver>>) {
        self.path.register_observer(observer);
    }

    /// Validate and apply network settings through the provider
    pub fn apply_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError> {
        self.provider.apply_network_settings(settings)
    }

    /// Wait for `Connected`, `Disconnected` or `Error`. No timeout.
    pub async fn wait_until_started(&self) -> Result<TunnelState, StartError> {
        publish::wait_until_started(&self.states, &self.fatal).await
    }

    /// [`wait_until_started`](Self::wait_until_started) bounded by `timeout`
    pub async fn wait_until_started_within(
        &self,
        timeout: Duration,
    ) -> Result<TunnelState, StartError> {
        match tokio::time::timeout(timeout, self.wait_until_started()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Tunnel did not start within {:?}", timeout);
                Err(StartError::Timeout(timeout))
            }
        }
    }

    /// Stop both worker threads and end every subscription.
    ///
    /// Events already queued are reduced first. Safe to call twice.
    pub fn shutdown(&mut self) {
        let Some(reducer) = self.reducer.take() else {
            return;
        };
        info!("Shutting down tunnel event bridge");

        if let Err(e) = self.provider.set_default_path_observer(None) {
            warn!("Failed to clear default path observer: {}", e);
        }
        self.path.shutdown();

        self.sender.shutdown();
        if reducer.join().is_err() {
            warn!("Tunnel reducer thread panicked");
            self.states.close();
            self.fatal.close();
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
