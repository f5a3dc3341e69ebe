//! Test doubles shared by the unit tests.

use crate::notify::{FailureNotifier, Notification, NotifyError};
use crate::path::{DefaultPath, DefaultPathObserver};
use crate::provider::{
    DnsSettings, Ipv4Settings, Ipv6Settings, ProviderError, TunnelNetworkSettings, TunnelProvider,
};
use crate::state::{ConnectionData, MixnetConnectionData, TunnelConnectionData, TunnelState};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

pub fn connection_data(entry: &str, exit: &str) -> ConnectionData {
    ConnectionData {
        entry_gateway: entry.to_string(),
        exit_gateway: exit.to_string(),
        connected_at: None,
        tunnel: TunnelConnectionData::Mixnet(MixnetConnectionData {
            nym_address: format!("client.{}", entry),
            exit_ipr: format!("ipr.{}", exit),
            ipv4: Ipv4Addr::new(10, 0, 0, 2),
            ipv6: Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 2),
        }),
    }
}

pub fn connecting(connection_data: Option<ConnectionData>) -> TunnelState {
    TunnelState::Connecting { connection_data }
}

pub fn connected(entry: &str, exit: &str) -> TunnelState {
    TunnelState::Connected {
        connection_data: connection_data(entry, exit),
    }
}

pub fn network_settings() -> TunnelNetworkSettings {
    TunnelNetworkSettings {
        tunnel_remote_address: "203.0.113.7".to_string(),
        ipv4: Some(Ipv4Settings {
            addresses: vec![Ipv4Addr::new(10, 0, 0, 2)],
            prefix: 16,
        }),
        ipv6: Some(Ipv6Settings {
            addresses: vec![Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 2)],
            prefix: 112,
        }),
        dns: Some(DnsSettings {
            servers: vec![IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))],
            search_domains: Vec::new(),
            match_domains: vec![String::new()],
        }),
        mtu: 1280,
    }
}

/// Non-owning reference to a test provider
pub fn weak_provider(provider: &Arc<RecordingProvider>) -> Weak<dyn TunnelProvider> {
    Arc::<RecordingProvider>::downgrade(provider)
}

/// Provider that records every call
#[derive(Default)]
pub struct RecordingProvider {
    reasserting: Mutex<Vec<bool>>,
    settings: Mutex<Vec<TunnelNetworkSettings>>,
    path_observer: Mutex<Option<Arc<dyn DefaultPathObserver>>>,
    reject_settings: bool,
    reasserting_panics: AtomicUsize,
}

impl RecordingProvider {
    pub fn rejecting_settings() -> Self {
        Self {
            reject_settings: true,
            ..Self::default()
        }
    }

    /// Provider whose first `times` reasserting calls panic
    pub fn panicking_reasserting(times: usize) -> Self {
        Self {
            reasserting_panics: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn reasserting_calls(&self) -> Vec<bool> {
        self.reasserting.lock().unwrap().clone()
    }

    pub fn applied_settings(&self) -> Vec<TunnelNetworkSettings> {
        self.settings.lock().unwrap().clone()
    }

    /// Whether a default path observer is registered
    pub fn observes_path(&self) -> bool {
        self.path_observer.lock().unwrap().is_some()
    }

    /// Simulate an OS path change
    pub fn emit_path(&self, path: DefaultPath) {
        let observer = self.path_observer.lock().unwrap().clone();
        if let Some(observer) = observer {
            observer.on_default_path_change(path);
        }
    }
}

impl TunnelProvider for RecordingProvider {
    fn set_reasserting(&self, reasserting: bool) {
        let remaining = self.reasserting_panics.load(Ordering::SeqCst);
        if remaining > 0 {
            self.reasserting_panics.store(remaining - 1, Ordering::SeqCst);
            panic!("provider rejected reasserting");
        }
        self.reasserting.lock().unwrap().push(reasserting);
    }

    fn set_tunnel_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError> {
        if self.reject_settings {
            return Err(ProviderError::Platform("settings rejected".to_string()));
        }
        self.settings.lock().unwrap().push(settings.clone());
        Ok(())
    }

    fn set_default_path_observer(
        &self,
        observer: Option<Arc<dyn DefaultPathObserver>>,
    ) -> Result<(), ProviderError> {
        *self.path_observer.lock().unwrap() = observer;
        Ok(())
    }
}

enum NotifierMode {
    Accept,
    Fail(NotifyError),
    Panic,
}

/// Notifier that records every scheduling attempt
pub struct RecordingNotifier {
    mode: NotifierMode,
    attempts: AtomicUsize,
    scheduled: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn with_mode(mode: NotifierMode) -> Self {
        Self {
            mode,
            attempts: AtomicUsize::new(0),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: NotifyError) -> Self {
        Self::with_mode(NotifierMode::Fail(error))
    }

    pub fn panicking() -> Self {
        Self::with_mode(NotifierMode::Panic)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn scheduled(&self) -> Vec<Notification> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::with_mode(NotifierMode::Accept)
    }
}

impl FailureNotifier for RecordingNotifier {
    fn schedule(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            NotifierMode::Accept => {
                self.scheduled.lock().unwrap().push(notification.clone());
                Ok(())
            }
            NotifierMode::Fail(error) => Err(error.clone()),
            NotifierMode::Panic => panic!("notification service crashed"),
        }
    }
}

/// Path observer forwarding every change to a channel
pub struct RecordingPathObserver {
    tx: Sender<DefaultPath>,
    rx: Receiver<DefaultPath>,
}

impl RecordingPathObserver {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DefaultPath> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Default for RecordingPathObserver {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

impl DefaultPathObserver for RecordingPathObserver {
    fn on_default_path_change(&self, path: DefaultPath) {
        let _ = self.tx.send(path);
    }
}
