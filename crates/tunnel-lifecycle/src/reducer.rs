//! State reducer
//!
//! The single consumer of backend events. All mutation of the tunnel
//! state, the reassert gate and every provider side effect happens here,
//! one event at a time, on the reducer thread.
//!
//! # Transitions
//!
//! | Incoming state          | Side effect                                          |
//! |-------------------------|------------------------------------------------------|
//! | `Connecting`            | gate open: `set_reasserting(true)`                   |
//! | `Connected`             | gate open: `set_reasserting(false)`; open the gate   |
//! | `Disconnecting(Error)`  | schedule a failure notification                      |
//! | anything else           | none                                                 |
//!
//! The gate stays closed until the first `Connected` because the OS
//! rejects reasserting before the provider's start routine has returned.

use crate::config::BridgeConfig;
use crate::event::{BackendEvent, BandwidthEvent, ConnectionEvent};
use crate::ingest::{EventQueue, ReducerMessage};
use crate::notify::{FailureNotifier, Notification};
use crate::provider::ProviderHandle;
use crate::publish::{FatalErrorFlag, Slot};
use crate::state::{ActionAfterDisconnect, ErrorStateReason, TunnelState};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// When failure notifications are scheduled
#[derive(Debug, Clone)]
struct NotificationPolicy {
    on_failure: bool,
    on_error_state: bool,
    title: String,
}

/// Sequential tunnel state machine
pub struct StateReducer {
    current: Option<TunnelState>,
    /// Closed until the first `Connected` has been processed
    reassert_gate: bool,
    /// Last value handed to the provider
    reasserting: bool,
    provider: ProviderHandle,
    notifier: Arc<dyn FailureNotifier>,
    states: Slot<TunnelState>,
    fatal: FatalErrorFlag,
    policy: NotificationPolicy,
}

impl StateReducer {
    pub fn new(
        config: &BridgeConfig,
        provider: ProviderHandle,
        notifier: Arc<dyn FailureNotifier>,
        states: Slot<TunnelState>,
        fatal: FatalErrorFlag,
    ) -> Self {
        Self {
            current: states.current(),
            reassert_gate: false,
            reasserting: false,
            provider,
            notifier,
            states,
            fatal,
            policy: NotificationPolicy {
                on_failure: config.notify_on_failure,
                on_error_state: config.notify_on_error_state,
                title: config.failure_title.clone(),
            },
        }
    }

    /// Current tunnel state
    pub fn current(&self) -> Option<&TunnelState> {
        self.current.as_ref()
    }

    /// Whether reasserting may be toggled
    pub fn reassert_gate(&self) -> bool {
        self.reassert_gate
    }

    /// Reduce one backend event
    pub fn handle(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::NewState(state) => self.apply_state(state),
            BackendEvent::Bandwidth(bandwidth) => match bandwidth {
                BandwidthEvent::NoBandwidth => warn!("Backend reports no bandwidth left"),
                BandwidthEvent::RemainingBandwidth(_) => debug!("Bandwidth: {}", bandwidth),
            },
            BackendEvent::Connection(connection) => log_connection_event(connection),
        }
    }

    fn apply_state(&mut self, state: TunnelState) {
        if self.current.as_ref() == Some(&state) {
            trace!("Tunnel state unchanged: {}", state);
            return;
        }

        match &state {
            TunnelState::Connecting { .. } => {
                if self.reassert_gate {
                    self.set_reasserting(true);
                }
            }
            TunnelState::Connected { .. } => {
                if self.reassert_gate {
                    self.set_reasserting(false);
                }
                self.reassert_gate = true;
            }
            TunnelState::Disconnecting {
                after_disconnect: ActionAfterDisconnect::Error(reason),
            } => {
                if self.policy.on_failure {
                    self.schedule_failure(*reason);
                }
            }
            TunnelState::Error(reason) => {
                let announced = self
                    .current
                    .as_ref()
                    .is_some_and(TunnelState::is_disconnecting_with_error);
                if self.policy.on_error_state && !announced {
                    self.schedule_failure(*reason);
                }
            }
            TunnelState::Disconnected | TunnelState::Disconnecting { .. } => {}
        }

        info!("Tunnel state: {}", state);
        self.states.publish(state.clone());
        self.current = Some(state);
    }

    fn set_reasserting(&mut self, reasserting: bool) {
        if self.reasserting == reasserting {
            return;
        }

        let provider = &self.provider;
        if isolate("set_reasserting", || provider.set_reasserting(reasserting)) {
            self.reasserting = reasserting;
        }
    }

    fn schedule_failure(&self, reason: ErrorStateReason) {
        let notification = Notification::tunnel_failure(&self.policy.title, reason);
        let notifier = &self.notifier;

        isolate("schedule notification", || {
            if let Err(e) = notifier.schedule(&notification) {
                warn!("Failed to schedule failure notification: {}", e);
            }
        });
    }

    /// Close the published slots, ending every subscription
    pub fn finish(self) {
        debug!("Closing tunnel state publication");
        self.states.close();
        self.fatal.close();
    }
}

fn log_connection_event(event: ConnectionEvent) {
    if event.is_degraded() {
        warn!("Connectivity degraded: {:?}", event);
    } else {
        debug!("Connectivity: {:?}", event);
    }
}

/// Run a collaborator call so that a panic in it cannot take the reducer down.
///
/// Returns `false` if the call panicked.
fn isolate(op: &str, f: impl FnOnce()) -> bool {
    let Err(panic_info) = panic::catch_unwind(AssertUnwindSafe(f)) else {
        return true;
    };
    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };
    error!("Panic during {}: {}", op, msg);
    false
}

/// Spawn the reducer thread.
///
/// The thread runs until it receives a shutdown message or every sender
/// is dropped, then closes the published slots.
pub(crate) fn spawn_reducer(
    thread_name: &str,
    mut reducer: StateReducer,
    queue: EventQueue,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            info!("Tunnel reducer started");
            loop {
                match queue.recv() {
                    Ok(ReducerMessage::Event(event)) => reducer.handle(event),
                    Ok(ReducerMessage::Shutdown) => {
                        debug!("Tunnel reducer received shutdown");
                        break;
                    }
                    Err(_) => {
                        debug!("Event queue closed, shutting down");
                        break;
                    }
                }
            }
            // Late submits become no-ops from here on.
            drop(queue);
            reducer.finish();
            info!("Tunnel reducer stopped");
        })
}
