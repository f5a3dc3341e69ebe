//! State publication and await point.
//!
//! A [`Slot`] holds the latest published value and fans every publish out
//! to its subscribers. A subscription starts with the value that was
//! current when it was created, then yields each later publish in order.
//! Every subscriber owns an unbounded queue, so a slow subscriber never
//! skips a value and never slows the publisher down.

use crate::state::TunnelState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct SlotInner<T> {
    current: Option<T>,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

/// Single-slot broadcastable value
pub struct Slot<T> {
    inner: Arc<Mutex<SlotInner<T>>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Slot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::with_value(None)
    }

    /// Create a slot holding `value`
    pub fn with_value(value: Option<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotInner {
                current: value,
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<T>> {
        // Publishing never leaves the slot half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current value and notify subscribers.
    ///
    /// Ignored once the slot is closed.
    pub fn publish(&self, value: T) {
        let mut inner = self.lock();
        if inner.closed {
            debug!("Ignoring publish on a closed slot");
            return;
        }
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(value.clone()).is_ok());
        inner.current = Some(value);
    }

    /// Latest published value
    pub fn current(&self) -> Option<T> {
        self.lock().current.clone()
    }

    /// Subscribe starting at the current value (inclusive)
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if let Some(value) = inner.current.clone() {
            let _ = tx.send(value);
        }
        // A closed slot still hands out its last value, then ends.
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// End every subscription. Later publishes are ignored.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|subscriber| !subscriber.is_closed());
        inner.subscribers.len()
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream of values published on a [`Slot`]
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next value. `None` once the slot is closed and drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Out-of-band flag raised when the backend dies before reporting any state
#[derive(Clone)]
pub struct FatalErrorFlag {
    slot: Slot<bool>,
}

impl FatalErrorFlag {
    pub fn new() -> Self {
        Self {
            slot: Slot::with_value(Some(false)),
        }
    }

    /// Mark the backend start as failed
    pub fn raise(&self) {
        if !self.is_raised() {
            warn!("Backend start failure reported");
            self.slot.publish(true);
        }
    }

    pub fn is_raised(&self) -> bool {
        self.slot.current().unwrap_or(false)
    }

    pub fn subscribe(&self) -> Subscription<bool> {
        self.slot.subscribe()
    }

    /// Resolve once the flag is raised.
    ///
    /// Returns `false` if the flag was closed without being raised.
    pub async fn wait(&self) -> bool {
        let mut values = self.subscribe();
        while let Some(raised) = values.next().await {
            if raised {
                return true;
            }
        }
        false
    }

    pub(crate) fn close(&self) {
        self.slot.close();
    }
}

impl Default for FatalErrorFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a startup wait ended without a terminal state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Backend failed to start")]
    BackendStartFailure,

    #[error("Tunnel was torn down before it started")]
    Closed,

    #[error("Tunnel did not start within {0:?}")]
    Timeout(Duration),
}

/// Wait until the published state is `Connected`, `Disconnected` or `Error`.
///
/// Fails fast with [`StartError::BackendStartFailure`] when the fatal flag
/// is raised. There is no timeout here; callers apply their own.
pub async fn wait_until_started(
    states: &Slot<TunnelState>,
    fatal: &FatalErrorFlag,
) -> Result<TunnelState, StartError> {
    let mut fatal_values = fatal.subscribe();
    let mut state_values = states.subscribe();
    let mut fatal_open = true;

    loop {
        tokio::select! {
            biased;

            raised = fatal_values.next(), if fatal_open => match raised {
                Some(true) => return Err(StartError::BackendStartFailure),
                Some(false) => {}
                None => fatal_open = false,
            },

            state = state_values.next() => match state {
                Some(state) if state.is_startup_terminal() => {
                    debug!("Tunnel started: {}", state);
                    return Ok(state);
                }
                Some(state) => debug!("Still waiting for tunnel start: {}", state),
                None => return Err(StartError::Closed),
            },
        }
    }
}
