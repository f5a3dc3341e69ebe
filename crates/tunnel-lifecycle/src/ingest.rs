//! Event ingestion point.
//!
//! Backend callback threads and OS observers hand events to the reducer
//! through an [`EventSender`]. The queue is unbounded so a producer never
//! blocks, and a single queue serializes every producer: events from one
//! producer reach the reducer in the order they were submitted.

use crate::event::BackendEvent;
use crossbeam_channel::{Receiver, RecvError, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Messages consumed by the reducer thread.
#[derive(Debug)]
pub(crate) enum ReducerMessage {
    /// Event to reduce
    Event(BackendEvent),
    /// Stop the reducer and close the published slots
    Shutdown,
}

/// Create the reducer queue.
pub(crate) fn channel() -> (EventSender, EventQueue) {
    let (tx, rx) = unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    (
        EventSender {
            tx,
            closed: closed.clone(),
        },
        EventQueue { rx, closed },
    )
}

/// Consumer side of the reducer queue. Marks the senders closed on drop.
pub(crate) struct EventQueue {
    rx: Receiver<ReducerMessage>,
    closed: Arc<AtomicBool>,
}

impl EventQueue {
    /// Block until the next message arrives
    pub(crate) fn recv(&self) -> Result<ReducerMessage, RecvError> {
        self.rx.recv()
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&self) -> Option<ReducerMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Handle used to submit backend events from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<ReducerMessage>,
    closed: Arc<AtomicBool>,
}

impl EventSender {
    /// Enqueue an event for the reducer.
    ///
    /// Never blocks and never fails. Once the reducer has been torn down
    /// the event is discarded.
    pub fn submit(&self, event: BackendEvent) {
        if let Err(e) = self.tx.send(ReducerMessage::Event(event)) {
            if let ReducerMessage::Event(event) = e.into_inner() {
                trace!("Dropping {} event submitted after teardown", event.kind());
            }
        }
    }

    /// Whether the reducer has gone away
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ask the reducer to stop after the events already queued
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(ReducerMessage::Shutdown);
    }
}
