//! Fan-out of notifications to live observers.
//!
//! [`BroadcastHub`] keeps one bounded `tokio::sync::mpsc` channel per
//! observer. Publishing never waits: an observer whose buffer is full or
//! whose receiver was dropped is removed from the registry, and the other
//! observers are unaffected. Each observer receives notifications in
//! publish order.

use std::collections::HashMap;

use autopost_core::event::Event;
use autopost_core::job::JobKind;
use autopost_core::status::Status;
use autopost_core::types::JobId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A message delivered to observers.
///
/// Serialized as `{"event": "<name>", "data": {...}}` with the names
/// `status`, `log`, `jobSucceeded` and `jobFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Notification {
    /// Initial state sent to every new observer.
    Status { status: Status, events: Vec<Event> },

    /// One appended event.
    Log(Event),

    /// A job exited with code 0.
    JobSucceeded {
        job_id: JobId,
        kind: JobKind,
        payload: serde_json::Value,
    },

    /// A job failed to start, exited non-zero, timed out, or was cancelled.
    JobFailed {
        job_id: JobId,
        kind: JobKind,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Registry key for an observer.
pub type ObserverId = u64;

/// Receiving end handed to a subscriber.
///
/// `recv` returns `None` once the observer has been unsubscribed or
/// evicted and the buffered notifications are drained.
pub struct Observer {
    id: ObserverId,
    receiver: mpsc::Receiver<Notification>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    /// Next buffered notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(notification),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

/// Default per-observer buffer, in notifications.
pub const DEFAULT_OBSERVER_BUFFER: usize = 256;

/// Registry of observer channels.
///
/// Not internally synchronized; the owner serializes access together with
/// the event log so that publish order matches append order.
pub struct BroadcastHub {
    buffer: usize,
    next_id: ObserverId,
    observers: HashMap<ObserverId, mpsc::Sender<Notification>>,
}

impl BroadcastHub {
    /// Create a hub whose observers buffer up to `buffer` notifications.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: 0,
            observers: HashMap::new(),
        }
    }

    /// Register an observer and queue its snapshot.
    pub fn subscribe(&mut self, status: Status, events: Vec<Event>) -> Observer {
        let (tx, rx) = mpsc::channel(self.buffer);
        // The channel is fresh and has room for at least one message.
        let _ = tx.try_send(Notification::Status { status, events });

        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(id, tx);
        tracing::debug!(observer_id = id, "Observer subscribed");

        Observer { id, receiver: rx }
    }

    /// Deliver `notification` to every observer.
    ///
    /// Returns the number of observers it was delivered to. Observers that
    /// are full or gone are dropped from the registry.
    pub fn publish(&mut self, notification: Notification) -> usize {
        let mut delivered = 0;
        self.observers
            .retain(|id, tx| match tx.try_send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(observer_id = *id, "Observer lagging, dropping it");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(observer_id = *id, "Observer disconnected");
                    false
                }
            });
        delivered
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
