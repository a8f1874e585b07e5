//! Process-wide table of identified connections.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use relay_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;

/// Unique connection identifier (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(prefixed_ulid(prefix::CONNECTION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized JSON frame, shared between all recipients of a fan-out.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is gone")]
    Gone,
    #[error("outbound queue is full")]
    Full,
}

/// Close gate shared by a session, its registry entry and its writer task.
///
/// Once shut, no frame is accepted onto the connection's queue. Shutting
/// waits for any enqueue already in progress, so everything in the queue
/// afterwards was accepted before the close.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: RwLock<bool>,
    notify: Notify,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shut the gate and wake the writer. Returns `false` if already shut.
    pub fn close(&self) -> bool {
        let mut closed = self.closed.write();
        if *closed {
            return false;
        }
        *closed = true;
        drop(closed);
        // Single waiter; the permit is kept if the writer is not parked yet.
        self.notify.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.notify.notified().await;
    }

    /// Enqueue `frame` without waiting, unless the gate is shut.
    pub fn try_send(&self, tx: &mpsc::Sender<Frame>, frame: Frame) -> Result<(), DeliveryError> {
        let closed = self.closed.read();
        if *closed {
            return Err(DeliveryError::Gone);
        }
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Gone,
        })
    }
}

/// A registered connection.
///
/// Holds only a weak handle to the connection's outbound queue; the
/// connection's session owns the strong end.
#[derive(Clone)]
pub struct RegistryEntry {
    pub conn_id: ConnectionId,
    pub username: String,
    outbound: mpsc::WeakSender<Frame>,
    signal: Arc<CloseSignal>,
}

impl RegistryEntry {
    /// Enqueue a frame on this connection's writer without waiting.
    pub fn deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        let tx = self.outbound.upgrade().ok_or(DeliveryError::Gone)?;
        self.signal.try_send(&tx, frame)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("conn_id", &self.conn_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Shared registry of active, identified connections.
///
/// A single mutex guards every read and write. Readers copy the entries out
/// and deliver after the lock is released.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `username`.
    ///
    /// Re-registering the same connection replaces its entry, so a connection
    /// never appears twice.
    pub fn register(
        &self,
        conn_id: ConnectionId,
        username: String,
        outbound: &mpsc::Sender<Frame>,
        signal: Arc<CloseSignal>,
    ) {
        let entry = RegistryEntry {
            conn_id,
            username,
            outbound: outbound.downgrade(),
            signal,
        };
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.conn_id == entry.conn_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn unregister(&self, conn_id: &ConnectionId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|e| &e.conn_id == conn_id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all entries, in registration order.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
