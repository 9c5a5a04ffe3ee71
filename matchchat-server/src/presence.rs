//! Presence registry: which connection currently reaches which member.
//!
//! At most one live [`ConnectionHandle`] is registered per [`UserId`]; a new
//! join for the same user silently replaces the previous one. A connection
//! only ever removes entries that still point at itself, so a slow teardown
//! of a superseded connection cannot erase the newer registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use matchchat_proto::event::ServerEvent;
use matchchat_proto::message::UserId;
use parking_lot::RwLock;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    #[must_use]
    pub fn allocate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Cloneable reference to one live connection's outbound event queue.
///
/// Handles compare equal only if they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl ConnectionHandle {
    /// Wraps an existing sender under a fresh connection id.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::allocate(),
            tx,
        }
    }

    /// Creates a handle together with the receiving end of its queue.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// This connection's identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an event for the connection.
    ///
    /// Returns `false` if the connection has already gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Returns `true` once the connection's writer has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Process-wide `UserId → ConnectionHandle` table.
///
/// Every operation takes the lock exactly once and never holds it across an
/// await point.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` as the live connection for `user`.
    ///
    /// Returns the handle it displaced, if any. The displaced connection is
    /// not notified.
    pub fn join(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.write().insert(user, handle)
    }

    /// Removes every entry still held by `handle`, returning the users that
    /// went offline. Entries already taken over by newer connections stay.
    pub fn leave(&self, handle: &ConnectionHandle) -> Vec<UserId> {
        let mut removed = Vec::new();
        self.entries.write().retain(|user, held| {
            if held == handle {
                removed.push(user.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns the live connection for `user`, if any.
    #[must_use]
    pub fn lookup(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.entries.read().get(user).cloned()
    }

    /// Number of users currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.entries.read().len()
    }
}
