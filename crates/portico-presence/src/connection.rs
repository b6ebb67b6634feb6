//! A single live WebSocket connection.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque id of one live connection.
///
/// Uuid v7 so ids sort by creation time in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One live socket channel owned by exactly one authenticated user.
///
/// The connection holds the *sending* half of a bounded outbound buffer;
/// the socket's writer task drains the other half. Fanout never awaits a
/// slow client: a full buffer is a dropped delivery for this connection
/// only, tallied in [`Connection::drop_count`].
pub struct Connection {
    /// Connection id, unique per socket.
    pub id: ConnectionId,
    /// Id of the verified user who owns this socket.
    pub user_id: String,
    sender: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

impl Connection {
    /// Create a connection owned by `user_id` writing into `sender`.
    pub fn new(user_id: impl Into<String>, sender: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id: user_id.into(),
            sender,
            drops: AtomicU64::new(0),
        }
    }

    /// Queue a serialized event for delivery; `false` when the buffer is
    /// full or the socket's writer is gone.
    pub fn send(&self, payload: Arc<String>) -> bool {
        if self.sender.try_send(payload).is_ok() {
            true
        } else {
            let _ = self.drops.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Lifetime count of dropped deliveries on this connection.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("drops", &self.drop_count())
            .finish_non_exhaustive()
    }
}
