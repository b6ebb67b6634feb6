//! Bookkeeping of which user owns which live connections.
//!
//! The registry holds the only mutable shared state in this service: the
//! forward relation `user → connections` and its inverse
//! `connection → user`. Both live in one struct behind one lock, so a
//! compound update (insert into forward set + inverse map) is atomic with
//! respect to every reader — no torn state where one relation has been
//! updated and the other has not.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::connection::{Connection, ConnectionId};

/// Aggregate registry counts for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Users with at least one live connection.
    pub users: usize,
    /// Live connections across all users.
    pub connections: usize,
}

/// Forward and inverse relations, always mutated together.
#[derive(Default)]
struct Relations {
    forward: HashMap<String, HashSet<ConnectionId>>,
    inverse: HashMap<ConnectionId, Arc<Connection>>,
}

/// Tracks online users and their live connections.
///
/// One instance per process, constructed by the composition root and
/// shared by reference with every connection handler. All operations are
/// safe under concurrent invocation and appear atomic.
pub struct ConnectionRegistry {
    relations: RwLock<Relations>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            relations: RwLock::new(Relations::default()),
        }
    }

    /// Add a connection under its owner.
    ///
    /// Idempotent per connection id. Returns `true` when this is the
    /// user's first live connection, i.e. the user just came online.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        let mut relations = self.relations.write();
        let set = relations
            .forward
            .entry(connection.user_id.clone())
            .or_default();
        let came_online = set.is_empty();
        let _ = set.insert(connection.id);
        let _ = relations.inverse.insert(connection.id, Arc::clone(&connection));

        debug!(
            user_id = %connection.user_id,
            connection_id = %connection.id,
            online_users = relations.forward.len(),
            "connection registered"
        );
        came_online
    }

    /// Remove a connection, returning its owner's id.
    ///
    /// Removing the owner's last connection removes the owner from the
    /// forward relation entirely. An id that was never registered (or was
    /// already removed — a normal race during teardown) returns `None`.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<String> {
        let mut relations = self.relations.write();
        let connection = relations.inverse.remove(&connection_id)?;
        let user_id = connection.user_id.clone();

        if let Some(set) = relations.forward.get_mut(&user_id) {
            let _ = set.remove(&connection_id);
            if set.is_empty() {
                let _ = relations.forward.remove(&user_id);
            }
        }

        debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            online_users = relations.forward.len(),
            "connection unregistered"
        );
        Some(user_id)
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.relations.read().forward.contains_key(user_id)
    }

    /// Ids of every user with at least one live connection.
    pub fn online_users(&self) -> Vec<String> {
        self.relations.read().forward.keys().cloned().collect()
    }

    /// The user's live connections; empty when offline.
    pub fn connections_of(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let relations = self.relations.read();
        relations
            .forward
            .get(user_id)
            .map(|set| {
                set.iter()
                    .filter_map(|id| relations.inverse.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every live connection across all users.
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.relations.read().inverse.values().cloned().collect()
    }

    /// The owner of a connection, if it is still registered.
    pub fn owner_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.relations
            .read()
            .inverse
            .get(&connection_id)
            .map(|c| c.user_id.clone())
    }

    /// Consistent user/connection counts.
    pub fn stats(&self) -> RegistryStats {
        let relations = self.relations.read();
        RegistryStats {
            users: relations.forward.len(),
            connections: relations.inverse.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
