//! Event fan-out to live connections.

use std::sync::Arc;

use metrics::counter;
use portico_core::event::Event;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;
use crate::registry::ConnectionRegistry;

/// Delivers events to a user's connections, a set of users, or everyone.
///
/// Delivery is best-effort: the payload is serialized once per call and
/// offered to each target connection independently. A connection whose
/// buffer is full (or whose writer is gone) loses that one delivery; the
/// failure is logged and counted and never reaches the caller or the
/// other targets. A connection that keeps dropping past the configured
/// threshold is evicted from the registry so a dead client cannot pile up
/// drops forever.
pub struct EventFanout {
    registry: Arc<ConnectionRegistry>,
    max_send_drops: u64,
}

impl EventFanout {
    /// Create a fanout engine over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, max_send_drops: u64) -> Self {
        Self {
            registry,
            max_send_drops,
        }
    }

    /// Deliver `event` to every connection of one user.
    ///
    /// An offline user is a silent no-op — "not online" is an expected,
    /// frequent condition, not an error.
    pub fn send_to_user(&self, user_id: &str, event: &Event) {
        let targets = self.registry.connections_of(user_id);
        if targets.is_empty() {
            debug!(user_id, event_type = %event.event_type, "user offline, event skipped");
            return;
        }
        self.deliver(&targets, event, user_id);
    }

    /// Deliver `event` to each listed user independently.
    ///
    /// One user being offline or failing never affects another's delivery.
    pub fn send_to_users(&self, user_ids: &[String], event: &Event) {
        for user_id in user_ids {
            self.send_to_user(user_id, event);
        }
    }

    /// Deliver `event` to every connection of every online user.
    pub fn broadcast(&self, event: &Event) {
        let targets = self.registry.all_connections();
        if targets.is_empty() {
            return;
        }
        self.deliver(&targets, event, "all");
    }

    /// Serialize once, offer to each target, evict hopeless connections.
    fn deliver(&self, targets: &[Arc<Connection>], event: &Event, label: &str) {
        let payload = match event.to_wire() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return;
            }
        };

        let mut delivered = 0usize;
        for conn in targets {
            if conn.send(Arc::clone(&payload)) {
                delivered += 1;
                continue;
            }
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            let drops = conn.drop_count();
            if drops >= self.max_send_drops {
                warn!(
                    connection_id = %conn.id,
                    user_id = %conn.user_id,
                    label,
                    drops,
                    "evicting slow connection"
                );
                let _ = self.registry.unregister(conn.id);
            } else {
                warn!(
                    connection_id = %conn.id,
                    user_id = %conn.user_id,
                    label,
                    total_drops = drops,
                    "failed to deliver event (buffer full)"
                );
            }
        }
        debug!(
            event_type = %event.event_type,
            label,
            targets = targets.len(),
            delivered,
            "event fanned out"
        );
    }
}
