//! Real-time events delivered to connected clients.
//!
//! An [`Event`] is a tagged payload: a `type` string plus opaque JSON
//! `data`. The fanout engine serializes an event exactly once per call and
//! shares the resulting string across every target connection; it never
//! inspects `data`. Events are transient — they exist only for the duration
//! of one delivery attempt and are never stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tagged real-time event destined for one user, a set of users, or the
/// whole connected population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type tag, e.g. `presence.online` or `friend.request`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload. Omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Event {
    /// Create an event with a payload.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data),
        }
    }

    /// Create a payload-less event.
    pub fn tag(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
        }
    }

    /// Serialize to the wire format.
    ///
    /// Fails only if `data` contains a non-serializable value (e.g. a map
    /// with non-string keys), which callers treat as a skipped delivery.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
