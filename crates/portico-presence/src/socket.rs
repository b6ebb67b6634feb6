//! The WebSocket endpoint that terminates gateway-forwarded upgrades.
//!
//! Identity comes exclusively from the `x-sender-*` headers the gateway
//! injected after verification; a request without them never upgrades.
//! Each accepted socket runs one task through a single exit path, so
//! `unregister` happens exactly once no matter what ended the session —
//! client close, transport error, eviction, or server shutdown.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use portico_core::event::Event;
use portico_core::identity::{
    SENDER_EMAIL_HEADER, SENDER_ID_HEADER, SENDER_NAME_HEADER, VerifiedIdentity,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::server::AppState;

/// What ended a connection's relay loop.
enum ExitReason {
    /// The transport closed or errored, or the client said goodbye.
    Transport,
    /// The fanout engine evicted this connection from the registry and
    /// the outbound buffer went away underneath us.
    Evicted,
}

/// `GET /social/wss` — upgrade handler.
pub async fn presence_socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = sender_identity(&headers) else {
        warn!("websocket upgrade without verified identity headers");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response();
    };
    ws.on_upgrade(move |socket| run_connection(state, identity, socket))
}

/// Read the gateway-injected identity headers.
///
/// `None` when the id header is absent, unreadable, or empty — the
/// gateway never forwards such a request on a private route, so seeing
/// one here means the caller bypassed the gateway.
pub fn sender_identity(headers: &HeaderMap) -> Option<VerifiedIdentity> {
    let id = headers.get(SENDER_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    Some(VerifiedIdentity {
        id: id.to_string(),
        name: header(SENDER_NAME_HEADER),
        email: header(SENDER_EMAIL_HEADER),
    })
}

/// Own one socket from registration to cleanup.
async fn run_connection(state: AppState, identity: VerifiedIdentity, socket: WebSocket) {
    let (outbound_tx, outbound_rx) = mpsc::channel(state.channel_capacity);
    let connection = Arc::new(Connection::new(identity.id.clone(), outbound_tx));
    let connection_id = connection.id;

    let came_online = state.registry.register(connection);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(
        user_id = %identity.id,
        %connection_id,
        online_users = state.registry.stats().users,
        "user connected"
    );
    if came_online {
        state
            .fanout
            .broadcast(&Event::new("presence.online", json!({"userId": identity.id})));
    }

    let reason = relay(socket, outbound_rx).await;

    // Single exit path: everything below runs exactly once per socket.
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    let owner = state.registry.unregister(connection_id);
    let removed_here = owner.is_some() || matches!(reason, ExitReason::Evicted);
    if removed_here && !state.registry.is_online(&identity.id) {
        state
            .fanout
            .broadcast(&Event::new("presence.offline", json!({"userId": identity.id})));
    }
    info!(
        user_id = %identity.id,
        %connection_id,
        online_users = state.registry.stats().users,
        "user disconnected"
    );
}

/// Pump events out and watch the inbound half until either side ends.
///
/// Inbound frames are not part of this service's surface: text and binary
/// payloads are discarded, ping/pong is handled by the protocol layer.
async fn relay(socket: WebSocket, mut outbound: mpsc::Receiver<Arc<String>>) -> ExitReason {
    let (mut sink, mut stream) = socket.split();
    let reason = loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.as_str().into())).await.is_err() {
                            break ExitReason::Transport;
                        }
                    }
                    // Sender gone while we are still alive: the registry
                    // dropped us (slow-client eviction).
                    None => break ExitReason::Evicted,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        break ExitReason::Transport;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    };
    // Best effort: the transport may already be gone.
    let _ = sink.send(Message::Close(None)).await;
    reason
}
