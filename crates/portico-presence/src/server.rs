//! Presence service assembly: state, router, listener.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use portico_core::event::Event;
use portico_settings::PorticoSettings;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::fanout::EventFanout;
use crate::metrics::EVENTS_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::socket::presence_socket;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Fanout engine over the registry.
    pub fanout: Arc<EventFanout>,
    /// Per-connection outbound buffer size.
    pub channel_capacity: usize,
    /// Renders the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Wire the registry and fanout engine from settings.
    pub fn from_settings(settings: &PorticoSettings, metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(EventFanout::new(
            Arc::clone(&registry),
            settings.presence.max_send_drops,
        ));
        Self {
            registry,
            fanout,
            channel_capacity: settings.presence.channel_capacity,
            metrics,
        }
    }
}

/// Build the presence router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/social/wss", get(presence_socket))
        .route("/social/online", get(online_users))
        .route("/social/stats", get(stats))
        .route("/social/events", post(dispatch_event))
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the presence service until shutdown.
pub async fn serve(settings: &PorticoSettings, metrics: PrometheusHandle) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings, metrics);
    let app = router(state);

    let addr = format!("{}:{}", settings.presence.host, settings.presence.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "presence service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

async fn online_users(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut users = state.registry.online_users();
    users.sort();
    Json(json!({"users": users}))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.registry.stats();
    Json(json!({"totalUsers": stats.users, "totalConnections": stats.connections}))
}

/// Event injection request from the business-logic services.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDispatch {
    /// Target user ids; ignored when `broadcast` is set.
    #[serde(default)]
    pub user_ids: Vec<String>,
    /// Deliver to every connected user.
    #[serde(default)]
    pub broadcast: bool,
    /// The event to deliver.
    pub event: Event,
}

/// `POST /social/events` — deliver an event on behalf of a collaborator.
///
/// Delivery is best-effort by design, so the response only acknowledges
/// acceptance; per-connection failures stay inside the fanout engine.
async fn dispatch_event(
    State(state): State<AppState>,
    Json(dispatch): Json<EventDispatch>,
) -> Response {
    if dispatch.broadcast {
        counter!(EVENTS_TOTAL, "kind" => "broadcast").increment(1);
        state.fanout.broadcast(&dispatch.event);
    } else if dispatch.user_ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "userIds is empty and broadcast is false"})),
        )
            .into_response();
    } else {
        counter!(EVENTS_TOTAL, "kind" => "targeted").increment(1);
        state.fanout.send_to_users(&dispatch.user_ids, &dispatch.event);
    }
    (StatusCode::ACCEPTED, Json(json!({"accepted": true}))).into_response()
}
