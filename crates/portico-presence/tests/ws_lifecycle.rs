//! End-to-end WebSocket lifecycle: upgrade, registration, delivery,
//! cleanup on both graceful and abnormal disconnects.

#![allow(missing_docs)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use portico_core::event::Event;
use portico_presence::server::{AppState, router};
use portico_settings::PorticoSettings;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

async fn spawn_service() -> (SocketAddr, AppState) {
    let settings = PorticoSettings::default();
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let state = AppState::from_settings(&settings, handle);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(
    addr: SocketAddr,
    user: &str,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let mut request = format!("ws://{addr}/social/wss")
        .into_client_request()
        .unwrap();
    let _ = request
        .headers_mut()
        .insert("x-sender-id", user.parse().unwrap());
    let _ = request
        .headers_mut()
        .insert("x-sender-name", "Tester".parse().unwrap());
    let (stream, _response) = connect_async(request).await.unwrap();
    stream
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn upgrade_without_identity_is_unauthorized() {
    let (addr, _state) = spawn_service().await;

    let request = format!("ws://{addr}/social/wss")
        .into_client_request()
        .unwrap();
    let error = connect_async(request).await.unwrap_err();

    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected HTTP 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_registers_and_close_unregisters() {
    let (addr, state) = spawn_service().await;

    let mut stream = connect(addr, "u1").await;
    wait_until(|| state.registry.is_online("u1"), "u1 to come online").await;
    assert_eq!(state.registry.stats().connections, 1);

    stream.close(None).await.unwrap();
    wait_until(|| !state.registry.is_online("u1"), "u1 to go offline").await;
    assert_eq!(state.registry.stats().connections, 0);
}

#[tokio::test]
async fn abrupt_disconnect_still_unregisters() {
    let (addr, state) = spawn_service().await;

    let stream = connect(addr, "u1").await;
    wait_until(|| state.registry.is_online("u1"), "u1 to come online").await;

    // No close frame — the transport just dies.
    drop(stream);
    wait_until(|| !state.registry.is_online("u1"), "u1 to go offline").await;
    assert_eq!(state.registry.stats().connections, 0);
}

#[tokio::test]
async fn events_reach_the_connected_client() {
    let (addr, state) = spawn_service().await;

    let mut stream = connect(addr, "u1").await;
    wait_until(|| state.registry.is_online("u1"), "u1 to come online").await;

    // First frame is the self-observed presence.online broadcast.
    let first = stream.next().await.unwrap().unwrap().into_text().unwrap();
    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(first["type"], "presence.online");
    assert_eq!(first["data"]["userId"], "u1");

    state
        .fanout
        .send_to_user("u1", &Event::new("friend.request", json!({"from": "u2"})));

    let second = stream.next().await.unwrap().unwrap().into_text().unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(second["type"], "friend.request");
    assert_eq!(second["data"]["from"], "u2");
}

#[tokio::test]
async fn second_device_keeps_user_online() {
    let (addr, state) = spawn_service().await;

    let mut first = connect(addr, "u1").await;
    wait_until(|| state.registry.is_online("u1"), "u1 to come online").await;
    let mut second = connect(addr, "u1").await;
    wait_until(
        || state.registry.stats().connections == 2,
        "second device to register",
    )
    .await;

    first.close(None).await.unwrap();
    wait_until(
        || state.registry.stats().connections == 1,
        "first device to unregister",
    )
    .await;
    assert!(state.registry.is_online("u1"));

    second.close(None).await.unwrap();
    wait_until(|| !state.registry.is_online("u1"), "u1 to go offline").await;
}
