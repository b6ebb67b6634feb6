//! Dispatch properties observed from outside: routing, the auth gate,
//! identity propagation, and upstream relay behavior.

#![allow(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use portico_gateway::identity::HttpIdentityVerifier;
use portico_gateway::routes::RouteTable;
use portico_gateway::server::{AppState, router};
use portico_settings::{AuthSettings, RouteSettings};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn route(prefix: &str, upstream: &str, rewrite: &str, requires_auth: bool) -> RouteSettings {
    RouteSettings {
        prefix: prefix.to_string(),
        upstream: upstream.to_string(),
        rewrite: rewrite.to_string(),
        requires_auth,
        websocket: false,
    }
}

async fn spawn_gateway(routes: &[RouteSettings], authority: &MockServer) -> SocketAddr {
    let auth_settings = AuthSettings {
        authority_url: authority.uri(),
        timeout_ms: 1_000,
    };
    let verifier = HttpIdentityVerifier::new(&auth_settings).unwrap();
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let state = AppState::new(
        RouteTable::from_settings(routes),
        Arc::new(verifier),
        reqwest::Client::new(),
        handle,
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn accepting_authority(identity: serde_json::Value) -> MockServer {
    let authority = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/check_jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(identity))
        .mount(&authority)
        .await;
    authority
}

async fn rejecting_authority() -> MockServer {
    let authority = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/check_jwt"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&authority)
        .await;
    authority
}

#[tokio::test]
async fn private_route_without_valid_credential_never_reaches_upstream() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let addr =
        spawn_gateway(&[route("/user", &upstream.uri(), "/user", true)], &authority).await;

    // Once with no credential at all, once with a rejected one.
    let client = reqwest::Client::new();
    for request in [
        client.get(format!("http://{addr}/user/me")),
        client
            .get(format!("http://{addr}/user/me"))
            .header("authorization", "Bearer expired"),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Unauthorized");
    }

    assert!(
        upstream.received_requests().await.unwrap().is_empty(),
        "upstream observed a request that should have been gated"
    );
}

#[tokio::test]
async fn private_route_with_credential_forwards_verified_identity() {
    let authority = accepting_authority(serde_json::json!({
        "id": "u1",
        "name": "Ada",
        "email": "ada@example.com"
    }))
    .await;

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/me"))
        .and(header("x-sender-id", "u1"))
        .and(header("x-sender-name", "Ada"))
        .and(header("x-sender-email", "ada@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&upstream)
        .await;

    let addr =
        spawn_gateway(&[route("/user", &upstream.uri(), "/user", true)], &authority).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/user/me"))
        .header("authorization", "Bearer good")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn longest_prefix_routes_public_subtree_past_the_gate() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/public/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("docs"))
        .mount(&upstream)
        .await;

    let addr = spawn_gateway(
        &[
            route("/user", &upstream.uri(), "/user", true),
            route("/user/public", &upstream.uri(), "/user/public", false),
        ],
        &authority,
    )
    .await;

    // No credential, but the more specific public prefix wins.
    let response = reqwest::Client::new()
        .get(format!("http://{addr}/user/public/docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "docs");
}

#[tokio::test]
async fn unmatched_path_is_not_found() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    let addr =
        spawn_gateway(&[route("/user", &upstream.uri(), "/user", false)], &authority).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/nothing/here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let authority = rejecting_authority().await;
    // Nothing listens on port 9 (discard).
    let addr = spawn_gateway(
        &[route("/user", "http://127.0.0.1:9", "/user", false)],
        &authority,
    )
    .await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/user/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bad Gateway");
}

#[tokio::test]
async fn upstream_status_is_relayed_verbatim() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(418).set_body_string("short and stout"))
        .mount(&upstream)
        .await;

    let addr =
        spawn_gateway(&[route("/tea", &upstream.uri(), "/tea", false)], &authority).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/tea/pot"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 418);
    assert_eq!(response.text().await.unwrap(), "short and stout");
}

#[tokio::test]
async fn client_supplied_identity_headers_are_stripped() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let addr = spawn_gateway(
        &[route("/open", &upstream.uri(), "/open", false)],
        &authority,
    )
    .await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/open/data"))
        .header("x-sender-id", "forged")
        .header("x-sender-name", "Mallory")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let seen = upstream.received_requests().await.unwrap();
    assert_eq!(seen.len(), 1);
    assert!(
        !seen[0].headers.contains_key("x-sender-id"),
        "forged identity header leaked to the upstream"
    );
    assert!(!seen[0].headers.contains_key("x-sender-name"));
}

#[tokio::test]
async fn rewrite_and_query_are_applied() {
    let authority = rejecting_authority().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/internal/users/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let addr = spawn_gateway(
        &[route("/api", &upstream.uri(), "/internal", false)],
        &authority,
    )
    .await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/users/list?page=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn post_body_streams_through_both_ways() {
    let authority = accepting_authority(serde_json::json!({"id": "u1"})).await;
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/social/friend/request"))
        .and(header("x-sender-id", "u1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": true, "message": "sent"})),
        )
        .mount(&upstream)
        .await;

    let addr = spawn_gateway(
        &[route(
            "/social/friend",
            &upstream.uri(),
            "/social/friend",
            true,
        )],
        &authority,
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/social/friend/request"))
        .header("authorization", "Bearer good")
        .json(&serde_json::json!({"user_id": "u1", "friend_id": "u2"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let seen = upstream.received_requests().await.unwrap();
    assert_eq!(seen.len(), 1);
    let forwarded: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
    assert_eq!(forwarded["friend_id"], "u2");
}

#[tokio::test]
async fn authority_is_consulted_once_per_private_request() {
    let authority = accepting_authority(serde_json::json!({"id": "u1"})).await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let addr =
        spawn_gateway(&[route("/user", &upstream.uri(), "/user", true)], &authority).await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let response = client
            .get(format!("http://{addr}/user/me"))
            .header("authorization", "Bearer good")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // No caching: three private requests, three authority round-trips.
    assert_eq!(authority.received_requests().await.unwrap().len(), 3);
}
