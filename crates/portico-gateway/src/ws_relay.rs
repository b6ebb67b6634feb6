//! WebSocket upgrade forwarding.
//!
//! The gateway completes the client's handshake, dials the upstream with
//! the rewritten path and the already-injected identity headers, then
//! relays frames both ways untouched until either side closes — normally
//! or not. It never parses frame payloads.

use axum::extract::ws::{CloseFrame, Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::header::{CONNECTION, HOST, UPGRADE};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::metrics::{WS_RELAYS_ACTIVE, WS_RELAYS_TOTAL};
use crate::routes::RouteEntry;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Whether the request asks for a WebSocket upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Forward an upgrade to the route's upstream and bridge the two sockets.
pub async fn relay_upgrade(
    route: &RouteEntry,
    rewritten: &str,
    request: Request,
) -> Result<Response, GatewayError> {
    let query = request.uri().query().map(ToString::to_string);
    let (mut parts, _body) = request.into_parts();

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        // Not a well-formed upgrade after all; let axum's rejection answer.
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let upstream_url = upstream_ws_url(&route.upstream, rewritten, query.as_deref());
    let mut upstream_request =
        upstream_url
            .clone()
            .into_client_request()
            .map_err(|e| GatewayError::UpstreamUnavailable {
                upstream: route.upstream.clone(),
                reason: e.to_string(),
            })?;
    copy_forwardable_headers(&parts.headers, upstream_request.headers_mut());

    let (upstream, _handshake) =
        connect_async(upstream_request)
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable {
                upstream: route.upstream.clone(),
                reason: e.to_string(),
            })?;

    counter!(WS_RELAYS_TOTAL, "route" => route.prefix.clone()).increment(1);
    info!(upstream = %upstream_url, "websocket relay established");

    Ok(ws.on_upgrade(move |client| async move {
        gauge!(WS_RELAYS_ACTIVE).increment(1.0);
        pump(client, upstream).await;
        gauge!(WS_RELAYS_ACTIVE).decrement(1.0);
        debug!(upstream = %upstream_url, "websocket relay closed");
    }))
}

/// Relay frames until either side closes or errors.
async fn pump(client: WebSocket, upstream: UpstreamSocket) {
    let (mut client_sink, mut client_stream) = client.split();
    let (mut upstream_sink, mut upstream_stream) = upstream.split();

    loop {
        tokio::select! {
            from_client = client_stream.next() => {
                match from_client {
                    Some(Ok(message)) => {
                        if upstream_sink.send(client_to_upstream(message)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
            from_upstream = upstream_stream.next() => {
                match from_upstream {
                    Some(Ok(message)) => {
                        let Some(converted) = upstream_to_client(message) else {
                            continue;
                        };
                        if client_sink.send(converted).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    // Both halves get a close attempt; either transport may already be gone.
    let _ = client_sink.send(ClientMessage::Close(None)).await;
    let _ = upstream_sink.send(UpstreamMessage::Close(None)).await;
}

/// Derive the upstream WebSocket URL from an HTTP upstream base.
fn upstream_ws_url(upstream: &str, path: &str, query: Option<&str>) -> String {
    let base = if let Some(rest) = upstream.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = upstream.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        upstream.to_string()
    };
    match query {
        Some(query) => format!("{base}{path}?{query}"),
        None => format!("{base}{path}"),
    }
}

/// Copy end-to-end headers onto the upstream handshake.
///
/// The upstream dial performs its own handshake, so the client's
/// `sec-websocket-*`, `connection`, `upgrade`, and `host` headers stay
/// behind; everything else — notably `authorization`, cookies, and the
/// injected `x-sender-*` identity — travels along.
fn copy_forwardable_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        let skip = name == HOST
            || name == CONNECTION
            || name == UPGRADE
            || name.as_str().starts_with("sec-websocket-");
        if !skip {
            let _ = to.append(name.clone(), value.clone());
        }
    }
}

fn client_to_upstream(message: ClientMessage) -> UpstreamMessage {
    match message {
        ClientMessage::Text(text) => UpstreamMessage::Text(text.as_str().into()),
        ClientMessage::Binary(data) => UpstreamMessage::Binary(data),
        ClientMessage::Ping(data) => UpstreamMessage::Ping(data),
        ClientMessage::Pong(data) => UpstreamMessage::Pong(data),
        ClientMessage::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn upstream_to_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Ping(data) => Some(ClientMessage::Ping(data)),
        UpstreamMessage::Pong(data) => Some(ClientMessage::Pong(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        }))),
        // Raw frames never surface from a managed stream read.
        UpstreamMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn detects_upgrade_requests() {
        let mut headers = HeaderMap::new();
        assert!(!is_upgrade_request(&headers));

        let _ = headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        assert!(is_upgrade_request(&headers));

        let _ = headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_upgrade_request(&headers));

        let _ = headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_upgrade_request(&headers));
    }

    #[test]
    fn derives_ws_scheme_from_http() {
        assert_eq!(
            upstream_ws_url("http://social:3000", "/social/wss", None),
            "ws://social:3000/social/wss"
        );
        assert_eq!(
            upstream_ws_url("https://social:3000", "/social/wss", None),
            "wss://social:3000/social/wss"
        );
    }

    #[test]
    fn keeps_query_string() {
        assert_eq!(
            upstream_ws_url("http://social:3000", "/social/wss", Some("room=7")),
            "ws://social:3000/social/wss?room=7"
        );
    }

    #[test]
    fn handshake_headers_stay_behind() {
        let mut from = HeaderMap::new();
        let _ = from.insert(HOST, HeaderValue::from_static("gateway:8080"));
        let _ = from.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        let _ = from.insert(UPGRADE, HeaderValue::from_static("websocket"));
        let _ = from.insert("sec-websocket-key", HeaderValue::from_static("abc"));
        let _ = from.insert("sec-websocket-version", HeaderValue::from_static("13"));
        let _ = from.insert("authorization", HeaderValue::from_static("Bearer t"));
        let _ = from.insert("x-sender-id", HeaderValue::from_static("u1"));
        let _ = from.insert("cookie", HeaderValue::from_static("session=1"));

        let mut to = HeaderMap::new();
        copy_forwardable_headers(&from, &mut to);

        assert!(to.get(HOST).is_none());
        assert!(to.get(CONNECTION).is_none());
        assert!(to.get(UPGRADE).is_none());
        assert!(to.get("sec-websocket-key").is_none());
        assert_eq!(to.get("authorization").unwrap(), "Bearer t");
        assert_eq!(to.get("x-sender-id").unwrap(), "u1");
        assert_eq!(to.get("cookie").unwrap(), "session=1");
    }

    #[test]
    fn close_frames_convert_both_ways() {
        let client_close = ClientMessage::Close(Some(CloseFrame {
            code: 1000,
            reason: "bye".into(),
        }));
        let upstream = client_to_upstream(client_close);
        match upstream {
            UpstreamMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1000);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("unexpected conversion: {other:?}"),
        }

        let back = upstream_to_client(UpstreamMessage::Close(Some(UpstreamCloseFrame {
            code: 1001u16.into(),
            reason: "away".into(),
        })))
        .unwrap();
        match back {
            ClientMessage::Close(Some(frame)) => {
                assert_eq!(frame.code, 1001);
                assert_eq!(frame.reason.as_str(), "away");
            }
            other => panic!("unexpected conversion: {other:?}"),
        }
    }

    #[test]
    fn text_and_binary_pass_through() {
        match client_to_upstream(ClientMessage::Text("hi".into())) {
            UpstreamMessage::Text(text) => assert_eq!(text.as_str(), "hi"),
            other => panic!("unexpected conversion: {other:?}"),
        }
        match upstream_to_client(UpstreamMessage::Binary(vec![1u8, 2, 3].into())).unwrap() {
            ClientMessage::Binary(data) => assert_eq!(data.as_ref(), &[1, 2, 3]),
            other => panic!("unexpected conversion: {other:?}"),
        }
    }
}
