//! The dispatcher: match, gate, rewrite, forward.
//!
//! Bodies stream through in both directions; the dispatcher never buffers
//! or reinterprets them. Whatever status the upstream produces is relayed
//! to the client unchanged — only a transport-level failure to reach the
//! upstream at all becomes a gateway error.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{info, warn};

use crate::auth::{inject_identity, strip_identity_headers};
use crate::error::GatewayError;
use crate::metrics::{
    GATEWAY_NOT_FOUND_TOTAL, GATEWAY_REQUESTS_TOTAL, GATEWAY_UNAUTHORIZED_TOTAL,
    GATEWAY_UPSTREAM_ERRORS_TOTAL,
};
use crate::routes::RouteEntry;
use crate::server::AppState;
use crate::ws_relay;

/// Hop-by-hop headers, meaningful only for a single transport link.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler for every path the gateway itself does not serve.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    match handle(&state, request).await {
        Ok(response) => response,
        Err(error) => {
            match &error {
                GatewayError::Unauthorized => {
                    counter!(GATEWAY_UNAUTHORIZED_TOTAL).increment(1);
                }
                GatewayError::RouteNotFound { .. } => {
                    counter!(GATEWAY_NOT_FOUND_TOTAL).increment(1);
                }
                GatewayError::UpstreamUnavailable { upstream, .. }
                | GatewayError::UpstreamTimeout { upstream } => {
                    counter!(GATEWAY_UPSTREAM_ERRORS_TOTAL, "upstream" => upstream.clone())
                        .increment(1);
                    warn!(%error, "upstream failure");
                }
            }
            error.into_response()
        }
    }
}

async fn handle(state: &AppState, mut request: Request) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();
    info!(method = %request.method(), %path, "dispatch");

    let route = state
        .routes
        .matches(&path)
        .cloned()
        .ok_or_else(|| GatewayError::RouteNotFound { path: path.clone() })?;
    counter!(GATEWAY_REQUESTS_TOTAL, "route" => route.prefix.clone()).increment(1);

    // Identity headers are gateway-owned: whatever the client sent is
    // dropped before the gate decides whether to inject verified values.
    strip_identity_headers(request.headers_mut());
    if route.requires_auth {
        let identity = state.auth.authenticate(request.headers()).await?;
        inject_identity(request.headers_mut(), &identity);
    }

    let rewritten = route.rewrite_path(&path);

    if route.websocket && ws_relay::is_upgrade_request(request.headers()) {
        return ws_relay::relay_upgrade(&route, &rewritten, request).await;
    }
    forward(state, &route, &rewritten, request).await
}

/// Stream one HTTP exchange through to the upstream and back.
async fn forward(
    state: &AppState,
    route: &RouteEntry,
    rewritten: &str,
    request: Request,
) -> Result<Response, GatewayError> {
    let mut url = format!("{}{rewritten}", route.upstream);
    if let Some(query) = request.uri().query() {
        url.push('?');
        url.push_str(query);
    }

    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    // The HTTP client derives host and framing from the upstream URL and
    // the streamed body.
    let _ = headers.remove(HOST);
    let _ = headers.remove(CONTENT_LENGTH);

    let upstream_response = state
        .http
        .request(parts.method, url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| classify_send_error(&route.upstream, &e))?;

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Remove headers that must not cross the proxy hop.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        let _ = headers.remove(name);
    }
}

fn classify_send_error(upstream: &str, error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::UpstreamTimeout {
            upstream: upstream.to_string(),
        }
    } else {
        GatewayError::UpstreamUnavailable {
            upstream: upstream.to_string(),
            reason: error.to_string(),
        }
    }
}
