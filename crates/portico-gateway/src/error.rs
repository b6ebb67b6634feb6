//! Gateway error taxonomy and response mapping.
//!
//! Only transport-level failures to *reach* an upstream become gateway
//! errors; anything the upstream itself produced — including its error
//! statuses — is relayed to the client unmodified by the dispatcher.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Terminal dispatch failures, each mapping to one client-facing status.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The credential is missing, invalid, expired, or the authority
    /// could not be consulted in time. The upstream is never contacted.
    #[error("unauthorized")]
    Unauthorized,
    /// No route prefix matches the request path.
    #[error("no route matches {path}")]
    RouteNotFound {
        /// The unmatched request path.
        path: String,
    },
    /// The chosen upstream could not be reached at the transport level.
    #[error("upstream {upstream} unreachable: {reason}")]
    UpstreamUnavailable {
        /// Upstream base URI.
        upstream: String,
        /// Error description.
        reason: String,
    },
    /// The chosen upstream did not respond in time.
    #[error("upstream {upstream} timed out")]
    UpstreamTimeout {
        /// Upstream base URI.
        upstream: String,
    },
}

impl GatewayError {
    /// The status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Unauthorized => "Unauthorized",
            Self::RouteNotFound { .. } => "Not Found",
            Self::UpstreamUnavailable { .. } => "Bad Gateway",
            Self::UpstreamTimeout { .. } => "Gateway Timeout",
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(GatewayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::RouteNotFound { path: "/x".into() }.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable {
                upstream: "http://user:3000".into(),
                reason: "connection refused".into(),
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::UpstreamTimeout {
                upstream: "http://user:3000".into(),
            }
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn display_includes_upstream() {
        let err = GatewayError::UpstreamUnavailable {
            upstream: "http://social:3000".into(),
            reason: "refused".into(),
        };
        assert!(err.to_string().contains("http://social:3000"));
        assert!(err.to_string().contains("refused"));
    }
}
