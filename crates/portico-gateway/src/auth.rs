//! The auth gate.
//!
//! For private routes the gate runs one verification round-trip per
//! request and either hands back an identity to propagate downstream or
//! halts the dispatch with a 401 — in which case the upstream is never
//! contacted.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use metrics::counter;
use portico_core::identity::{
    SENDER_EMAIL_HEADER, SENDER_HEADERS, SENDER_ID_HEADER, SENDER_NAME_HEADER, VerifiedIdentity,
};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::identity::IdentityVerifier;
use crate::metrics::AUTH_CHECKS_TOTAL;

/// Gatekeeper in front of every private route.
pub struct AuthGate {
    verifier: Arc<dyn IdentityVerifier>,
}

impl AuthGate {
    /// Build a gate over an identity verifier.
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify the request's bearer credential.
    ///
    /// A missing `authorization` header is forwarded to the authority as
    /// an empty credential — indistinguishable from an invalid one. Every
    /// failure mode (rejection, timeout, transport, bad body) collapses
    /// to [`GatewayError::Unauthorized`].
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<VerifiedIdentity, GatewayError> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        match self.verifier.verify(bearer).await {
            Ok(identity) => {
                counter!(AUTH_CHECKS_TOTAL, "outcome" => "accepted").increment(1);
                debug!(user_id = %identity.id, "credential verified");
                Ok(identity)
            }
            Err(error) => {
                counter!(AUTH_CHECKS_TOTAL, "outcome" => "rejected").increment(1);
                warn!(%error, "credential rejected");
                Err(GatewayError::Unauthorized)
            }
        }
    }
}

/// Remove any client-supplied identity headers.
///
/// Downstream services trust `x-sender-*` as proof of identity, so the
/// gateway clears them on every forwarded request before (possibly)
/// re-injecting verified values.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in SENDER_HEADERS {
        let _ = headers.remove(name);
    }
}

/// Inject the verified identity into the forwarded request.
pub fn inject_identity(headers: &mut HeaderMap, identity: &VerifiedIdentity) {
    let _ = headers.insert(SENDER_ID_HEADER, header_value(&identity.id));
    let _ = headers.insert(SENDER_NAME_HEADER, header_value(&identity.name));
    let _ = headers.insert(SENDER_EMAIL_HEADER, header_value(&identity.email));
}

/// Encode an identity attribute as a header value.
///
/// Attribute values come from the trusted authority, but a header value
/// must still be byte-clean; anything unrepresentable becomes empty
/// rather than poisoning the forward.
fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_bytes(value.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}
