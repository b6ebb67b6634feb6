//! Identity-authority client.
//!
//! One outbound call per private request, carrying the request's original
//! `authorization` header value. No caching — a revoked credential stops
//! working on the very next request, at the cost of one authority
//! round-trip per private request.

use std::time::Duration;

use async_trait::async_trait;
use portico_core::identity::VerifiedIdentity;
use portico_settings::AuthSettings;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

/// Why a credential failed verification.
///
/// Every variant surfaces to the client as the same 401; the split exists
/// for logs and metrics.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The authority answered and did not vouch for the credential.
    #[error("identity authority rejected the credential")]
    Rejected,
    /// The authority did not answer within the configured timeout.
    #[error("identity authority timed out")]
    Timeout,
    /// The authority could not be reached.
    #[error("identity authority unreachable: {reason}")]
    Transport {
        /// Error description.
        reason: String,
    },
    /// The authority answered success with a body that is not an identity.
    #[error("identity authority returned an unreadable body: {reason}")]
    Malformed {
        /// Error description.
        reason: String,
    },
    /// Failed to build the HTTP client at startup.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild {
        /// Error description.
        reason: String,
    },
}

/// The seam between the auth gate and the external identity authority.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify one bearer credential; `Ok` carries a non-empty identity.
    async fn verify(&self, bearer: &str) -> Result<VerifiedIdentity, VerifyError>;
}

/// Production verifier: POST `{authority}/check_jwt` with the credential.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    check_url: String,
}

impl HttpIdentityVerifier {
    /// Build a verifier from auth settings.
    pub fn new(settings: &AuthSettings) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| VerifyError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            check_url: format!("{}/check_jwt", settings.authority_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, bearer: &str) -> Result<VerifiedIdentity, VerifyError> {
        let response = self
            .client
            .post(&self.check_url)
            .header(AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VerifyError::Timeout
                } else {
                    VerifyError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "authority returned non-success");
            return Err(VerifyError::Rejected);
        }

        let body = response.bytes().await.map_err(|e| VerifyError::Transport {
            reason: e.to_string(),
        })?;
        if body.is_empty() {
            return Err(VerifyError::Rejected);
        }

        let identity: VerifiedIdentity =
            serde_json::from_slice(&body).map_err(|e| VerifyError::Malformed {
                reason: e.to_string(),
            })?;
        if !identity.is_verified() {
            return Err(VerifyError::Rejected);
        }
        Ok(identity)
    }
}
