//! Verified sender identity and the headers that carry it.
//!
//! A [`VerifiedIdentity`] is produced by exactly one place — the gateway's
//! identity verifier after a successful round-trip to the identity
//! authority — and lives only for the request or connection establishment
//! it authenticated. Downstream services never construct one from client
//! input; they read the `x-sender-*` headers the gateway injected.

use serde::{Deserialize, Serialize};

/// Header carrying the verified sender's user id.
pub const SENDER_ID_HEADER: &str = "x-sender-id";
/// Header carrying the verified sender's display name.
pub const SENDER_NAME_HEADER: &str = "x-sender-name";
/// Header carrying the verified sender's email address.
pub const SENDER_EMAIL_HEADER: &str = "x-sender-email";

/// All identity headers, in injection order.
pub const SENDER_HEADERS: [&str; 3] =
    [SENDER_ID_HEADER, SENDER_NAME_HEADER, SENDER_EMAIL_HEADER];

/// The authenticated user attributes returned by the identity authority.
///
/// The authority's success body must carry a non-empty `id`; `name` and
/// `email` default to the empty string when omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// Stable user id. Non-empty for any identity that passed verification.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
}

impl VerifiedIdentity {
    /// Whether the authority's response actually identifies someone.
    ///
    /// The authority signals rejection either with a non-success status or
    /// with a body whose `id` is absent or empty; both collapse to "not
    /// verified" here.
    pub fn is_verified(&self) -> bool {
        !self.id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_identity() {
        let identity: VerifiedIdentity =
            serde_json::from_str(r#"{"id":"u1","name":"Ada","email":"ada@example.com"}"#).unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.email, "ada@example.com");
        assert!(identity.is_verified());
    }

    #[test]
    fn name_and_email_default_to_empty() {
        let identity: VerifiedIdentity = serde_json::from_str(r#"{"id":"u2"}"#).unwrap();
        assert_eq!(identity.name, "");
        assert_eq!(identity.email, "");
        assert!(identity.is_verified());
    }

    #[test]
    fn empty_id_is_not_verified() {
        let identity: VerifiedIdentity = serde_json::from_str(r#"{"id":""}"#).unwrap();
        assert!(!identity.is_verified());
    }

    #[test]
    fn missing_id_fails_to_deserialize() {
        let result = serde_json::from_str::<VerifiedIdentity>(r#"{"name":"Ada"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn header_names_are_lowercase() {
        for name in SENDER_HEADERS {
            assert_eq!(name, name.to_lowercase());
        }
    }
}
