//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! wire format. Each type implements [`Default`] with production default
//! values. Types marked with `#[serde(default)]` allow partial JSON —
//! missing fields get their default value during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for the Portico services.
///
/// Loaded from `portico.json` with defaults applied for missing fields.
/// Environment variables can override specific values.
///
/// # JSON Format
///
/// All field names are camelCase. Optional sections (`gateway.tls`) are
/// omitted when `None`. Example:
///
/// ```json
/// {
///   "gateway": { "port": 8080 },
///   "auth": { "authorityUrl": "http://authenticate:3000" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PorticoSettings {
    /// Settings schema version.
    pub version: String,
    /// Deployment name, used as the tracing service label.
    pub name: String,
    /// Public gateway listener settings.
    pub gateway: GatewaySettings,
    /// Identity-authority settings for the auth gate.
    pub auth: AuthSettings,
    /// Presence service settings.
    pub presence: PresenceSettings,
    /// Ordered route table; longest matching prefix wins.
    pub routes: Vec<RouteSettings>,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for PorticoSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "portico".to_string(),
            gateway: GatewaySettings::default(),
            auth: AuthSettings::default(),
            presence: PresenceSettings::default(),
            routes: default_routes(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PorticoSettings {
    /// Correct invalid values in place rather than rejecting the document.
    ///
    /// Called automatically during loading. Out-of-range values are fixed
    /// with a warning so operators get working behavior instead of a
    /// confusing startup error.
    pub fn validate(&mut self) {
        if self.auth.timeout_ms == 0 {
            tracing::warn!("auth timeoutMs of 0 would fail every check, using default");
            self.auth.timeout_ms = AuthSettings::default().timeout_ms;
        }
        if self.presence.channel_capacity == 0 {
            tracing::warn!("presence channelCapacity of 0 can buffer nothing, using default");
            self.presence.channel_capacity = PresenceSettings::default().channel_capacity;
        }
        self.routes.retain(|route| {
            let keep = route.prefix.starts_with('/') && !route.upstream.is_empty();
            if !keep {
                tracing::warn!(
                    prefix = %route.prefix,
                    upstream = %route.upstream,
                    "dropping malformed route entry"
                );
            }
            keep
        });
    }
}

/// Public gateway listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Bind address.
    pub host: String,
    /// Public port.
    pub port: u16,
    /// TLS termination material. Plain HTTP when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
        }
    }
}

/// PEM paths for TLS termination at the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    /// Certificate chain file (PEM).
    pub cert_path: String,
    /// Private key file (PEM).
    pub key_path: String,
}

/// Identity-authority settings for the auth gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Base URL of the identity authority; the gateway POSTs to
    /// `{authorityUrl}/check_jwt`.
    pub authority_url: String,
    /// Per-request verification timeout in milliseconds. A timed-out
    /// check counts as a failed verification, never a pass-through.
    pub timeout_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authority_url: "http://authenticate:3000".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Presence service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceSettings {
    /// Bind address.
    pub host: String,
    /// Service port (reached through the gateway's `/social` route).
    pub port: u16,
    /// Per-connection outbound buffer, in messages. A full buffer drops
    /// the message for that connection only.
    pub channel_capacity: usize,
    /// Lifetime drop count after which a connection is considered too
    /// slow and is disconnected.
    pub max_send_drops: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            channel_capacity: 64,
            max_send_drops: 100,
        }
    }
}

/// One prefix-route entry of the gateway's route table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSettings {
    /// Path prefix matched against the request path.
    pub prefix: String,
    /// Upstream base URI, e.g. `http://user:3000`.
    pub upstream: String,
    /// Prefix substituted for `prefix` in the forwarded path.
    pub rewrite: String,
    /// Whether the auth gate must verify identity before forwarding.
    #[serde(default)]
    pub requires_auth: bool,
    /// Whether WebSocket upgrades are forwarded on this route.
    #[serde(default)]
    pub websocket: bool,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter, overridden by `RUST_LOG` when set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The production route table: public user lookups, private user and
/// friend routes, the presence WebSocket, dev passthroughs, and the
/// frontend catch-all (websocket for HMR).
fn default_routes() -> Vec<RouteSettings> {
    fn route(
        prefix: &str,
        upstream: &str,
        rewrite: &str,
        requires_auth: bool,
        websocket: bool,
    ) -> RouteSettings {
        RouteSettings {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            rewrite: rewrite.to_string(),
            requires_auth,
            websocket,
        }
    }

    vec![
        route("/user/public", "http://user:3000", "/user/public", false, false),
        route("/user", "http://user:3000", "/user", true, false),
        route("/social/friend", "http://social:3000", "/social/friend", true, false),
        route("/social/friends", "http://social:3000", "/social/friends", true, false),
        route("/social", "http://social:3000", "/social", true, true),
        route("/database", "http://database:3000", "/database", false, false),
        route("/authenticate", "http://authenticate:3000", "/authenticate", false, false),
        route("/", "http://frontend:3000", "", false, true),
    ]
}
