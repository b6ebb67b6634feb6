//! # portico-gateway
//!
//! The edge gateway: every client request enters here, gets matched
//! against the prefix route table, passes the auth gate when the route is
//! private, and is forwarded to its upstream — plain HTTP with streamed
//! bodies, or a full-duplex WebSocket relay for upgrade requests.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `routes` | Route table, longest-prefix matching, path rewriting |
//! | `identity` | Identity-authority client (`/check_jwt` round-trip) |
//! | `auth` | Auth gate: bearer extraction, `x-sender-*` injection |
//! | `proxy` | Dispatcher: match → gate → rewrite → streamed forward |
//! | `ws_relay` | Upgrade forwarding and bidirectional frame relay |
//! | `error` | Gateway error taxonomy and response mapping |
//! | `server` | Router assembly, plain and TLS listeners |
//! | `metrics` | Prometheus recorder and metric name constants |
//!
//! ## Data Flow
//!
//! client → `proxy::dispatch` → (`auth`, if private) → `identity` →
//! upstream; `websocket` routes hand the established channel to
//! `ws_relay` for the connection's lifetime.

pub mod auth;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod ws_relay;
