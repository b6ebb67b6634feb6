//! # portico-core
//!
//! Foundation types shared by the Portico services:
//!
//! - **Identity**: [`identity::VerifiedIdentity`] as returned by the
//!   external identity authority, plus the `x-sender-*` header names the
//!   gateway injects and downstream services trust.
//! - **Events**: [`event::Event`] — the tagged payload fanned out to live
//!   WebSocket connections.
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `portico-gateway` and
//! `portico-presence`.

pub mod event;
pub mod identity;
