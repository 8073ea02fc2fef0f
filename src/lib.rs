//! # babelcast
//!
//! The real-time session and WebSocket control plane for a multilingual
//! audio broadcasting system: an authenticated speaker opens a session
//! under a human-memorable id, anonymous listeners join it in a target
//! language, and the control plane owns admission, authentication, unique
//! ID generation, capacity/rate limiting, heartbeats, connection refresh,
//! and lifecycle fan-out (`sessionEnded`/`sessionPaused`/`sessionResumed`).
//!
//! The audio data plane (capture, encoding, translation, synthesis), the
//! browser clients, deployment packaging, and JWT issuance are all out of
//! scope — this crate validates tokens an external identity provider
//! issues, and never inspects audio payloads.
//!
//! ## Layout
//!
//! - [`model`] — `Session`/`Connection`/`RateLimitCounter`, the three
//!   entities the rest of the crate reads and writes exclusively through
//!   [`store`].
//! - [`store`] — C1, the transactional state store contract, plus
//!   [`store::memory::MemoryStore`], the in-process implementation this
//!   crate ships.
//! - [`id_generator`] — C2, unique human-readable session IDs.
//! - [`auth`] — C3, JWT validation against a cached JWKS.
//! - [`rate_limit`] — C4, fixed-window admission limits.
//! - [`validate`] — C5, pure input validators plus the `LanguageSupport`
//!   cache.
//! - [`session_handlers`] — C6-C9, the per-connection admission and
//!   lifecycle state transitions.
//! - [`fanout`] — C10, the broadcaster.
//! - [`wire`] — the client-facing query-string and JSON frame shapes.
//! - [`ws_server`] — the WebSocket transport that drives all of the above.
//! - [`config`] — tunables, defaulted per spec §6.
//! - [`error`] — one `thiserror` enum per component boundary, composing
//!   into [`error::AdmissionError`] for the outermost wire surface.
//! - [`stats`] — in-process counters (supplemented feature; see
//!   `DESIGN.md`).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Authorizer (C3): JWT validation against a cached JWKS.
pub mod auth;
/// Control-plane configuration and its §6 defaults.
pub mod config;
/// Error types for every component boundary.
pub mod error;
/// Broadcaster (C10): per-connection send plus bounded fan-out.
pub mod fanout;
/// ID generator (C2): unique human-readable session IDs.
pub mod id_generator;
/// Core data model: `Session`, `Connection`, `RateLimitCounter`.
pub mod model;
/// Rate limiter (C4): fixed-window counters per (identifier, operation).
pub mod rate_limit;
/// Connection handler, heartbeat, refresh, and disconnect (C6-C9).
pub mod session_handlers;
/// In-process counters for observability (supplemented feature).
pub mod stats;
/// State store (C1): the transactional contract every other component
/// reads and writes through.
pub mod store;
/// Validators (C5) and the `LanguageSupport` cache.
pub mod validate;
/// Wire protocol: admission query parameters and JSON frames.
pub mod wire;
/// The WebSocket transport layer.
pub mod ws_server;

pub use config::ControlPlaneConfig;
pub use error::AdmissionError;
pub use model::{Connection, QualityTier, Role, Session};
pub use store::{memory::MemoryStore, StateStore};
pub use ws_server::ControlPlaneServer;
