//! Core data model: Session, Connection, RateLimitCounter.
//!
//! These are plain records owned exclusively by the state store (C1) —
//! nothing else mutates them directly, and nothing models the session/
//! connection relationship as an in-memory pointer graph. A flow holds at
//! most one session snapshot and one connection snapshot at a time; the
//! store is the join.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Millis
}

/// An ISO-639-1 language code: exactly two lowercase ASCII letters.
///
/// Construction is only exposed via [`crate::validate::validate_language`];
/// this type itself does not re-validate, matching the rest of the crate's
/// pattern of pure, side-effect-free validators at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageCode([u8; 2]);

impl LanguageCode {
    /// Build a code from two already-validated lowercase ASCII bytes.
    #[must_use]
    pub(crate) fn from_bytes_unchecked(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    /// The code as a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // SAFETY-free: both bytes are ASCII lowercase letters by construction.
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Standard quality.
    Standard,
    /// Premium quality.
    Premium,
}

impl QualityTier {
    /// Parse from the wire string, if it names a known tier.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

/// Role a connection plays within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The session's sole authenticated audio source.
    Speaker,
    /// An anonymous audio consumer.
    Listener,
}

/// Per-connection admission state machine (C6 §4.6). Only the
/// `Admitting -> Active` transition is caller-visible via the reply
/// message; `Closing` is entered on any fatal error after `Admitting`, or
/// on transport close, and triggers the disconnect handler (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// Admission flow is in progress; no reply sent yet.
    Admitting,
    /// Admission succeeded; the connection is live.
    Active,
    /// A fatal error occurred or the transport closed; cleanup pending.
    Closing,
    /// Cleanup complete.
    Closed,
}

impl ConnectionPhase {
    /// Whether moving from `self` to `to` is a valid transition.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Admitting, Self::Active)
                | (Self::Admitting, Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }
}

/// Whether a session's audio is currently flowing, per the `sessionPaused`
/// / `sessionResumed` lifecycle notifications (supplemented feature; see
/// SPEC_FULL.md). Distinct from `isActive`: pausing never terminates a
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    /// Audio is flowing normally.
    #[default]
    Playing,
    /// The speaker has explicitly paused; listeners are notified but stay
    /// joined.
    Paused,
}

/// A broadcasting session: one speaker, many listeners, identified by a
/// human-memorable ID.
///
/// Field-level mutability notes mirror the spec's lifecycle table:
/// `speakerConnectionId` is rewritten by refresh (C8); `isActive` flips
/// `true -> false` exactly once (C9); `listenerCount` is only ever touched
/// through the store's atomic-add (C6/C9); everything else is immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Primary key. Shape `<adjective>-<noun>-<3-digit-number>`.
    pub session_id: String,
    /// Currently-active speaker transport identifier.
    pub speaker_connection_id: String,
    /// Stable principal from the authorizer. Immutable.
    pub speaker_user_id: String,
    /// Source language of the speaker's audio. Immutable.
    pub source_language: LanguageCode,
    /// Quality tier. Immutable.
    pub quality_tier: QualityTier,
    /// Creation timestamp.
    pub created_at: Millis,
    /// Whether the session is still accepting joins / has live audio.
    /// Transitions `true -> false` exactly once; never reactivated.
    pub is_active: bool,
    /// Number of live listener connections. Invariant: equals the count of
    /// listener connection records for this session whose TTL has not
    /// elapsed, observed under the same consistency horizon.
    pub listener_count: u32,
    /// Playback state for pause/resume notifications.
    pub playback_state: PlaybackState,
    /// Reclamation deadline.
    pub expires_at: Millis,
}

impl Session {
    /// Whether this session can still admit a join (active and has
    /// `listener_count < max`). Capacity invariant 4 in the spec.
    #[must_use]
    pub fn has_capacity(&self, max_listeners: u32) -> bool {
        self.is_active && self.listener_count < max_listeners
    }
}

/// A single transport attachment, playing either the speaker or a listener
/// role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Primary key, provided by the transport layer (opaque).
    pub connection_id: String,
    /// Session this connection belongs to.
    pub session_id: String,
    /// Language this connection receives (speaker: equals the session's
    /// `source_language`).
    pub target_language: LanguageCode,
    /// Speaker or listener.
    pub role: Role,
    /// Connect timestamp.
    pub connected_at: Millis,
    /// Reclamation deadline for this connection record.
    pub ttl: Millis,
    /// Opaque >=16-char hash of the client address. Never the plaintext IP.
    pub ip_address_hash: String,
}

impl Connection {
    /// Age of this connection in milliseconds, given the current time.
    #[must_use]
    pub fn age_ms(&self, now: Millis) -> Millis {
        now.saturating_sub(self.connected_at)
    }
}

/// A fixed-window rate-limit counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCounter {
    /// Primary key, shape `<operation>:<principalOrHash>`.
    pub identifier: String,
    /// Requests admitted so far in the current window.
    pub count: u32,
    /// Start of the current window.
    pub window_start: Millis,
    /// Reclamation deadline.
    pub expires_at: Millis,
}

/// Build the canonical rate-limit counter identifier for an operation and
/// principal-or-hash.
#[must_use]
pub fn rate_limit_identifier(operation: &str, principal_or_hash: &str) -> String {
    format!("{operation}:{principal_or_hash}")
}
