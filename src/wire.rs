//! Wire protocol: admission query parameters and JSON frames.
//!
//! `ClientFrame`/`ServerFrame` are the post-admission message shapes;
//! [`AdmissionParams`] is the URL query string carried on the WebSocket
//! upgrade. Kept free of any transport or store dependency so it can be
//! unit tested in isolation.

use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;
use crate::model::Millis;

/// Parsed admission query string from the WebSocket upgrade URL.
#[derive(Debug, Clone)]
pub struct AdmissionParams {
    /// `action`: `createSession`, `joinSession`, or `refreshConnection`.
    pub action: String,
    /// Present for `createSession`.
    pub source_language: Option<String>,
    /// Present for `createSession`.
    pub quality_tier: Option<String>,
    /// Present for `joinSession` and listener `refreshConnection`.
    pub target_language: Option<String>,
    /// Present for `joinSession` and `refreshConnection`.
    pub session_id: Option<String>,
    /// Opaque bearer token; present for `createSession` and
    /// `refreshConnection`.
    pub token: Option<String>,
}

impl AdmissionParams {
    /// Parse `a=b&c=d`-shaped raw query string, as found after the `?` in
    /// the upgrade URL.
    #[must_use]
    pub fn parse(raw_query: &str) -> Self {
        let mut action = String::new();
        let mut source_language = None;
        let mut quality_tier = None;
        let mut target_language = None;
        let mut session_id = None;
        let mut token = None;

        for pair in raw_query.split('&') {
            let mut it = pair.splitn(2, '=');
            let (Some(key), Some(value)) = (it.next(), it.next()) else {
                continue;
            };
            let value = percent_decode(value);
            match key {
                "action" => action = value,
                "sourceLanguage" => source_language = Some(value),
                "qualityTier" => quality_tier = Some(value),
                "targetLanguage" => target_language = Some(value),
                "sessionId" => session_id = Some(value),
                "token" => token = Some(value),
                _ => {}
            }
        }

        Self {
            action,
            source_language,
            quality_tier,
            target_language,
            session_id,
            token,
        }
    }
}

/// Minimal percent-decoding sufficient for the small alphabet admission
/// parameters use (letters, digits, dashes, and the bearer token's base64
/// alphabet); unrecognized escapes pass through unchanged.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        if bytes[i] == b'+' {
            out.push(b' ');
        } else {
            out.push(bytes[i]);
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A post-admission client-to-server frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Liveness frame (C7).
    Heartbeat,
    /// In-band refresh request (C8), for transports that prefer a frame
    /// over a fresh connection.
    RefreshConnection,
    /// Speaker-only: pause the session's audio (supplemented feature; see
    /// SPEC_FULL.md). Carries the speaker's bearer token so the handler can
    /// re-authorize the request against `speakerUserId`.
    PauseSession {
        /// Bearer token, re-checked against the session's recorded speaker.
        token: String,
    },
    /// Speaker-only: resume a previously paused session.
    ResumeSession {
        /// Bearer token, re-checked against the session's recorded speaker.
        token: String,
    },
}

/// A server-to-client frame, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Reply to a successful `createSession`.
    SessionCreated {
        session_id: String,
        created_at: Millis,
        expires_at: Millis,
    },
    /// Reply to a successful `joinSession`.
    SessionJoined {
        session_id: String,
        source_language: String,
        target_language: String,
        joined_at: Millis,
    },
    /// Reply to a `heartbeat` frame for a known connection.
    HeartbeatAck { server_time: Millis },
    /// Reply to a `heartbeat` frame past the warning threshold.
    ConnectionWarning { expires_in_sec: u64 },
    /// Reply on the new transport after a successful refresh.
    ConnectionRefreshed {
        old_connection_id: String,
        new_connection_id: String,
        refreshed_at: Millis,
    },
    /// Fan-out notification that a session ended.
    SessionEnded { session_id: String, ended_at: Millis },
    /// Fan-out notification that the speaker paused (supplemented
    /// feature).
    SessionPaused { session_id: String, paused_at: Millis },
    /// Fan-out notification that the speaker resumed (supplemented
    /// feature).
    SessionResumed { session_id: String, resumed_at: Millis },
    /// A terminal error for the current admission or connection attempt.
    Error {
        code: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
}

impl ServerFrame {
    /// Build the `error` frame for an [`AdmissionError`].
    #[must_use]
    pub fn from_admission_error(err: &AdmissionError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
            retry_after: err.retry_after_secs(),
        }
    }

    #[cfg(test)]
    pub(crate) fn test_ping() -> Self {
        Self::HeartbeatAck { server_time: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_session_query() {
        let p = AdmissionParams::parse(
            "action=createSession&sourceLanguage=en&qualityTier=standard&token=abc%2Bdef",
        );
        assert_eq!(p.action, "createSession");
        assert_eq!(p.source_language.as_deref(), Some("en"));
        assert_eq!(p.quality_tier.as_deref(), Some("standard"));
        assert_eq!(p.token.as_deref(), Some("abc+def"));
    }

    #[test]
    fn parses_join_session_query() {
        let p = AdmissionParams::parse(
            "action=joinSession&sessionId=amber-anchor-123&targetLanguage=es",
        );
        assert_eq!(p.action, "joinSession");
        assert_eq!(p.session_id.as_deref(), Some("amber-anchor-123"));
        assert_eq!(p.target_language.as_deref(), Some("es"));
    }

    #[test]
    fn error_frame_carries_retry_after_only_when_rate_limited() {
        let frame = ServerFrame::from_admission_error(&AdmissionError::RateLimited {
            retry_after_secs: 5,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["retryAfter"], 5);

        let frame = ServerFrame::from_admission_error(&AdmissionError::SessionNotFound);
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("retryAfter").is_none());
    }
}
