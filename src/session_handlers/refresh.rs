//! C8: the refresh handler.
//!
//! Mints a successor connection slot so a session survives transport churn
//! within a hard per-transport lifetime cap. Speaker refresh requires
//! re-authorization against the session's recorded `speakerUserId`;
//! listener refresh is structurally identical but skips that check.

use std::sync::Arc;

use crate::auth::Authorizer;
use crate::config::ControlPlaneConfig;
use crate::error::{AdmissionError, SessionLifecycleError};
use crate::model::{now_ms, Connection, LanguageCode, Role};
use crate::store::{SessionCondition, SessionPatch, StateStore};
use crate::wire::ServerFrame;

/// Input to a speaker `refreshConnection`. The wire protocol never carries
/// the old connection id (the client only identifies itself by session and
/// token on the new transport) — the true old id comes from the session's
/// own `speakerConnectionId` pointer, read here before it's overwritten.
pub struct SpeakerRefreshInput<'a> {
    pub new_connection_id: &'a str,
    pub session_id: &'a str,
    pub token: &'a str,
}

/// Replace the session's authoritative speaker connection pointer (spec
/// §4.8, steps 2-6). The caller is responsible for step 7 (cleanup on the
/// old connection happens through the ordinary disconnect path).
pub async fn refresh_speaker_connection(
    store: &Arc<dyn StateStore>,
    authorizer: &Authorizer,
    config: &ControlPlaneConfig,
    input: SpeakerRefreshInput<'_>,
) -> Result<ServerFrame, AdmissionError> {
    let principal = authorizer.authorize(input.token).await?;

    let session = store
        .get_session(input.session_id)
        .await
        .map_err(SessionLifecycleError::from)?
        .ok_or(AdmissionError::SessionNotFound)?;

    if principal.user_id != session.speaker_user_id {
        return Err(AdmissionError::Unauthorized);
    }
    if !session.is_active {
        return Err(AdmissionError::SessionNotFound);
    }

    let old_connection_id = session.speaker_connection_id.clone();
    let now = now_ms();
    let ttl = now + config.max_connection_duration.as_millis() as u64;
    let new_connection = Connection {
        connection_id: input.new_connection_id.to_string(),
        session_id: input.session_id.to_string(),
        target_language: session.source_language,
        role: Role::Speaker,
        connected_at: now,
        ttl,
        ip_address_hash: String::new(),
    };
    store
        .put_connection(new_connection)
        .await
        .map_err(SessionLifecycleError::from)?;

    store
        .update_session(
            input.session_id,
            SessionPatch::SetSpeakerConnectionId(input.new_connection_id.to_string()),
            SessionCondition::IsActive,
        )
        .await
        .map_err(SessionLifecycleError::from)?;

    Ok(ServerFrame::ConnectionRefreshed {
        old_connection_id,
        new_connection_id: input.new_connection_id.to_string(),
        refreshed_at: now,
    })
}

/// Input to a listener `refreshConnection` (no authorization required). The
/// wire protocol has no way for the server to learn the listener's old
/// connection id (unlike the speaker, a listener has no session-level
/// pointer to read it back from), so the reply leaves it empty.
pub struct ListenerRefreshInput<'a> {
    pub new_connection_id: &'a str,
    pub session_id: &'a str,
    pub target_language: LanguageCode,
}

/// Listener-side refresh: allocate a successor connection record carrying
/// the same role and language, without touching the session's speaker
/// pointer. Unlike the speaker path, there is no single pointer to swap —
/// the old and new listener connection records briefly coexist, so the
/// listener count is bumped here to stay equal to the live record count;
/// the old record's eventual disconnect brings it back down.
pub async fn refresh_listener_connection(
    store: &Arc<dyn StateStore>,
    config: &ControlPlaneConfig,
    input: ListenerRefreshInput<'_>,
) -> Result<ServerFrame, AdmissionError> {
    store
        .get_session(input.session_id)
        .await
        .map_err(SessionLifecycleError::from)?
        .filter(|s| s.is_active)
        .ok_or(AdmissionError::SessionNotFound)?;

    let now = now_ms();
    let ttl = now + config.max_connection_duration.as_millis() as u64;
    let new_connection = Connection {
        connection_id: input.new_connection_id.to_string(),
        session_id: input.session_id.to_string(),
        target_language: input.target_language,
        role: Role::Listener,
        connected_at: now,
        ttl,
        ip_address_hash: String::new(),
    };
    store
        .put_connection(new_connection)
        .await
        .map_err(SessionLifecycleError::from)?;

    store
        .atomic_add_listener_count(input.session_id, 1, 0)
        .await
        .map_err(SessionLifecycleError::from)?;

    Ok(ServerFrame::ConnectionRefreshed {
        old_connection_id: String::new(),
        new_connection_id: input.new_connection_id.to_string(),
        refreshed_at: now,
    })
}
