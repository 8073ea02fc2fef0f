//! C6: the connection handler's `createSession` and `joinSession`
//! transitions.

use std::sync::Arc;

use crate::auth::Authorizer;
use crate::config::ControlPlaneConfig;
use crate::error::{AdmissionError, IdGenerationError, SessionLifecycleError};
use crate::id_generator;
use crate::model::{now_ms, Connection, PlaybackState, Role, Session};
use crate::rate_limit::{Operation, RateLimiter};
use crate::store::{SessionCondition, SessionPatch, StateStore};
use crate::validate::{validate_language, validate_quality_tier, validate_session_id, LanguageSupport};
use crate::wire::ServerFrame;

/// Input to a `createSession` admission, already split out of the raw
/// query string by the transport layer.
pub struct CreateSessionInput<'a> {
    pub connection_id: &'a str,
    pub token: &'a str,
    pub source_language: &'a str,
    pub quality_tier: &'a str,
}

/// Run the full `createSession` admission flow (spec §4.6).
pub async fn create_session(
    store: &Arc<dyn StateStore>,
    authorizer: &Authorizer,
    rate_limiter: &RateLimiter,
    config: &ControlPlaneConfig,
    input: CreateSessionInput<'_>,
) -> Result<ServerFrame, AdmissionError> {
    let principal = authorizer.authorize(input.token).await?;

    let source_language = validate_language(input.source_language)?;
    let quality_tier = validate_quality_tier(input.quality_tier)?;

    rate_limiter
        .allow(&principal.user_id, Operation::CreateSession)
        .await?;

    let store_for_probe = store.clone();
    let session_id = id_generator::new_session_id(config.id_generator_max_attempts, move |candidate| {
        let store = store_for_probe.clone();
        async move {
            match store.get_session(&candidate).await {
                Ok(existing) => Ok(existing.is_some()),
                Err(e) => Err(IdGenerationError::ProbeFailed(e)),
            }
        }
    })
    .await?;

    let now = now_ms();
    let expires_at = now + config.session_retention.as_millis() as u64;
    let session = Session {
        session_id: session_id.clone(),
        speaker_connection_id: input.connection_id.to_string(),
        speaker_user_id: principal.user_id.clone(),
        source_language,
        quality_tier,
        created_at: now,
        is_active: true,
        listener_count: 0,
        playback_state: PlaybackState::Playing,
        expires_at,
    };
    store
        .put_session(session.clone(), true)
        .await
        .map_err(SessionLifecycleError::from)?;

    let ttl = now + config.max_connection_duration.as_millis() as u64;
    let speaker_connection = Connection {
        connection_id: input.connection_id.to_string(),
        session_id: session_id.clone(),
        target_language: source_language,
        role: Role::Speaker,
        connected_at: now,
        ttl,
        ip_address_hash: String::new(),
    };
    store
        .put_connection(speaker_connection)
        .await
        .map_err(SessionLifecycleError::from)?;

    Ok(ServerFrame::SessionCreated {
        session_id,
        created_at: now,
        expires_at,
    })
}

/// Input to a `joinSession` admission.
pub struct JoinSessionInput<'a> {
    pub connection_id: &'a str,
    pub ip_hash: &'a str,
    pub session_id: &'a str,
    pub target_language: &'a str,
}

/// Run the full `joinSession` admission flow (spec §4.6).
pub async fn join_session(
    store: &Arc<dyn StateStore>,
    rate_limiter: &RateLimiter,
    language_support: &LanguageSupport,
    config: &ControlPlaneConfig,
    input: JoinSessionInput<'_>,
) -> Result<ServerFrame, AdmissionError> {
    validate_session_id(input.session_id)?;
    let target_language = validate_language(input.target_language)?;

    rate_limiter
        .allow(input.ip_hash, Operation::JoinSession)
        .await?;

    let session = store
        .get_session(input.session_id)
        .await
        .map_err(SessionLifecycleError::from)?
        .filter(|s| s.is_active)
        .ok_or(AdmissionError::SessionNotFound)?;

    if !language_support
        .is_supported(session.source_language, target_language)
        .await
    {
        return Err(SessionLifecycleError::UnsupportedLanguage.into());
    }

    let max = config.max_listeners_per_session;
    let updated = match store
        .update_session(
            input.session_id,
            SessionPatch::AddListenerCount { delta: 1, floor: 0 },
            SessionCondition::IsActiveAndUnderCapacity { max_listeners: max },
        )
        .await
    {
        Ok(session) => session,
        Err(crate::error::StoreError::ConditionFailed) => {
            return Err(disambiguate_capacity_failure(store, input.session_id).await.into());
        }
        Err(e) => return Err(SessionLifecycleError::from(e).into()),
    };

    let now = now_ms();
    let ttl = now + config.max_connection_duration.as_millis() as u64;
    let listener_connection = Connection {
        connection_id: input.connection_id.to_string(),
        session_id: input.session_id.to_string(),
        target_language,
        role: Role::Listener,
        connected_at: now,
        ttl,
        ip_address_hash: input.ip_hash.to_string(),
    };

    if let Err(e) = store.put_connection(listener_connection).await {
        tracing::warn!(
            session_id = input.session_id,
            "compensating listener_count decrement after PutConnection failure"
        );
        let _ = store
            .atomic_add_listener_count(input.session_id, -1, 0)
            .await;
        return Err(SessionLifecycleError::from(e).into());
    }

    Ok(ServerFrame::SessionJoined {
        session_id: input.session_id.to_string(),
        source_language: updated.source_language.to_string(),
        target_language: target_language.to_string(),
        joined_at: now,
    })
}

async fn disambiguate_capacity_failure(
    store: &Arc<dyn StateStore>,
    session_id: &str,
) -> SessionLifecycleError {
    match store.get_session(session_id).await {
        Ok(Some(s)) if !s.is_active => SessionLifecycleError::NotFound,
        Ok(Some(_)) => SessionLifecycleError::Full,
        Ok(None) => SessionLifecycleError::NotFound,
        Err(e) => SessionLifecycleError::Store(e),
    }
}
