//! In-process embedded implementation of [`StateStore`].
//!
//! Mirrors the registry shape this crate already uses elsewhere for
//! shared, concurrently-accessed state (a `tokio::sync::RwLock` around a
//! `HashMap`, plus a reverse index for fast by-session lookups) rather than
//! reaching for an external embedded database. Good enough to back a single
//! process; a hosted deployment swaps in a different [`StateStore`] impl
//! without any caller-visible change.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BatchDeleteOutcome, SessionCondition, SessionPatch, StateStore};
use crate::error::StoreError;
use crate::model::{now_ms, Connection, LanguageCode, RateLimitCounter, Session};

/// In-memory [`StateStore`]. Cheap to clone (wrap in `Arc`), safe to share
/// across every connection task in the process.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    connections: RwLock<HashMap<String, Connection>>,
    /// sessionId -> connectionIds, kept in sync with `connections` under the
    /// same critical sections so the two never drift.
    by_session: RwLock<HashMap<String, HashSet<String>>>,
    rate_limits: RwLock<HashMap<String, RateLimitCounter>>,
}

impl MemoryStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put_session(&self, session: Session, only_if_absent: bool) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if only_if_absent && sessions.contains_key(&session.session_id) {
            return Err(StoreError::AlreadyExists);
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
        condition: SessionCondition,
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(StoreError::NotFound)?;

        let condition_holds = match condition {
            SessionCondition::Always => true,
            SessionCondition::IsActive => session.is_active,
            SessionCondition::IsActiveAndUnderCapacity { max_listeners } => {
                session.is_active && session.listener_count < max_listeners
            }
        };
        if !condition_holds {
            return Err(StoreError::ConditionFailed);
        }

        match patch {
            SessionPatch::AddListenerCount { delta, floor } => {
                let new_value = (i64::from(session.listener_count) + i64::from(delta))
                    .max(i64::from(floor));
                session.listener_count = new_value as u32;
            }
            SessionPatch::SetSpeakerConnectionId(new_id) => {
                session.speaker_connection_id = new_id;
            }
            SessionPatch::SetInactive => {
                session.is_active = false;
            }
            SessionPatch::SetPlaybackState(state) => {
                session.playback_state = state;
            }
        }

        Ok(session.clone())
    }

    async fn atomic_add_listener_count(
        &self,
        id: &str,
        delta: i32,
        floor: u32,
    ) -> Result<u32, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(StoreError::NotFound)?;
        let new_value =
            (i64::from(session.listener_count) + i64::from(delta)).max(i64::from(floor));
        session.listener_count = new_value as u32;
        Ok(session.listener_count)
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, StoreError> {
        Ok(self.connections.read().await.get(id).cloned())
    }

    async fn put_connection(&self, connection: Connection) -> Result<(), StoreError> {
        let mut connections = self.connections.write().await;
        let mut by_session = self.by_session.write().await;
        by_session
            .entry(connection.session_id.clone())
            .or_default()
            .insert(connection.connection_id.clone());
        connections.insert(connection.connection_id.clone(), connection);
        Ok(())
    }

    async fn delete_connection(&self, id: &str) -> Result<(), StoreError> {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(id) {
            let mut by_session = self.by_session.write().await;
            if let Some(set) = by_session.get_mut(&conn.session_id) {
                set.remove(id);
                if set.is_empty() {
                    by_session.remove(&conn.session_id);
                }
            }
        }
        // Deleting a missing record is success: idempotent by contract.
        Ok(())
    }

    async fn query_connections_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Connection>, StoreError> {
        let by_session = self.by_session.read().await;
        let Some(ids) = by_session.get(session_id) else {
            return Ok(Vec::new());
        };
        let connections = self.connections.read().await;
        Ok(ids.iter().filter_map(|id| connections.get(id).cloned()).collect())
    }

    async fn query_connections_by_language(
        &self,
        session_id: &str,
        language: LanguageCode,
    ) -> Result<Vec<Connection>, StoreError> {
        let all = self.query_connections_by_session(session_id).await?;
        Ok(all
            .into_iter()
            .filter(|c| c.target_language == language)
            .collect())
    }

    async fn batch_delete_connections(&self, ids: &[String]) -> BatchDeleteOutcome {
        let mut outcome = BatchDeleteOutcome::default();
        for id in ids {
            match self.delete_connection(id).await {
                Ok(()) => outcome.succeeded.push(id.clone()),
                Err(e) => outcome.failed.push((id.clone(), e.to_string())),
            }
        }
        outcome
    }

    async fn rate_limit_check(
        &self,
        identifier: &str,
        limit: u32,
        window_ms: u64,
    ) -> Result<(bool, u64), StoreError> {
        let mut counters = self.rate_limits.write().await;
        let now = now_ms();
        let counter = counters
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitCounter {
                identifier: identifier.to_string(),
                count: 0,
                window_start: now,
                expires_at: now + window_ms,
            });

        if now.saturating_sub(counter.window_start) >= window_ms {
            counter.window_start = now;
            counter.count = 0;
            counter.expires_at = now + window_ms;
        }

        counter.count += 1;
        let allowed = counter.count <= limit;
        let retry_after_secs = if allowed {
            0
        } else {
            (counter.window_start + window_ms).saturating_sub(now) / 1000
        };
        Ok((allowed, retry_after_secs))
    }

    async fn get_rate_limit_counter(
        &self,
        identifier: &str,
    ) -> Result<Option<RateLimitCounter>, StoreError> {
        Ok(self.rate_limits.read().await.get(identifier).cloned())
    }
}
