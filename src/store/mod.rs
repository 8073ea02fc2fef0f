//! C1: the state store.
//!
//! A transactional key-value contract with secondary-index query,
//! conditional writes, and atomic numeric update, satisfiable by a hosted
//! wide-column service or an in-process embedded store. [`StateStore`] is
//! the trait every other component depends on; nothing outside this module
//! reaches into [`Session`]/[`Connection`] storage directly.
//!
//! Deployments wanting a hosted backend (DynamoDB-style) implement
//! [`StateStore`] and reuse [`retry::RetryPolicy`] for the transient-error
//! handling §4.1 requires; [`memory::MemoryStore`] is the in-process
//! embedded implementation this crate ships.

pub mod memory;
pub mod retry;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Connection, LanguageCode, RateLimitCounter, Session};

/// A field-level update to apply to a [`Session`], gated by a
/// [`SessionCondition`].
#[derive(Debug, Clone)]
pub enum SessionPatch {
    /// Add `delta` to `listener_count`, clamped so it never drops below
    /// `floor`. Used by the capacity-checked join increment.
    AddListenerCount {
        /// Amount to add (may be negative).
        delta: i32,
        /// Floor the result is clamped to.
        floor: u32,
    },
    /// Replace the speaker's connection id (C8 refresh).
    SetSpeakerConnectionId(String),
    /// Idempotently flip `is_active` to `false` (C9 terminal disconnect).
    SetInactive,
    /// Set the playback state (pause/resume fan-out feature).
    SetPlaybackState(crate::model::PlaybackState),
}

/// Precondition a [`SessionPatch`] must satisfy to apply.
#[derive(Debug, Clone, Copy)]
pub enum SessionCondition {
    /// No precondition.
    Always,
    /// `is_active == true`.
    IsActive,
    /// `is_active == true && listener_count < max_listeners`.
    IsActiveAndUnderCapacity {
        /// Capacity ceiling.
        max_listeners: u32,
    },
}

/// Outcome of a best-effort batch delete: every id passed in appears in
/// exactly one of `succeeded`/`failed`.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteOutcome {
    /// Connection ids that were deleted (or already absent — deletion is
    /// idempotent).
    pub succeeded: Vec<String>,
    /// Connection ids that failed to delete, with the error kind as text.
    pub failed: Vec<(String, String)>,
}

/// The state store contract (C1).
///
/// All operations are safe under parallel callers. Conditional writes
/// serialize races (create-if-absent for ID allocation; `is_active` as a
/// precondition for the listener-count increment). `query_*` is eventually
/// consistent; callers must tolerate stragglers (see spec §4.9/§5).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a session by id.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert a session. If `only_if_absent`, fails with
    /// [`StoreError::AlreadyExists`] when a record with the same id exists.
    async fn put_session(&self, session: Session, only_if_absent: bool) -> Result<(), StoreError>;

    /// Apply `patch` to the session `id` iff `condition` holds; otherwise
    /// [`StoreError::ConditionFailed`]. Returns the session as it stood
    /// after the update.
    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
        condition: SessionCondition,
    ) -> Result<Session, StoreError>;

    /// Unconditionally add `delta` to the session's `listener_count`,
    /// clamped to `floor`. Succeeds regardless of concurrent callers.
    async fn atomic_add_listener_count(
        &self,
        id: &str,
        delta: i32,
        floor: u32,
    ) -> Result<u32, StoreError>;

    /// Fetch a connection by id.
    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, StoreError>;

    /// Insert or replace a connection record.
    async fn put_connection(&self, connection: Connection) -> Result<(), StoreError>;

    /// Delete a connection. Deleting a missing record is success
    /// (idempotent).
    async fn delete_connection(&self, id: &str) -> Result<(), StoreError>;

    /// All connections for a session, via the `(sessionId, targetLanguage)`
    /// secondary index. Eventually consistent.
    async fn query_connections_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Connection>, StoreError>;

    /// Connections for a session filtered to one target language.
    async fn query_connections_by_language(
        &self,
        session_id: &str,
        language: LanguageCode,
    ) -> Result<Vec<Connection>, StoreError>;

    /// Best-effort batch delete; partial failures are reported per item,
    /// never as a single all-or-nothing error.
    async fn batch_delete_connections(&self, ids: &[String]) -> BatchDeleteOutcome;

    /// Read-modify-write a rate-limit counter in one logical step: if the
    /// stored window has elapsed, reset it; otherwise increment and compare
    /// against `limit`. Returns `(allowed, retry_after_secs)`.
    async fn rate_limit_check(
        &self,
        identifier: &str,
        limit: u32,
        window_ms: u64,
    ) -> Result<(bool, u64), StoreError>;

    /// Snapshot of a rate-limit counter, for tests/observability only.
    async fn get_rate_limit_counter(
        &self,
        identifier: &str,
    ) -> Result<Option<RateLimitCounter>, StoreError>;
}
