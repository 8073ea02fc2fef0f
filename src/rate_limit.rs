//! C4: the rate limiter.
//!
//! A thin policy layer atop [`StateStore::rate_limit_check`]: picks the
//! window/limit for an operation and decides fail-open vs fail-closed when
//! the backend itself is unavailable. `createSession` is the one mutating,
//! expensive operation that fails closed; everything else fails open so a
//! store hiccup never blocks a heartbeat or a join.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ControlPlaneConfig;
use crate::error::{RateLimitError, StoreError};
use crate::model::rate_limit_identifier;
use crate::store::StateStore;

/// The operation a rate-limit check is guarding, matching the wire
/// `action` vocabulary where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `createSession` — fails closed.
    CreateSession,
    /// `joinSession` — fails open.
    JoinSession,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::CreateSession => "createSession",
            Self::JoinSession => "joinSession",
        }
    }

    fn fails_closed(self) -> bool {
        matches!(self, Self::CreateSession)
    }
}

/// Rate limiter bound to a [`StateStore`] and the configured window/limit
/// pairs.
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    create_session: (Duration, u32),
    join_session: (Duration, u32),
}

impl RateLimiter {
    /// Build a rate limiter from config.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, config: &ControlPlaneConfig) -> Self {
        Self {
            store,
            create_session: config.rate_limit_create_session,
            join_session: config.rate_limit_join_session,
        }
    }

    /// Check whether `identifier` may perform `operation` right now.
    pub async fn allow(
        &self,
        identifier: &str,
        operation: Operation,
    ) -> Result<(), RateLimitError> {
        let (window, limit) = match operation {
            Operation::CreateSession => self.create_session,
            Operation::JoinSession => self.join_session,
        };
        let key = rate_limit_identifier(operation.as_str(), identifier);

        match self
            .store
            .rate_limit_check(&key, limit, window.as_millis() as u64)
            .await
        {
            Ok((true, _)) => Ok(()),
            Ok((false, retry_after_secs)) => Err(RateLimitError::Limited {
                retry_after: Duration::from_secs(retry_after_secs),
            }),
            Err(StoreError::Unavailable(_)) if !operation.fails_closed() => {
                tracing::warn!(op = operation.as_str(), "rate limiter backend unavailable, failing open");
                Ok(())
            }
            Err(_) => Err(RateLimitError::BackendUnavailable),
        }
    }
}
