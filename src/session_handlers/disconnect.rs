//! C9: the disconnect handler.
//!
//! Never propagates errors to the transport layer — a retried close must
//! stay idempotent, so every failure here is logged and swallowed (spec
//! §7, propagation policy for disconnect paths).

use std::sync::Arc;

use crate::config::ControlPlaneConfig;
use crate::fanout::{self, Sender};
use crate::model::{now_ms, Role};
use crate::stats::ControlPlaneStats;
use crate::store::{SessionCondition, SessionPatch, StateStore};
use crate::wire::ServerFrame;

/// Handle a transport close for `connection_id`. Always succeeds from the
/// caller's point of view; internal failures are logged.
pub async fn disconnect(
    store: &Arc<dyn StateStore>,
    sender: &Arc<dyn Sender>,
    config: &ControlPlaneConfig,
    stats: &Arc<ControlPlaneStats>,
    connection_id: &str,
) {
    let connection = match store.get_connection(connection_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(connection_id, error = %e, "disconnect: failed to load connection, giving up");
            return;
        }
    };

    match connection.role {
        Role::Listener => disconnect_listener(store, &connection).await,
        Role::Speaker => disconnect_speaker(store, sender, config, stats, &connection).await,
    }
}

async fn disconnect_listener(store: &Arc<dyn StateStore>, connection: &crate::model::Connection) {
    if let Err(e) = store.delete_connection(&connection.connection_id).await {
        tracing::warn!(connection_id = %connection.connection_id, error = %e, "listener disconnect: delete failed, continuing");
    }
    if let Err(e) = store
        .atomic_add_listener_count(&connection.session_id, -1, 0)
        .await
    {
        tracing::warn!(session_id = %connection.session_id, error = %e, "listener disconnect: compensating decrement failed");
    }
}

async fn disconnect_speaker(
    store: &Arc<dyn StateStore>,
    sender: &Arc<dyn Sender>,
    config: &ControlPlaneConfig,
    stats: &Arc<ControlPlaneStats>,
    connection: &crate::model::Connection,
) {
    let session = match store.get_session(&connection.session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            // Session already fully cleaned up; just drop this connection record.
            let _ = store.delete_connection(&connection.connection_id).await;
            return;
        }
        Err(e) => {
            tracing::warn!(session_id = %connection.session_id, error = %e, "speaker disconnect: failed to load session");
            return;
        }
    };

    if session.speaker_connection_id != connection.connection_id {
        // This disconnect corresponds to a replaced transport (§4.8); the
        // session is owned by a newer connection now.
        if let Err(e) = store.delete_connection(&connection.connection_id).await {
            tracing::warn!(connection_id = %connection.connection_id, error = %e, "stale speaker connection delete failed");
        }
        return;
    }

    let started_at = std::time::Instant::now();

    match store
        .update_session(
            &connection.session_id,
            SessionPatch::SetInactive,
            SessionCondition::IsActive,
        )
        .await
    {
        Ok(_) | Err(crate::error::StoreError::ConditionFailed) => {}
        Err(e) => {
            tracing::warn!(session_id = %connection.session_id, error = %e, "speaker disconnect: set-inactive failed, proceeding with cleanup anyway");
        }
    }

    let listeners = match store
        .query_connections_by_session(&connection.session_id)
        .await
    {
        Ok(conns) => conns,
        Err(e) => {
            tracing::warn!(session_id = %connection.session_id, error = %e, "speaker disconnect: listener enumeration failed");
            Vec::new()
        }
    };

    let listener_ids: Vec<String> = listeners
        .iter()
        .filter(|c| c.role == Role::Listener)
        .map(|c| c.connection_id.clone())
        .collect();

    if !listener_ids.is_empty() {
        let frame = ServerFrame::SessionEnded {
            session_id: connection.session_id.clone(),
            ended_at: now_ms(),
        };
        let summary = fanout::broadcast(
            sender.clone(),
            &listener_ids,
            frame,
            config.broadcast_max_parallel,
        )
        .await;
        tracing::info!(
            session_id = %connection.session_id,
            sent = summary.sent.len(),
            gone = summary.gone.len(),
            failed = summary.failed.len(),
            "sessionEnded fan-out complete"
        );
        stats.record_broadcast(&summary);
    }
    stats.record_session_ended();

    let mut to_delete = listener_ids;
    to_delete.push(connection.connection_id.clone());
    let outcome = store.batch_delete_connections(&to_delete).await;
    if !outcome.failed.is_empty() {
        tracing::warn!(
            session_id = %connection.session_id,
            failed = outcome.failed.len(),
            "speaker disconnect: some connection deletes failed, relying on TTL reclamation"
        );
    }

    tracing::info!(
        session_id = %connection.session_id,
        duration_ms = started_at.elapsed().as_millis() as u64,
        listener_count = listeners.len(),
        "session terminated"
    );
}
