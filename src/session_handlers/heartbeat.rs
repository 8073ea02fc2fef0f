//! C7: the heartbeat handler.
//!
//! Purely observational — never mutates a session or connection record.

use std::sync::Arc;

use crate::config::ControlPlaneConfig;
use crate::model::now_ms;
use crate::store::StateStore;
use crate::wire::ServerFrame;

/// Handle a `heartbeat` frame for connection `connection_id`.
///
/// Returns `HeartbeatAck` for a known, young connection; `ConnectionWarning`
/// once the connection has crossed the configured warning age. A connection
/// the store no longer knows about still gets an ack — the transport may
/// drop it regardless, but heartbeat itself never errors.
pub async fn heartbeat(
    store: &Arc<dyn StateStore>,
    config: &ControlPlaneConfig,
    connection_id: &str,
) -> ServerFrame {
    let now = now_ms();
    let Ok(Some(connection)) = store.get_connection(connection_id).await else {
        return ServerFrame::HeartbeatAck { server_time: now };
    };

    let age_ms = connection.age_ms(now);
    if age_ms >= config.connection_warning_at.as_millis() as u64 {
        let expires_in_ms = config
            .max_connection_duration
            .as_millis()
            .saturating_sub(u128::from(age_ms));
        return ServerFrame::ConnectionWarning {
            expires_in_sec: (expires_in_ms / 1000) as u64,
        };
    }

    ServerFrame::HeartbeatAck { server_time: now }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, LanguageCode, Role};
    use crate::store::memory::MemoryStore;
    use std::time::Duration;

    fn connection_of_age(age_ms: u64) -> Connection {
        Connection {
            connection_id: "c1".into(),
            session_id: "s1".into(),
            target_language: LanguageCode::from_bytes_unchecked(*b"en"),
            role: Role::Listener,
            connected_at: now_ms().saturating_sub(age_ms),
            ttl: now_ms() + 10_000,
            ip_address_hash: "0123456789abcdef".into(),
        }
    }

    #[tokio::test]
    async fn unknown_connection_still_gets_an_ack() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let config = ControlPlaneConfig::default();
        let frame = heartbeat(&store, &config, "missing").await;
        assert!(matches!(frame, ServerFrame::HeartbeatAck { .. }));
    }

    #[tokio::test]
    async fn young_connection_gets_plain_ack() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let config = ControlPlaneConfig::default();
        store.put_connection(connection_of_age(10)).await.unwrap();
        let frame = heartbeat(&store, &config, "c1").await;
        assert!(matches!(frame, ServerFrame::HeartbeatAck { .. }));
    }

    #[tokio::test]
    async fn connection_past_warning_threshold_gets_a_warning() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let mut config = ControlPlaneConfig::default();
        config.connection_warning_at = Duration::from_secs(100);
        config.max_connection_duration = Duration::from_secs(200);
        store.put_connection(connection_of_age(100_500)).await.unwrap();
        let frame = heartbeat(&store, &config, "c1").await;
        assert!(matches!(frame, ServerFrame::ConnectionWarning { .. }));
    }
}
