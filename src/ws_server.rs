//! The WebSocket transport layer: accepts upgrades, parses admission query
//! strings, drives C3/C4/C6 for the connect transition, then hands each
//! live connection off to the post-admission frame loop (C7 heartbeat, C8
//! in-connection refresh rejection, C9 on close).
//!
//! Structured as a plain accept loop: an explicit `running` flag, a
//! shutdown `mpsc` channel selected alongside `listener.accept()`, and one
//! spawned task per connection. The upgrade handshake goes through
//! `tokio-tungstenite`; each connection is a control-plane admission flow
//! rather than a bare TCP stream.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::auth::Authorizer;
use crate::config::ControlPlaneConfig;
use crate::error::{AdmissionError, SessionLifecycleError};
use crate::fanout::{SendOutcome, Sender};
use crate::model::ConnectionPhase;
use crate::rate_limit::RateLimiter;
use crate::session_handlers::{connect, disconnect, heartbeat, refresh};
use crate::stats::ControlPlaneStats;
use crate::store::StateStore;
use crate::validate::{validate_action, validate_language, Action, LanguageSupport};
use crate::wire::{AdmissionParams, ServerFrame};

/// Per-connection outbound channels, keyed by `connectionId`. The state
/// store is the join between sessions and connections (see
/// [`crate::model`]); this registry is the *transport's* join between a
/// connection id and the live socket that owns it, needed because
/// [`crate::fanout::broadcast`] addresses connections by id, not by
/// socket handle.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl ConnectionRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, connection_id: &str, tx: mpsc::UnboundedSender<Message>) {
        self.channels
            .write()
            .await
            .insert(connection_id.to_string(), tx);
    }

    async fn unregister(&self, connection_id: &str) {
        self.channels.write().await.remove(connection_id);
    }
}

#[async_trait]
impl Sender for ConnectionRegistry {
    async fn send(&self, connection_id: &str, frame: &ServerFrame) -> SendOutcome {
        let Some(tx) = self.channels.read().await.get(connection_id).cloned() else {
            return SendOutcome::Gone;
        };
        let Ok(json) = serde_json::to_string(frame) else {
            return SendOutcome::Failed;
        };
        match tx.send(Message::Text(json)) {
            Ok(()) => SendOutcome::Ok,
            Err(_) => SendOutcome::Gone,
        }
    }
}

/// Everything a connection task needs, bundled so `handle_socket` takes one
/// clone-cheap argument instead of eight.
#[derive(Clone)]
struct Shared {
    config: Arc<ControlPlaneConfig>,
    store: Arc<dyn StateStore>,
    authorizer: Arc<Authorizer>,
    rate_limiter: Arc<RateLimiter>,
    language_support: Arc<LanguageSupport>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<ControlPlaneStats>,
}

/// The control-plane WebSocket server. Owns the shared singletons (§4.9
/// "Global mutable state"): the store client, the rate limiter, and the
/// authorizer's JWKS cache, all initialized once at construction and torn
/// down together on [`ControlPlaneServer::shutdown`].
pub struct ControlPlaneServer {
    shared: Shared,
    running: AtomicBool,
    shutdown_tx: RwLock<Option<mpsc::Sender<()>>>,
}

impl ControlPlaneServer {
    /// Build a server over the given store, authorizer, and language
    /// support, using `config` for every tunable.
    #[must_use]
    pub fn new(
        config: ControlPlaneConfig,
        store: Arc<dyn StateStore>,
        authorizer: Authorizer,
        language_support: LanguageSupport,
    ) -> Self {
        let config = Arc::new(config);
        let rate_limiter = Arc::new(RateLimiter::new(store.clone(), &config));
        Self {
            shared: Shared {
                config,
                store,
                authorizer: Arc::new(authorizer),
                rate_limiter,
                language_support: Arc::new(language_support),
                registry: Arc::new(ConnectionRegistry::new()),
                stats: Arc::new(ControlPlaneStats::new()),
            },
            running: AtomicBool::new(false),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Snapshot of the in-process counters (sessions created, joins by
    /// outcome, broadcast sent/gone/failed).
    #[must_use]
    pub fn stats(&self) -> crate::stats::StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Bind `addr` and start accepting WebSocket upgrades. Each accepted
    /// transport is handled on its own spawned task; this call returns once
    /// the listener is bound, not when the server stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.write().await = Some(shutdown_tx);
        self.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                let shared = shared.clone();
                                tokio::spawn(async move {
                                    handle_socket(stream, peer_addr, shared).await;
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "accept error");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("control plane server shutting down, no longer accepting");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Stop accepting new transports. Connections already admitted keep
    /// running to completion (their tasks aren't tracked or aborted here);
    /// this only closes the accept loop.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(()).await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the accept loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn handle_socket(stream: TcpStream, peer_addr: SocketAddr, shared: Shared) {
    let captured_query = Arc::new(RwLock::new(String::new()));
    let captured_query_for_cb = captured_query.clone();

    let callback = move |req: &Request, resp: Response| {
        let query = req.uri().query().unwrap_or("").to_string();
        // The handshake callback is synchronous; `try_write` never blocks
        // here since nothing else touches this lock before the handshake
        // returns.
        if let Ok(mut guard) = captured_query_for_cb.try_write() {
            *guard = query;
        }
        Ok(resp)
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(error = %e, "websocket handshake failed");
            return;
        }
    };

    let raw_query = captured_query.read().await.clone();
    let params = AdmissionParams::parse(&raw_query);
    let connection_id = Uuid::new_v4().to_string();
    let ip_hash = hash_ip(&peer_addr);

    let (mut write, mut read) = ws_stream.split();

    let admit = tokio::time::timeout(
        shared.config.admission_deadline,
        admit(&shared, &connection_id, &ip_hash, &params),
    )
    .await;

    let frame = match admit {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            let _ = write
                .send(Message::Text(
                    serde_json::to_string(&ServerFrame::from_admission_error(&e)).unwrap_or_default(),
                ))
                .await;
            let _ = write.send(Message::Close(Some(close_frame(&e)))).await;
            return;
        }
        Err(_) => {
            tracing::warn!(connection_id, "admission deadline exceeded");
            let timeout_frame = ServerFrame::from_admission_error(&AdmissionError::Internal(
                "admission deadline exceeded".into(),
            ));
            let _ = write
                .send(Message::Text(
                    serde_json::to_string(&timeout_frame).unwrap_or_default(),
                ))
                .await;
            return;
        }
    };

    let Ok(reply_json) = serde_json::to_string(&frame) else {
        return;
    };
    if write.send(Message::Text(reply_json)).await.is_err() {
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    shared.registry.register(&connection_id, outbound_tx).await;

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_frame(&shared, &connection_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id, error = %e, "read error, treating as close");
                break;
            }
        }
    }

    forward_task.abort();
    shared.registry.unregister(&connection_id).await;
    disconnect::disconnect(
        &shared.store,
        &(shared.registry.clone() as Arc<dyn Sender>),
        &shared.config,
        &shared.stats,
        &connection_id,
    )
    .await;
}

async fn admit(
    shared: &Shared,
    connection_id: &str,
    ip_hash: &str,
    params: &AdmissionParams,
) -> Result<ServerFrame, AdmissionError> {
    let action = validate_action(&params.action)?;
    match action {
        Action::CreateSession => {
            let result = connect::create_session(
                &shared.store,
                &shared.authorizer,
                &shared.rate_limiter,
                &shared.config,
                connect::CreateSessionInput {
                    connection_id,
                    token: params.token.as_deref().unwrap_or(""),
                    source_language: params.source_language.as_deref().unwrap_or(""),
                    quality_tier: params.quality_tier.as_deref().unwrap_or(""),
                },
            )
            .await;
            if result.is_ok() {
                shared.stats.record_session_created();
            }
            result
        }
        Action::JoinSession => {
            let result = connect::join_session(
                &shared.store,
                &shared.rate_limiter,
                &shared.language_support,
                &shared.config,
                connect::JoinSessionInput {
                    connection_id,
                    ip_hash,
                    session_id: params.session_id.as_deref().unwrap_or(""),
                    target_language: params.target_language.as_deref().unwrap_or(""),
                },
            )
            .await;
            shared
                .stats
                .record_join_outcome(result.as_ref().err().map(AdmissionError::code));
            result
        }
        Action::RefreshConnection => refresh_on_connect(shared, connection_id, params).await,
        Action::Heartbeat => Err(AdmissionError::InvalidInput {
            field: "action",
        }),
    }
}

/// A listener refresh carries `targetLanguage`; a speaker refresh does
/// not (it re-authorizes against the session's recorded `speakerUserId`
/// instead). This is the disambiguation decided in DESIGN.md's Open
/// Question 1 follow-up: the wire's `refreshConnection` admission
/// parameters are shared by both roles, so the presence of
/// `targetLanguage` is what tells the two apart.
async fn refresh_on_connect(
    shared: &Shared,
    new_connection_id: &str,
    params: &AdmissionParams,
) -> Result<ServerFrame, AdmissionError> {
    let session_id = params
        .session_id
        .as_deref()
        .ok_or(AdmissionError::InvalidInput { field: "sessionId" })?;

    if let Some(target_language) = params.target_language.as_deref() {
        let target_language = validate_language(target_language)?;
        refresh::refresh_listener_connection(
            &shared.store,
            &shared.config,
            refresh::ListenerRefreshInput {
                new_connection_id,
                session_id,
                target_language,
            },
        )
        .await
    } else {
        refresh::refresh_speaker_connection(
            &shared.store,
            &shared.authorizer,
            &shared.config,
            refresh::SpeakerRefreshInput {
                new_connection_id,
                session_id,
                token: params.token.as_deref().unwrap_or(""),
            },
        )
        .await
    }
}

async fn handle_client_frame(shared: &Shared, connection_id: &str, text: &str) {
    match serde_json::from_str::<crate::wire::ClientFrame>(text) {
        Ok(crate::wire::ClientFrame::Heartbeat) => {
            let frame = heartbeat::heartbeat(&shared.store, &shared.config, connection_id).await;
            let sender: Arc<dyn Sender> = shared.registry.clone();
            let _ = sender.send(connection_id, &frame).await;
        }
        Ok(crate::wire::ClientFrame::RefreshConnection) => {
            // A frame arriving over an already-admitted transport is by
            // definition `Active`; `refreshConnection` only makes sense as
            // the admission action of a brand new transport (`Admitting`).
            // Asking to refresh in-band is the `Active -> Admitting`
            // transition, which `ConnectionPhase` never permits.
            let err = SessionLifecycleError::InvalidTransition {
                from: ConnectionPhase::Active,
            }
            .into();
            let frame = ServerFrame::from_admission_error(&err);
            let sender: Arc<dyn Sender> = shared.registry.clone();
            let _ = sender.send(connection_id, &frame).await;
        }
        Ok(crate::wire::ClientFrame::PauseSession { token }) => {
            handle_playback_frame(shared, connection_id, &token, true).await;
        }
        Ok(crate::wire::ClientFrame::ResumeSession { token }) => {
            handle_playback_frame(shared, connection_id, &token, false).await;
        }
        Err(e) => {
            tracing::debug!(connection_id, error = %e, "unparseable client frame, ignoring");
        }
    }
}

/// Resolve `connection_id`'s session and run the pause/resume flow
/// (supplemented feature; see SPEC_FULL.md). The triggering speaker gets
/// its reply the same way the fan-out recipients do: through the
/// registry, by connection id.
async fn handle_playback_frame(shared: &Shared, connection_id: &str, token: &str, pause: bool) {
    let sender: Arc<dyn Sender> = shared.registry.clone();

    let session_id = match shared.store.get_connection(connection_id).await {
        Ok(Some(conn)) => conn.session_id,
        Ok(None) => {
            let _ = sender
                .send(connection_id, &ServerFrame::from_admission_error(&AdmissionError::SessionNotFound))
                .await;
            return;
        }
        Err(e) => {
            let _ = sender
                .send(
                    connection_id,
                    &ServerFrame::from_admission_error(&AdmissionError::Internal(e.to_string())),
                )
                .await;
            return;
        }
    };

    let input = crate::session_handlers::playback::PlaybackControlInput {
        session_id: &session_id,
        token,
    };
    let result = if pause {
        crate::session_handlers::playback::pause_session(
            &shared.store,
            &sender,
            &shared.config,
            &shared.authorizer,
            &shared.stats,
            input,
        )
        .await
    } else {
        crate::session_handlers::playback::resume_session(
            &shared.store,
            &sender,
            &shared.config,
            &shared.authorizer,
            &shared.stats,
            input,
        )
        .await
    };

    let reply = result.unwrap_or_else(|e| ServerFrame::from_admission_error(&e));
    let _ = sender.send(connection_id, &reply).await;
}

fn close_frame(err: &AdmissionError) -> tokio_tungstenite::tungstenite::protocol::CloseFrame<'static> {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    let code = match err {
        AdmissionError::Unauthorized => CloseCode::Policy,
        AdmissionError::Internal(_) => CloseCode::Error,
        _ => CloseCode::Normal,
    };
    CloseFrame {
        code,
        reason: err.code().into(),
    }
}

/// Hash a peer address down to an opaque, fixed-width identifier suitable
/// for rate-limit keys and logs. Never persists or logs the plaintext IP
/// (spec §3, `ipAddressHash`); `SipHash`'s 64-bit output renders as exactly
/// 16 hex characters, meeting the ">=16 char" shape requirement.
fn hash_ip(addr: &SocketAddr) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    addr.ip().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ip_is_stable_and_fixed_width() {
        let addr: SocketAddr = "203.0.113.7:9000".parse().unwrap();
        let a = hash_ip(&addr);
        let b = hash_ip(&addr);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_ip_ignores_port() {
        let a: SocketAddr = "203.0.113.7:9000".parse().unwrap();
        let b: SocketAddr = "203.0.113.7:1".parse().unwrap();
        assert_eq!(hash_ip(&a), hash_ip(&b));
    }

    #[tokio::test]
    async fn registry_reports_gone_for_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let outcome = registry.send("missing", &ServerFrame::test_ping()).await;
        assert!(matches!(outcome, SendOutcome::Gone));
    }

    #[tokio::test]
    async fn registry_delivers_to_registered_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;

        let outcome = registry.send("c1", &ServerFrame::test_ping()).await;
        assert!(matches!(outcome, SendOutcome::Ok));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn registry_reports_gone_after_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;
        registry.unregister("c1").await;

        let outcome = registry.send("c1", &ServerFrame::test_ping()).await;
        assert!(matches!(outcome, SendOutcome::Gone));
    }
}
