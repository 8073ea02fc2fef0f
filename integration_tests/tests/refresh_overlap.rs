//! End-to-end: the speaker refreshes onto a new transport; the old
//! transport closing afterward must not end the session, only the new
//! transport's eventual close should.

mod common;

use babelcast::{ControlPlaneConfig, StateStore};
use std::time::Duration;

use common::{connect, recv_json, recv_json_or_close, VALID_TOKEN};

#[tokio::test]
async fn old_connection_closing_after_refresh_does_not_end_the_session() {
    let test = common::spawn_server(ControlPlaneConfig::default()).await;

    let mut speaker_old = connect(
        test.addr,
        &format!("action=createSession&sourceLanguage=en&qualityTier=standard&token={VALID_TOKEN}"),
    )
    .await;
    let created = recv_json(&mut speaker_old).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let mut listener = connect(
        test.addr,
        &format!("action=joinSession&sessionId={session_id}&targetLanguage=es"),
    )
    .await;
    let joined = recv_json(&mut listener).await;
    assert_eq!(joined["type"], "sessionJoined");

    let mut speaker_new = connect(
        test.addr,
        &format!("action=refreshConnection&sessionId={session_id}&token={VALID_TOKEN}"),
    )
    .await;
    let refreshed = recv_json(&mut speaker_new).await;
    assert_eq!(refreshed["type"], "connectionRefreshed");
    assert!(
        !refreshed["oldConnectionId"].as_str().unwrap_or("").is_empty(),
        "oldConnectionId should name the speaker's prior connection"
    );

    drop(speaker_old);

    // Give the server's accept-loop-spawned task time to run the disconnect
    // path, then confirm the session survived it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let session = test.store.get_session(&session_id).await.unwrap().unwrap();
    assert!(session.is_active, "session must survive the replaced connection's close");

    let nothing = recv_json_or_close(&mut listener, Duration::from_millis(300)).await;
    assert!(nothing.is_none(), "listener must not be told the session ended yet");

    drop(speaker_new);

    let ended = tokio::time::timeout(Duration::from_secs(2), recv_json(&mut listener))
        .await
        .expect("listener should be notified once the live speaker connection closes");
    assert_eq!(ended["type"], "sessionEnded");

    let session = test.store.get_session(&session_id).await.unwrap().unwrap();
    assert!(!session.is_active);
}
