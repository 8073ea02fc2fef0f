//! End-to-end: a listener's connection record disappears from the store
//! (simulating TTL reclamation elsewhere) while its transport is still
//! open. The speaker's subsequent disconnect must fan out cleanly,
//! without attempting delivery to the now-unlisted listener.

mod common;

use babelcast::{ControlPlaneConfig, Role, StateStore};
use std::time::Duration;

use common::{connect, recv_json, recv_json_or_close, VALID_TOKEN};

#[tokio::test]
async fn speaker_disconnect_tolerates_an_externally_removed_listener_record() {
    let test = common::spawn_server(ControlPlaneConfig::default()).await;

    let mut speaker = connect(
        test.addr,
        &format!("action=createSession&sourceLanguage=en&qualityTier=standard&token={VALID_TOKEN}"),
    )
    .await;
    let created = recv_json(&mut speaker).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let mut listener = connect(
        test.addr,
        &format!("action=joinSession&sessionId={session_id}&targetLanguage=es"),
    )
    .await;
    let joined = recv_json(&mut listener).await;
    assert_eq!(joined["type"], "sessionJoined");

    let connections = test
        .store
        .query_connections_by_session(&session_id)
        .await
        .unwrap();
    let listener_connection = connections
        .iter()
        .find(|c| c.role == Role::Listener)
        .expect("listener connection record must exist after join");
    test.store
        .delete_connection(&listener_connection.connection_id)
        .await
        .unwrap();

    use futures::SinkExt;
    speaker.close(None).await.unwrap();
    drop(speaker);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let session = test.store.get_session(&session_id).await.unwrap().unwrap();
    assert!(!session.is_active, "speaker disconnect must still terminate the session");

    let nothing = recv_json_or_close(&mut listener, Duration::from_millis(300)).await;
    assert!(
        nothing.is_none(),
        "a listener whose store record was already gone must not receive a stray sessionEnded"
    );
}
