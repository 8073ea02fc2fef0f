//! End-to-end: two listeners race to join a session capped at one slot.
//! Exactly one is admitted; the other gets `SESSION_FULL`; the session's
//! `listenerCount` never exceeds the cap.

mod common;

use babelcast::{ControlPlaneConfig, StateStore};

use common::{connect, recv_json, VALID_TOKEN};

#[tokio::test]
async fn only_one_listener_is_admitted_at_the_cap() {
    let test = common::spawn_server(ControlPlaneConfig::default().max_listeners_per_session(1)).await;

    let mut speaker = connect(
        test.addr,
        &format!("action=createSession&sourceLanguage=en&qualityTier=standard&token={VALID_TOKEN}"),
    )
    .await;
    let created = recv_json(&mut speaker).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let query = format!("action=joinSession&sessionId={session_id}&targetLanguage=es");
    let (ws_a, ws_b) = tokio::join!(connect(test.addr, &query), connect(test.addr, &query));
    let mut ws_a = ws_a;
    let mut ws_b = ws_b;

    let (frame_a, frame_b) = tokio::join!(recv_json(&mut ws_a), recv_json(&mut ws_b));
    let types = [frame_a["type"].as_str().unwrap(), frame_b["type"].as_str().unwrap()];

    let joined = types.iter().filter(|t| **t == "sessionJoined").count();
    let full = types.iter().filter(|t| **t == "error").count();
    assert_eq!(joined, 1, "exactly one join should be admitted: {types:?}");
    assert_eq!(full, 1, "exactly one join should be rejected: {types:?}");

    let rejected = if frame_a["type"] == "error" { &frame_a } else { &frame_b };
    assert_eq!(rejected["code"], "SESSION_FULL");

    let session = test.store.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.listener_count, 1);
}
