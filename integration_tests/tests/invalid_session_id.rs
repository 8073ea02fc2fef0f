//! End-to-end: `joinSession` with a malformed `sessionId` is rejected at
//! the validation boundary, before any store lookup, and the transport is
//! closed.

mod common;

use babelcast::ControlPlaneConfig;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use common::{connect, recv_json};

#[tokio::test]
async fn malformed_session_id_is_rejected() {
    let test = common::spawn_server(ControlPlaneConfig::default()).await;

    let mut ws = connect(test.addr, "action=joinSession&sessionId=notthreeparts&targetLanguage=es").await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "INVALID_INPUT");

    let next = ws.next().await;
    assert!(
        matches!(next, Some(Ok(Message::Close(_))) | None),
        "transport should close after a rejected admission, got {next:?}"
    );
}
