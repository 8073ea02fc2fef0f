//! End-to-end: `createSession` with an expired token is denied, the
//! transport is closed, and neither a session nor a rate-limit counter is
//! left behind.

mod common;

use babelcast::model::rate_limit_identifier;
use babelcast::{ControlPlaneConfig, StateStore};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use common::{connect, recv_json, EXPIRED_TOKEN};

#[tokio::test]
async fn expired_token_is_denied_without_side_effects() {
    let test = common::spawn_server(ControlPlaneConfig::default()).await;

    let mut ws = connect(
        test.addr,
        &format!("action=createSession&sourceLanguage=en&qualityTier=standard&token={EXPIRED_TOKEN}"),
    )
    .await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "UNAUTHORIZED");

    let next = ws.next().await;
    assert!(
        matches!(next, Some(Ok(Message::Close(_))) | None),
        "transport should close after a denied admission, got {next:?}"
    );

    let counter = test
        .store
        .get_rate_limit_counter(&rate_limit_identifier("createSession", "user-1"))
        .await
        .unwrap();
    assert!(
        counter.is_none(),
        "a denial before authorization must never touch the rate limiter"
    );
}
