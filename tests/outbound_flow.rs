//! Outbound dispatch: transaction id reuse, the retry budget, and
//! independence from the sync long-poll.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    api_error, connection_error, empty_sync, session, MockTransport, Step, ROOM_ALIAS, ROOM_ID,
};
use minimx::api::{Method, Transport};
use minimx::error::{SendError, TransportError};
use minimx::outbound::OutboundDispatcher;
use minimx::room::RoomHandle;
use minimx::sync::SyncEngine;
use serde_json::json;
use tokio::sync::{mpsc, watch};

fn dispatcher(transport: &Arc<MockTransport>) -> OutboundDispatcher {
    let transport: Arc<dyn Transport> = transport.clone();
    OutboundDispatcher::new(transport, session(), ROOM_ID.into())
}

#[tokio::test(start_paused = true)]
async fn retries_reuse_the_transaction_id() {
    let transport = MockTransport::new();
    transport.expect("/send/", Step::Err(connection_error()));
    transport.expect("/send/", Step::Err(TransportError::Timeout));
    transport.expect("/send/", Step::Ok(json!({"event_id": "$evt:example.org"})));

    let event_id = dispatcher(&transport)
        .send("hello")
        .await
        .expect("send succeeds on the third attempt");
    assert_eq!(event_id, "$evt:example.org");

    let sends = transport.requests_to("/send/");
    assert_eq!(sends.len(), 3);
    // Same path means the same transaction id on every attempt, which is
    // what lets the server deduplicate.
    assert!(sends.iter().all(|r| r.path == sends[0].path));
    assert_eq!(sends[0].method, Method::Put);
    let body = sends[0].body.as_ref().expect("send body");
    assert_eq!(body["msgtype"], "m.text");
    assert_eq!(body["body"], "hello");
}

#[tokio::test(start_paused = true)]
async fn transient_budget_exhaustion_is_reported() {
    let transport = MockTransport::new();
    for _ in 0..3 {
        transport.expect("/send/", Step::Err(connection_error()));
    }

    let err = dispatcher(&transport)
        .send("hello")
        .await
        .expect_err("budget exhausted");
    assert!(matches!(
        err,
        SendError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(transport.requests_to("/send/").len(), 3);
}

#[tokio::test]
async fn rejection_is_not_retried() {
    let transport = MockTransport::new();
    transport.expect(
        "/send/",
        Step::Err(api_error(403, "M_FORBIDDEN", "You cannot post in this room")),
    );

    let err = dispatcher(&transport)
        .send("hello")
        .await
        .expect_err("rejected");
    assert!(matches!(err, SendError::Rejected(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sends_do_not_queue_behind_the_long_poll() {
    let transport = MockTransport::new();
    // A long-poll held open by the server for 25 virtual seconds.
    transport.expect("/sync", Step::OkAfter(Duration::from_secs(25), empty_sync("s1")));
    transport.expect("/sync", Step::Hang);
    transport.expect("/send/", Step::Ok(json!({"event_id": "$evt:example.org"})));

    let room = RoomHandle {
        alias: ROOM_ALIAS.into(),
        room_id: ROOM_ID.into(),
    };
    let sync_transport: Arc<dyn Transport> = transport.clone();
    let mut engine = SyncEngine::new(sync_transport, session(), &room);
    let (tx, _rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);
    let engine_task = tokio::spawn(async move { engine.run(tx, stop_rx).await });

    // Wait until the poll is in flight.
    while transport.requests_to("/sync").is_empty() {
        tokio::task::yield_now().await;
    }

    let before = tokio::time::Instant::now();
    dispatcher(&transport)
        .send("ping")
        .await
        .expect("send completes");
    // The send finished without the virtual clock reaching the poll's
    // response time, so it never waited on the long-poll.
    assert_eq!(before.elapsed(), Duration::ZERO);

    stop_tx.send(true).expect("engine listening");
    engine_task
        .await
        .expect("engine task")
        .expect("clean shutdown");
}

#[tokio::test]
async fn invite_targets_the_room() {
    let transport = MockTransport::new();
    transport.expect("/invite", Step::Ok(json!({})));

    dispatcher(&transport)
        .invite("@bob:example.org")
        .await
        .expect("invite");

    let requests = transport.requests_to("/invite");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    let body = requests[0].body.as_ref().expect("invite body");
    assert_eq!(body["user_id"], "@bob:example.org");
}

#[tokio::test]
async fn display_name_update_targets_own_profile() {
    let transport = MockTransport::new();
    transport.expect("/profile/", Step::Ok(json!({})));

    dispatcher(&transport)
        .set_display_name("Alice")
        .await
        .expect("display name update");

    let requests = transport.requests_to("/profile/");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Put);
    assert!(requests[0].path.ends_with("/displayname"));
    let body = requests[0].body.as_ref().expect("profile body");
    assert_eq!(body["displayname"], "Alice");
}
