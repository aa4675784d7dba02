//! Session-level behavior over the in-process transport, including a
//! hand-driven remote side that speaks raw wire text.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crosstalk_core::{
    CallError, Channel, CloseReason, Peer, Registry, SessionHooks, Transport,
};

fn math_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .expose_fn("add", |args| async move {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .unwrap();
    registry
}

fn spawn_peer(transport: Transport, registry: Registry) -> (Peer, JoinHandle<CloseReason>) {
    let (peer, driver) = Peer::new(Channel::new(transport), registry);
    (peer, tokio::spawn(driver.run()))
}

/// Parse one raw wire message into a JSON value.
async fn recv_json(transport: &Transport) -> Value {
    let text = transport.recv_text().await.unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn call_round_trips_between_two_peers() {
    let (host_side, ui_side) = Transport::mem_pair();
    let (_host, _host_task) = spawn_peer(host_side, math_registry());
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    let sum = ui.call("add", vec![json!(2), json!(3)]).await.unwrap();
    assert_eq!(sum, json!(5));
}

#[tokio::test]
async fn repeated_calls_correlate_independently() {
    let (host_side, ui_side) = Transport::mem_pair();
    let (_host, _host_task) = spawn_peer(host_side, math_registry());
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    for i in 0..5i64 {
        let sum = ui.call("add", vec![json!(i), json!(10)]).await.unwrap();
        assert_eq!(sum, json!(i + 10));
    }
}

#[tokio::test]
async fn both_directions_call_concurrently() {
    let (a_side, b_side) = Transport::mem_pair();
    let mut a_registry = Registry::new();
    a_registry
        .expose_fn("name", |_| async { Ok(json!("a")) })
        .unwrap();
    let mut b_registry = Registry::new();
    b_registry
        .expose_fn("name", |_| async { Ok(json!("b")) })
        .unwrap();
    let (a, _a_task) = spawn_peer(a_side, a_registry);
    let (b, _b_task) = spawn_peer(b_side, b_registry);

    let (from_b, from_a) = tokio::join!(a.call("name", vec![]), b.call("name", vec![]));
    assert_eq!(from_b.unwrap(), json!("b"));
    assert_eq!(from_a.unwrap(), json!("a"));
}

#[tokio::test]
async fn unknown_function_rejects_and_session_survives() {
    let (host_side, ui_side) = Transport::mem_pair();
    let (_host, _host_task) = spawn_peer(host_side, math_registry());
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    let err = ui.call("no_such_fn", vec![]).await.unwrap_err();
    match err {
        CallError::Remote(payload) => {
            assert_eq!(payload["kind"], json!("function_not_found"));
            assert!(payload["message"]
                .as_str()
                .unwrap()
                .contains("no_such_fn"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    // The peer keeps answering after the failed lookup.
    let sum = ui.call("add", vec![json!(1), json!(1)]).await.unwrap();
    assert_eq!(sum, json!(2));
}

#[tokio::test]
async fn handler_failure_propagates_to_the_caller() {
    let (host_side, ui_side) = Transport::mem_pair();
    let mut registry = Registry::new();
    registry
        .expose_fn("explode", |_| async { Err("told to explode".into()) })
        .unwrap();
    let (_host, _host_task) = spawn_peer(host_side, registry);
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    let err = ui.call("explode", vec![]).await.unwrap_err();
    match err {
        CallError::Remote(payload) => {
            assert_eq!(payload["message"], json!("told to explode"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_panic_becomes_an_error_envelope() {
    let (host_side, ui_side) = Transport::mem_pair();
    let mut registry = Registry::new();
    registry
        .expose_fn("panicky", |_| async { panic!("kaboom") })
        .unwrap();
    let (_host, _host_task) = spawn_peer(host_side, registry);
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    let err = ui.call("panicky", vec![]).await.unwrap_err();
    match err {
        CallError::Remote(payload) => {
            assert_eq!(payload["kind"], json!("handler_panic"));
            assert!(payload["message"].as_str().unwrap().contains("kaboom"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    // The host peer is still alive.
    let sum = ui.call("add", vec![json!(2), json!(2)]).await;
    assert!(sum.is_err()); // add is not registered on this host
}

#[tokio::test]
async fn out_of_order_responses_resolve_by_id() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, _near_task) = spawn_peer(near_side, Registry::new());

    let first = {
        let near = near.clone();
        tokio::spawn(async move { near.call("first", vec![]).await })
    };
    let second = {
        let near = near.clone();
        tokio::spawn(async move { near.call("second", vec![]).await })
    };

    // Collect both call envelopes; the spawn order does not fix the send
    // order, so map ids by function name.
    let mut id_by_name = std::collections::HashMap::new();
    for _ in 0..2 {
        let call = recv_json(&far_side).await;
        assert_eq!(call["type"], json!("call"));
        id_by_name.insert(
            call["name"].as_str().unwrap().to_owned(),
            call["id"].as_str().unwrap().to_owned(),
        );
    }

    // Answer in reverse order.
    let reply = json!({"type": "return", "id": id_by_name["second"], "ret": "two"});
    far_side.send_text(reply.to_string()).await.unwrap();
    let reply = json!({"type": "return", "id": id_by_name["first"], "ret": "one"});
    far_side.send_text(reply.to_string()).await.unwrap();

    assert_eq!(first.await.unwrap().unwrap(), json!("one"));
    assert_eq!(second.await.unwrap().unwrap(), json!("two"));
}

#[tokio::test]
async fn slow_handler_does_not_block_a_fast_one() {
    let (host_side, ui_side) = Transport::mem_pair();
    let mut registry = Registry::new();
    registry
        .expose_fn("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("slow"))
        })
        .unwrap();
    registry
        .expose_fn("fast", |_| async { Ok(json!("fast")) })
        .unwrap();
    let (_host, _host_task) = spawn_peer(host_side, registry);
    let (ui, _ui_task) = spawn_peer(ui_side, Registry::new());

    let started = Instant::now();
    let slow = {
        let ui = ui.clone();
        tokio::spawn(async move { ui.call("slow", vec![]).await })
    };
    let fast = ui.call("fast", vec![]).await.unwrap();
    let fast_elapsed = started.elapsed();

    assert_eq!(fast, json!("fast"));
    assert!(fast_elapsed < Duration::from_millis(150));
    assert_eq!(slow.await.unwrap().unwrap(), json!("slow"));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn abnormal_close_drains_all_pending_calls() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, near_task) = spawn_peer(near_side, Registry::new());

    let mut waiters = Vec::new();
    for name in ["a", "b", "c"] {
        let near = near.clone();
        waiters.push(tokio::spawn(async move { near.call(name, vec![]).await }));
    }
    // Make sure all three reached the wire before the drop.
    for _ in 0..3 {
        recv_json(&far_side).await;
    }
    drop(far_side);

    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CallError::ConnectionClosed)));
    }
    assert_eq!(near_task.await.unwrap(), CloseReason::ConnectionLost);
}

#[tokio::test]
async fn response_with_unknown_id_is_ignored() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, _near_task) = spawn_peer(near_side, Registry::new());

    let stray = json!({"type": "return", "id": "999", "ret": 1});
    far_side.send_text(stray.to_string()).await.unwrap();

    // A real call afterwards still works.
    let waiter = {
        let near = near.clone();
        tokio::spawn(async move { near.call("probe", vec![]).await })
    };
    let call = recv_json(&far_side).await;
    let reply = json!({"type": "return", "id": call["id"], "ret": "ok"});
    far_side.send_text(reply.to_string()).await.unwrap();
    assert_eq!(waiter.await.unwrap().unwrap(), json!("ok"));
}

#[tokio::test]
async fn abandoned_call_future_makes_late_response_a_no_op() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, _near_task) = spawn_peer(near_side, Registry::new());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        near.call("never_answered", vec![]),
    )
    .await;
    assert!(timed_out.is_err());

    // The far side answers long after the caller gave up.
    let call = recv_json(&far_side).await;
    let reply = json!({"type": "return", "id": call["id"], "ret": "late"});
    far_side.send_text(reply.to_string()).await.unwrap();

    // Session still healthy.
    let waiter = {
        let near = near.clone();
        tokio::spawn(async move { near.call("probe", vec![]).await })
    };
    let call = recv_json(&far_side).await;
    let reply = json!({"type": "return", "id": call["id"], "ret": "ok"});
    far_side.send_text(reply.to_string()).await.unwrap();
    assert_eq!(waiter.await.unwrap().unwrap(), json!("ok"));
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_session() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, _near_task) = spawn_peer(near_side, Registry::new());

    far_side.send_text("garbage".into()).await.unwrap();
    far_side
        .send_text(r#"{"type": "teleport"}"#.into())
        .await
        .unwrap();

    let waiter = {
        let near = near.clone();
        tokio::spawn(async move { near.call("probe", vec![]).await })
    };
    let call = recv_json(&far_side).await;
    let reply = json!({"type": "return", "id": call["id"], "ret": "alive"});
    far_side.send_text(reply.to_string()).await.unwrap();
    assert_eq!(waiter.await.unwrap().unwrap(), json!("alive"));
}

#[tokio::test]
async fn remote_close_envelope_drains_gracefully_and_fires_the_hook() {
    let (near_side, far_side) = Transport::mem_pair();
    let (reason_tx, reason_rx) = tokio::sync::oneshot::channel();
    let hooks = SessionHooks::new().on_session_close(move |reason| {
        let _ = reason_tx.send(reason);
    });
    let (near, driver) = Peer::with_hooks(Channel::new(near_side), Registry::new(), hooks);
    let near_task = tokio::spawn(driver.run());

    let waiter = {
        let near = near.clone();
        tokio::spawn(async move { near.call("pending_forever", vec![]).await })
    };
    recv_json(&far_side).await;

    far_side
        .send_text(r#"{"type":"close"}"#.into())
        .await
        .unwrap();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(CallError::GracefulClose)));
    assert_eq!(near_task.await.unwrap(), CloseReason::RemoteClose);
    assert_eq!(reason_rx.await.unwrap(), CloseReason::RemoteClose);
}

#[tokio::test]
async fn local_close_announces_itself_on_the_wire() {
    let (near_side, far_side) = Transport::mem_pair();
    let (near, near_task) = spawn_peer(near_side, Registry::new());

    near.close().await;
    assert_eq!(near_task.await.unwrap(), CloseReason::LocalClose);
    assert_eq!(recv_json(&far_side).await, json!({"type": "close"}));
}

#[tokio::test]
async fn open_hook_fires_before_traffic() {
    let (near_side, _far_side) = Transport::mem_pair();
    let (open_tx, open_rx) = tokio::sync::oneshot::channel();
    let hooks = SessionHooks::new().on_session_open(move || {
        let _ = open_tx.send(());
    });
    let (_near, driver) = Peer::with_hooks(Channel::new(near_side), Registry::new(), hooks);
    tokio::spawn(driver.run());

    open_rx.await.unwrap();
}

#[tokio::test]
async fn calls_after_close_fail_fast() {
    let (near_side, _far_side) = Transport::mem_pair();
    let (near, near_task) = spawn_peer(near_side, Registry::new());

    near.close().await;
    near_task.await.unwrap();

    let err = near.call("anything", vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::ConnectionClosed));
}
