//! The generated typed clients against a live peer pair.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crosstalk::{remote_client, CallError, Channel, Peer, Registry, Transport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Greeting {
    text: String,
    emphatic: bool,
}

remote_client! {
    /// UI-side view of the host's exposed functions.
    struct HostClient {
        async fn add(a: i64, b: i64) -> i64;
        async fn greet(name: String, emphatic: bool) -> Greeting;
        async fn fail_always() -> i64;
        async fn ping();
    }
}

fn host_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .expose_fn("add", |args| async move {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .unwrap();
    registry
        .expose_fn("greet", |args| async move {
            let name = args[0].as_str().unwrap_or("stranger").to_owned();
            let emphatic = args[1].as_bool().unwrap_or(false);
            let text = if emphatic {
                format!("HELLO {}!", name.to_uppercase())
            } else {
                format!("hello {name}")
            };
            Ok(json!({"text": text, "emphatic": emphatic}))
        })
        .unwrap();
    registry
        .expose_fn("fail_always", |_| async { Err("nope".into()) })
        .unwrap();
    registry
        .expose_fn("ping", |_| async { Ok(json!(null)) })
        .unwrap();
    registry
        .expose_fn("not_a_number", |_| async { Ok(json!("twelve")) })
        .unwrap();
    registry
}

fn connect() -> HostClient {
    let (host_side, ui_side) = Transport::mem_pair();
    let (_host, host_driver) = Peer::new(Channel::new(host_side), host_registry());
    tokio::spawn(host_driver.run());
    let (ui_peer, ui_driver) = Peer::new(Channel::new(ui_side), Registry::new());
    tokio::spawn(ui_driver.run());
    HostClient::new(ui_peer)
}

#[tokio::test]
async fn typed_arguments_and_return_value() {
    let host = connect();
    assert_eq!(host.add(19, 23).await.unwrap(), 42);
    assert_eq!(
        host.greet("ada".to_owned(), true).await.unwrap(),
        Greeting {
            text: "HELLO ADA!".to_owned(),
            emphatic: true,
        }
    );
}

#[tokio::test]
async fn unit_return_accepts_null() {
    let host = connect();
    host.ping().await.unwrap();
}

#[tokio::test]
async fn remote_failure_surfaces_as_remote_error() {
    let host = connect();
    let err = host.fail_always().await.unwrap_err();
    match err {
        CallError::Remote(payload) => assert_eq!(payload["message"], json!("nope")),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_return_type_is_a_deserialize_error() {
    let host = connect();
    // Bypass the typed surface to hit a function returning the wrong shape.
    let raw = host.peer().call("not_a_number", vec![]).await.unwrap();
    assert_eq!(raw, json!("twelve"));

    remote_client! {
        struct WrongClient {
            async fn not_a_number() -> i64;
        }
    }
    let wrong = WrongClient::new(host.peer().clone());
    assert!(matches!(
        wrong.not_a_number().await.unwrap_err(),
        CallError::Deserialize(_)
    ));
}

#[tokio::test]
async fn dynamic_and_typed_calls_share_one_peer() {
    let host = connect();
    let raw = host.peer().call("add", vec![json!(1), json!(2)]).await.unwrap();
    assert_eq!(raw, json!(3));
    assert_eq!(host.add(1, 2).await.unwrap(), 3);
}
