//! End-to-end scenarios, driven over in-memory duplex pipes standing in for
//! sockets so the whole router can be exercised without a real listener.
//! These are the six literal scenarios enumerated in the broker's testable
//! properties: register/request/reply, no-such-service, timeout, publish
//! fan-out with dedup, spy, and duplicate registration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broker_core::wire::{self, Envelope, Frame};
use broker_core::{proto, Registries, Router};
use prost::Message as _;
use serde_json::json;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;

fn peer(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn new_router(timeout: Duration) -> Arc<Router> {
    Arc::new(Router::new(Registries::new(), None, timeout, Arc::new(Notify::new())))
}

async fn spawn_client(router: Arc<Router>, port: u16) -> DuplexStream {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        broker_core::serve_connection(server_side, peer(port), router).await;
    });
    client_side
}

async fn send(stream: &mut DuplexStream, ty: proto::message::Type, payload: Vec<u8>) {
    let frame = wire::encode_message_frame(ty, payload);
    stream.write_all(&frame).await.unwrap();
}

async fn recv(stream: &mut DuplexStream) -> Envelope {
    match wire::read_frame(stream).await.unwrap() {
        Frame::Data(raw) => wire::decode_envelope(&raw).unwrap(),
        Frame::Eof => panic!("connection closed unexpectedly"),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn register_request_reply_round_trip() {
    let router = new_router(Duration::from_secs(60));
    let mut a = spawn_client(router.clone(), 1).await;
    let mut b = spawn_client(router.clone(), 2).await;

    send(
        &mut a,
        proto::message::Type::Register,
        proto::Register {
            name: "date".into(),
            identification: String::new(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    send(
        &mut b,
        proto::message::Type::Request,
        proto::Request {
            id: 7,
            service_name: "date".into(),
            service_identification: String::new(),
            method: "time".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut a).await {
        Envelope::Request(req) => {
            assert_eq!(req.id, 7);
            assert_eq!(req.method, "time");
        }
        other => panic!("expected Request, got {other:?}"),
    }

    send(
        &mut a,
        proto::message::Type::Reply,
        proto::Reply {
            id: 7,
            data: b"2024-01-01T00:00:00Z".to_vec(),
            error: None,
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut b).await {
        Envelope::Reply(reply) => {
            assert_eq!(reply.id, 7);
            assert_eq!(reply.data, b"2024-01-01T00:00:00Z");
            assert!(reply.error.is_none());
        }
        other => panic!("expected Reply, got {other:?}"),
    }
}

#[tokio::test]
async fn request_to_unknown_service_replies_no_such_service() {
    let router = new_router(Duration::from_secs(60));
    let mut b = spawn_client(router.clone(), 1).await;

    send(
        &mut b,
        proto::message::Type::Request,
        proto::Request {
            id: 9,
            service_name: "foo".into(),
            service_identification: "bar".into(),
            method: "x".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut b).await {
        Envelope::Reply(reply) => {
            assert_eq!(reply.id, 9);
            let error = reply.error.expect("expected an error reply");
            assert_eq!(error.r#type, proto::reply::ErrorType::NoSuchService as i32);
        }
        other => panic!("expected Reply, got {other:?}"),
    }
}

#[tokio::test]
async fn unanswered_request_times_out_and_late_reply_is_dropped() {
    let router = new_router(Duration::from_millis(100));
    let mut a = spawn_client(router.clone(), 1).await;
    let mut b = spawn_client(router.clone(), 2).await;

    send(
        &mut a,
        proto::message::Type::Register,
        proto::Register {
            name: "slow".into(),
            identification: String::new(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    send(
        &mut b,
        proto::message::Type::Request,
        proto::Request {
            id: 42,
            service_name: "slow".into(),
            service_identification: String::new(),
            method: "op".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    // A receives the forwarded request but never replies.
    let _ = recv(&mut a).await;

    match recv(&mut b).await {
        Envelope::Reply(reply) => {
            assert_eq!(reply.id, 42);
            let error = reply.error.expect("expected a timeout error");
            assert_eq!(error.r#type, proto::reply::ErrorType::Timeout as i32);
        }
        other => panic!("expected timeout Reply, got {other:?}"),
    }

    send(
        &mut a,
        proto::message::Type::Reply,
        proto::Reply {
            id: 42,
            data: Vec::new(),
            error: None,
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    let late = tokio::time::timeout(Duration::from_millis(50), recv(&mut b)).await;
    assert!(late.is_err(), "a reply after timeout must be dropped, not forwarded");
}

#[tokio::test]
async fn publish_fans_out_to_exact_and_glob_subscribers_exactly_once() {
    let router = new_router(Duration::from_secs(60));
    let mut x = spawn_client(router.clone(), 1).await;
    let mut y = spawn_client(router.clone(), 2).await;
    let mut publisher = spawn_client(router.clone(), 3).await;

    send(
        &mut x,
        proto::message::Type::Subscribe,
        proto::Subscribe { event: "test".into() }.encode_to_vec(),
    )
    .await;
    send(
        &mut y,
        proto::message::Type::Subscribe,
        proto::Subscribe {
            event: "test*".into(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    send(
        &mut publisher,
        proto::message::Type::Publish,
        proto::Publish {
            event: "test".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut x).await {
        Envelope::Publish(p) => assert_eq!(p.event, "test"),
        other => panic!("expected Publish, got {other:?}"),
    }
    match recv(&mut y).await {
        Envelope::Publish(p) => assert_eq!(p.event, "test"),
        other => panic!("expected Publish, got {other:?}"),
    }

    let extra = tokio::time::timeout(Duration::from_millis(50), recv(&mut x)).await;
    assert!(extra.is_err(), "exact subscriber must receive exactly one copy");

    send(
        &mut publisher,
        proto::message::Type::Publish,
        proto::Publish {
            event: "test.foo".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut y).await {
        Envelope::Publish(p) => assert_eq!(p.event, "test.foo"),
        other => panic!("expected Publish, got {other:?}"),
    }
    let extra_x = tokio::time::timeout(Duration::from_millis(50), recv(&mut x)).await;
    assert!(extra_x.is_err(), "non-matching exact subscriber must not receive the glob-only event");
}

#[tokio::test]
async fn spy_receives_request_and_reply() {
    let router = new_router(Duration::from_secs(60));
    let mut a = spawn_client(router.clone(), 1).await;
    let mut b = spawn_client(router.clone(), 2).await;
    let mut s = spawn_client(router.clone(), 3).await;

    send(
        &mut a,
        proto::message::Type::Register,
        proto::Register {
            name: "date".into(),
            identification: String::new(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    let spy_args = json!({
        "service_name": "date",
        "service_identification": "",
        "client_id": peer(3).to_string(),
    });
    send(
        &mut s,
        proto::message::Type::Request,
        proto::Request {
            id: 1,
            service_name: "cellaserv".into(),
            service_identification: String::new(),
            method: "spy".into(),
            data: serde_json::to_vec(&spy_args).unwrap(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut s).await {
        Envelope::Reply(reply) => assert!(reply.error.is_none()),
        other => panic!("expected Reply, got {other:?}"),
    }

    send(
        &mut b,
        proto::message::Type::Request,
        proto::Request {
            id: 5,
            service_name: "date".into(),
            service_identification: String::new(),
            method: "time".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut a).await {
        Envelope::Request(req) => assert_eq!(req.id, 5),
        other => panic!("expected Request, got {other:?}"),
    }
    match recv(&mut s).await {
        Envelope::Request(req) => assert_eq!(req.id, 5),
        other => panic!("spy expected Request, got {other:?}"),
    }

    send(
        &mut a,
        proto::message::Type::Reply,
        proto::Reply {
            id: 5,
            data: b"ok".to_vec(),
            error: None,
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut b).await {
        Envelope::Reply(reply) => assert_eq!(reply.id, 5),
        other => panic!("expected Reply, got {other:?}"),
    }
    match recv(&mut s).await {
        Envelope::Reply(reply) => assert_eq!(reply.id, 5),
        other => panic!("spy expected Reply, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_registration_redirects_future_requests() {
    let router = new_router(Duration::from_secs(60));
    let mut a1 = spawn_client(router.clone(), 1).await;
    let mut a2 = spawn_client(router.clone(), 2).await;
    let mut b = spawn_client(router.clone(), 3).await;

    send(
        &mut a1,
        proto::message::Type::Register,
        proto::Register {
            name: "echo".into(),
            identification: String::new(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    send(
        &mut a2,
        proto::message::Type::Register,
        proto::Register {
            name: "echo".into(),
            identification: String::new(),
        }
        .encode_to_vec(),
    )
    .await;
    settle().await;

    send(
        &mut b,
        proto::message::Type::Request,
        proto::Request {
            id: 1,
            service_name: "echo".into(),
            service_identification: String::new(),
            method: "x".into(),
            data: Vec::new(),
        }
        .encode_to_vec(),
    )
    .await;

    match recv(&mut a2).await {
        Envelope::Request(req) => assert_eq!(req.id, 1),
        other => panic!("a2 should have received the request, got {other:?}"),
    }

    let none_to_a1 = tokio::time::timeout(Duration::from_millis(50), recv(&mut a1)).await;
    assert!(none_to_a1.is_err(), "the displaced owner must not receive requests");
}
