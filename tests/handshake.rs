//! Handshake negotiation and the rules around it.

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use common::room_app;
use playwire::{PacketType, RouteDictionary, ServerConfig};
use playwire_testing::{TestClient, json_body, spawn_server};
use serde_json::json;

#[tokio::test]
async fn data_before_handshake_closes_connection() {
    let server = spawn_server(room_app(ServerConfig::default())).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");

    client
        .request("room.enter", &json!({"id": 1, "name": "Fi"}))
        .await
        .expect("send");
    let frames = client.until_closed().await.expect("server closes");
    assert!(frames.is_empty(), "unexpected packets: {frames:?}");

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_handshake_closes_connection() {
    let server = spawn_server(room_app(ServerConfig::default())).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");

    client
        .send(PacketType::Handshake, b"{not json".to_vec())
        .await
        .expect("send");
    let frames = client.until_closed().await.expect("server closes");
    assert!(frames.is_empty(), "unexpected packets: {frames:?}");

    server.shutdown().await;
}

#[tokio::test]
async fn repeated_handshake_is_ignored() {
    let handshakes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handshakes);
    let app = room_app(ServerConfig::default()).on_session_connected(move |session| {
        let counter = Arc::clone(&counter);
        session.on_handshaken(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });
    let server = spawn_server(app).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");

    client
        .send(PacketType::Handshake, b"{}".to_vec())
        .await
        .expect("second handshake");
    // The next packet must be the response, not a second acknowledgement.
    let response = client
        .call("room.enter", &json!({"id": 4, "name": "Gus"}))
        .await
        .expect("room.enter");
    assert!(!response.error);
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn dictionary_compresses_routes() {
    let dictionary =
        RouteDictionary::from_pairs([("room.enter", 1), ("room.shout", 2), ("room.onShout", 3)])
            .expect("dictionary");
    let app = room_app(ServerConfig::default().with_data_compression(true)).with_route_dictionary(dictionary);
    let server = spawn_server(app).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");

    let ack = client.handshake().await.expect("handshake");
    assert_eq!(ack.sys.dict.len(), 3);
    assert_eq!(ack.sys.dict.get("room.onShout"), Some(&3));

    let response = client
        .call("room.enter", &json!({"id": 5, "name": "Hal"}))
        .await
        .expect("room.enter");
    assert_eq!(
        json_body(&response.body),
        json!({"id": 5, "name": "Hal"})
    );

    client
        .notify("room.shout", &json!({"text": "hi"}))
        .await
        .expect("notify");
    let push = client.recv_message().await.expect("push");
    assert_eq!(push.route, "room.onShout");
    assert_eq!(json_body(&push.body), json!({"text": "hi"}));

    server.shutdown().await;
}
