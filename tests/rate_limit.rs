//! Per-session inbound rate limiting.

mod common;

use std::time::Duration;

use common::room_app;
use playwire::{MessageType, PacketType, ServerConfig, message::MessageCodec};
use playwire_testing::{TestClient, json_body, spawn_server};
use serde_json::json;

fn limited(per_second: u32) -> ServerConfig {
    ServerConfig::default()
        .with_heartbeat_interval(Duration::from_secs(1))
        .with_rate_limit(per_second)
}

#[tokio::test]
async fn flooding_client_is_refused_then_kicked() {
    let server = spawn_server(room_app(limited(2))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");

    for id in 0..2 {
        let ok = client
            .call("room.enter", &json!({"id": id, "name": "Di"}))
            .await
            .expect("within budget");
        assert!(!ok.error);
    }

    let refused = client
        .call("room.enter", &json!({"id": 2, "name": "Di"}))
        .await
        .expect("refusal");
    assert!(refused.error);
    assert_eq!(json_body(&refused.body)["code"], "RateLimit");

    let last = client
        .request("room.enter", &json!({"id": 3, "name": "Di"}))
        .await
        .expect("send");
    let frames = client.until_closed().await.expect("server closes");
    let kinds: Vec<_> = frames.iter().map(playwire::Frame::packet_type).collect();
    assert_eq!(kinds, [PacketType::Data, PacketType::Kick]);
    let codec = MessageCodec::default();
    let refusal = codec
        .decode(frames[0].payload().clone())
        .expect("error response");
    assert_eq!(refusal.kind, MessageType::Response);
    assert_eq!(refusal.id, last);
    assert!(refusal.error);
    assert_eq!(json_body(&refusal.body)["code"], "RateLimit");

    server.shutdown().await;
}

#[tokio::test]
async fn client_within_rate_is_served() {
    let server = spawn_server(room_app(limited(50))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");

    for id in 0..20 {
        let response = client
            .call("room.enter", &json!({"id": id, "name": "Ed"}))
            .await
            .expect("served");
        assert!(!response.error);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn zero_rate_disables_limiting() {
    let server = spawn_server(room_app(limited(0))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");

    for _ in 0..100 {
        client
            .notify("room.shout", &json!({"n": 1}))
            .await
            .expect("notify");
    }
    for _ in 0..100 {
        let push = client.recv_message().await.expect("push");
        assert_eq!(push.route, "room.onShout");
    }

    server.shutdown().await;
}
