//! Liveness: heartbeats, heartbeat timeout and handshake timeout.

mod common;

use std::time::Duration;

use common::{fast_config, room_app};
use playwire::PacketType;
use playwire_testing::{TestClient, spawn_server};
use serde_json::json;
use tokio::time::{Instant, sleep};

const INTERVAL: Duration = Duration::from_millis(100);

#[tokio::test]
async fn silent_client_is_closed_after_three_intervals() {
    let server = spawn_server(room_app(fast_config(INTERVAL))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");
    let started = Instant::now();

    let frames = client.until_closed().await.expect("server closes");
    let waited = started.elapsed();
    assert!(waited >= INTERVAL * 3, "closed too early: {waited:?}");
    assert!(waited < INTERVAL * 10, "closed too late: {waited:?}");
    assert!(!frames.is_empty(), "no heartbeats before timeout");
    assert!(
        frames
            .iter()
            .all(|f| f.packet_type() == PacketType::Heartbeat)
    );

    server.shutdown().await;
}

#[tokio::test]
async fn heartbeating_client_stays_connected() {
    let server = spawn_server(room_app(fast_config(INTERVAL))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    client.handshake().await.expect("handshake");

    for _ in 0..12 {
        sleep(INTERVAL / 2).await;
        client.heartbeat().await.expect("heartbeat");
    }

    let response = client
        .call("room.enter", &json!({"id": 9, "name": "Cy"}))
        .await
        .expect("session still open");
    assert!(!response.error);

    server.shutdown().await;
}

#[tokio::test]
async fn missing_handshake_closes_connection() {
    let server = spawn_server(room_app(fast_config(INTERVAL))).await;
    let mut client = TestClient::connect(server.addr()).await.expect("connect");
    let started = Instant::now();

    let frames = client.until_closed().await.expect("server closes");
    assert!(frames.is_empty(), "unexpected packets: {frames:?}");
    assert!(started.elapsed() < INTERVAL * 5);

    server.shutdown().await;
}
