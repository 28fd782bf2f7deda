//! Tests for connections and WebSocket unwrapping.

use std::io;

use bytes::BytesMut;
use rstest::{fixture, rstest};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};

use super::{
    Connection,
    Transport,
    WebSocketError,
    websocket::{StreamState, WebSocketUnwrapper},
};
use crate::frame::{self, FrameReassembler, PacketType};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

/// Build a masked client frame with a short payload.
fn client_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126, "test frames use the short length form");
    let mut out = vec![first_byte, 0x80 | u8::try_from(payload.len()).expect("short payload")];
    out.extend_from_slice(&MASK);
    out.extend(payload.iter().zip(MASK.iter().cycle()).map(|(b, k)| b ^ k));
    out
}

fn binary(payload: &[u8]) -> Vec<u8> { client_frame(0x82, payload) }

#[fixture]
fn unwrapper() -> WebSocketUnwrapper { WebSocketUnwrapper::new(BytesMut::new(), 1024) }

#[fixture]
fn reassembler() -> FrameReassembler { FrameReassembler::new(1024) }

async fn loopback() -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let client = TcpStream::connect(addr).await.expect("connect");
    let (server, _) = listener.accept().await.expect("accept");
    (
        Connection::new(server, Transport::Tcp).expect("connection"),
        client,
    )
}

#[rstest]
fn binary_frame_yields_packet(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let packet = frame::encode(PacketType::Heartbeat, &[]).expect("encode");
    let state = unwrapper
        .feed(&binary(&packet), &mut reassembler)
        .expect("valid frame");
    assert_eq!(state, StreamState::Open);
    let frame = reassembler.next_frame().expect("decode").expect("frame");
    assert_eq!(frame.packet_type(), PacketType::Heartbeat);
}

#[rstest]
fn truncated_frame_is_held_back(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let packet = frame::encode(PacketType::Data, b"hello").expect("encode");
    let wire = binary(&packet);
    let (head, tail) = wire.split_at(wire.len() - 3);

    assert_eq!(
        unwrapper.feed(head, &mut reassembler).expect("partial"),
        StreamState::Open
    );
    assert_eq!(unwrapper.pending(), head.len());
    assert_eq!(reassembler.buffered(), 0);

    unwrapper.feed(tail, &mut reassembler).expect("complete");
    assert_eq!(unwrapper.pending(), 0);
    let frame = reassembler.next_frame().expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"hello");
}

#[rstest]
fn packet_spanning_two_frames(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let packet = frame::encode(PacketType::Data, b"split packet").expect("encode");
    let (first, second) = packet.split_at(6);
    unwrapper
        .feed(&binary(first), &mut reassembler)
        .expect("first");
    assert!(reassembler.next_frame().expect("decode").is_none());
    unwrapper
        .feed(&binary(second), &mut reassembler)
        .expect("second");
    let frame = reassembler.next_frame().expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"split packet");
}

#[rstest]
fn unmasked_frame_is_rejected(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let err = unwrapper
        .feed(&[0x82, 0x01, 0x00], &mut reassembler)
        .expect_err("unmasked frames are invalid");
    assert!(matches!(err, WebSocketError::Unmasked));
}

#[rstest]
fn close_frame_ends_stream(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let state = unwrapper
        .feed(&client_frame(0x88, &[0x03, 0xe8]), &mut reassembler)
        .expect("close");
    assert_eq!(state, StreamState::Closed);
}

#[rstest]
fn pings_are_skipped(mut unwrapper: WebSocketUnwrapper, mut reassembler: FrameReassembler) {
    let mut wire = client_frame(0x89, b"ping");
    wire.extend(binary(&frame::encode(PacketType::Heartbeat, &[]).expect("encode")));
    unwrapper.feed(&wire, &mut reassembler).expect("valid");
    assert!(reassembler.next_frame().expect("decode").is_some());
}

#[rstest]
fn oversized_frame_is_rejected(mut reassembler: FrameReassembler) {
    let mut unwrapper = WebSocketUnwrapper::new(BytesMut::new(), 4);
    let err = unwrapper
        .feed(&binary(b"too long"), &mut reassembler)
        .expect_err("oversized");
    assert!(matches!(err, WebSocketError::Oversized { size: 8, max: 4 }));
}

#[rstest]
fn leftover_bytes_are_decoded_first(mut reassembler: FrameReassembler) {
    let packet = frame::encode(PacketType::Heartbeat, &[]).expect("encode");
    let mut unwrapper = WebSocketUnwrapper::new(BytesMut::from(&binary(&packet)[..]), 1024);
    unwrapper.drain(&mut reassembler).expect("valid");
    assert!(reassembler.next_frame().expect("decode").is_some());
}

#[tokio::test]
async fn close_happens_once() {
    let (connection, _client) = loopback().await;
    assert!(connection.close());
    assert!(!connection.close());
    assert!(connection.is_closed());
}

#[tokio::test]
async fn writes_after_close_fail() {
    let (connection, _client) = loopback().await;
    connection.close();
    let err = connection
        .write_packet(b"late")
        .await
        .expect_err("closed connection");
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
}

#[tokio::test]
async fn websocket_writes_are_wrapped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let mut client = TcpStream::connect(listener.local_addr().expect("addr"))
        .await
        .expect("connect");
    let (server, _) = listener.accept().await.expect("accept");
    let connection = Connection::new(server, Transport::WebSocket).expect("connection");

    connection.write_packet(&[3, 0, 0, 0]).await.expect("write");
    let mut buf = [0_u8; 6];
    client.read_exact(&mut buf).await.expect("read");
    assert_eq!(buf, [0x82, 0x04, 3, 0, 0, 0]);
}
