//! `PacketCodec` driven through `tokio_util` framing over an in-memory pipe.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use playwire::{
    codec::{CodecError, EofError, PacketCodec},
    frame::{self, Frame, FrameError, PacketType},
};
use proptest::prelude::*;
use tokio::io::{AsyncWriteExt, duplex};
use tokio_util::codec::{FramedRead, FramedWrite};

fn packets() -> Vec<Frame> {
    vec![
        Frame::new(PacketType::Handshake, br#"{"sys":{}}"#.to_vec()),
        Frame::new(PacketType::Heartbeat, Vec::new()),
        Frame::new(PacketType::Data, vec![7_u8; 300]),
        Frame::new(PacketType::Kick, Vec::new()),
    ]
}

fn wire(frames: &[Frame]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| frame::encode(f.packet_type(), f.payload()).expect("encode").to_vec())
        .collect()
}

proptest! {
    #[test]
    fn arbitrary_chunking_yields_the_same_packets(chunk in 1usize..64) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let expected = packets();
        let bytes = wire(&expected);
        let received = rt.block_on(async move {
            let (mut tx, rx) = duplex(16);
            let writer = tokio::spawn(async move {
                for piece in bytes.chunks(chunk) {
                    tx.write_all(piece).await.expect("write");
                }
            });
            let frames: Vec<Frame> = FramedRead::new(rx, PacketCodec::default())
                .map(|f| f.expect("frame"))
                .collect()
                .await;
            writer.await.expect("writer");
            frames
        });
        prop_assert_eq!(received, expected);
    }
}

#[tokio::test]
async fn framed_write_produces_wire_format() {
    let (tx, mut rx) = duplex(1024);
    let mut sink = FramedWrite::new(tx, PacketCodec::default());
    sink.send(Frame::new(PacketType::Data, Bytes::from_static(b"abc")))
        .await
        .expect("send");
    drop(sink);

    let mut out = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut rx, &mut out)
        .await
        .expect("read");
    assert_eq!(out, [4, 0, 0, 3, b'a', b'b', b'c']);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let (mut tx, rx) = duplex(64);
    tx.write_all(&[4, 0, 1, 0]).await.expect("write");
    let mut stream = FramedRead::new(rx, PacketCodec::new(16));
    let err = stream.next().await.expect("item").expect_err("oversized");
    assert!(matches!(
        err,
        CodecError::Frame(FrameError::Oversized { size: 256, max: 16 })
    ));
}

#[tokio::test]
async fn unknown_type_is_rejected() {
    let (mut tx, rx) = duplex(64);
    tx.write_all(&[9, 0, 0, 0]).await.expect("write");
    let mut stream = FramedRead::new(rx, PacketCodec::default());
    let err = stream.next().await.expect("item").expect_err("unknown type");
    assert!(matches!(
        err,
        CodecError::Frame(FrameError::UnknownPacketType(9))
    ));
}

#[tokio::test]
async fn truncated_stream_reports_eof_position() {
    let (mut tx, rx) = duplex(64);
    tx.write_all(&[4, 0, 0, 5, b'x', b'y']).await.expect("write");
    drop(tx);
    let mut stream = FramedRead::new(rx, PacketCodec::default());
    let err = stream.next().await.expect("item").expect_err("truncated");
    assert!(matches!(
        err,
        CodecError::Eof(EofError::MidFrame {
            bytes_received: 2,
            expected: 5
        })
    ));
}
