//! Tokio codec for the packet framing.
//!
//! [`PacketCodec`] exposes the framing in [`crate::frame`] as a
//! `tokio_util` [`Decoder`]/[`Encoder`] pair so that clients, tests and tools
//! can drive a connection with [`tokio_util::codec::Framed`]. The server's own
//! read path goes through the poller and [`crate::frame::FrameReassembler`]
//! instead, but both share the same header parsing.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame, HEADER_LENGTH, MAX_PAYLOAD_LENGTH};

pub mod error;

pub use error::{CodecError, EofError};

/// Decoder/encoder for length-prefixed packets.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use playwire::{
///     codec::PacketCodec,
///     frame::{Frame, PacketType},
/// };
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = PacketCodec::default();
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Frame::new(PacketType::Heartbeat, Vec::new()), &mut buf)
///     .expect("encode");
/// let frame = codec.decode(&mut buf).expect("decode").expect("frame");
/// assert_eq!(frame.packet_type(), PacketType::Heartbeat);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct PacketCodec {
    max_frame_length: usize,
}

impl PacketCodec {
    /// Create a codec accepting payloads up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to what the 3-byte length field can express.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: max_frame_length.min(MAX_PAYLOAD_LENGTH),
        }
    }

    /// Maximum payload length accepted in either direction.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for PacketCodec {
    fn default() -> Self { Self::new(MAX_PAYLOAD_LENGTH) }
}

impl Decoder for PacketCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(frame::split_frame(src, self.max_frame_length)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src, self.max_frame_length)),
        }
    }
}

/// Describe where in a packet the peer hung up.
fn build_eof_error(src: &BytesMut, max_frame_length: usize) -> CodecError {
    match frame::peek_header(src, max_frame_length) {
        Ok(Some(header)) => CodecError::Eof(EofError::MidFrame {
            bytes_received: src.len().saturating_sub(HEADER_LENGTH),
            expected: header.length,
        }),
        Ok(None) => CodecError::Eof(EofError::MidHeader {
            bytes_received: src.len(),
            header_size: HEADER_LENGTH,
        }),
        Err(e) => CodecError::Frame(e),
    }
}

impl Encoder<Frame> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.payload().len();
        if size > self.max_frame_length {
            return Err(CodecError::Frame(frame::FrameError::Oversized {
                size,
                max: self.max_frame_length,
            }));
        }
        frame::encode_into(item.packet_type(), item.payload(), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{CodecError, EofError, PacketCodec};
    use crate::frame::{Frame, FrameError, PacketType};

    #[test]
    fn truncated_header_at_eof_is_reported() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[4_u8, 0][..]);
        let err = codec.decode_eof(&mut buf).expect_err("truncated");
        assert!(matches!(
            err,
            CodecError::Eof(EofError::MidHeader {
                bytes_received: 2,
                header_size: 4
            })
        ));
    }

    #[test]
    fn truncated_payload_at_eof_is_reported() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[4_u8, 0, 0, 3, b'a'][..]);
        let err = codec.decode_eof(&mut buf).expect_err("truncated");
        assert!(matches!(
            err,
            CodecError::Eof(EofError::MidFrame {
                bytes_received: 1,
                expected: 3
            })
        ));
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut codec = PacketCodec::default();
        assert!(matches!(codec.decode_eof(&mut BytesMut::new()), Ok(None)));
    }

    #[test]
    fn encoder_enforces_configured_limit() {
        let mut codec = PacketCodec::new(4);
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Frame::new(PacketType::Data, vec![0; 5]), &mut buf)
            .expect_err("too large");
        assert!(matches!(
            err,
            CodecError::Frame(FrameError::Oversized { size: 5, max: 4 })
        ));
        assert!(buf.is_empty());
    }
}
