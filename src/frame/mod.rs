//! Packet framing for the wire protocol.
//!
//! Every packet on the wire is a one-byte [`PacketType`], a 24-bit
//! big-endian payload length, then the payload itself. The functions here are
//! stateless; [`FrameReassembler`] layers per-connection buffering on top.

mod error;
mod reassembler;

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
pub use error::FrameError;
pub use reassembler::FrameReassembler;

use crate::byte_order::{MAX_U24, read_network_u24, write_network_u24};

/// Size of the packet header in bytes.
pub const HEADER_LENGTH: usize = 4;

/// Largest payload the 3-byte length field can describe.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_U24 as usize;

/// Kind of packet carried by a frame.
///
/// The numeric values are shared with every client implementation and must
/// not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client capability negotiation, answered with [`PacketType::HandshakeAck`].
    Handshake = 1,
    /// Handshake acknowledgement carrying the server's parameters.
    HandshakeAck = 2,
    /// Keep-alive in either direction.
    Heartbeat = 3,
    /// Application message envelope.
    Data = 4,
    /// Forced disconnect notice.
    Kick = 5,
}

impl PacketType {
    /// Return the on-wire type byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }
}

impl TryFrom<u8> for PacketType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Handshake),
            2 => Ok(Self::HandshakeAck),
            3 => Ok(Self::Heartbeat),
            4 => Ok(Self::Data),
            5 => Ok(Self::Kick),
            other => Err(FrameError::UnknownPacketType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::HandshakeAck => "handshake-ack",
            Self::Heartbeat => "heartbeat",
            Self::Data => "data",
            Self::Kick => "kick",
        };
        f.write_str(name)
    }
}

/// One decoded packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    packet_type: PacketType,
    payload: Bytes,
}

impl Frame {
    /// Build a frame from its parts.
    #[must_use]
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// Packet type of this frame.
    #[must_use]
    pub fn packet_type(&self) -> PacketType { self.packet_type }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame and return its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

/// Parsed packet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Packet type byte.
    pub packet_type: PacketType,
    /// Declared payload length.
    pub length: usize,
}

/// Parse a header, rejecting unknown types and lengths above `max_length`.
///
/// # Errors
///
/// Returns [`FrameError::UnknownPacketType`] or [`FrameError::Oversized`].
pub fn parse_header(
    header: [u8; HEADER_LENGTH],
    max_length: usize,
) -> Result<FrameHeader, FrameError> {
    let [kind, hi, mid, lo] = header;
    let packet_type = PacketType::try_from(kind)?;
    let length = read_network_u24([hi, mid, lo]) as usize;
    let max = max_length.min(MAX_PAYLOAD_LENGTH);
    if length > max {
        return Err(FrameError::Oversized { size: length, max });
    }
    Ok(FrameHeader {
        packet_type,
        length,
    })
}

/// Parse the header at the front of `buf` if at least four bytes are present.
pub(crate) fn peek_header(buf: &[u8], max_length: usize) -> Result<Option<FrameHeader>, FrameError> {
    let Some(header) = buf
        .get(..HEADER_LENGTH)
        .and_then(|slice| <[u8; HEADER_LENGTH]>::try_from(slice).ok())
    else {
        return Ok(None);
    };
    parse_header(header, max_length).map(Some)
}

/// Split one complete packet off the front of `buf` without copying.
///
/// Leaves `buf` untouched and reserves room for the rest of the packet when
/// only part of it is buffered.
pub(crate) fn split_frame(buf: &mut BytesMut, max_length: usize) -> Result<Option<Frame>, FrameError> {
    let Some(header) = peek_header(buf, max_length)? else {
        return Ok(None);
    };
    let total = HEADER_LENGTH + header.length;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }
    buf.advance(HEADER_LENGTH);
    let payload = buf.split_to(header.length).freeze();
    Ok(Some(Frame::new(header.packet_type, payload)))
}

/// Append the encoded form of one packet to `dst`.
///
/// # Errors
///
/// Returns [`FrameError::Oversized`] if the payload cannot be described by
/// the 3-byte length field.
pub fn encode_into(
    packet_type: PacketType,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<(), FrameError> {
    let length = u32::try_from(payload.len())
        .ok()
        .and_then(write_network_u24)
        .ok_or(FrameError::Oversized {
            size: payload.len(),
            max: MAX_PAYLOAD_LENGTH,
        })?;
    dst.reserve(HEADER_LENGTH + payload.len());
    dst.put_u8(packet_type.as_u8());
    dst.put_slice(&length);
    dst.put_slice(payload);
    Ok(())
}

/// Encode one packet.
///
/// # Examples
///
/// ```
/// use playwire::frame::{PacketType, encode};
///
/// let wire = encode(PacketType::Heartbeat, b"").expect("empty payload fits");
/// assert_eq!(&wire[..], &[3, 0, 0, 0]);
/// ```
///
/// # Errors
///
/// Returns [`FrameError::Oversized`] if the payload exceeds
/// [`MAX_PAYLOAD_LENGTH`].
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut dst = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
    encode_into(packet_type, payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode every complete packet at the front of `buf`.
///
/// Returns the frames and the number of bytes they occupied. A trailing
/// partial packet is left unconsumed; fewer than four bytes, or a declared
/// length that is not fully buffered yet, yields no frame for that tail.
///
/// # Examples
///
/// ```
/// use playwire::frame::{PacketType, decode, encode};
///
/// let mut wire = encode(PacketType::Data, b"hi").expect("fits").to_vec();
/// wire.extend_from_slice(&[4, 0, 0]);
/// let (frames, consumed) = decode(&wire, 1024).expect("valid stream");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(consumed, 6);
/// ```
///
/// # Errors
///
/// A malformed header (unknown type, length above `max_length`) is fatal:
/// the caller must close the connection rather than wait for more bytes.
pub fn decode(buf: &[u8], max_length: usize) -> Result<(Vec<Frame>, usize), FrameError> {
    let mut frames = Vec::new();
    let mut consumed = 0;
    while let Some(rest) = buf.get(consumed..) {
        let Some(header) = peek_header(rest, max_length)? else {
            break;
        };
        let end = HEADER_LENGTH + header.length;
        let Some(payload) = rest.get(HEADER_LENGTH..end) else {
            break;
        };
        frames.push(Frame::new(header.packet_type, Bytes::copy_from_slice(payload)));
        consumed += end;
    }
    Ok((frames, consumed))
}
