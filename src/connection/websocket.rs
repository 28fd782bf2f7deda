//! WebSocket framing over a raw socket.
//!
//! WebSocket connections are read by the same poller as TCP connections, so
//! frames are unwrapped by hand here instead of through a stream adapter.
//! The payloads of data frames form the packet byte stream and are fed to
//! the connection's [`FrameReassembler`].
//!
//! A WebSocket frame split across reads is rolled back: its bytes stay
//! buffered and parsing resumes once the rest arrives. A packet split across
//! several complete WebSocket frames is likewise left to the reassembler.
//! Only bytes that can never form a valid frame are errors.

use std::io::{self, Cursor};

use bytes::{Buf, BytesMut};
use tokio_tungstenite::tungstenite::protocol::frame::{
    FrameHeader,
    coding::{Control, Data, OpCode},
};

use super::WebSocketError;
use crate::frame::FrameReassembler;

const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Whether the peer is still sending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamState {
    /// More frames may follow.
    Open,
    /// The peer sent a close frame.
    Closed,
}

/// Incremental decoder for client-to-server WebSocket frames.
#[derive(Debug)]
pub(crate) struct WebSocketUnwrapper {
    input: BytesMut,
    max_payload: usize,
}

impl WebSocketUnwrapper {
    /// Create an unwrapper, seeding it with bytes read past the HTTP upgrade.
    pub(crate) fn new(leftover: BytesMut, max_payload: usize) -> Self {
        Self {
            input: leftover,
            max_payload,
        }
    }

    /// Append raw socket bytes and unwrap every complete frame into `out`.
    ///
    /// # Errors
    ///
    /// Returns a [`WebSocketError`] for frames that violate the protocol.
    pub(crate) fn feed(
        &mut self,
        bytes: &[u8],
        out: &mut FrameReassembler,
    ) -> Result<StreamState, WebSocketError> {
        self.input.extend_from_slice(bytes);
        self.drain(out)
    }

    /// Unwrap any complete frames already buffered.
    pub(crate) fn drain(&mut self, out: &mut FrameReassembler) -> Result<StreamState, WebSocketError> {
        loop {
            let mut cursor = Cursor::new(&self.input[..]);
            let Some((header, length)) = FrameHeader::parse(&mut cursor)? else {
                return Ok(StreamState::Open);
            };
            let header_len = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
            let payload_len = usize::try_from(length)
                .ok()
                .filter(|len| *len <= self.max_payload)
                .ok_or(WebSocketError::Oversized {
                    size: length,
                    max: self.max_payload,
                })?;
            validate(&header, length)?;
            let mask = header.mask.ok_or(WebSocketError::Unmasked)?;

            let needed = header_len + payload_len;
            if self.input.len() < needed {
                self.input.reserve(needed - self.input.len());
                return Ok(StreamState::Open);
            }

            self.input.advance(header_len);
            let mut payload = self.input.split_to(payload_len);
            unmask(&mut payload, mask);

            match header.opcode {
                OpCode::Data(Data::Binary | Data::Text | Data::Continue) => out.feed(&payload),
                OpCode::Control(Control::Close) => return Ok(StreamState::Closed),
                OpCode::Control(Control::Ping | Control::Pong) => {}
                opcode @ (OpCode::Data(Data::Reserved(_)) | OpCode::Control(Control::Reserved(_))) => {
                    return Err(WebSocketError::UnsupportedOpcode(format!("{opcode:?}")));
                }
            }
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize { self.input.len() }
}

fn validate(header: &FrameHeader, length: u64) -> Result<(), WebSocketError> {
    if header.rsv1 || header.rsv2 || header.rsv3 {
        return Err(WebSocketError::ReservedBits);
    }
    if matches!(header.opcode, OpCode::Control(_)) && (!header.is_final || length > MAX_CONTROL_PAYLOAD) {
        return Err(WebSocketError::InvalidControlFrame);
    }
    Ok(())
}

fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (byte, key) in payload.iter_mut().zip(mask.iter().cycle()) {
        *byte ^= key;
    }
}

/// Wrap `payload` in one unmasked binary frame.
///
/// # Errors
///
/// Returns an error only if the header cannot be formatted.
pub(crate) fn encode_binary(payload: &[u8]) -> io::Result<Vec<u8>> {
    let header = FrameHeader {
        is_final: true,
        rsv1: false,
        rsv2: false,
        rsv3: false,
        opcode: OpCode::Data(Data::Binary),
        mask: None,
    };
    let length = payload.len() as u64;
    let mut out = Vec::with_capacity(header.len(length) + payload.len());
    header.format(length, &mut out).map_err(io::Error::other)?;
    out.extend_from_slice(payload);
    Ok(out)
}
