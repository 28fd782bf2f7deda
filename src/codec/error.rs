//! Error types for [`PacketCodec`](super::PacketCodec).

use std::io;

use thiserror::Error;

use crate::frame::FrameError;

/// End-of-stream conditions that left a packet incomplete.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed before a full header arrived.
    #[error("connection closed mid-header: received {bytes_received} of {header_size} bytes")]
    MidHeader {
        /// Header bytes received.
        bytes_received: usize,
        /// Header size.
        header_size: usize,
    },

    /// The peer closed after the header but before the whole payload.
    #[error("connection closed mid-frame: received {bytes_received} of {expected} bytes")]
    MidFrame {
        /// Payload bytes received.
        bytes_received: usize,
        /// Payload length declared by the header.
        expected: usize,
    },
}

/// Errors produced by [`PacketCodec`](super::PacketCodec).
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The byte stream violated the packet framing.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The stream ended inside a packet.
    #[error("unexpected eof: {0}")]
    Eof(EofError),
}
