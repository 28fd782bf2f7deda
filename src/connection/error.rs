//! Errors terminating a connection's read side.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::frame::FrameError;

/// Violations of the WebSocket framing by a client.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// The frame header could not be parsed.
    #[error("malformed websocket frame: {0}")]
    Malformed(#[from] tungstenite::Error),
    /// Client frames must be masked.
    #[error("client websocket frame is not masked")]
    Unmasked,
    /// Reserved header bits were set without a negotiated extension.
    #[error("reserved websocket header bits set")]
    ReservedBits,
    /// The opcode is reserved.
    #[error("unsupported websocket opcode: {0}")]
    UnsupportedOpcode(String),
    /// A control frame was fragmented or too long.
    #[error("invalid websocket control frame")]
    InvalidControlFrame,
    /// The frame payload exceeds the permitted maximum.
    #[error("websocket frame exceeds max length: {size} > {max}")]
    Oversized {
        /// Declared payload length.
        size: u64,
        /// Maximum accepted payload length.
        max: usize,
    },
}

/// Terminal condition reported on a connection's inbound queue.
///
/// Every variant ends the session that owns the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Eof,
    /// Reading from the socket failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The packet stream was corrupt.
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),
    /// The WebSocket framing was corrupt.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WebSocketError),
}
