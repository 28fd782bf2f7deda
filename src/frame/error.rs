//! Errors raised while framing packets.

use thiserror::Error;

/// A framing violation. Every variant is fatal to the connection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The type byte does not name a known packet type.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// The payload length exceeds the permitted maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    Oversized {
        /// Declared or actual payload length.
        size: usize,
        /// Maximum accepted payload length.
        max: usize,
    },
}
