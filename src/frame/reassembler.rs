//! Per-connection packet reassembly.
//!
//! Reads arrive in arbitrary sizes. [`FrameReassembler`] accumulates them in a
//! single [`BytesMut`] and splits complete packets off the front without
//! copying the payload. Consumed space is reclaimed when the buffer next
//! grows, so a long run of partial reads does not grow memory unboundedly.

use bytes::BytesMut;

use super::{Frame, FrameError, split_frame};
use crate::buffer_pool::BufferPool;

/// Accumulates raw bytes and yields complete [`Frame`]s.
///
/// # Examples
///
/// ```
/// use playwire::frame::{FrameReassembler, PacketType, encode};
///
/// let wire = encode(PacketType::Data, b"hello").expect("fits");
/// let mut reassembler = FrameReassembler::new(1024);
/// reassembler.feed(&wire[..3]);
/// assert!(reassembler.next_frame().expect("valid").is_none());
/// reassembler.feed(&wire[3..]);
/// let frame = reassembler.next_frame().expect("valid").expect("complete");
/// assert_eq!(&frame.payload()[..], b"hello");
/// ```
#[derive(Debug)]
pub struct FrameReassembler {
    buf: BytesMut,
    max_length: usize,
}

impl FrameReassembler {
    /// Create a reassembler with a fresh buffer.
    #[must_use]
    pub fn new(max_length: usize) -> Self { Self::with_buffer(BytesMut::new(), max_length) }

    /// Create a reassembler around a buffer checked out of `pool`.
    #[must_use]
    pub fn from_pool(pool: &BufferPool, max_length: usize) -> Self {
        Self::with_buffer(pool.checkout(), max_length)
    }

    /// Create a reassembler using `buf` as its input buffer.
    ///
    /// Any bytes already in `buf` are treated as received input.
    #[must_use]
    pub fn with_buffer(buf: BytesMut, max_length: usize) -> Self { Self { buf, max_length } }

    /// Append newly read bytes.
    pub fn feed(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

    /// Split the next complete frame off the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not yet hold a whole
    /// packet; the partial tail is kept in place for the next call.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the header at the front of the buffer is
    /// malformed. The stream cannot be resynchronised after that.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        split_frame(&mut self.buf, self.max_length)
    }

    /// Number of bytes buffered but not yet returned as frames.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buf.len() }

    /// Return the input buffer to `pool`.
    pub fn release(self, pool: &BufferPool) { pool.release(self.buf); }
}
