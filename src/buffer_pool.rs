//! Shared pool of reusable read buffers.
//!
//! Connections check a [`BytesMut`] out when they are registered with the
//! poller and hand it back when they are torn down. The pool bounds both the
//! number of idle buffers it keeps and the capacity of any buffer it accepts,
//! so a single connection that once received a huge frame cannot pin that
//! allocation forever.

use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;

/// Default number of idle buffers retained by a pool.
pub const DEFAULT_MAX_POOLED: usize = 1024;
/// Default capacity above which returned buffers are dropped.
pub const DEFAULT_MAX_BUFFER_CAPACITY: usize = 32 * 1024;

/// Lock-protected pool of [`BytesMut`] buffers.
///
/// # Examples
///
/// ```
/// use playwire::buffer_pool::BufferPool;
///
/// let pool = BufferPool::new(4, 1024, 16 * 1024);
/// let mut buf = pool.checkout();
/// buf.extend_from_slice(b"abc");
/// pool.release(buf);
/// assert_eq!(pool.idle(), 1);
/// assert!(pool.checkout().is_empty());
/// ```
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    initial_capacity: usize,
    max_capacity: usize,
}

impl BufferPool {
    /// Create a pool holding at most `max_pooled` idle buffers.
    ///
    /// Fresh buffers start with `initial_capacity` bytes; returned buffers
    /// larger than `max_capacity` are discarded.
    #[must_use]
    pub fn new(max_pooled: usize, initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_pooled,
            initial_capacity: initial_capacity.min(max_capacity),
            max_capacity,
        }
    }

    /// Take an empty buffer from the pool, allocating when none is idle.
    #[must_use]
    pub fn checkout(&self) -> BytesMut {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        reused.unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity))
    }

    /// Return `buf` to the pool after clearing it.
    ///
    /// Buffers that grew past the configured maximum capacity, or that arrive
    /// while the pool is full, are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_pooled {
            idle.push(buf);
        }
    }

    /// Number of idle buffers currently held.
    #[must_use]
    pub fn idle(&self) -> usize { self.idle.lock().unwrap_or_else(PoisonError::into_inner).len() }

    /// Capacity above which returned buffers are dropped.
    #[must_use]
    pub fn max_capacity(&self) -> usize { self.max_capacity }
}

impl Default for BufferPool {
    fn default() -> Self { Self::new(DEFAULT_MAX_POOLED, 4096, DEFAULT_MAX_BUFFER_CAPACITY) }
}

#[cfg(test)]
mod tests {
    use super::BufferPool;

    #[test]
    fn released_buffers_are_cleared_and_reused() {
        let pool = BufferPool::new(2, 64, 1024);
        let mut buf = pool.checkout();
        buf.extend_from_slice(&[1, 2, 3]);
        let ptr = buf.as_ptr();
        pool.release(buf);

        let reused = pool.checkout();
        assert!(reused.is_empty());
        assert_eq!(reused.as_ptr(), ptr);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn oversized_buffers_are_not_pooled() {
        let pool = BufferPool::new(2, 64, 128);
        let mut buf = pool.checkout();
        buf.reserve(4096);
        pool.release(buf);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_never_exceeds_its_bound() {
        let pool = BufferPool::new(2, 16, 1024);
        for _ in 0..5 {
            pool.release(pool.checkout());
        }
        let held: Vec<_> = (0..5).map(|_| pool.checkout()).collect();
        for buf in held {
            pool.release(buf);
        }
        assert_eq!(pool.idle(), 2);
    }
}
