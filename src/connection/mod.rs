//! Accepted client sockets.
//!
//! A [`Connection`] wraps one non-blocking TCP socket shared between the
//! poller shard that reads it and the session that writes to it. Writes go
//! through a gate that [`Connection::close`] shuts under the same lock, so no
//! byte reaches the socket once `close` has returned.

mod error;
pub(crate) mod upgrade;
pub(crate) mod websocket;
#[cfg(test)]
mod tests;

use std::{
    fmt,
    io,
    net::{Shutdown, SocketAddr},
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

pub use error::{ConnectionError, WebSocketError};
use log::debug;
use socket2::SockRef;
use tokio::{
    io::{Interest, Ready},
    net::TcpStream,
};
pub use upgrade::UpgradeError;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a connection.
///
/// Identifiers come from a process-wide counter and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Wire transport of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Packets directly on the TCP stream.
    Tcp,
    /// Packets inside WebSocket binary messages.
    WebSocket,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::WebSocket => "websocket",
        })
    }
}

/// A client socket shared by its poller registration and its session.
pub struct Connection {
    id: ConnectionId,
    transport: Transport,
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    closed: Mutex<bool>,
}

impl Connection {
    /// Wrap an accepted socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket addresses cannot be read.
    pub fn new(stream: TcpStream, transport: Transport) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY: peer={peer_addr}, error={e}");
        }
        Ok(Self {
            id: ConnectionId::next(),
            transport,
            stream,
            local_addr,
            peer_addr,
            closed: Mutex::new(false),
        })
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Transport of this connection.
    #[must_use]
    pub fn transport(&self) -> Transport { self.transport }

    /// Local socket address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Remote socket address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer_addr }

    /// Returns `true` once [`Connection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool { *self.gate() }

    /// Wait until the socket reports read readiness or hang-up.
    pub(crate) async fn read_ready(&self) -> io::Result<Ready> { self.stream.ready(Interest::READABLE).await }

    /// Read without blocking; `WouldBlock` clears the readiness flag.
    pub(crate) fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> { self.stream.try_read(buf) }

    /// Write one encoded packet, wrapping it for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotConnected`] if the connection is closed
    /// before the packet is fully written, or any socket error.
    pub async fn write_packet(&self, packet: &[u8]) -> io::Result<()> {
        match self.transport {
            Transport::Tcp => self.write_all(packet).await,
            Transport::WebSocket => {
                let wrapped = websocket::encode_binary(packet)?;
                self.write_all(&wrapped).await
            }
        }
    }

    async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.stream.writable().await?;
            match self.try_write_gated(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = buf.get(n..).unwrap_or_default(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn try_write_gated(&self, buf: &[u8]) -> io::Result<usize> {
        let closed = self.gate();
        if *closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.stream.try_write(buf)
    }

    /// Shut the socket down in both directions.
    ///
    /// Returns `true` for the call that actually closed the connection and
    /// `false` for every later call.
    pub fn close(&self) -> bool {
        let mut closed = self.gate();
        if *closed {
            return false;
        }
        *closed = true;
        if let Err(e) = SockRef::from(&self.stream).shutdown(Shutdown::Both)
            && e.kind() != io::ErrorKind::NotConnected
        {
            debug!("socket shutdown failed: id={}, error={e}", self.id);
        }
        true
    }

    fn gate(&self) -> MutexGuard<'_, bool> { self.closed.lock().unwrap_or_else(PoisonError::into_inner) }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
