//! Readiness-driven connection multiplexer.
//!
//! The [`Poller`] owns a fixed number of shard tasks. Each shard keeps its
//! own registry of connections and its own set of pending readiness waits;
//! nothing is shared between shards. A connection is assigned to shard
//! `id % shards` when it is registered and stays there until EOF, a read
//! error or a decode error removes it.
//!
//! Decoded packets are delivered in arrival order on the bounded inbound
//! queue returned by [`Poller::register`]. The last item delivered for a
//! connection that ends is always an `Err`.

mod shard;

use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    buffer_pool::BufferPool,
    config::ServerConfig,
    connection::{Connection, ConnectionError},
    frame::Frame,
};

/// Item delivered on a connection's inbound queue.
pub type Inbound = Result<Frame, ConnectionError>;

/// Returned when registering with a poller that has shut down.
#[derive(Debug, Error)]
#[error("poller is shut down")]
pub struct PollerClosed;

struct Registration {
    connection: Arc<Connection>,
    leftover: BytesMut,
    inbound: mpsc::Sender<Inbound>,
}

/// Handle used to register connections with the poller shards.
#[derive(Clone, Debug)]
pub struct Poller {
    shards: Arc<[mpsc::Sender<Registration>]>,
    inbound_queue_size: usize,
}

impl Poller {
    /// Spawn the shard tasks on `tracker`.
    ///
    /// Shards stop when `shutdown` is cancelled, dropping every registration.
    pub fn spawn(
        config: &ServerConfig,
        pool: Arc<BufferPool>,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Self {
        let shards = (0..config.poller_shards.max(1))
            .map(|index| {
                let (tx, rx) = mpsc::channel(config.connection_queue_size.max(1));
                let shard = shard::Shard::new(index, rx, Arc::clone(&pool), config);
                tracker.spawn(shard.run(shutdown.clone()));
                tx
            })
            .collect();
        Self {
            shards,
            inbound_queue_size: config.inbound_queue_size.max(1),
        }
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize { self.shards.len() }

    /// Start reading `connection` and return its inbound queue.
    ///
    /// `leftover` holds bytes already read from the socket, such as data a
    /// WebSocket client sent directly after its upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`PollerClosed`] if the owning shard has stopped.
    pub async fn register(
        &self,
        connection: Arc<Connection>,
        leftover: BytesMut,
    ) -> Result<mpsc::Receiver<Inbound>, PollerClosed> {
        let shard = shard_for(connection.id().as_u64(), self.shards.len());
        let tx = self.shards.get(shard).ok_or(PollerClosed)?;
        let (inbound, rx) = mpsc::channel(self.inbound_queue_size);
        tx.send(Registration {
            connection,
            leftover,
            inbound,
        })
        .await
        .map_err(|_| PollerClosed)?;
        Ok(rx)
    }
}

fn shard_for(id: u64, shards: usize) -> usize {
    let shards = u64::try_from(shards.max(1)).unwrap_or(u64::MAX);
    usize::try_from(id % shards).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bytes::BytesMut;
    use rstest::rstest;
    use tokio::{
        io::AsyncWriteExt,
        net::{TcpListener, TcpStream},
        time::timeout,
    };
    use tokio_util::{sync::CancellationToken, task::TaskTracker};

    use super::{Poller, shard_for};
    use crate::{
        buffer_pool::BufferPool,
        config::ServerConfig,
        connection::{Connection, ConnectionError, Transport},
        frame::{self, PacketType},
    };

    const WAIT: Duration = Duration::from_secs(5);

    async fn pair() -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr"))
            .await
            .expect("connect");
        let (server, _) = listener.accept().await.expect("accept");
        (
            Arc::new(Connection::new(server, Transport::Tcp).expect("connection")),
            client,
        )
    }

    fn poller(config: &ServerConfig, tracker: &TaskTracker, token: &CancellationToken) -> Poller {
        Poller::spawn(config, Arc::new(BufferPool::default()), tracker, token)
    }

    #[rstest]
    #[case(7, 1, 0)]
    #[case(7, 4, 3)]
    #[case(8, 4, 0)]
    #[case(9, 0, 0)]
    fn connections_map_to_shards(#[case] id: u64, #[case] shards: usize, #[case] expected: usize) {
        assert_eq!(shard_for(id, shards), expected);
    }

    #[tokio::test]
    async fn delivers_frames_then_eof() {
        let config = ServerConfig::default().with_poller_shards(2);
        let (tracker, token) = (TaskTracker::new(), CancellationToken::new());
        let poller = poller(&config, &tracker, &token);
        let (connection, mut client) = pair().await;
        let mut inbound = poller
            .register(connection, BytesMut::new())
            .await
            .expect("register");

        let mut wire = frame::encode(PacketType::Heartbeat, &[]).expect("encode").to_vec();
        wire.extend_from_slice(&frame::encode(PacketType::Data, b"abc").expect("encode"));
        client.write_all(&wire).await.expect("write");

        let first = timeout(WAIT, inbound.recv()).await.expect("timely").expect("item");
        assert_eq!(first.expect("frame").packet_type(), PacketType::Heartbeat);
        let second = timeout(WAIT, inbound.recv()).await.expect("timely").expect("item");
        assert_eq!(second.expect("frame").payload().as_ref(), b"abc");

        drop(client);
        let last = timeout(WAIT, inbound.recv()).await.expect("timely").expect("item");
        assert!(matches!(last, Err(ConnectionError::Eof)));
        token.cancel();
    }

    #[tokio::test]
    async fn packet_split_across_writes_is_reassembled() {
        let config = ServerConfig::default().with_poller_shards(1);
        let (tracker, token) = (TaskTracker::new(), CancellationToken::new());
        let poller = poller(&config, &tracker, &token);
        let (connection, mut client) = pair().await;
        let mut inbound = poller
            .register(connection, BytesMut::new())
            .await
            .expect("register");

        let wire = frame::encode(PacketType::Data, b"fragmented").expect("encode");
        for chunk in wire.chunks(3) {
            client.write_all(chunk).await.expect("write");
            client.flush().await.expect("flush");
            tokio::task::yield_now().await;
        }
        let frame = timeout(WAIT, inbound.recv())
            .await
            .expect("timely")
            .expect("item")
            .expect("frame");
        assert_eq!(frame.payload().as_ref(), b"fragmented");
        token.cancel();
    }

    #[tokio::test]
    async fn corrupt_header_is_terminal() {
        let config = ServerConfig::default().with_poller_shards(1);
        let (tracker, token) = (TaskTracker::new(), CancellationToken::new());
        let poller = poller(&config, &tracker, &token);
        let (connection, mut client) = pair().await;
        let mut inbound = poller
            .register(connection, BytesMut::new())
            .await
            .expect("register");

        client.write_all(&[0xee, 0, 0, 1, 0]).await.expect("write");
        let item = timeout(WAIT, inbound.recv()).await.expect("timely").expect("item");
        assert!(matches!(item, Err(ConnectionError::Frame(_))));
        token.cancel();
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure_without_loss() {
        let config = ServerConfig::default()
            .with_poller_shards(1)
            .with_inbound_queue_size(1);
        let (tracker, token) = (TaskTracker::new(), CancellationToken::new());
        let poller = poller(&config, &tracker, &token);
        let (connection, mut client) = pair().await;
        let mut inbound = poller
            .register(connection, BytesMut::new())
            .await
            .expect("register");

        let mut wire = Vec::new();
        for i in 0..32_u8 {
            wire.extend_from_slice(&frame::encode(PacketType::Data, &[i]).expect("encode"));
        }
        client.write_all(&wire).await.expect("write");

        for i in 0..32_u8 {
            let frame = timeout(WAIT, inbound.recv())
                .await
                .expect("timely")
                .expect("item")
                .expect("frame");
            assert_eq!(frame.payload().as_ref(), &[i]);
        }
        token.cancel();
    }
}
