//! Accept loop: turns listener sockets into registered connections.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use bytes::BytesMut;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    connection::{Connection, Transport, upgrade},
    poller::{Inbound, Poller},
    server::Endpoint,
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> { TcpListener::accept(self).await }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// A registered connection waiting for its session.
#[derive(Debug)]
pub(in crate::server) struct NewConnection {
    pub connection: Arc<Connection>,
    pub inbound: mpsc::Receiver<Inbound>,
}

#[derive(Clone, Debug)]
pub(in crate::server) struct AcceptOptions {
    pub endpoint: Endpoint,
    pub poller: Poller,
    pub connections: mpsc::Sender<NewConnection>,
    pub upgrade_timeout: Duration,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections from `listener` until `shutdown` is cancelled.
///
/// Each accepted socket is handed to a tracked task that performs the
/// WebSocket upgrade when the endpoint requires one, registers the connection
/// with the poller and publishes it on the `connections` queue. Failures to
/// accept trigger an exponential back-off governed by `backoff`.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, mut options: AcceptOptions)
where
    L: AcceptListener + 'static,
{
    options.backoff = options.backoff.normalized();
    debug_assert!(
        options.backoff.initial_delay <= options.backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = options.backoff.initial_delay;
    while let Some(next_delay) = accept_iteration(listener.as_ref(), &options, delay).await {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L: AcceptListener>(
    listener: &L,
    options: &AcceptOptions,
    delay: Duration,
) -> Option<Duration> {
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, _)) => {
                options.tracker.spawn(open_connection(stream, options.clone()));
                options.backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                options.backoff.next_delay(delay)
            }
        }),
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn open_connection(mut stream: TcpStream, options: AcceptOptions) {
    let peer = stream.peer_addr().ok();
    let (transport, leftover) = match &options.endpoint {
        Endpoint::Tcp => (Transport::Tcp, BytesMut::new()),
        Endpoint::WebSocket { path } => {
            let upgraded = select! {
                biased;

                () = options.shutdown.cancelled() => return,
                res = upgrade::accept(&mut stream, path, options.upgrade_timeout) => res,
            };
            match upgraded {
                Ok(leftover) => (Transport::WebSocket, leftover),
                Err(e) => {
                    debug!("websocket upgrade failed: peer={peer:?}, error={e}");
                    return;
                }
            }
        }
    };
    let connection = match Connection::new(stream, transport) {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            warn!("failed to wrap accepted socket: peer={peer:?}, error={e}");
            return;
        }
    };
    let inbound = match options
        .poller
        .register(Arc::clone(&connection), leftover)
        .await
    {
        Ok(inbound) => inbound,
        Err(e) => {
            debug!("dropping connection: id={}, error={e}", connection.id());
            connection.close();
            return;
        }
    };
    if let Err(mpsc::error::SendError(new)) = options
        .connections
        .send(NewConnection { connection, inbound })
        .await
    {
        debug!("session loop stopped: id={}", new.connection.id());
        new.connection.close();
    }
}
