//! Spawn helpers running a server on an ephemeral local port.

use std::net::{Ipv4Addr, SocketAddr};

use playwire::{
    App,
    Serializer,
    server::{Bound, Server},
};
use tokio::{sync::oneshot, task::JoinHandle};

/// A server running in a background task.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Address clients connect to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Stop the server and wait until every session has closed.
    ///
    /// # Panics
    ///
    /// Panics if the server task panicked.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.handle.await.expect("server task panicked");
    }
}

/// Run `app` on `127.0.0.1` over raw TCP.
///
/// # Panics
///
/// Panics if binding fails or the server stops before becoming ready.
pub async fn spawn_server<S: Serializer>(app: App<S>) -> TestServer {
    let server = Server::new(app)
        .bind(localhost())
        .expect("bind test server");
    start(server).await
}

/// Run `app` on `127.0.0.1` over WebSocket, accepting upgrades on `path`.
///
/// # Panics
///
/// Panics if binding fails or the server stops before becoming ready.
pub async fn spawn_websocket_server<S: Serializer>(app: App<S>, path: &str) -> TestServer {
    let server = Server::new(app)
        .bind_websocket(localhost(), path)
        .expect("bind test server");
    start(server).await
}

fn localhost() -> SocketAddr { SocketAddr::from((Ipv4Addr::LOCALHOST, 0)) }

async fn start<S: Serializer>(server: Server<S, Bound>) -> TestServer {
    let addr = server.local_addr().expect("bound address");
    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .ready_signal(ready_tx)
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server run failed");
    });
    ready_rx.await.expect("server stopped before ready");
    TestServer {
        addr,
        shutdown,
        handle,
    }
}
