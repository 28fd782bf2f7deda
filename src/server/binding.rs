//! Construction and listener binding for [`Server`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::{net::TcpListener, sync::oneshot};

use super::{Bound, Endpoint, Listener, Server, ServerState, Unbound, sealed::Sealed};
use crate::{app::App, serializer::Serializer, server::ServerError};

impl<S: Serializer> Server<S, Unbound> {
    /// Create a server for `app`. Call [`bind`](Self::bind) before running.
    #[must_use]
    pub fn new(app: App<S>) -> Self {
        Self {
            app,
            ready_tx: None,
            state: Unbound,
        }
    }

    /// Return `None` as the server is not bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use playwire::{app::App, server::Server};
    ///
    /// assert!(Server::new(App::new()).local_addr().is_none());
    /// ```
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl<S: Serializer, St: ServerState> Server<S, St> {
    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// The application served.
    #[must_use]
    pub fn app(&self) -> &App<S> { &self.app }

    /// Bind a raw TCP listener on `addr`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use playwire::{app::App, server::Server};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    /// let server = Server::new(App::new()).bind(addr).expect("bind failed");
    /// assert!(server.local_addr().is_some());
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<Server<S, Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_listener(std_listener)
    }

    /// Bind a WebSocket listener on `addr`, accepting upgrades on `path`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind_websocket(self, addr: SocketAddr, path: impl Into<String>) -> Result<Server<S, Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing(std_listener, Endpoint::WebSocket { path: path.into() })
    }

    /// Serve raw TCP on an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_listener(self, std_listener: StdTcpListener) -> Result<Server<S, Bound>, ServerError> {
        self.bind_existing(std_listener, Endpoint::Tcp)
    }

    /// Serve `endpoint` on an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_existing(self, std_listener: StdTcpListener, endpoint: Endpoint) -> Result<Server<S, Bound>, ServerError> {
        std_listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;
        let listener = Listener {
            listener: Arc::new(listener),
            endpoint,
        };
        let Self { app, ready_tx, state } = self;
        let mut listeners = state.into_listeners();
        listeners.push(listener);
        Ok(Server {
            app,
            ready_tx,
            state: Bound { listeners },
        })
    }
}

impl<S: Serializer> Server<S, Bound> {
    /// Address of the first bound listener, or `None` if retrieving it
    /// fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .listeners
            .first()
            .and_then(|l| l.listener.local_addr().ok())
    }

    /// Addresses of every bound listener with the endpoint each serves.
    #[must_use]
    pub fn local_addrs(&self) -> Vec<(SocketAddr, Endpoint)> {
        self.state
            .listeners
            .iter()
            .filter_map(|l| {
                l.listener
                    .local_addr()
                    .ok()
                    .map(|addr| (addr, l.endpoint.clone()))
            })
            .collect()
    }
}
