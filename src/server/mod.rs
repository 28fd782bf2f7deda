//! Tokio-based server for [`App`] instances.
//!
//! [`Server`] binds one or more listeners, raw TCP or WebSocket, and runs
//! the protocol engine behind them: the poller shards reading sockets, the
//! sender shards writing them, the heartbeat wheel and one session per
//! accepted connection.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    app::App,
    serializer::{JsonSerializer, Serializer},
};

mod binding;
pub mod error;
mod runtime;

pub use error::ServerError;
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;

/// Tokio-based server for [`App`] instances.
///
/// The server carries a typestate `St` indicating whether it is [`Unbound`]
/// (no listener yet) or [`Bound`]. New servers start `Unbound` and must call
/// [`Server::bind`], [`Server::bind_websocket`] or [`Server::bind_listener`]
/// before running. A bound server may add further listeners; every listener
/// feeds the same sessions.
pub struct Server<S: Serializer = JsonSerializer, St: ServerState = Unbound> {
    pub(crate) app: App<S>,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` transmits a single notification, so a new sender
    /// must be provided each time a server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: St,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to at least one listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listeners: Vec<Listener>,
}

/// What clients speak on a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Packets directly on the TCP stream.
    Tcp,
    /// An HTTP upgrade on `path`, then packets in WebSocket binary messages.
    WebSocket {
        /// Request path accepted for the upgrade, for example `"/ws"`.
        path: String,
    },
}

/// A listener bound by [`Server`] and the endpoint it serves.
#[derive(Clone, Debug)]
pub struct Listener {
    pub(crate) listener: Arc<TcpListener>,
    pub(crate) endpoint: Endpoint,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    use super::Listener;

    pub trait Sealed {
        fn into_listeners(self) -> Vec<Listener>;
    }

    impl Sealed for super::Unbound {
        fn into_listeners(self) -> Vec<Listener> { Vec::new() }
    }

    impl Sealed for super::Bound {
        fn into_listeners(self) -> Vec<Listener> { self.listeners }
    }
}

impl ServerState for Unbound {}
impl ServerState for Bound {}
