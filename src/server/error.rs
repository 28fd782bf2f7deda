//! Errors raised by [`Server`](super::Server) operations.

use std::io;

use thiserror::Error;

use crate::handshake::HandshakeError;

/// Errors that may occur while binding or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring a listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The handshake response could not be encoded.
    #[error("handshake response error: {0}")]
    Handshake(#[from] HandshakeError),
}
