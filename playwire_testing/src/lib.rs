//! Utilities for driving a [`playwire`] server over real sockets in tests.
//!
//! [`spawn_server`] runs an [`App`](playwire::App) on an ephemeral port and
//! [`TestClient`] speaks the packet protocol to it.
//!
//! ```no_run
//! use playwire::App;
//! use playwire_testing::{TestClient, spawn_server};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = spawn_server(App::new()).await;
//! let mut client = TestClient::connect(server.addr()).await?;
//! let ack = client.handshake().await?;
//! assert_eq!(ack.code, 200);
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod server;

pub use client::{RECV_TIMEOUT, TestClient, json_body};
pub use server::{TestServer, spawn_server, spawn_websocket_server};
