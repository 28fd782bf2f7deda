#![doc(html_root_url = "https://docs.rs/playwire/latest")]
//! Public API for the `playwire` library.
//!
//! `playwire` is a protocol engine for persistent-connection game servers.
//! Clients connect over raw TCP or WebSocket, complete a JSON handshake,
//! keep the connection alive with heartbeats and exchange routed
//! request/notify/response/push messages with handlers registered on an
//! [`App`].
//!
//! ```no_run
//! use playwire::{app::App, error::HandlerError, handler::Service, server::Server};
//! use serde_json::Value;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::new().service(
//!     Service::new("room").request("enter", |_ctx, body: Value| async move {
//!         Ok::<_, HandlerError>(body)
//!     }),
//! )?;
//! Server::new(app)
//!     .bind(([0, 0, 0, 0], 3010).into())?
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod attachment;
pub mod buffer_pool;
pub mod byte_order;
pub mod callbacks;
pub mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod poller;
pub mod route;
pub mod sender;
pub mod serializer;
pub mod server;
pub mod session;
pub(crate) mod timer;

pub use app::App;
pub use config::ServerConfig;
pub use error::HandlerError;
pub use frame::{Frame, PacketType};
pub use handler::{Handler, HandlerContext, Service};
pub use message::{Message, MessageType};
pub use metrics::{Direction, ERRORS_TOTAL, FRAMES_PROCESSED, SESSIONS_ACTIVE};
pub use route::{Route, RouteDictionary};
pub use serializer::{JsonSerializer, Serializer};
pub use server::{Server, ServerError};
pub use session::{CloseReason, Phase, PushError, Session, SessionId};
