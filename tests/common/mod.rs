//! Shared utilities for integration tests.
//!
//! Provides the chat-room application used across scenarios and a helper to
//! create a TCP listener bound to an unused local port.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use playwire::{App, HandlerContext, HandlerError, Service, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Create a TCP listener bound to a free local port.
#[expect(
    clippy::expect_used,
    reason = "binding to an ephemeral localhost port must abort the test immediately"
)]
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Request and response body of `room.enter`.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enter {
    pub id: u32,
    pub name: String,
}

/// Configuration with a short heartbeat interval for fast tests.
pub fn fast_config(heartbeat: Duration) -> ServerConfig {
    ServerConfig::default()
        .with_heartbeat_interval(heartbeat)
        .with_timer_resolution(heartbeat / 10)
}

/// The `room` service: `enter` echoes its body, `fail` returns a coded
/// error, `explode` panics and `shout` pushes the body back as `room.onShout`.
pub fn room_service() -> Service {
    Service::new("room")
        .request("enter", |ctx: HandlerContext, req: Enter| async move {
            ctx.session().attachment().insert("name", req.name.clone());
            Ok::<_, HandlerError>(req)
        })
        .request("fail", |_ctx: HandlerContext, _: Value| async move {
            Err::<Value, _>(HandlerError::new("RoomFull", "room is full"))
        })
        .request("explode", |_ctx: HandlerContext, _: Value| async move {
            if true {
                panic!("handler exploded");
            }
            Ok::<Value, HandlerError>(Value::Null)
        })
        .notify("shout", |ctx: HandlerContext, body: Value| async move {
            ctx.session()
                .push("room.onShout", &body)
                .await
                .map_err(HandlerError::plain)
        })
}

/// Application serving [`room_service`] with `config`.
#[expect(
    clippy::expect_used,
    reason = "a fixed service set always registers"
)]
pub fn room_app(config: ServerConfig) -> App {
    App::new()
        .with_config(config)
        .service(room_service())
        .expect("register room service")
}
