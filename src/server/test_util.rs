//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use bytes::Bytes;
use rstest::fixture;

use super::{Bound, Server};
use crate::{app::App, handler::Service, serializer::JsonSerializer};

#[fixture]
pub fn app() -> App {
    App::new()
        .service(Service::new("echo").raw("say", |_ctx, body: Bytes| async move { Ok(body) }))
        .expect("register echo service")
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

pub fn bind_server(app: App, listener: StdTcpListener) -> Server<JsonSerializer, Bound> {
    Server::new(app)
        .bind_listener(listener)
        .expect("Failed to bind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_app_registers_echo() {
        assert_eq!(app().routes(), vec!["echo.say".to_owned()]);
    }

    #[tokio::test]
    async fn bound_server_reports_listener_address() {
        let listener = free_listener();
        let addr = listener.local_addr().expect("failed to get address");
        let server = bind_server(app(), listener);
        assert_eq!(server.local_addr(), Some(addr));
    }
}
