//! Demo `playwire` server.
//!
//! Serves a small chat room: `room.enter` joins with a name and
//! `room.chat` broadcasts a line to every session as a `room.onChat` push.

mod cli;

use std::{error::Error, net::SocketAddr, time::Duration};

use clap::Parser;
use log::{info, warn};
use playwire::{App, HandlerContext, HandlerError, Service, ServerConfig, server::Server};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct Enter {
    name: String,
}

#[derive(Debug, Serialize)]
struct Welcome {
    code: u16,
    session: u64,
    members: usize,
}

#[derive(Debug, Deserialize)]
struct Chat {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatLine {
    from: String,
    text: String,
}

fn room() -> Service {
    Service::new("room")
        .request("enter", |ctx: HandlerContext, req: Enter| async move {
            let session = ctx.session();
            session.attachment().insert("name", req.name);
            Ok::<_, HandlerError>(Welcome {
                code: 200,
                session: session.id().as_u64(),
                members: session.active_sessions().len(),
            })
        })
        .notify("chat", |ctx: HandlerContext, chat: Chat| async move {
            let session = ctx.session();
            let from = session
                .attachment()
                .get::<String>("name")
                .map(|name| String::clone(&name))
                .unwrap_or_default();
            let line = ChatLine {
                from,
                text: chat.text,
            };
            for id in session.active_sessions() {
                let Some(peer) = session.find(id) else { continue };
                if let Err(e) = peer.push("room.onChat", &line).await {
                    warn!("chat push failed: id={id}, error={e}");
                }
            }
            Ok(())
        })
}

fn config(cli: &cli::Cli) -> ServerConfig {
    let mut config = ServerConfig::default()
        .with_heartbeat_interval(Duration::from_secs(cli.heartbeat_secs))
        .with_data_compression(cli.compression)
        .with_rate_limit(cli.rate_limit);
    if let Some(shards) = cli.poller_shards {
        config = config.with_poller_shards(shards);
    }
    if let Some(shards) = cli.sender_shards {
        config = config.with_sender_shards(shards);
    }
    config
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("metrics exporter listening: addr={addr}");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    if addr.is_some() {
        warn!("--metrics-addr ignored: built without the metrics feature");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics(cli.metrics_addr)?;

    let app = App::new()
        .with_config(config(&cli))
        .service(room())?
        .on_session_connected(|session| {
            info!("client connected: id={}, peer={}", session.id(), session.peer_addr());
            session.on_closed(|s| info!("client left: id={}", s.id()));
        });

    let server = Server::new(app).bind(cli.bind)?;
    let server = match cli.websocket {
        Some(addr) => server.bind_websocket(addr, cli.ws_path.clone())?,
        None => server,
    };
    server.run().await?;
    Ok(())
}
