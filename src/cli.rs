//! Command line interface for the `playwire` demo server.
//!
//! Also compiled by `build.rs` to render the man page, so it depends on
//! nothing but `clap` and the standard library.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `playwire` binary.
#[derive(Debug, Parser)]
#[command(name = "playwire", version, about = "Demo playwire game server")]
pub struct Cli {
    /// Address raw TCP clients connect to.
    #[arg(short, long, default_value = "0.0.0.0:3010")]
    pub bind: SocketAddr,
    /// Address WebSocket clients connect to; WebSocket is off when absent.
    #[arg(long)]
    pub websocket: Option<SocketAddr>,
    /// Request path accepted for WebSocket upgrades.
    #[arg(long, default_value = "/")]
    pub ws_path: String,
    /// Heartbeat interval in seconds.
    #[arg(long, default_value_t = 10)]
    pub heartbeat_secs: u64,
    /// Compress the handshake response and message routes.
    #[arg(long)]
    pub compression: bool,
    /// Data packets allowed per second per session; 0 disables limiting.
    #[arg(long, default_value_t = 0)]
    pub rate_limit: u32,
    /// Number of poller shards; defaults to the number of CPUs.
    #[arg(long)]
    pub poller_shards: Option<usize>,
    /// Number of sender shards; defaults to the number of CPUs.
    #[arg(long)]
    pub sender_shards: Option<usize>,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
