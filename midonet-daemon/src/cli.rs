use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "midonet-daemon", about = "Per-packet simulation coordinator daemon")]
pub struct Args {
    /// TOML file of tunable constants (§6); hot-reloaded on change.
    #[arg(long, default_value = "midonet.toml")]
    pub config: PathBuf,

    /// JSON topology snapshot, loaded once at startup.
    #[arg(long)]
    pub topology: PathBuf,

    /// Newline-delimited JSON synthetic packet feed. `-` reads stdin.
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Address the Prometheus `/metrics` endpoint binds to.
    #[arg(long, default_value = "127.0.0.1:9090")]
    pub metrics_addr: SocketAddr,

    /// Maximum in-flight simulations from the packet feed.
    #[arg(long, default_value_t = 64)]
    pub concurrency: usize,
}
