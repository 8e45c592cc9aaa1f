use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "midonet-cli", about = "Operator tool for the per-packet simulation coordinator")]
pub struct Cli {
    /// JSON topology snapshot to load before simulating.
    #[arg(long, global = true)]
    pub topology: PathBuf,

    /// TOML file of tunable constants; built-in defaults if omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Simulate a single packet described inline as a JSON object.
    Simulate {
        /// JSON-encoded packet, matching the synthetic packet feed's wire shape.
        packet: String,
        /// Record this simulation's rule-chain trace.
        #[arg(long)]
        trace: bool,
    },
    /// Simulate every packet in a newline-delimited JSON file (`-` for stdin).
    Batch {
        #[arg(long, default_value = "-")]
        input: String,
    },
}
