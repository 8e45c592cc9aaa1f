//! One-shot operator tool: load a topology snapshot, run one or more
//! synthetic packets through the coordinator, print what came out (§6,
//! grounded on `nyx-cli::main`'s subcommand dispatch). Unlike the daemon,
//! everything here runs in-process and sequentially — no `'static` leak or
//! hot-reload plumbing is needed for a tool that exits when it's done.

mod cli;
mod output;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use midonet_core::capability::{conn_track_key, ConnCache};
use midonet_core::config::SimulationConfig;
use midonet_core::packet_dto::{to_wcmatch, PacketDto};
use midonet_core::types::PortId;
use midonet_sim::{Coordinator, RecordingCallbackRunner, RecordingEmitter, SimulationRequest};
use midonet_topology::json::load_topology;
use midonet_topology::TopologyCacheClient;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let trace_wanted = matches!(cli.command, Commands::Simulate { trace: true, .. });

    tracing_subscriber::fmt()
        .with_env_filter(if trace_wanted {
            tracing_subscriber::EnvFilter::new("midonet_sim=trace")
        } else {
            tracing_subscriber::EnvFilter::from_default_env()
        })
        .init();

    let topology =
        load_topology(&cli.topology).with_context(|| format!("loading topology from {:?}", cli.topology))?;
    let config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path).with_context(|| format!("loading config from {path:?}"))?,
        None => SimulationConfig::default(),
    };

    let emitter = RecordingEmitter::new();
    let callbacks = RecordingCallbackRunner::new();
    let coordinator = Coordinator::new(&*topology, &emitter, &callbacks, std::sync::Arc::new(config));
    let conn_cache = ConnCache::new();

    match cli.command {
        Commands::Simulate { packet, trace } => {
            let dto: PacketDto = serde_json::from_str(&packet).context("parsing packet JSON")?;
            let result = simulate_one(&coordinator, &*topology, &conn_cache, &dto, trace).await?;
            output::render(&result, cli.format);

            let generated = emitter.drain().await;
            if !generated.is_empty() {
                eprintln!("({} generated packet(s) not re-injected in one-shot mode)", generated.len());
            }
        }
        Commands::Batch { input } => {
            let reader: Box<dyn tokio::io::AsyncRead + Unpin> = if input == "-" {
                Box::new(tokio::io::stdin())
            } else {
                Box::new(tokio::fs::File::open(&input).await.with_context(|| format!("opening {input}"))?)
            };
            let mut lines = BufReader::new(reader).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let dto: PacketDto = match serde_json::from_str(line) {
                    Ok(dto) => dto,
                    Err(err) => {
                        eprintln!("skipping malformed packet: {err}");
                        continue;
                    }
                };
                let result = simulate_one(&coordinator, &*topology, &conn_cache, &dto, false).await?;
                output::render(&result, cli.format);
            }
        }
    }

    Ok(())
}

async fn simulate_one(
    coordinator: &Coordinator<'_>,
    topology: &dyn TopologyCacheClient,
    conn_cache: &ConnCache,
    dto: &PacketDto,
    trace: bool,
) -> anyhow::Result<midonet_core::result::SimulationResult> {
    let input_port =
        std::num::NonZeroU32::new(dto.input_port).context("packet input_port must be non-zero")?;
    let input_port = PortId::new(input_port);
    let budget = std::time::Duration::from_millis(dto.budget_millis);
    let wcmatch = to_wcmatch(dto);

    let device_id = topology.fetch_port(input_port, budget).await.map(|p| p.device_id);
    let track_key = device_id.and_then(|did| conn_track_key(did, &wcmatch));

    let req = SimulationRequest {
        wcmatch,
        input_port: Some(input_port),
        generated_egress_port: None,
        has_cookie: dto.has_cookie,
        conn_cache: track_key.map(|_| conn_cache.clone()),
        conn_track_key: track_key,
        trace_enabled: trace,
        traced_conditions: Vec::new(),
        budget,
    };
    Ok(coordinator.simulate(req).await)
}
