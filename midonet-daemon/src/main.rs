//! Entry point: wires config hot-reload, the topology snapshot, the
//! generated-packet re-injection loop, the Prometheus endpoint and the
//! synthetic packet feed together (§5-6, grounded on
//! `nyx-daemon::main`'s top-level wiring style).

mod cli;
mod metrics_server;
mod packet_feed;
mod reinject;

use std::sync::Arc;

use arc_swap::ArcSwap;
use clap::Parser;

use midonet_core::capability::ConnCache;
use midonet_core::config::SimulationConfig;
use midonet_sim::{ChannelEmitter, Coordinator, TracingCallbackRunner};
use midonet_topology::TopologyCacheClient;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = cli::Args::parse();

    let topology = midonet_topology::json::load_topology(&args.topology)?;
    let topology: &'static dyn TopologyCacheClient = {
        let leaked: &'static Arc<midonet_topology::InMemoryTopologyCache> = Box::leak(Box::new(topology));
        &**leaked
    };

    let (emitter, generated_rx) = ChannelEmitter::new();
    let emitter: &'static dyn midonet_sim::GeneratedPacketEmitter = Box::leak(Box::new(emitter));
    let callbacks: &'static dyn midonet_sim::CallbackRunner = Box::leak(Box::new(TracingCallbackRunner));

    let (initial_config, mut config_rx) = SimulationConfig::watch_file(&args.config)?;
    tracing::info!(config = ?args.config, "loaded simulation config");

    let coordinator = Arc::new(ArcSwap::from_pointee(Coordinator::new(
        topology,
        emitter,
        callbacks,
        initial_config,
    )));

    {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            while config_rx.changed().await.is_ok() {
                let new_config = config_rx.borrow().clone();
                tracing::info!("simulation config reloaded");
                coordinator.store(Arc::new(Coordinator::new(topology, emitter, callbacks, new_config)));
            }
        });
    }

    let conn_cache = ConnCache::new();

    metrics_server::spawn(args.metrics_addr);
    tokio::spawn(reinject::run_reinjection(
        generated_rx,
        Arc::clone(&coordinator),
        topology,
        conn_cache.clone(),
    ));

    if args.input == "-" {
        packet_feed::run_feed(tokio::io::stdin(), coordinator, topology, conn_cache, args.concurrency).await?;
    } else {
        let file = tokio::fs::File::open(&args.input).await?;
        packet_feed::run_feed(file, coordinator, topology, conn_cache, args.concurrency).await?;
    }

    Ok(())
}
