//! Synthetic packet ingestion: reads newline-delimited JSON describing one
//! inbound packet per line and drives the coordinator for each (§6
//! "Inputs into the core"). One `tokio::spawn`ed task per packet, matching
//! `nyx-daemon::packet_processor`'s per-event task-spawn discipline.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;

use midonet_core::capability::{conn_track_key, ConnCache};
use midonet_core::packet_dto::{to_wcmatch, PacketDto};
use midonet_core::types::PortId;
use midonet_sim::{Coordinator, SimulationRequest};
use midonet_topology::TopologyCacheClient;

/// Reads one packet description per line from `reader` and spawns a
/// coordinator simulation for each, bounding in-flight work to `concurrency`
/// tasks at a time so a fast feed cannot unboundedly queue memory.
pub async fn run_feed(
    reader: impl tokio::io::AsyncRead + Unpin,
    coordinator: Arc<ArcSwap<Coordinator<'static>>>,
    topology: &'static dyn TopologyCacheClient,
    conn_cache: ConnCache,
    concurrency: usize,
) -> anyhow::Result<()> {
    let limiter = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut lines = BufReader::new(reader).lines();
    let mut handles = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let dto: PacketDto = match serde_json::from_str(&line) {
            Ok(dto) => dto,
            Err(err) => {
                tracing::warn!(%err, %line, "skipping malformed synthetic packet");
                continue;
            }
        };
        let Some(input_port) = NonZeroU32::new(dto.input_port) else {
            tracing::warn!("skipping synthetic packet with input_port=0");
            continue;
        };
        let input_port = PortId::new(input_port);
        let budget = Duration::from_millis(dto.budget_millis);
        let wcmatch = to_wcmatch(&dto);

        let device_id = topology.fetch_port(input_port, budget).await.map(|p| p.device_id);
        let track_key = device_id.and_then(|did| conn_track_key(did, &wcmatch));
        let conn_cache = conn_cache.clone();

        let permit = Arc::clone(&limiter).acquire_owned().await?;
        let coordinator = coordinator.load_full();
        let req = SimulationRequest {
            wcmatch,
            input_port: Some(input_port),
            generated_egress_port: None,
            has_cookie: dto.has_cookie,
            conn_cache: track_key.map(|_| conn_cache),
            conn_track_key: track_key,
            trace_enabled: dto.trace,
            traced_conditions: Vec::new(),
            budget,
        };

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let result = coordinator.simulate(req).await;
            tracing::info!(?result, "simulation complete");
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
