//! Re-injects generated packets (ARP replies, ICMP errors) as fresh
//! `egress_port` simulations, running independently of the packet feed that
//! produced them (§5 reentrancy constraint).

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use midonet_core::capability::{conn_track_key, ConnCache};
use midonet_sim::{Coordinator, GeneratedPacket, SimulationRequest};
use midonet_topology::TopologyCacheClient;

pub async fn run_reinjection(
    mut generated: tokio::sync::mpsc::UnboundedReceiver<GeneratedPacket>,
    coordinator: Arc<ArcSwap<Coordinator<'static>>>,
    topology: &'static dyn TopologyCacheClient,
    conn_cache: ConnCache,
) {
    const REINJECT_BUDGET: Duration = Duration::from_millis(100);

    while let Some(packet) = generated.recv().await {
        let coordinator = coordinator.load_full();
        let conn_cache = conn_cache.clone();
        tokio::spawn(async move {
            let device_id = topology
                .fetch_port(packet.egress_port, REINJECT_BUDGET)
                .await
                .map(|p| p.device_id);
            let track_key = device_id.and_then(|did| conn_track_key(did, &packet.wcmatch));

            let req = SimulationRequest {
                wcmatch: packet.wcmatch,
                input_port: None,
                generated_egress_port: Some(packet.egress_port),
                has_cookie: false,
                conn_cache: track_key.map(|_| conn_cache),
                conn_track_key: track_key,
                trace_enabled: false,
                traced_conditions: Vec::new(),
                budget: REINJECT_BUDGET,
            };
            let result = coordinator.simulate(req).await;
            tracing::debug!(?result, "generated packet re-injected");
        });
    }
}
