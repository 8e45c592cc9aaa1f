use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use midonet_core::capability::{ArpCache, MacLearningTable, RoutingTable};
use midonet_core::config::SimulationConfig;
use midonet_core::device::{AdminState, Bridge, Device, Port, PortKind, Router, VlanBridge};
use midonet_core::match_key::WildcardMatch;
use midonet_core::types::{DatapathPortNo, DeviceId, PortId, PortSetId};
use midonet_sim::{Coordinator, RecordingCallbackRunner, RecordingEmitter, SimulationRequest};
use midonet_topology::InMemoryTopologyCache;

pub fn port_id(v: u32) -> PortId {
    PortId::new(NonZeroU32::new(v).unwrap())
}

pub fn device_id(v: u32) -> DeviceId {
    DeviceId::new(NonZeroU32::new(v).unwrap())
}

pub fn port_set_id(v: u32) -> PortSetId {
    PortSetId::new(NonZeroU32::new(v).unwrap())
}

pub fn exterior_port(id: u32, device: DeviceId, dp_no: u32) -> Port {
    Port {
        id: port_id(id),
        device_id: device,
        admin_state: AdminState::Up,
        kind: PortKind::Exterior { port_groups: Default::default() },
        inbound_filter: None,
        outbound_filter: None,
        datapath_port_no: Some(DatapathPortNo(dp_no)),
    }
}

pub fn interior_port(id: u32, device: DeviceId, peer: u32) -> Port {
    Port {
        id: port_id(id),
        device_id: device,
        admin_state: AdminState::Up,
        kind: PortKind::Interior { peer_id: port_id(peer) },
        inbound_filter: None,
        outbound_filter: None,
        datapath_port_no: None,
    }
}

/// A two-port bridge (ports 1, 2) with nothing yet learned into its MAC table.
pub fn bridge_topology() -> (Arc<InMemoryTopologyCache>, DeviceId) {
    let topo = InMemoryTopologyCache::new();
    let did = device_id(1);
    topo.put_device(Device::Bridge(Bridge {
        id: did,
        admin_state: AdminState::Up,
        inbound_filter: None,
        outbound_filter: None,
        flood_port_set_id: port_set_id(1),
        mac_table: MacLearningTable::new(),
    }));
    topo.put_port(exterior_port(1, did, 1));
    topo.put_port(exterior_port(2, did, 2));
    (topo, did)
}

/// A VLAN-aware bridge: local ports 1, 2 plus a trunk uplink on port 9.
pub fn vlan_bridge_topology() -> (Arc<InMemoryTopologyCache>, DeviceId) {
    let topo = InMemoryTopologyCache::new();
    let did = device_id(1);
    topo.put_device(Device::VlanBridge(VlanBridge {
        id: did,
        admin_state: AdminState::Up,
        inbound_filter: None,
        outbound_filter: None,
        flood_port_set_id: port_set_id(1),
        mac_table: MacLearningTable::new(),
        trunk_port: port_id(9),
    }));
    topo.put_port(exterior_port(1, did, 1));
    topo.put_port(exterior_port(2, did, 2));
    topo.put_port(exterior_port(9, did, 9));
    (topo, did)
}

/// A single router with one exterior port (1, address 10.0.0.1/24) and one
/// egress-side exterior port (2) reachable via the `10.0.1.0/24` route.
/// Returns the `ArpCache` handle too, so a test can prime a resolved
/// next-hop before simulating (ARP-hit scenarios).
pub fn router_topology() -> (Arc<InMemoryTopologyCache>, DeviceId, ArpCache) {
    let topo = InMemoryTopologyCache::new();
    let did = device_id(1);
    let mut port_addresses = BTreeMap::new();
    port_addresses.insert(port_id(1), "10.0.0.1".parse().unwrap());
    port_addresses.insert(port_id(2), "10.0.1.1".parse().unwrap());
    let mut port_macs = BTreeMap::new();
    port_macs.insert(port_id(1), [0xaa; 6]);
    port_macs.insert(port_id(2), [0xbb; 6]);
    let arp_cache = ArpCache::new();
    topo.put_device(Device::Router(Router {
        id: did,
        admin_state: AdminState::Up,
        inbound_filter: None,
        outbound_filter: None,
        routing_table: RoutingTable::new(vec![midonet_core::capability::RouteEntry {
            prefix: "10.0.1.0".parse().unwrap(),
            prefix_len: 24,
            next_hop: None,
            out_port: port_id(2),
        }]),
        arp_cache: arp_cache.clone(),
        port_addresses,
        port_macs,
    }));
    topo.put_port(exterior_port(1, did, 1));
    topo.put_port(exterior_port(2, did, 2));
    (topo, did, arp_cache)
}

pub struct Harness {
    pub topo: Arc<InMemoryTopologyCache>,
    pub emitter: RecordingEmitter,
    pub callbacks: RecordingCallbackRunner,
    pub config: Arc<SimulationConfig>,
}

impl Harness {
    pub fn new(topo: Arc<InMemoryTopologyCache>) -> Self {
        Self {
            topo,
            emitter: RecordingEmitter::new(),
            callbacks: RecordingCallbackRunner::new(),
            config: Arc::new(SimulationConfig::default()),
        }
    }

    pub fn with_config(topo: Arc<InMemoryTopologyCache>, config: SimulationConfig) -> Self {
        Self { topo, emitter: RecordingEmitter::new(), callbacks: RecordingCallbackRunner::new(), config: Arc::new(config) }
    }

    pub fn coordinator(&self) -> Coordinator<'_> {
        Coordinator::new(&*self.topo, &self.emitter, &self.callbacks, self.config.clone())
    }
}

pub fn ethernet_frame(eth_src: [u8; 6], eth_dst: [u8; 6]) -> WildcardMatch {
    let mut m = WildcardMatch::new();
    m.eth_src = Some(eth_src);
    m.eth_dst = Some(eth_dst);
    m
}

pub fn request(wcmatch: WildcardMatch, input_port: PortId) -> SimulationRequest {
    SimulationRequest {
        wcmatch,
        input_port: Some(input_port),
        generated_egress_port: None,
        has_cookie: true,
        conn_cache: None,
        conn_track_key: None,
        trace_enabled: false,
        traced_conditions: Vec::new(),
        budget: Duration::from_millis(100),
    }
}
