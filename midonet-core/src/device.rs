//! Immutable device snapshots handed out by the topology cache (§3
//! "Device Snapshot"). Variants are a tagged enum rather than a trait-object
//! hierarchy, exhaustively matched by callers.

use std::collections::BTreeSet;

use crate::capability::{ArpCache, MacLearningTable, RoutingTable};
use crate::types::{ChainId, DeviceId, PortGroupId, PortId, PortSetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    Up,
    Down,
}

/// A bridge (L2 broadcast domain).
#[derive(Debug, Clone)]
pub struct Bridge {
    pub id: DeviceId,
    pub admin_state: AdminState,
    pub inbound_filter: Option<ChainId>,
    pub outbound_filter: Option<ChainId>,
    pub flood_port_set_id: PortSetId,
    pub mac_table: MacLearningTable,
}

/// A router (L3 forwarding device).
#[derive(Debug, Clone)]
pub struct Router {
    pub id: DeviceId,
    pub admin_state: AdminState,
    pub inbound_filter: Option<ChainId>,
    pub outbound_filter: Option<ChainId>,
    pub routing_table: RoutingTable,
    pub arp_cache: ArpCache,
    /// Ports owned by this router, used to recognise ARP requests that
    /// target one of the router's own addresses (§4.4 Router step 2).
    pub port_addresses: std::collections::BTreeMap<PortId, std::net::IpAddr>,
    pub port_macs: std::collections::BTreeMap<PortId, [u8; 6]>,
}

/// A VLAN-aware bridge with a trunk port fanning multiple VLANs onto one
/// physical uplink (§4.4 Bridge step 4, Fork semantics).
#[derive(Debug, Clone)]
pub struct VlanBridge {
    pub id: DeviceId,
    pub admin_state: AdminState,
    pub inbound_filter: Option<ChainId>,
    pub outbound_filter: Option<ChainId>,
    pub flood_port_set_id: PortSetId,
    pub mac_table: MacLearningTable,
    pub trunk_port: PortId,
}

/// Tagged variant in place of inheritance: dispatch on this, never via a
/// trait object (design notes).
#[derive(Debug, Clone)]
pub enum Device {
    Bridge(Bridge),
    Router(Router),
    VlanBridge(VlanBridge),
}

impl Device {
    pub fn id(&self) -> DeviceId {
        match self {
            Device::Bridge(b) => b.id,
            Device::Router(r) => r.id,
            Device::VlanBridge(v) => v.id,
        }
    }

    pub fn admin_state(&self) -> AdminState {
        match self {
            Device::Bridge(b) => b.admin_state,
            Device::Router(r) => r.admin_state,
            Device::VlanBridge(v) => v.admin_state,
        }
    }

    pub fn inbound_filter(&self) -> Option<ChainId> {
        match self {
            Device::Bridge(b) => b.inbound_filter,
            Device::Router(r) => r.inbound_filter,
            Device::VlanBridge(v) => v.inbound_filter,
        }
    }

    pub fn outbound_filter(&self) -> Option<ChainId> {
        match self {
            Device::Bridge(b) => b.outbound_filter,
            Device::Router(r) => r.outbound_filter,
            Device::VlanBridge(v) => v.outbound_filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// Bound to a host interface; part of zero or more port-groups.
    Exterior { port_groups: BTreeSet<PortGroupId> },
    /// Bound to another device's port.
    Interior { peer_id: PortId },
}

#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub device_id: DeviceId,
    pub admin_state: AdminState,
    pub kind: PortKind,
    pub inbound_filter: Option<ChainId>,
    pub outbound_filter: Option<ChainId>,
    pub datapath_port_no: Option<crate::types::DatapathPortNo>,
}

impl Port {
    pub fn is_exterior(&self) -> bool {
        matches!(self.kind, PortKind::Exterior { .. })
    }

    pub fn peer_id(&self) -> Option<PortId> {
        match &self.kind {
            PortKind::Interior { peer_id } => Some(*peer_id),
            PortKind::Exterior { .. } => None,
        }
    }
}
