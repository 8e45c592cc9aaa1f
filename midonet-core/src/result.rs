//! Simulation result types (§3 "Simulation Result").

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use crate::capability::ConnTrackKey;
use crate::dp_action::DpAction;
use crate::match_key::WildcardMatch;
use crate::types::DeviceId;

/// A tag attached to an installed flow so the topology layer can invalidate
/// it when the device/rule it depended on changes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowTag(pub String);

impl FlowTag {
    pub fn device(id: DeviceId) -> Self {
        Self(format!("device:{id}"))
    }
}

/// Data, not closures (design notes) — fired by the flow
/// installer when the owning flow is removed, or synchronously by the
/// coordinator when no flow is installed at all (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowRemovedCallback {
    /// Re-attempt ARP resolution and re-simulate when it resolves.
    ArpRetry { device_id: DeviceId, target: IpAddr },
    /// Refresh a connection-tracking entry's TTL.
    ConnTrackRefresh { key: ConnTrackKey },
    /// Extension point for callbacks this core does not need to interpret.
    Generic { tag: String, payload: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardFlow {
    pub wcmatch: WildcardMatch,
    pub actions: Vec<DpAction>,
    pub idle_expiration: Duration,
    pub hard_expiration: Duration,
}

/// Tagged union produced once per simulation (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationResult {
    NoOp,
    SendPacket { actions: Vec<DpAction> },
    AddVirtualWildcardFlow {
        flow: WildcardFlow,
        callbacks: Vec<FlowRemovedCallback>,
        tags: BTreeSet<FlowTag>,
    },
}

impl SimulationResult {
    pub fn is_no_op(&self) -> bool {
        matches!(self, SimulationResult::NoOp)
    }
}
