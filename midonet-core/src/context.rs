//! Packet Context: the mutable per-simulation scratchpad (§3, §4.1).
//!
//! Mutation discipline is modeled as the small state machine from
//! design notes: `Open -> Frozen -> Consumed`. All mutators
//! require `Open`; result production transitions `Open -> Frozen`. Fork
//! children reopen by cloning the match and calling [`PacketContext::unfreeze`].

use std::collections::BTreeSet;
use std::net::IpAddr;

use thiserror::Error;

use crate::capability::{ConnCache, ConnTrackKey, FlowDirection};
use crate::match_key::WildcardMatch;
use crate::result::{FlowRemovedCallback, FlowTag};
use crate::types::{DeviceId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("packet context is not open for mutation")]
pub struct FrozenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtxState {
    Open,
    Frozen,
    Consumed,
}

/// Per-simulation scratchpad. One instance per simulation invocation,
/// dropped when the final `SimulationResult` is produced (§3).
#[derive(Debug, Clone)]
pub struct PacketContext {
    original_match: WildcardMatch,
    current_match: WildcardMatch,
    state: CtxState,
    input_port: Option<PortId>,
    output_port: Option<PortId>,
    flow_tags: BTreeSet<FlowTag>,
    callbacks: Vec<FlowRemovedCallback>,
    trace_enabled: bool,
    trace_log: Vec<(DeviceId, String)>,
    devices_traversed: u32,
    visit_counts: std::collections::HashMap<DeviceId, u32>,
    conn_cache: Option<ConnCache>,
    conn_track_key: Option<ConnTrackKey>,
    is_conn_tracked: bool,
    forward_flow: Option<bool>,
    fork_count: u32,
}

impl PacketContext {
    pub fn new(original_match: WildcardMatch, trace_enabled: bool) -> Self {
        Self {
            current_match: original_match.clone(),
            original_match,
            state: CtxState::Open,
            input_port: None,
            output_port: None,
            flow_tags: BTreeSet::new(),
            callbacks: Vec::new(),
            trace_enabled,
            trace_log: Vec::new(),
            devices_traversed: 0,
            visit_counts: std::collections::HashMap::new(),
            conn_cache: None,
            conn_track_key: None,
            is_conn_tracked: false,
            forward_flow: None,
            fork_count: 0,
        }
    }

    pub fn with_conn_cache(mut self, cache: ConnCache, key: ConnTrackKey) -> Self {
        self.conn_cache = Some(cache);
        self.conn_track_key = Some(key);
        self
    }

    pub fn original_match(&self) -> &WildcardMatch {
        &self.original_match
    }

    pub fn current_match(&self) -> &WildcardMatch {
        &self.current_match
    }

    /// O(fields) clone of the current match (§4.1 `clone_match`).
    pub fn clone_match(&self) -> WildcardMatch {
        self.current_match.clone()
    }

    fn check_open(&self) -> Result<(), FrozenError> {
        if self.state == CtxState::Open {
            Ok(())
        } else {
            Err(FrozenError)
        }
    }

    pub fn set_match(&mut self, m: WildcardMatch) -> Result<(), FrozenError> {
        self.check_open()?;
        self.current_match = m;
        Ok(())
    }

    /// One-way latch during result production; released only by explicit
    /// `unfreeze` (used between Fork branches, §4.5).
    pub fn freeze(&mut self) {
        if self.state == CtxState::Open {
            self.state = CtxState::Frozen;
        }
    }

    pub fn unfreeze(&mut self) {
        if self.state == CtxState::Frozen {
            self.state = CtxState::Open;
        }
    }

    pub fn consume(&mut self) {
        self.state = CtxState::Consumed;
    }

    pub fn is_frozen(&self) -> bool {
        self.state != CtxState::Open
    }

    pub fn add_flow_tag(&mut self, tag: FlowTag) -> Result<(), FrozenError> {
        self.check_open()?;
        self.flow_tags.insert(tag);
        Ok(())
    }

    pub fn add_flow_removed_callback(&mut self, cb: FlowRemovedCallback) -> Result<(), FrozenError> {
        self.check_open()?;
        self.callbacks.push(cb);
        Ok(())
    }

    pub fn take_flow_tags(&mut self) -> BTreeSet<FlowTag> {
        std::mem::take(&mut self.flow_tags)
    }

    pub fn take_callbacks(&mut self) -> Vec<FlowRemovedCallback> {
        std::mem::take(&mut self.callbacks)
    }

    pub fn peek_callbacks(&self) -> &[FlowRemovedCallback] {
        &self.callbacks
    }

    pub fn trace(&mut self, device_id: DeviceId, message: impl Into<String>) {
        let message = message.into();
        if self.trace_enabled {
            tracing::trace!(device = %device_id, msg = %message, "simulation trace");
            self.trace_log.push((device_id, message));
        } else {
            tracing::debug!(device = %device_id, msg = %message, "simulation step");
        }
    }

    pub fn trace_log(&self) -> &[(DeviceId, String)] {
        &self.trace_log
    }

    pub fn set_input_port(&mut self, port: PortId) -> Result<(), FrozenError> {
        self.check_open()?;
        self.input_port = Some(port);
        Ok(())
    }

    pub fn input_port(&self) -> Option<PortId> {
        self.input_port
    }

    pub fn set_output_port(&mut self, id: PortId) -> Result<(), FrozenError> {
        self.check_open()?;
        self.output_port = Some(id);
        Ok(())
    }

    pub fn output_port(&self) -> Option<PortId> {
        self.output_port
    }

    pub fn is_conn_tracked(&self) -> bool {
        self.is_conn_tracked
    }

    pub fn mark_conn_tracked(&mut self) {
        self.is_conn_tracked = true;
    }

    /// Lazily consults the connection cache on first query and caches the
    /// verdict for the rest of the simulation (§4.1).
    pub fn is_forward_flow(&mut self) -> bool {
        if let Some(cached) = self.forward_flow {
            return cached;
        }
        let forward = match (&self.conn_cache, self.conn_track_key) {
            (Some(cache), Some(key)) => match cache.get(key) {
                Some(FlowDirection::Forward) => true,
                Some(FlowDirection::Return) => false,
                None => {
                    // First packet of this 5-tuple: record it as forward.
                    cache.put(key, FlowDirection::Forward, std::time::Duration::from_secs(60));
                    true
                }
            },
            _ => true,
        };
        self.forward_flow = Some(forward);
        forward
    }

    /// Bumps the devices-traversed counter and the per-device visit count,
    /// returning the new totals for the coordinator's loop-detection checks
    /// (§3 invariant, §4.5 loop detection).
    pub fn record_device_visit(&mut self, device_id: DeviceId) -> (u32, u32) {
        self.devices_traversed += 1;
        let visits = self.visit_counts.entry(device_id).or_insert(0);
        *visits += 1;
        (self.devices_traversed, *visits)
    }

    pub fn devices_traversed(&self) -> u32 {
        self.devices_traversed
    }

    /// Bumps the Fork-actions-interpreted counter (telemetry only; has no
    /// bearing on loop detection).
    pub fn record_fork(&mut self) {
        self.fork_count += 1;
    }

    pub fn fork_count(&self) -> u32 {
        self.fork_count
    }

    pub fn dst_ip(&self) -> Option<IpAddr> {
        use crate::match_key::NetworkMatch;
        match &self.current_match.network {
            Some(NetworkMatch::V4 { dst, .. }) => Some(IpAddr::V4(*dst)),
            Some(NetworkMatch::V6 { dst, .. }) => Some(IpAddr::V6(*dst)),
            None => None,
        }
    }
}
