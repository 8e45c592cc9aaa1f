//! Action Interpreter + Coordinator loop (§4.5).
//!
//! Mutually recursive across `ingress_port` / `ingress_device` / `egress_port`
//! / `interpret_action`, each boxed with `Pin<Box<dyn Future<...>>>` the same
//! way `RuleChainEvaluator` boxes its jump recursion, since none of these can
//! be a plain recursive `async fn`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use midonet_core::action::{Action, DropKind};
use midonet_core::capability::{ConnCache, ConnTrackKey};
use midonet_core::config::SimulationConfig;
use midonet_core::context::PacketContext;
use midonet_core::device::{AdminState, PortKind};
use midonet_core::dp_action::DpAction;
use midonet_core::match_key::{FragmentType, WildcardMatch};
use midonet_core::result::{SimulationResult, WildcardFlow};
use midonet_core::rule::Condition;
use midonet_core::types::{DeviceId, PortId};
use midonet_topology::TopologyCacheClient;

use crate::callback::CallbackRunner;
use crate::devices;
use crate::devices::fragmentation::FragmentDecision;
use crate::devices::port_filter::apply_filter;
use crate::diff::diff_to_actions;
use crate::generated::{GeneratedPacket, GeneratedPacketEmitter};

/// Jump-chain recursion depth is not one of the historical tunables listed
/// in §6; kept as a coordinator-local constant rather than growing
/// `SimulationConfig` with a knob the spec never names.
const MAX_JUMP_DEPTH: u32 = 16;

/// One packet's worth of input (§6 "Inputs into the core").
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub wcmatch: WildcardMatch,
    pub input_port: Option<PortId>,
    pub generated_egress_port: Option<PortId>,
    /// Absent means the packet was generated internally (no datapath cookie).
    pub has_cookie: bool,
    pub conn_cache: Option<ConnCache>,
    pub conn_track_key: Option<ConnTrackKey>,
    pub trace_enabled: bool,
    pub traced_conditions: Vec<Condition>,
    pub budget: Duration,
}

pub struct Coordinator<'a> {
    topology: &'a dyn TopologyCacheClient,
    emitter: &'a dyn GeneratedPacketEmitter,
    callbacks: &'a dyn CallbackRunner,
    config: Arc<SimulationConfig>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        topology: &'a dyn TopologyCacheClient,
        emitter: &'a dyn GeneratedPacketEmitter,
        callbacks: &'a dyn CallbackRunner,
        config: Arc<SimulationConfig>,
    ) -> Self {
        Self { topology, emitter, callbacks, config }
    }

    pub async fn simulate(&self, req: SimulationRequest) -> SimulationResult {
        let mut ctx = PacketContext::new(req.wcmatch.clone(), req.trace_enabled || traced(&req));
        if let (Some(cache), Some(key)) = (req.conn_cache.clone(), req.conn_track_key) {
            ctx.mark_conn_tracked();
            ctx = ctx.with_conn_cache(cache, key);
        }

        let result = match (req.input_port, req.generated_egress_port) {
            (Some(input), None) => self.ingress_port(input, &mut ctx, &req).await,
            (None, Some(egress)) => self.egress_port(egress, &mut ctx, &req).await,
            _ => {
                tracing::warn!("illegal simulation start: expected exactly one of input/generated-egress port");
                self.finalize_drop(&mut ctx, &req, DropKind::Temporary).await
            }
        };

        #[cfg(feature = "telemetry")]
        midonet_telemetry::record_simulation(ctx.devices_traversed(), ctx.fork_count(), drop_reason(&result));

        result
    }

    fn ingress_port<'b>(
        &'b self,
        pid: PortId,
        ctx: &'b mut PacketContext,
        req: &'b SimulationRequest,
    ) -> Pin<Box<dyn Future<Output = SimulationResult> + Send + 'b>> {
        Box::pin(async move {
            let Some(port) = self.topology.fetch_port(pid, req.budget).await else {
                tracing::debug!(port = %pid, "ingress port not found");
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            };
            if ctx.set_input_port(pid).is_err() {
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }

            let is_exterior = port.is_exterior();
            if let PortKind::Exterior { port_groups } = &port.kind {
                let mut m = ctx.clone_match();
                m.port_groups = port_groups.clone();
                if ctx.set_match(m).is_err() {
                    return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                }
            }

            let mut m = ctx.clone_match();
            let filtered = apply_filter(
                self.topology,
                port.inbound_filter,
                port.device_id,
                true,
                ctx,
                &mut m,
                MAX_JUMP_DEPTH,
                req.budget,
            )
            .await;
            if ctx.set_match(m).is_err() {
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }
            if let Some(action) = filtered {
                return self.interpret_action(action, ctx, req).await;
            }

            if is_exterior {
                if let Some(result) = self.apply_fragmentation_policy(ctx, req).await {
                    return result;
                }
            }

            self.ingress_device(port.device_id, ctx, req).await
        })
    }

    /// §4.4 "Fragmentation policy": applied only on exterior ingress,
    /// before the packet reaches any device. `None` means pass-through.
    async fn apply_fragmentation_policy(
        &self,
        ctx: &mut PacketContext,
        req: &SimulationRequest,
    ) -> Option<SimulationResult> {
        let m = ctx.current_match().clone();
        match devices::fragmentation::check(&m, self.config.idle_expiration()) {
            FragmentDecision::PassThrough => None,
            FragmentDecision::Drop(action) => {
                if m.fragment_type == FragmentType::First && m.is_ipv4() {
                    if let (Some(reply), Some(in_port)) =
                        (devices::fragmentation::icmp_fragmentation_needed(&m), ctx.input_port())
                    {
                        self.emitter.emit(GeneratedPacket { wcmatch: reply, egress_port: in_port }).await;
                    }
                }
                Some(self.interpret_action(action, ctx, req).await)
            }
            FragmentDecision::InstallWideDrop(flow) => {
                Some(self.finish(ctx, req, flow.wcmatch, flow.actions, flow.idle_expiration, flow.hard_expiration).await)
            }
        }
    }

    fn ingress_device<'b>(
        &'b self,
        did: DeviceId,
        ctx: &'b mut PacketContext,
        req: &'b SimulationRequest,
    ) -> Pin<Box<dyn Future<Output = SimulationResult> + Send + 'b>> {
        Box::pin(async move {
            let (total, visits) = ctx.record_device_visit(did);
            if total > self.config.max_devices_traversed || visits > self.config.max_device_revisits {
                ctx.trace(did, "loop detected, dropping");
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }

            let Some(device) = self.topology.fetch_device(did, req.budget).await else {
                tracing::debug!(device = %did, "device not found");
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            };
            if device.admin_state() == AdminState::Down {
                ctx.trace(did, "device administratively down");
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }

            let mut m = ctx.clone_match();
            let filtered = apply_filter(
                self.topology,
                device.inbound_filter(),
                did,
                false,
                ctx,
                &mut m,
                MAX_JUMP_DEPTH,
                req.budget,
            )
            .await;
            if ctx.set_match(m).is_err() {
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }
            if let Some(action) = filtered {
                return self.interpret_action(action, ctx, req).await;
            }

            let action = devices::process(&device, ctx, self.emitter).await;
            let passes_onward = matches!(action, Action::ToPort(_) | Action::ToPortSet(_) | Action::Fork(_));

            let action = if passes_onward {
                let mut m = ctx.clone_match();
                let filtered = apply_filter(
                    self.topology,
                    device.outbound_filter(),
                    did,
                    false,
                    ctx,
                    &mut m,
                    MAX_JUMP_DEPTH,
                    req.budget,
                )
                .await;
                if ctx.set_match(m).is_err() {
                    return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                }
                filtered.unwrap_or(action)
            } else {
                action
            };

            self.interpret_action(action, ctx, req).await
        })
    }

    fn egress_port<'b>(
        &'b self,
        pid: PortId,
        ctx: &'b mut PacketContext,
        req: &'b SimulationRequest,
    ) -> Pin<Box<dyn Future<Output = SimulationResult> + Send + 'b>> {
        Box::pin(async move {
            let Some(port) = self.topology.fetch_port(pid, req.budget).await else {
                tracing::debug!(port = %pid, "egress port not found");
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            };
            if ctx.set_output_port(pid).is_err() {
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }

            let mut m = ctx.clone_match();
            let filtered = apply_filter(
                self.topology,
                port.outbound_filter,
                port.device_id,
                true,
                ctx,
                &mut m,
                MAX_JUMP_DEPTH,
                req.budget,
            )
            .await;
            if ctx.set_match(m).is_err() {
                return self.finalize_drop(ctx, req, DropKind::Temporary).await;
            }
            if let Some(action) = filtered {
                return self.interpret_action(action, ctx, req).await;
            }

            if port.is_exterior() {
                let Some(dp_no) = port.datapath_port_no else {
                    ctx.trace(port.device_id, "exterior port missing a datapath port number");
                    return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                };
                self.finalize_forward(ctx, req, DpAction::Output(dp_no)).await
            } else {
                let Some(peer) = port.peer_id() else {
                    return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                };
                self.ingress_port(peer, ctx, req).await
            }
        })
    }

    fn interpret_action<'b>(
        &'b self,
        action: Action,
        ctx: &'b mut PacketContext,
        req: &'b SimulationRequest,
    ) -> Pin<Box<dyn Future<Output = SimulationResult> + Send + 'b>> {
        Box::pin(async move {
            match action {
                Action::ToPort(p) => self.egress_port(p, ctx, req).await,
                Action::ToPortSet(set) => self.finalize_forward(ctx, req, DpAction::OutputPortSet(set)).await,
                Action::Fork(branches) => self.interpret_fork(branches, ctx, req).await,
                Action::Consumed => self.finalize_consumed(ctx, req).await,
                Action::Drop(kind) => self.finalize_drop(ctx, req, kind).await,
                Action::ErrorDrop => self.finalize_drop(ctx, req, DropKind::Temporary).await,
                Action::NotIpv4 => self.finalize_not_ipv4(ctx, req).await,
                Action::DoDatapathAction(dp) => self.finalize_forward(ctx, req, dp).await,
            }
        })
    }

    fn interpret_fork<'b>(
        &'b self,
        branches: Vec<Action>,
        ctx: &'b mut PacketContext,
        req: &'b SimulationRequest,
    ) -> Pin<Box<dyn Future<Output = SimulationResult> + Send + 'b>> {
        Box::pin(async move {
            ctx.record_fork();
            let snapshot = ctx.clone_match();
            let mut results = Vec::with_capacity(branches.len());
            for branch in branches {
                ctx.unfreeze();
                if ctx.set_match(snapshot.clone()).is_err() {
                    return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                }
                results.push(self.interpret_action(branch, ctx, req).await);
            }

            let mut merged = match results.first().cloned() {
                Some(first) => first,
                None => return SimulationResult::NoOp,
            };
            for next in results.into_iter().skip(1) {
                match merge_pair(merged, next) {
                    Some(m) => merged = m,
                    None => {
                        tracing::warn!("incompatible fork outcomes, dropping");
                        return self.finalize_drop(ctx, req, DropKind::Temporary).await;
                    }
                }
            }
            merged
        })
    }

    async fn finalize_forward(&self, ctx: &mut PacketContext, req: &SimulationRequest, extra: DpAction) -> SimulationResult {
        let mut actions = diff_to_actions(ctx.original_match(), ctx.current_match());
        actions.push(extra);
        let (idle, hard) = self.forwarding_expiration(ctx);
        self.finish(ctx, req, ctx.original_match().clone(), actions, idle, hard).await
    }

    async fn finalize_drop(&self, ctx: &mut PacketContext, req: &SimulationRequest, kind: DropKind) -> SimulationResult {
        let (idle, hard) = match kind {
            DropKind::Temporary => (Duration::ZERO, self.config.temporary_drop()),
            DropKind::Permanent => (self.config.idle_expiration(), Duration::ZERO),
        };
        self.finish(ctx, req, ctx.original_match().clone(), Vec::new(), idle, hard).await
    }

    async fn finalize_not_ipv4(&self, ctx: &mut PacketContext, req: &SimulationRequest) -> SimulationResult {
        let mut wide = WildcardMatch::new();
        wide.ether_type = ctx.current_match().ether_type;
        self.finish(ctx, req, wide, Vec::new(), self.config.idle_expiration(), Duration::ZERO).await
    }

    async fn finalize_consumed(&self, ctx: &mut PacketContext, req: &SimulationRequest) -> SimulationResult {
        let _ = req;
        ctx.freeze();
        self.run_callbacks(ctx).await;
        ctx.consume();
        SimulationResult::NoOp
    }

    fn forwarding_expiration(&self, ctx: &mut PacketContext) -> (Duration, Duration) {
        if ctx.is_conn_tracked() {
            if ctx.is_forward_flow() {
                (Duration::ZERO, self.config.forward_flow_expiration())
            } else {
                (Duration::ZERO, self.config.return_flow_expiration())
            }
        } else {
            (self.config.idle_expiration(), Duration::ZERO)
        }
    }

    /// Shared tail of every finalize path (§4.5 `emit` steps 3-4, §7
    /// "internally generated packets whose simulation drops silently consume
    /// the packet").
    async fn finish(
        &self,
        ctx: &mut PacketContext,
        req: &SimulationRequest,
        wcmatch: WildcardMatch,
        actions: Vec<DpAction>,
        idle_expiration: Duration,
        hard_expiration: Duration,
    ) -> SimulationResult {
        ctx.freeze();
        if !req.has_cookie {
            self.run_callbacks(ctx).await;
            if actions.is_empty() {
                return SimulationResult::NoOp;
            }
            return SimulationResult::SendPacket { actions };
        }

        let callbacks = ctx.take_callbacks();
        let tags = ctx.take_flow_tags();
        SimulationResult::AddVirtualWildcardFlow {
            flow: WildcardFlow { wcmatch, actions, idle_expiration, hard_expiration },
            callbacks,
            tags,
        }
    }

    async fn run_callbacks(&self, ctx: &mut PacketContext) {
        for callback in ctx.take_callbacks() {
            self.callbacks.run(callback).await;
        }
    }
}

/// Classifies a finished simulation for the drop-reason metric label (spec
/// §4.5 "drops by reason"). Best-effort: a flow with no actions is a drop,
/// distinguished temporary/permanent by which expiration field is set;
/// anything producing actions is a forward and reports no drop reason.
#[cfg(feature = "telemetry")]
fn drop_reason(result: &SimulationResult) -> Option<midonet_telemetry::DropReason> {
    use midonet_telemetry::DropReason;
    match result {
        SimulationResult::NoOp => Some(DropReason::Permanent),
        SimulationResult::SendPacket { .. } => None,
        SimulationResult::AddVirtualWildcardFlow { flow, .. } if flow.actions.is_empty() => {
            if flow.hard_expiration.is_zero() {
                Some(DropReason::Permanent)
            } else {
                Some(DropReason::Temporary)
            }
        }
        SimulationResult::AddVirtualWildcardFlow { .. } => None,
    }
}

fn traced(req: &SimulationRequest) -> bool {
    req.traced_conditions.iter().any(|c| c.matches(&req.wcmatch))
}

fn min_nonzero(a: Duration, b: Duration) -> Duration {
    if a.is_zero() {
        b
    } else if b.is_zero() {
        a
    } else {
        a.min(b)
    }
}

/// `None` return means the pair is incompatible (§4.5, §9 Open
/// Question on differing `NotIPv4` results: resolved here as incompatible).
fn merge_pair(a: SimulationResult, b: SimulationResult) -> Option<SimulationResult> {
    match (a, b) {
        (SimulationResult::NoOp, other) | (other, SimulationResult::NoOp) => Some(other),
        (SimulationResult::SendPacket { actions: mut a1 }, SimulationResult::SendPacket { actions: a2 }) => {
            a1.extend(a2);
            Some(SimulationResult::SendPacket { actions: a1 })
        }
        (
            SimulationResult::AddVirtualWildcardFlow { flow: f1, callbacks: c1, tags: t1 },
            SimulationResult::AddVirtualWildcardFlow { flow: f2, callbacks: c2, tags: t2 },
        ) => {
            if f1.wcmatch != f2.wcmatch {
                return None;
            }
            let mut actions = f1.actions;
            actions.extend(f2.actions);
            let idle_expiration = min_nonzero(f1.idle_expiration, f2.idle_expiration);
            let hard_expiration = min_nonzero(f1.hard_expiration, f2.hard_expiration);
            let mut callbacks = c1;
            callbacks.extend(c2);
            let mut tags = t1;
            tags.extend(t2);
            Some(SimulationResult::AddVirtualWildcardFlow {
                flow: WildcardFlow { wcmatch: f1.wcmatch, actions, idle_expiration, hard_expiration },
                callbacks,
                tags,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::RecordingCallbackRunner;
    use crate::generated::RecordingEmitter;
    use midonet_core::capability::MacLearningTable;
    use midonet_core::device::{Bridge, Device, Port, PortKind};
    use midonet_core::types::{DatapathPortNo, PortSetId};
    use midonet_topology::InMemoryTopologyCache;
    use std::num::NonZeroU32;

    fn port_id(v: u32) -> PortId {
        PortId::new(NonZeroU32::new(v).unwrap())
    }

    fn device_id(v: u32) -> DeviceId {
        DeviceId::new(NonZeroU32::new(v).unwrap())
    }

    fn base_request(input_port: Option<PortId>) -> SimulationRequest {
        let mut m = WildcardMatch::new();
        m.eth_src = Some([1; 6]);
        m.eth_dst = Some([2; 6]);
        SimulationRequest {
            wcmatch: m,
            input_port,
            generated_egress_port: None,
            has_cookie: true,
            conn_cache: None,
            conn_track_key: None,
            trace_enabled: false,
            traced_conditions: vec![],
            budget: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn illegal_start_is_temporary_drop() {
        let topo = InMemoryTopologyCache::new();
        let emitter = RecordingEmitter::new();
        let callbacks = RecordingCallbackRunner::new();
        let coordinator = Coordinator::new(&*topo, &emitter, &callbacks, Arc::new(SimulationConfig::default()));
        let mut req = base_request(None);
        req.generated_egress_port = None;

        let result = coordinator.simulate(req).await;
        match result {
            SimulationResult::AddVirtualWildcardFlow { flow, .. } => {
                assert_eq!(flow.hard_expiration, SimulationConfig::default().temporary_drop());
            }
            other => panic!("expected a temporary drop flow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn learned_unicast_installs_forwarding_flow() {
        let topo = InMemoryTopologyCache::new();
        let mac_table = MacLearningTable::new();
        mac_table.learn([2; 6], port_id(2));
        topo.put_device(Device::Bridge(Bridge {
            id: device_id(1),
            admin_state: AdminState::Up,
            inbound_filter: None,
            outbound_filter: None,
            flood_port_set_id: PortSetId::new(NonZeroU32::new(1).unwrap()),
            mac_table,
        }));
        topo.put_port(Port {
            id: port_id(1),
            device_id: device_id(1),
            admin_state: AdminState::Up,
            kind: PortKind::Exterior { port_groups: Default::default() },
            inbound_filter: None,
            outbound_filter: None,
            datapath_port_no: Some(DatapathPortNo(1)),
        });
        topo.put_port(Port {
            id: port_id(2),
            device_id: device_id(1),
            admin_state: AdminState::Up,
            kind: PortKind::Exterior { port_groups: Default::default() },
            inbound_filter: None,
            outbound_filter: None,
            datapath_port_no: Some(DatapathPortNo(2)),
        });

        let emitter = RecordingEmitter::new();
        let callbacks = RecordingCallbackRunner::new();
        let coordinator = Coordinator::new(&*topo, &emitter, &callbacks, Arc::new(SimulationConfig::default()));
        let req = base_request(Some(port_id(1)));

        let result = coordinator.simulate(req).await;
        match result {
            SimulationResult::AddVirtualWildcardFlow { flow, .. } => {
                assert_eq!(flow.actions, vec![DpAction::Output(DatapathPortNo(2))]);
                assert_eq!(flow.idle_expiration, SimulationConfig::default().idle_expiration());
                assert_eq!(flow.hard_expiration, Duration::ZERO);
            }
            other => panic!("expected a forwarding flow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn devices_traversed_at_max_still_succeeds() {
        let topo = InMemoryTopologyCache::new();
        let mac_table = MacLearningTable::new();
        mac_table.learn([2; 6], port_id(2));
        topo.put_device(Device::Bridge(Bridge {
            id: device_id(1),
            admin_state: AdminState::Up,
            inbound_filter: None,
            outbound_filter: None,
            flood_port_set_id: PortSetId::new(NonZeroU32::new(1).unwrap()),
            mac_table,
        }));
        topo.put_port(Port {
            id: port_id(1),
            device_id: device_id(1),
            admin_state: AdminState::Up,
            kind: PortKind::Exterior { port_groups: Default::default() },
            inbound_filter: None,
            outbound_filter: None,
            datapath_port_no: Some(DatapathPortNo(1)),
        });
        topo.put_port(Port {
            id: port_id(2),
            device_id: device_id(1),
            admin_state: AdminState::Up,
            kind: PortKind::Exterior { port_groups: Default::default() },
            inbound_filter: None,
            outbound_filter: None,
            datapath_port_no: Some(DatapathPortNo(2)),
        });

        let emitter = RecordingEmitter::new();
        let callbacks = RecordingCallbackRunner::new();
        let mut config = SimulationConfig::default();
        config.max_devices_traversed = 1;
        config.max_device_revisits = 1;
        let coordinator = Coordinator::new(&*topo, &emitter, &callbacks, Arc::new(config));
        let req = base_request(Some(port_id(1)));

        let result = coordinator.simulate(req).await;
        assert!(matches!(result, SimulationResult::AddVirtualWildcardFlow { .. }));
    }
}
