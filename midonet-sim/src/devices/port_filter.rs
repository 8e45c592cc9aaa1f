//! Port Filter wrapper (§4.4 "Port Filter wrapper").

use std::time::Duration;

use midonet_core::action::{Action, DropKind};
use midonet_core::context::PacketContext;
use midonet_core::match_key::WildcardMatch;
use midonet_core::types::{ChainId, DeviceId};
use midonet_topology::TopologyCacheClient;

use crate::rules::{ChainOutcome, RuleChainEvaluator};

/// Wraps a device entry/exit with its associated chain, if any. `None`
/// chain id is a no-op pass-through: returns `None` to signal "keep going".
pub async fn apply_filter(
    topology: &dyn TopologyCacheClient,
    chain_id: Option<ChainId>,
    owner_id: DeviceId,
    is_port_filter: bool,
    ctx: &mut PacketContext,
    m: &mut WildcardMatch,
    max_jump_depth: u32,
    budget: Duration,
) -> Option<Action> {
    let chain_id = chain_id?;
    let Some(chain) = topology.fetch_chain(chain_id, budget).await else {
        ctx.trace(owner_id, format!("missing filter chain {chain_id}"));
        return Some(Action::ErrorDrop);
    };

    let eval = RuleChainEvaluator::new(topology, max_jump_depth);
    match eval
        .apply(&chain, ctx, m, owner_id, is_port_filter, budget)
        .await
    {
        ChainOutcome::Accept => None,
        ChainOutcome::Drop | ChainOutcome::Reject => Some(Action::Drop(DropKind::Permanent)),
        ChainOutcome::ErrorDrop => Some(Action::ErrorDrop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midonet_core::rule::{Chain, Condition, Rule, RuleAction};
    use midonet_topology::InMemoryTopologyCache;
    use std::num::NonZeroU32;

    fn device_id(v: u32) -> DeviceId {
        DeviceId::new(NonZeroU32::new(v).unwrap())
    }

    fn chain_id(v: u32) -> ChainId {
        ChainId::new(NonZeroU32::new(v).unwrap())
    }

    #[tokio::test]
    async fn no_chain_is_pass_through() {
        let topo = InMemoryTopologyCache::new();
        let mut ctx = PacketContext::new(WildcardMatch::new(), false);
        let mut m = WildcardMatch::new();
        let result = apply_filter(
            &*topo,
            None,
            device_id(1),
            true,
            &mut ctx,
            &mut m,
            8,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn drop_rule_becomes_permanent_drop() {
        let topo = InMemoryTopologyCache::new();
        topo.put_chain(Chain {
            id: chain_id(1),
            rules: vec![Rule {
                condition: Condition::And(vec![]),
                nat: None,
                action: RuleAction::Drop,
            }],
        });
        let mut ctx = PacketContext::new(WildcardMatch::new(), false);
        let mut m = WildcardMatch::new();
        let result = apply_filter(
            &*topo,
            Some(chain_id(1)),
            device_id(1),
            true,
            &mut ctx,
            &mut m,
            8,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result, Some(Action::Drop(DropKind::Permanent)));
    }

    #[tokio::test]
    async fn missing_chain_is_error_drop() {
        let topo = InMemoryTopologyCache::new();
        let mut ctx = PacketContext::new(WildcardMatch::new(), false);
        let mut m = WildcardMatch::new();
        let result = apply_filter(
            &*topo,
            Some(chain_id(99)),
            device_id(1),
            true,
            &mut ctx,
            &mut m,
            8,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result, Some(Action::ErrorDrop));
    }
}
