//! Rule Chain Evaluator (§4.3).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use midonet_core::context::PacketContext;
use midonet_core::match_key::WildcardMatch;
use midonet_core::rule::{Chain, RuleAction};
use midonet_core::types::DeviceId;
use midonet_topology::TopologyCacheClient;

/// The chain's final disposition, as seen by the caller (§4.3). Folds
/// a `RETURN` falling off the end of the outermost chain into `Accept`
/// (spec: "Final default when the chain exhausts is ACCEPT for filter
/// chains"); internal recursion distinguishes an explicit fall-through via
/// [`ChainOutcome::Return`] so a `JUMP` can resume its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Accept,
    Drop,
    Reject,
    ErrorDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainVerdict {
    Accept,
    Drop,
    Reject,
    ErrorDrop,
    /// The chain exhausted its rules, or hit an explicit `RETURN`: control
    /// falls back to whichever chain called this one via `JUMP`.
    Return,
}

pub struct RuleChainEvaluator<'a> {
    topology: &'a dyn TopologyCacheClient,
    max_jump_depth: u32,
}

impl<'a> RuleChainEvaluator<'a> {
    pub fn new(topology: &'a dyn TopologyCacheClient, max_jump_depth: u32) -> Self {
        Self { topology, max_jump_depth }
    }

    /// Apply `chain` to `m`, mutating it in place for NAT rules (§4.3).
    /// `owner_id` and `is_port_filter` are carried through for tracing only.
    pub async fn apply(
        &self,
        chain: &Chain,
        ctx: &mut PacketContext,
        m: &mut WildcardMatch,
        owner_id: DeviceId,
        is_port_filter: bool,
        budget: Duration,
    ) -> ChainOutcome {
        match self.apply_inner(chain, ctx, m, owner_id, is_port_filter, budget, 0).await {
            ChainVerdict::Accept | ChainVerdict::Return => ChainOutcome::Accept,
            ChainVerdict::Drop => ChainOutcome::Drop,
            ChainVerdict::Reject => ChainOutcome::Reject,
            ChainVerdict::ErrorDrop => ChainOutcome::ErrorDrop,
        }
    }

    fn apply_inner<'b>(
        &'b self,
        chain: &'b Chain,
        ctx: &'b mut PacketContext,
        m: &'b mut WildcardMatch,
        owner_id: DeviceId,
        is_port_filter: bool,
        budget: Duration,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = ChainVerdict> + Send + 'b>> {
        Box::pin(async move {
            for rule in &chain.rules {
                if !rule.condition.matches(m) {
                    continue;
                }
                if let Some(nat) = &rule.nat {
                    nat.apply(m);
                }
                match &rule.action {
                    RuleAction::Accept => return ChainVerdict::Accept,
                    RuleAction::Drop => return ChainVerdict::Drop,
                    RuleAction::Reject => return ChainVerdict::Reject,
                    RuleAction::Continue => continue,
                    RuleAction::Return => return ChainVerdict::Return,
                    RuleAction::Jump(target_id) => {
                        if depth + 1 > self.max_jump_depth {
                            ctx.trace(owner_id, format!("jump depth exceeded at chain {}", chain.id));
                            return ChainVerdict::ErrorDrop;
                        }
                        let Some(target) = self.topology.fetch_chain(*target_id, budget).await else {
                            ctx.trace(owner_id, format!("missing jump target chain {target_id}"));
                            return ChainVerdict::ErrorDrop;
                        };
                        match Box::pin(self.apply_inner(
                            &target,
                            ctx,
                            m,
                            owner_id,
                            is_port_filter,
                            budget,
                            depth + 1,
                        ))
                        .await
                        {
                            ChainVerdict::Return => continue,
                            other => return other,
                        }
                    }
                }
            }
            ChainVerdict::Return
        })
    }
}
