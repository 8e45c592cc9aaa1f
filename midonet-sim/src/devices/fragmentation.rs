//! Fragmentation policy (§4.4 "Fragmentation policy"), applied before
//! a packet from an exterior ingress enters any device.

use midonet_core::action::{Action, DropKind};
use midonet_core::match_key::{FragmentType, IcmpErrorPayload, TransportMatch, WildcardMatch};
use midonet_core::result::WildcardFlow;
use std::time::Duration;

const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_FRAGMENTATION_NEEDED: u8 = 4;

pub enum FragmentDecision {
    /// No fragmentation concern; proceed into the device pipeline.
    PassThrough,
    Drop(Action),
    /// Later fragments install a wide wildcard flow matching only ether
    /// type + fragment type, dropping every later fragment of any
    /// connection rather than re-simulating each one.
    InstallWideDrop(WildcardFlow),
}

/// Runs ahead of any device's `process`, so there is no owning device id yet
/// to trace against; the coordinator traces the decision itself once it has
/// one. `emit_icmp` is invoked only for the First-fragment/IPv4 case, where
/// the caller (the coordinator) owns the generated-packet hand-off.
pub fn check(m: &WildcardMatch, idle_expiration: Duration) -> FragmentDecision {
    match m.fragment_type {
        FragmentType::None => FragmentDecision::PassThrough,
        FragmentType::First if m.is_ipv4() => FragmentDecision::Drop(Action::Drop(DropKind::Temporary)),
        FragmentType::First => FragmentDecision::Drop(Action::Drop(DropKind::Permanent)),
        FragmentType::Later => {
            let mut wide = WildcardMatch::new();
            wide.ether_type = m.ether_type;
            wide.fragment_type = FragmentType::Later;
            FragmentDecision::InstallWideDrop(WildcardFlow {
                wcmatch: wide,
                actions: vec![],
                idle_expiration,
                hard_expiration: idle_expiration,
            })
        }
    }
}

/// Builds the ICMP Fragmentation-Needed payload the coordinator emits via
/// the generated-packet path when [`check`] returns the First-fragment case.
pub fn icmp_fragmentation_needed(original: &WildcardMatch) -> Option<WildcardMatch> {
    use midonet_core::match_key::NetworkMatch;
    let NetworkMatch::V4 { src, dst } = original.network? else {
        return None;
    };
    let mut reply = WildcardMatch::new();
    reply.eth_src = original.eth_dst;
    reply.eth_dst = original.eth_src;
    reply.ether_type = Some(0x0800);
    reply.network = Some(NetworkMatch::V4 { src: dst, dst: src });
    reply.ip_proto = Some(1);
    reply.transport = Some(TransportMatch::Icmp {
        icmp_type: ICMP_DEST_UNREACHABLE,
        icmp_code: ICMP_FRAGMENTATION_NEEDED,
    });
    reply.icmp_error = Some(IcmpErrorPayload {
        icmp_type: ICMP_DEST_UNREACHABLE,
        code: ICMP_FRAGMENTATION_NEEDED,
        data: Vec::new(),
    });
    Some(reply)
}
