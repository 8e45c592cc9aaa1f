//! Match-diff -> datapath-action translator (§4.6).
//!
//! Given the original and current matches of a `PacketContext`, produces an
//! ordered list of [`DpAction`]s that, applied to `orig`, yields `modif`.
//! Ordering is fixed; no action-level deduplication is performed (spec
//! explicitly calls this out).

use std::collections::HashSet;

use midonet_core::dp_action::{DpAction, SetKeyAction};
use midonet_core::match_key::{NetworkMatch, TransportMatch, VlanTag, WildcardMatch};

const TPID_DOT1Q: u16 = 0x8100;
const TPID_PROVIDER_BRIDGING: u16 = 0x88a8;

const ICMP_UNREACHABLE: u8 = 3;
const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_PARAMETER_PROBLEM: u8 = 12;

fn is_icmp_error_type(t: u8) -> bool {
    matches!(t, ICMP_UNREACHABLE | ICMP_TIME_EXCEEDED | ICMP_PARAMETER_PROBLEM)
}

pub fn diff_to_actions(orig: &WildcardMatch, modif: &WildcardMatch) -> Vec<DpAction> {
    let mut actions = Vec::new();

    // 1. Ethernet.
    if orig.eth_src != modif.eth_src || orig.eth_dst != modif.eth_dst {
        if let (Some(src), Some(dst)) = (modif.eth_src, modif.eth_dst) {
            actions.push(DpAction::SetKey(SetKeyAction::Ethernet { src, dst }));
        }
    }

    // 2. Network layer (src, dst or TTL/hop-limit).
    let network_changed = orig.network != modif.network || orig.ip_ttl != modif.ip_ttl;
    if network_changed {
        match &modif.network {
            Some(NetworkMatch::V4 { src, dst }) => {
                actions.push(DpAction::SetKey(SetKeyAction::Ipv4 {
                    src: *src,
                    dst: *dst,
                    proto: modif.ip_proto.unwrap_or(0),
                    tos: modif.ip_tos.unwrap_or(0),
                    ttl: modif.ip_ttl.unwrap_or(0),
                }));
            }
            Some(NetworkMatch::V6 { src, dst }) => {
                actions.push(DpAction::SetKey(SetKeyAction::Ipv6 {
                    src: *src,
                    dst: *dst,
                    proto: modif.ip_proto.unwrap_or(0),
                    hop_limit: modif.ip_ttl.unwrap_or(0),
                }));
            }
            None => {}
        }
    }

    // 3. VLAN stack diff: pop what left, then push what arrived.
    if orig.vlan_stack != modif.vlan_stack {
        let modif_set: HashSet<VlanTag> = modif.vlan_stack.iter().copied().collect();
        for tag in orig.vlan_stack.iter().filter(|t| !modif_set.contains(t)) {
            let _ = tag;
            actions.push(DpAction::PopVlan);
        }

        let orig_set: HashSet<VlanTag> = orig.vlan_stack.iter().copied().collect();
        let to_push: Vec<VlanTag> = modif
            .vlan_stack
            .iter()
            .copied()
            .filter(|t| !orig_set.contains(t))
            .collect();
        let last_idx = to_push.len().saturating_sub(1);
        for (i, tag) in to_push.iter().enumerate() {
            let tpid = if i == last_idx { TPID_DOT1Q } else { TPID_PROVIDER_BRIDGING };
            actions.push(DpAction::PushVlan { tpid, tci: tag.0 });
        }
    }

    // 4. ICMP error payload, restricted to the types that carry one.
    if orig.icmp_error != modif.icmp_error {
        if let Some(err) = &modif.icmp_error {
            if is_icmp_error_type(err.icmp_type) {
                actions.push(DpAction::SetKey(SetKeyAction::IcmpError {
                    icmp_type: err.icmp_type,
                    code: err.code,
                    data: err.data.clone(),
                }));
            }
        }
    }

    // 5. Transport ports. ICMP id/seq are never synthesized as a SetKey.
    if orig.transport != modif.transport {
        match modif.transport {
            Some(TransportMatch::Tcp { src, dst }) => {
                actions.push(DpAction::SetKey(SetKeyAction::Tcp { src, dst }));
            }
            Some(TransportMatch::Udp { src, dst }) => {
                actions.push(DpAction::SetKey(SetKeyAction::Udp { src, dst }));
            }
            Some(TransportMatch::Icmp { .. }) | None => {}
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use midonet_core::match_key::WildcardMatch;

    #[test]
    fn no_diff_yields_no_actions() {
        let m = WildcardMatch::new();
        assert!(diff_to_actions(&m, &m).is_empty());
    }

    #[test]
    fn ethernet_rewrite() {
        let orig = WildcardMatch {
            eth_src: Some([1; 6]),
            eth_dst: Some([2; 6]),
            ..WildcardMatch::new()
        };
        let modif = WildcardMatch {
            eth_src: Some([3; 6]),
            eth_dst: Some([4; 6]),
            ..WildcardMatch::new()
        };
        let actions = diff_to_actions(&orig, &modif);
        assert_eq!(
            actions,
            vec![DpAction::SetKey(SetKeyAction::Ethernet { src: [3; 6], dst: [4; 6] })]
        );
    }

    #[test]
    fn vlan_push_pop_ordering() {
        let orig = WildcardMatch {
            vlan_stack: vec![VlanTag::new(10)],
            ..WildcardMatch::new()
        };
        let modif = WildcardMatch {
            vlan_stack: vec![VlanTag::new(20), VlanTag::new(30)],
            ..WildcardMatch::new()
        };
        let actions = diff_to_actions(&orig, &modif);
        assert_eq!(actions[0], DpAction::PopVlan);
        match &actions[1] {
            DpAction::PushVlan { tpid, .. } => assert_eq!(*tpid, TPID_PROVIDER_BRIDGING),
            other => panic!("expected PushVlan, got {other:?}"),
        }
        match &actions[2] {
            DpAction::PushVlan { tpid, .. } => assert_eq!(*tpid, TPID_DOT1Q),
            other => panic!("expected PushVlan, got {other:?}"),
        }
    }

    #[test]
    fn vlan_push_then_pop_round_trips_to_original() {
        // Property from §8: push followed by pop yields the original frame.
        let orig = WildcardMatch::new();
        let mut pushed = orig.clone();
        pushed.vlan_stack.push(VlanTag::new(100));
        let push_actions = diff_to_actions(&orig, &pushed);
        assert_eq!(push_actions.len(), 1);

        let pop_actions = diff_to_actions(&pushed, &orig);
        assert_eq!(pop_actions, vec![DpAction::PopVlan]);
    }

    #[test]
    fn icmp_transport_fields_never_synthesized() {
        let orig = WildcardMatch {
            transport: Some(TransportMatch::Icmp { icmp_type: 8, icmp_code: 0 }),
            ..WildcardMatch::new()
        };
        let modif = WildcardMatch {
            transport: Some(TransportMatch::Icmp { icmp_type: 0, icmp_code: 0 }),
            ..WildcardMatch::new()
        };
        assert!(diff_to_actions(&orig, &modif).is_empty());
    }
}
