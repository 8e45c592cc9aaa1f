//! VLAN-aware bridge processor (§4.4 "Bridge" step 4, Fork semantics).
//!
//! Behaves like a plain bridge for learned-unicast traffic. Broadcast or
//! unknown-unicast frames that did not arrive on the trunk port additionally
//! need to reach whatever sits behind the trunk, so flooding forks into both
//! the local flood port set and the trunk uplink (§4.5 scenario F).

use midonet_core::action::{Action, DropKind};
use midonet_core::context::PacketContext;
use midonet_core::device::VlanBridge;

pub fn process(bridge: &VlanBridge, ctx: &mut PacketContext) -> Action {
    let m = ctx.current_match().clone();

    let Some(in_port) = ctx.input_port() else {
        return Action::ErrorDrop;
    };

    if let Some(src) = m.eth_src {
        bridge.mac_table.learn(src, in_port);
    }

    let Some(dst) = m.eth_dst else {
        return Action::ErrorDrop;
    };

    let should_flood = m.is_broadcast_or_multicast_dst() || bridge.mac_table.lookup(dst).is_none();
    if should_flood {
        if in_port == bridge.trunk_port {
            ctx.trace(bridge.id, "flood: already arrived via trunk");
            return Action::ToPortSet(bridge.flood_port_set_id);
        }
        ctx.trace(bridge.id, "flood: forking to local port set and trunk");
        return Action::Fork(vec![
            Action::ToPortSet(bridge.flood_port_set_id),
            Action::ToPort(bridge.trunk_port),
        ]);
    }

    match bridge.mac_table.lookup(dst) {
        Some(learned_port) if learned_port == in_port => {
            ctx.trace(bridge.id, "hairpin suppressed");
            Action::Drop(DropKind::Permanent)
        }
        Some(learned_port) => Action::ToPort(learned_port),
        None => unreachable!("flood path already handled the miss case"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midonet_core::capability::MacLearningTable;
    use midonet_core::device::AdminState;
    use midonet_core::match_key::WildcardMatch;
    use midonet_core::types::{DeviceId, PortId, PortSetId};
    use std::num::NonZeroU32;

    fn port(v: u32) -> PortId {
        PortId::new(NonZeroU32::new(v).unwrap())
    }

    fn fixture() -> VlanBridge {
        VlanBridge {
            id: DeviceId::new(NonZeroU32::new(1).unwrap()),
            admin_state: AdminState::Up,
            inbound_filter: None,
            outbound_filter: None,
            flood_port_set_id: PortSetId::new(NonZeroU32::new(1).unwrap()),
            mac_table: MacLearningTable::new(),
            trunk_port: port(9),
        }
    }

    #[test]
    fn unknown_destination_forks_to_trunk() {
        let bridge = fixture();
        let mut m = WildcardMatch::new();
        m.eth_src = Some([1; 6]);
        m.eth_dst = Some([2; 6]);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();

        let action = process(&bridge, &mut ctx);
        assert_eq!(
            action,
            Action::Fork(vec![
                Action::ToPortSet(bridge.flood_port_set_id),
                Action::ToPort(bridge.trunk_port),
            ])
        );
    }

    #[test]
    fn flood_arriving_via_trunk_does_not_loop_back() {
        let bridge = fixture();
        let mut m = WildcardMatch::new();
        m.eth_src = Some([1; 6]);
        m.eth_dst = Some([2; 6]);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(bridge.trunk_port).unwrap();

        let action = process(&bridge, &mut ctx);
        assert_eq!(action, Action::ToPortSet(bridge.flood_port_set_id));
    }

    #[test]
    fn learned_unicast_forwards_without_forking() {
        let bridge = fixture();
        bridge.mac_table.learn([2; 6], port(2));
        let mut m = WildcardMatch::new();
        m.eth_src = Some([1; 6]);
        m.eth_dst = Some([2; 6]);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();

        let action = process(&bridge, &mut ctx);
        assert_eq!(action, Action::ToPort(port(2)));
    }
}
