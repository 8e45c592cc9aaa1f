//! Bridge device processor (§4.4 "Bridge").

use midonet_core::action::{Action, DropKind};
use midonet_core::context::PacketContext;
use midonet_core::device::Bridge;

/// Pure over the immutable snapshot, but side-effects the MAC-learning table
/// through its capability handle (§4.4 step 3).
pub fn process(bridge: &Bridge, ctx: &mut PacketContext) -> Action {
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

    // Step 1: flood broadcast/multicast or unknown-unicast destinations.
    if m.is_broadcast_or_multicast_dst() {
        ctx.trace(bridge.id, "flood: broadcast/multicast destination");
        return Action::ToPortSet(bridge.flood_port_set_id);
    }

    match bridge.mac_table.lookup(dst) {
        None => {
            ctx.trace(bridge.id, "flood: destination MAC not learned");
            Action::ToPortSet(bridge.flood_port_set_id)
        }
        Some(learned_port) if learned_port == in_port => {
            // Step 2: hairpin suppression.
            ctx.trace(bridge.id, "hairpin suppressed");
            Action::Drop(DropKind::Permanent)
        }
        Some(learned_port) => Action::ToPort(learned_port),
    }
}
