//! Router device processor (§4.4 "Router").

use std::net::IpAddr;

use midonet_core::action::{Action, DropKind};
use midonet_core::context::PacketContext;
use midonet_core::device::Router;
use midonet_core::dp_action::{DpAction, SetKeyAction};
use midonet_core::match_key::{ArpInfo, ArpOp, IcmpErrorPayload, NetworkMatch, TransportMatch, WildcardMatch};
use midonet_core::result::FlowRemovedCallback;

use crate::generated::{GeneratedPacket, GeneratedPacketEmitter};

const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_TIME_EXCEEDED_TRANSIT: u8 = 0;
const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_DEST_NET_UNREACHABLE: u8 = 0;

/// Needs the generated-packet emitter injected alongside the common
/// `(device, ctx)` contract, since ARP replies/requests and ICMP errors are
/// never simulated inline (§5 Reentrancy).
pub async fn process(
    router: &Router,
    ctx: &mut PacketContext,
    emitter: &dyn GeneratedPacketEmitter,
) -> Action {
    let m = ctx.current_match().clone();

    // Step 1: gate on ether type.
    if m.is_arp() {
        return process_arp(router, ctx, &m, emitter).await;
    }
    if !m.is_ipv4() && !m.is_ipv6() {
        ctx.trace(router.id, "not IPv4/IPv6/ARP");
        return Action::NotIpv4;
    }

    // Step 3: TTL decrement.
    let Some(ttl) = m.ip_ttl else {
        return Action::ErrorDrop;
    };
    if ttl <= 1 {
        ctx.trace(router.id, "TTL exceeded");
        emit_icmp_error(
            ctx,
            emitter,
            &m,
            ICMP_TIME_EXCEEDED,
            ICMP_TIME_EXCEEDED_TRANSIT,
        )
        .await;
        return Action::Drop(DropKind::Permanent);
    }
    let mut m = m;
    m.ip_ttl = Some(ttl - 1);
    if ctx.set_match(m.clone()).is_err() {
        return Action::ErrorDrop;
    }

    // Step 4: route lookup.
    let Some(dst) = ctx.dst_ip() else {
        return Action::ErrorDrop;
    };
    let Some(route) = router.routing_table.lookup(dst) else {
        ctx.trace(router.id, "no route");
        emit_icmp_error(
            ctx,
            emitter,
            &m,
            ICMP_DEST_UNREACHABLE,
            ICMP_DEST_NET_UNREACHABLE,
        )
        .await;
        return Action::Drop(DropKind::Permanent);
    };
    let egress_port = route.out_port;
    let next_hop = route.next_hop.unwrap_or(dst);

    // Step 5: ARP resolution.
    let Some(next_hop_mac) = router.arp_cache.get(next_hop) else {
        ctx.trace(router.id, "ARP cache miss, deferring");
        let arp_request = build_arp_request(router, egress_port, next_hop);
        emitter
            .emit(GeneratedPacket {
                wcmatch: arp_request,
                egress_port,
            })
            .await;
        let _ = ctx.add_flow_removed_callback(FlowRemovedCallback::ArpRetry {
            device_id: router.id,
            target: next_hop,
        });
        return Action::Drop(DropKind::Temporary);
    };

    // Step 6: rewrite ethernet src/dst and forward.
    let Some(src_mac) = router.port_macs.get(&egress_port).copied() else {
        return Action::ErrorDrop;
    };
    m.eth_src = Some(src_mac);
    m.eth_dst = Some(next_hop_mac);
    if ctx.set_match(m).is_err() {
        return Action::ErrorDrop;
    }
    Action::ToPort(egress_port)
}

async fn process_arp(
    router: &Router,
    ctx: &mut PacketContext,
    m: &WildcardMatch,
    emitter: &dyn GeneratedPacketEmitter,
) -> Action {
    let Some(arp) = m.arp else {
        return Action::ErrorDrop;
    };
    if arp.operation != ArpOp::Request {
        // Replies arriving at the router populate the ARP cache upstream of
        // this processor (the coordinator's "learn" step); nothing more to do.
        return Action::Consumed;
    }

    let targets_router = router
        .port_addresses
        .values()
        .any(|addr| *addr == IpAddr::V4(arp.target_ip));
    if !targets_router {
        ctx.trace(router.id, "ARP request not addressed to this router");
        return Action::Drop(DropKind::Permanent);
    }

    let Some(in_port) = ctx.input_port() else {
        return Action::ErrorDrop;
    };
    let Some(&router_mac) = router.port_macs.get(&in_port) else {
        return Action::ErrorDrop;
    };

    ctx.trace(router.id, "answering ARP for own address");
    let mut reply = WildcardMatch::new();
    reply.eth_src = Some(router_mac);
    reply.eth_dst = Some(arp.sender_mac);
    reply.ether_type = Some(0x0806);
    reply.arp = Some(ArpInfo {
        operation: ArpOp::Reply,
        sender_mac: router_mac,
        sender_ip: arp.target_ip,
        target_ip: arp.sender_ip,
    });
    emitter
        .emit(GeneratedPacket {
            wcmatch: reply,
            egress_port: in_port,
        })
        .await;
    Action::Consumed
}

fn build_arp_request(router: &Router, egress_port: midonet_core::types::PortId, next_hop: IpAddr) -> WildcardMatch {
    let sender_mac = router.port_macs.get(&egress_port).copied().unwrap_or([0; 6]);
    let sender_ip = router
        .port_addresses
        .get(&egress_port)
        .copied()
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    let IpAddr::V4(target_ip) = next_hop else {
        return WildcardMatch::new();
    };
    let IpAddr::V4(sender_ip) = sender_ip else {
        return WildcardMatch::new();
    };

    let mut request = WildcardMatch::new();
    request.eth_src = Some(sender_mac);
    request.eth_dst = Some([0xff; 6]);
    request.ether_type = Some(0x0806);
    request.arp = Some(ArpInfo {
        operation: ArpOp::Request,
        sender_mac,
        sender_ip,
        target_ip,
    });
    request
}

/// Synthesizes the ICMP error and hands it to the generated-packet emitter;
/// the router never rewrites the in-flight packet's own action to an ICMP
/// send — that would require device output in the *other* direction.
async fn emit_icmp_error(
    ctx: &mut PacketContext,
    emitter: &dyn GeneratedPacketEmitter,
    original: &WildcardMatch,
    icmp_type: u8,
    icmp_code: u8,
) {
    let Some(in_port) = ctx.input_port() else {
        return;
    };
    let Some(NetworkMatch::V4 { src, dst }) = original.network else {
        return;
    };
    let mut reply = WildcardMatch::new();
    reply.eth_src = original.eth_dst;
    reply.eth_dst = original.eth_src;
    reply.ether_type = Some(0x0800);
    reply.network = Some(NetworkMatch::V4 { src: dst, dst: src });
    reply.ip_proto = Some(1);
    reply.transport = Some(TransportMatch::Icmp { icmp_type, icmp_code });
    reply.icmp_error = Some(IcmpErrorPayload {
        icmp_type,
        code: icmp_code,
        data: Vec::new(),
    });
    emitter
        .emit(GeneratedPacket {
            wcmatch: reply,
            egress_port: in_port,
        })
        .await;
}

/// Helper retained for the Action Interpreter: the datapath-level rewrite
/// that mirrors step 6's match mutation, used when translating a cached
/// `ToPort` decision straight into `SetKey` actions without a full diff.
pub fn ethernet_rewrite(src: [u8; 6], dst: [u8; 6]) -> DpAction {
    DpAction::SetKey(SetKeyAction::Ethernet { src, dst })
}

#[cfg(test)]
mod tests {
    use super::*;
    use midonet_core::capability::{ArpCache, RouteEntry, RoutingTable};
    use midonet_core::device::AdminState;
    use midonet_core::types::{DeviceId, PortId};
    use std::collections::BTreeMap;
    use std::num::NonZeroU32;

    fn port(v: u32) -> PortId {
        PortId::new(NonZeroU32::new(v).unwrap())
    }

    fn fixture(routes: Vec<RouteEntry>) -> Router {
        let mut port_addresses = BTreeMap::new();
        port_addresses.insert(port(1), "10.0.0.1".parse().unwrap());
        let mut port_macs = BTreeMap::new();
        port_macs.insert(port(1), [0xaa; 6]);
        Router {
            id: DeviceId::new(NonZeroU32::new(1).unwrap()),
            admin_state: AdminState::Up,
            inbound_filter: None,
            outbound_filter: None,
            routing_table: RoutingTable::new(routes),
            arp_cache: ArpCache::new(),
            port_addresses,
            port_macs,
        }
    }

    fn ipv4_match(dst: &str, ttl: u8) -> WildcardMatch {
        let mut m = WildcardMatch::new();
        m.ether_type = Some(0x0800);
        m.network = Some(NetworkMatch::V4 {
            src: "10.0.0.5".parse().unwrap(),
            dst: dst.parse().unwrap(),
        });
        m.ip_ttl = Some(ttl);
        m
    }

    #[tokio::test]
    async fn non_ip_non_arp_yields_not_ipv4() {
        let router = fixture(vec![]);
        let mut m = WildcardMatch::new();
        m.ether_type = Some(0x86DD + 1); // not a recognised ether type
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::NotIpv4);
    }

    #[tokio::test]
    async fn ttl_exceeded_drops_and_emits_icmp() {
        let router = fixture(vec![RouteEntry {
            prefix: "10.0.1.0".parse().unwrap(),
            prefix_len: 24,
            next_hop: None,
            out_port: port(2),
        }]);
        let m = ipv4_match("10.0.1.5", 1);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::Drop(DropKind::Permanent));
        let emitted = emitter.drain().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].wcmatch.transport,
            Some(TransportMatch::Icmp {
                icmp_type: ICMP_TIME_EXCEEDED,
                icmp_code: ICMP_TIME_EXCEEDED_TRANSIT
            })
        );
    }

    #[tokio::test]
    async fn no_route_drops_and_emits_unreachable() {
        let router = fixture(vec![]);
        let m = ipv4_match("192.168.1.5", 64);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::Drop(DropKind::Permanent));
        let emitted = emitter.drain().await;
        assert_eq!(emitted[0].wcmatch.transport, Some(TransportMatch::Icmp {
            icmp_type: ICMP_DEST_UNREACHABLE,
            icmp_code: ICMP_DEST_NET_UNREACHABLE,
        }));
    }

    #[tokio::test]
    async fn arp_cache_miss_defers_with_temporary_drop() {
        let router = fixture(vec![RouteEntry {
            prefix: "10.0.1.0".parse().unwrap(),
            prefix_len: 24,
            next_hop: None,
            out_port: port(2),
        }]);
        let m = ipv4_match("10.0.1.5", 64);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::Drop(DropKind::Temporary));
        let emitted = emitter.drain().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].wcmatch.arp.map(|a| a.operation),
            Some(ArpOp::Request)
        );
    }

    #[tokio::test]
    async fn arp_hit_rewrites_ethernet_and_forwards() {
        let router = fixture(vec![RouteEntry {
            prefix: "10.0.1.0".parse().unwrap(),
            prefix_len: 24,
            next_hop: None,
            out_port: port(2),
        }]);
        let mut port_macs = BTreeMap::new();
        port_macs.insert(port(1), [0xaa; 6]);
        port_macs.insert(port(2), [0xbb; 6]);
        let router = Router {
            port_macs,
            ..router
        };
        router.arp_cache.put("10.0.1.5".parse().unwrap(), [0xcc; 6]);
        let m = ipv4_match("10.0.1.5", 64);
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::ToPort(port(2)));
        assert_eq!(ctx.current_match().eth_src, Some([0xbb; 6]));
        assert_eq!(ctx.current_match().eth_dst, Some([0xcc; 6]));
        assert_eq!(ctx.current_match().ip_ttl, Some(63));
    }

    #[tokio::test]
    async fn arp_request_to_router_own_address_is_answered() {
        let router = fixture(vec![]);
        let mut m = WildcardMatch::new();
        m.ether_type = Some(0x0806);
        m.arp = Some(ArpInfo {
            operation: ArpOp::Request,
            sender_mac: [0x11; 6],
            sender_ip: "10.0.0.5".parse().unwrap(),
            target_ip: "10.0.0.1".parse().unwrap(),
        });
        let mut ctx = PacketContext::new(m.clone(), false);
        ctx.set_match(m).unwrap();
        ctx.set_input_port(port(1)).unwrap();
        let emitter = crate::generated::RecordingEmitter::new();

        let action = process(&router, &mut ctx, &emitter).await;
        assert_eq!(action, Action::Consumed);
        let emitted = emitter.drain().await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].wcmatch.arp.map(|a| a.operation),
            Some(ArpOp::Reply)
        );
    }
}
