//! The wildcard match: a mutable set of header fields with independent
//! per-field presence, as described in §3.

use crate::types::{PortGroupId, PortId};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

/// ARP is not an IP protocol, so its fields live outside the IPv4/IPv6
/// network match. This is the minimum the router processor needs to
/// recognise requests for its own addresses and to build replies (§3
/// notes the match field list is an extensible minimum set, not exhaustive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpOp {
    Request,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArpInfo {
    pub operation: ArpOp,
    pub sender_mac: [u8; 6],
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

/// One 802.1Q/802.1ad VLAN tag. The low 12 bits are the VLAN id; bit 0x1000
/// marks the tag as present (mirrors the datapath wire encoding in §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VlanTag(pub u16);

impl VlanTag {
    pub const PRESENT_BIT: u16 = 0x1000;

    pub fn new(vlan_id: u16) -> Self {
        Self((vlan_id & 0x0FFF) | Self::PRESENT_BIT)
    }

    pub fn vlan_id(self) -> u16 {
        self.0 & 0x0FFF
    }
}

/// Fragmentation state derived from the IP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FragmentType {
    #[default]
    None,
    First,
    Later,
}

/// IPv4 or IPv6 network-layer fields. Kept as one enum because a match never
/// carries both address families at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkMatch {
    V4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
    },
    V6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
    },
}

/// Transport-layer (L4) fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMatch {
    Tcp { src: u16, dst: u16 },
    Udp { src: u16, dst: u16 },
    Icmp { icmp_type: u8, icmp_code: u8 },
}

/// ICMP error payload (the inner IP header the ICMP error refers to),
/// carried only for the ICMP types §4.6 names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IcmpErrorPayload {
    pub icmp_type: u8,
    pub code: u8,
    pub data: Vec<u8>,
}

/// Mutable set of header fields with independent per-field presence.
///
/// Two matches are equal iff the set of present fields and their values
/// coincide (§3); `#[derive(PartialEq)]` gives us exactly that because
/// every field is `Option`-wrapped (or, for the VLAN stack and port-group
/// set, empty-is-absent).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WildcardMatch {
    pub in_port: Option<PortId>,
    pub eth_src: Option<[u8; 6]>,
    pub eth_dst: Option<[u8; 6]>,
    pub ether_type: Option<u16>,
    pub arp: Option<ArpInfo>,
    pub vlan_stack: Vec<VlanTag>,
    pub network: Option<NetworkMatch>,
    pub ip_proto: Option<u8>,
    pub ip_tos: Option<u8>,
    pub ip_ttl: Option<u8>,
    pub fragment_type: FragmentType,
    pub transport: Option<TransportMatch>,
    pub icmp_error: Option<IcmpErrorPayload>,
    pub port_groups: BTreeSet<PortGroupId>,
}

impl WildcardMatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(fields) clone, matching §3's invariant that a match is never
    /// mutated after being handed to a flow installer — callers clone
    /// before any mutation they need to preserve for diff computation.
    pub fn clone_for_mutation(&self) -> Self {
        self.clone()
    }

    pub fn is_broadcast_or_multicast_dst(&self) -> bool {
        match self.eth_dst {
            Some(mac) => mac == [0xff; 6] || (mac[0] & 0x01) != 0,
            None => false,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.network, Some(NetworkMatch::V4 { .. }))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.network, Some(NetworkMatch::V6 { .. }))
    }

    pub fn is_arp(&self) -> bool {
        self.ether_type == Some(0x0806)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_field_presence_and_value() {
        let mut a = WildcardMatch::new();
        let mut b = WildcardMatch::new();
        assert_eq!(a, b);
        a.ip_ttl = Some(64);
        assert_ne!(a, b);
        b.ip_ttl = Some(64);
        assert_eq!(a, b);
    }

    #[test]
    fn vlan_tag_present_bit() {
        let t = VlanTag::new(42);
        assert_eq!(t.vlan_id(), 42);
        assert_eq!(t.0 & VlanTag::PRESENT_BIT, VlanTag::PRESENT_BIT);
    }

    #[test]
    fn broadcast_detection() {
        let mut m = WildcardMatch::new();
        m.eth_dst = Some([0xff; 6]);
        assert!(m.is_broadcast_or_multicast_dst());
        m.eth_dst = Some([0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(m.is_broadcast_or_multicast_dst());
        m.eth_dst = Some([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert!(!m.is_broadcast_or_multicast_dst());
    }
}
