//! Rule/chain data model (§3 "Rule", §4.3).

use std::net::IpAddr;

use crate::match_key::WildcardMatch;
use crate::types::{ChainId, PortGroupId};

/// A pure predicate over the current match plus port-group membership.
/// Conditions never mutate state — evaluation is side-effect free (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    EthSrc([u8; 6]),
    EthDst([u8; 6]),
    EtherType(u16),
    /// Matches when the match's network source falls in this CIDR.
    NwSrcPrefix { addr: IpAddr, prefix_len: u8 },
    /// Matches when the match's network destination falls in this CIDR.
    NwDstPrefix { addr: IpAddr, prefix_len: u8 },
    IpProto(u8),
    TpSrcRange(u16, u16),
    TpDstRange(u16, u16),
    InPortGroup(PortGroupId),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

fn prefix_matches(addr: IpAddr, prefix: IpAddr, prefix_len: u8) -> bool {
    match (addr, prefix) {
        (IpAddr::V4(a), IpAddr::V4(p)) => {
            if prefix_len == 0 {
                return true;
            }
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            (u32::from(a) & mask) == (u32::from(p) & mask)
        }
        (IpAddr::V6(a), IpAddr::V6(p)) => {
            if prefix_len == 0 {
                return true;
            }
            let a = u128::from(a);
            let p = u128::from(p);
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            (a & mask) == (p & mask)
        }
        _ => false,
    }
}

impl Condition {
    pub fn matches(&self, m: &WildcardMatch) -> bool {
        use crate::match_key::{NetworkMatch, TransportMatch};
        match self {
            Condition::EthSrc(mac) => m.eth_src == Some(*mac),
            Condition::EthDst(mac) => m.eth_dst == Some(*mac),
            Condition::EtherType(et) => m.ether_type == Some(*et),
            Condition::NwSrcPrefix { addr, prefix_len } => match &m.network {
                Some(NetworkMatch::V4 { src, .. }) => {
                    prefix_matches(IpAddr::V4(*src), *addr, *prefix_len)
                }
                Some(NetworkMatch::V6 { src, .. }) => {
                    prefix_matches(IpAddr::V6(*src), *addr, *prefix_len)
                }
                None => false,
            },
            Condition::NwDstPrefix { addr, prefix_len } => match &m.network {
                Some(NetworkMatch::V4 { dst, .. }) => {
                    prefix_matches(IpAddr::V4(*dst), *addr, *prefix_len)
                }
                Some(NetworkMatch::V6 { dst, .. }) => {
                    prefix_matches(IpAddr::V6(*dst), *addr, *prefix_len)
                }
                None => false,
            },
            Condition::IpProto(proto) => m.ip_proto == Some(*proto),
            Condition::TpSrcRange(lo, hi) => match m.transport {
                Some(TransportMatch::Tcp { src, .. }) | Some(TransportMatch::Udp { src, .. }) => {
                    src >= *lo && src <= *hi
                }
                _ => false,
            },
            Condition::TpDstRange(lo, hi) => match m.transport {
                Some(TransportMatch::Tcp { dst, .. }) | Some(TransportMatch::Udp { dst, .. }) => {
                    dst >= *lo && dst <= *hi
                }
                _ => false,
            },
            Condition::InPortGroup(pg) => m.port_groups.contains(pg),
            Condition::And(cs) => cs.iter().all(|c| c.matches(m)),
            Condition::Or(cs) => cs.iter().any(|c| c.matches(m)),
            Condition::Not(c) => !c.matches(m),
        }
    }
}

/// A NAT transform, applied in-place to the match before the rule's action
/// takes effect (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatTransform {
    Snat { new_src: IpAddr, new_src_port: Option<u16> },
    Dnat { new_dst: IpAddr, new_dst_port: Option<u16> },
}

impl NatTransform {
    pub fn apply(&self, m: &mut WildcardMatch) {
        use crate::match_key::{NetworkMatch, TransportMatch};
        match self {
            NatTransform::Snat { new_src, new_src_port } => {
                m.network = match (&m.network, new_src) {
                    (Some(NetworkMatch::V4 { dst, .. }), IpAddr::V4(s)) => {
                        Some(NetworkMatch::V4 { src: *s, dst: *dst })
                    }
                    (Some(NetworkMatch::V6 { dst, .. }), IpAddr::V6(s)) => {
                        Some(NetworkMatch::V6 { src: *s, dst: *dst })
                    }
                    (other, _) => other.clone(),
                };
                if let Some(port) = new_src_port {
                    m.transport = match m.transport {
                        Some(TransportMatch::Tcp { dst, .. }) => {
                            Some(TransportMatch::Tcp { src: *port, dst })
                        }
                        Some(TransportMatch::Udp { dst, .. }) => {
                            Some(TransportMatch::Udp { src: *port, dst })
                        }
                        other => other,
                    };
                }
            }
            NatTransform::Dnat { new_dst, new_dst_port } => {
                m.network = match (&m.network, new_dst) {
                    (Some(NetworkMatch::V4 { src, .. }), IpAddr::V4(d)) => {
                        Some(NetworkMatch::V4 { src: *src, dst: *d })
                    }
                    (Some(NetworkMatch::V6 { src, .. }), IpAddr::V6(d)) => {
                        Some(NetworkMatch::V6 { src: *src, dst: *d })
                    }
                    (other, _) => other.clone(),
                };
                if let Some(port) = new_dst_port {
                    m.transport = match m.transport {
                        Some(TransportMatch::Tcp { src, .. }) => {
                            Some(TransportMatch::Tcp { src, dst: *port })
                        }
                        Some(TransportMatch::Udp { src, .. }) => {
                            Some(TransportMatch::Udp { src, dst: *port })
                        }
                        other => other,
                    };
                }
            }
        }
    }
}

/// A rule's terminal or control-flow disposition (§3 "Rule", §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Accept,
    Drop,
    Reject,
    Jump(ChainId),
    Return,
    Continue,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub condition: Condition,
    pub nat: Option<NatTransform>,
    pub action: RuleAction,
}

/// An ordered list of rules addressable by id (§3 "Chain").
#[derive(Debug, Clone)]
pub struct Chain {
    pub id: ChainId,
    pub rules: Vec<Rule>,
}
