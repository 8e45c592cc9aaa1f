//! JSON shape of one synthetic packet, shared by `midonet-daemon`'s feed and
//! `midonet-cli`'s one-shot `simulate` command (§6 "Inputs into the
//! core"). A deliberately small subset of [`WildcardMatch`]'s field list —
//! enough to drive the conformance scenarios without a full packet-parser
//! DTO, which is out of scope (§1, netlink decode is a collaborator).

use std::net::IpAddr;

use serde::Deserialize;

use crate::match_key::{NetworkMatch, TransportMatch, WildcardMatch};

#[derive(Debug, Deserialize)]
pub struct PacketDto {
    pub input_port: u32,
    pub eth_src: [u8; 6],
    pub eth_dst: [u8; 6],
    pub ether_type: u16,
    #[serde(default)]
    pub src_ip: Option<IpAddr>,
    #[serde(default)]
    pub dst_ip: Option<IpAddr>,
    #[serde(default)]
    pub ip_proto: Option<u8>,
    #[serde(default)]
    pub ip_ttl: Option<u8>,
    #[serde(default)]
    pub src_port: Option<u16>,
    #[serde(default)]
    pub dst_port: Option<u16>,
    #[serde(default = "default_true")]
    pub has_cookie: bool,
    #[serde(default)]
    pub trace: bool,
    #[serde(default = "default_budget_millis")]
    pub budget_millis: u64,
}

fn default_true() -> bool {
    true
}

fn default_budget_millis() -> u64 {
    100
}

pub fn to_wcmatch(dto: &PacketDto) -> WildcardMatch {
    let mut m = WildcardMatch::new();
    m.eth_src = Some(dto.eth_src);
    m.eth_dst = Some(dto.eth_dst);
    m.ether_type = Some(dto.ether_type);
    m.ip_proto = dto.ip_proto;
    m.ip_ttl = dto.ip_ttl;

    if let (Some(src), Some(dst)) = (dto.src_ip, dto.dst_ip) {
        m.network = match (src, dst) {
            (IpAddr::V4(s), IpAddr::V4(d)) => Some(NetworkMatch::V4 { src: s, dst: d }),
            (IpAddr::V6(s), IpAddr::V6(d)) => Some(NetworkMatch::V6 { src: s, dst: d }),
            _ => None,
        };
    }

    if let (Some(sp), Some(dp)) = (dto.src_port, dto.dst_port) {
        m.transport = match dto.ip_proto {
            Some(6) => Some(TransportMatch::Tcp { src: sp, dst: dp }),
            Some(17) => Some(TransportMatch::Udp { src: sp, dst: dp }),
            _ => None,
        };
    }

    m
}
