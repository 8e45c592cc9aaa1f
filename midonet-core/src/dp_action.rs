//! Datapath action wire shape (§6, §4.6). The encoding to netlink
//! attributes belongs to a collaborator outside this crate's scope; this is
//! only the ordered, structured action list the coordinator produces.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::types::{DatapathPortNo, PortSetId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetKeyAction {
    Ethernet {
        src: [u8; 6],
        dst: [u8; 6],
    },
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        proto: u8,
        tos: u8,
        ttl: u8,
    },
    Ipv6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        proto: u8,
        hop_limit: u8,
    },
    Tcp {
        src: u16,
        dst: u16,
    },
    Udp {
        src: u16,
        dst: u16,
    },
    IcmpError {
        icmp_type: u8,
        code: u8,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpAction {
    Output(DatapathPortNo),
    OutputPortSet(PortSetId),
    PopVlan,
    PushVlan { tpid: u16, tci: u16 },
    SetKey(SetKeyAction),
}
