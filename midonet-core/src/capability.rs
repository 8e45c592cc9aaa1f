//! Thread-safe capability handles for state that is logically owned by the
//! topology subsystem but mutated by device processors as a side effect of
//! simulation (§4.4, §5). Modeled as cheap `Arc`-shared handles around
//! `dashmap::DashMap`, never locked across an `.await` point.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::match_key::{NetworkMatch, TransportMatch, WildcardMatch};
use crate::types::{DeviceId, PortId};

/// Bridge MAC-learning table: source-MAC -> ingress port, consulted and
/// updated by the bridge processor on every frame (§4.4 Bridge steps 2-3).
#[derive(Debug, Clone, Default)]
pub struct MacLearningTable(Arc<DashMap<[u8; 6], PortId>>);

impl MacLearningTable {
    pub fn new() -> Self {
        Self(Arc::new(DashMap::new()))
    }

    pub fn learn(&self, mac: [u8; 6], port: PortId) {
        self.0.insert(mac, port);
    }

    pub fn lookup(&self, mac: [u8; 6]) -> Option<PortId> {
        self.0.get(&mac).map(|e| *e.value())
    }
}

/// Router ARP cache: resolved-IP -> next-hop MAC.
#[derive(Debug, Clone, Default)]
pub struct ArpCache(Arc<DashMap<IpAddr, [u8; 6]>>);

impl ArpCache {
    pub fn new() -> Self {
        Self(Arc::new(DashMap::new()))
    }

    pub fn get(&self, ip: IpAddr) -> Option<[u8; 6]> {
        self.0.get(&ip).map(|e| *e.value())
    }

    pub fn put(&self, ip: IpAddr, mac: [u8; 6]) {
        self.0.insert(ip, mac);
    }
}

/// One routing table entry. Longest-prefix-match wins; ties broken by the
/// order entries were inserted (first match), matching a conventional FIB.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub prefix: IpAddr,
    pub prefix_len: u8,
    pub next_hop: Option<IpAddr>,
    pub out_port: PortId,
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

/// A device's routing table, shared behind an `Arc` and replaced wholesale
/// on topology updates (the coordinator only ever reads it).
#[derive(Debug, Clone, Default)]
pub struct RoutingTable(Arc<Vec<RouteEntry>>);

impl RoutingTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self(Arc::new(entries))
    }

    /// Longest-prefix match over the destination address.
    pub fn lookup(&self, dst: IpAddr) -> Option<&RouteEntry> {
        self.0
            .iter()
            .filter(|e| prefix_matches(dst, e.prefix, e.prefix_len))
            .max_by_key(|e| e.prefix_len)
    }
}

/// 5-tuple plus owning device, the connection-tracking key (§9 design
/// notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnTrackKey {
    pub device_id: crate::types::DeviceId,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub proto: u8,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ConnTrackKey {
    /// The key as seen from the return direction: addresses and ports swapped.
    pub fn reversed(self) -> Self {
        Self {
            device_id: self.device_id,
            src: self.dst,
            dst: self.src,
            proto: self.proto,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

/// Builds the connection-tracking key for a match that carries a full
/// 5-tuple (IPv4/IPv6 addresses, protocol, TCP/UDP ports); `None` for
/// anything else (ARP, ICMP, non-IP) since those have no forward/return
/// direction to track. Shared by every real entry point so a synthetic
/// packet and its re-injected replies key into the same `ConnCache`.
pub fn conn_track_key(device_id: DeviceId, m: &WildcardMatch) -> Option<ConnTrackKey> {
    let (src, dst) = match m.network? {
        NetworkMatch::V4 { src, dst } => (IpAddr::V4(src), IpAddr::V4(dst)),
        NetworkMatch::V6 { src, dst } => (IpAddr::V6(src), IpAddr::V6(dst)),
    };
    let proto = m.ip_proto?;
    let (src_port, dst_port) = match m.transport? {
        TransportMatch::Tcp { src, dst } => (src, dst),
        TransportMatch::Udp { src, dst } => (src, dst),
        TransportMatch::Icmp { .. } => return None,
    };
    Some(ConnTrackKey { device_id, src, dst, proto, src_port, dst_port })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Forward,
    Return,
}

#[derive(Debug, Clone, Copy)]
struct ConnEntry {
    direction: FlowDirection,
    expires_at: Instant,
}

/// Connection-tracking capability: records which direction of a 5-tuple was
/// seen first, so later packets can be classified forward/return (§4.1
/// `is_forward_flow`).
#[derive(Debug, Clone, Default)]
pub struct ConnCache(Arc<DashMap<ConnTrackKey, ConnEntry>>);

impl ConnCache {
    pub fn new() -> Self {
        Self(Arc::new(DashMap::new()))
    }

    pub fn put(&self, key: ConnTrackKey, direction: FlowDirection, ttl: Duration) {
        self.0.insert(
            key,
            ConnEntry {
                direction,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: ConnTrackKey) -> Option<FlowDirection> {
        let entry = self.0.get(&key)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[test]
    fn mac_table_learn_lookup() {
        let t = MacLearningTable::new();
        let p = PortId::new(NonZeroU32::new(1).unwrap());
        t.learn([1, 2, 3, 4, 5, 6], p);
        assert_eq!(t.lookup([1, 2, 3, 4, 5, 6]), Some(p));
        assert_eq!(t.lookup([0; 6]), None);
    }

    #[test]
    fn longest_prefix_match() {
        let p = PortId::new(NonZeroU32::new(1).unwrap());
        let p2 = PortId::new(NonZeroU32::new(2).unwrap());
        let table = RoutingTable::new(vec![
            RouteEntry {
                prefix: "10.0.0.0".parse().unwrap(),
                prefix_len: 8,
                next_hop: None,
                out_port: p,
            },
            RouteEntry {
                prefix: "10.0.1.0".parse().unwrap(),
                prefix_len: 24,
                next_hop: None,
                out_port: p2,
            },
        ]);
        let route = table.lookup("10.0.1.5".parse().unwrap()).unwrap();
        assert_eq!(route.out_port, p2);
        let route = table.lookup("10.0.2.5".parse().unwrap()).unwrap();
        assert_eq!(route.out_port, p);
        assert!(table.lookup("192.168.0.1".parse().unwrap()).is_none());
    }

    #[test]
    fn conn_track_key_requires_a_full_5_tuple() {
        let device_id = DeviceId::new(NonZeroU32::new(1).unwrap());

        let mut m = WildcardMatch::new();
        m.network = Some(NetworkMatch::V4 {
            src: "10.0.0.1".parse().unwrap(),
            dst: "10.0.0.2".parse().unwrap(),
        });
        m.ip_proto = Some(6);
        m.transport = Some(TransportMatch::Tcp { src: 1234, dst: 80 });
        let key = conn_track_key(device_id, &m).unwrap();
        assert_eq!(key.src_port, 1234);
        assert_eq!(key.dst_port, 80);

        // ICMP has no ports to track a direction by.
        let mut icmp = WildcardMatch::new();
        icmp.network = m.network;
        icmp.ip_proto = Some(1);
        icmp.transport = Some(TransportMatch::Icmp { icmp_type: 0, icmp_code: 0 });
        assert!(conn_track_key(device_id, &icmp).is_none());

        assert!(conn_track_key(device_id, &WildcardMatch::new()).is_none());
    }

    #[test]
    fn conn_cache_direction() {
        let cache = ConnCache::new();
        let key = ConnTrackKey {
            device_id: crate::types::DeviceId::new(NonZeroU32::new(1).unwrap()),
            src: "10.0.0.1".parse().unwrap(),
            dst: "10.0.0.2".parse().unwrap(),
            proto: 6,
            src_port: 1234,
            dst_port: 80,
        };
        cache.put(key, FlowDirection::Forward, Duration::from_secs(30));
        assert_eq!(cache.get(key), Some(FlowDirection::Forward));
        assert_eq!(cache.get(key.reversed()), None);
    }
}
