//! JSON topology snapshots, shared by `midonet-daemon` and `midonet-cli`.
//!
//! The real topology cache is a cluster service out of scope for this
//! system (§1); a standalone daemon or one-shot CLI run instead points
//! at a static snapshot file, loaded once into an [`InMemoryTopologyCache`].
//! Only bridges are representable here — router and VLAN-bridge topologies
//! carry enough state (routing tables, ARP caches, port-address maps) that
//! hand-authoring them as JSON is not worth it for this ambient loader;
//! build those programmatically against [`InMemoryTopologyCache`] directly
//! instead (see `midonet-conformance` for examples).

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use midonet_core::capability::MacLearningTable;
use midonet_core::device::{AdminState, Bridge, Device, Port, PortKind};
use midonet_core::error::{Error, Result};
use midonet_core::rule::{Chain, Condition, Rule, RuleAction};
use midonet_core::types::{ChainId, DatapathPortNo, DeviceId, PortGroupId, PortId, PortSetId};

use crate::InMemoryTopologyCache;

#[derive(Debug, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    bridges: Vec<BridgeDto>,
    #[serde(default)]
    chains: Vec<ChainDto>,
}

#[derive(Debug, Deserialize)]
struct BridgeDto {
    id: u32,
    #[serde(default)]
    inbound_filter: Option<u32>,
    #[serde(default)]
    outbound_filter: Option<u32>,
    flood_port_set_id: u32,
    ports: Vec<PortDto>,
}

#[derive(Debug, Deserialize)]
struct PortDto {
    id: u32,
    #[serde(default)]
    inbound_filter: Option<u32>,
    #[serde(default)]
    outbound_filter: Option<u32>,
    kind: PortKindDto,
    #[serde(default)]
    datapath_port_no: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PortKindDto {
    Exterior { #[serde(default)] port_groups: Vec<u32> },
    Interior { peer_id: u32 },
}

#[derive(Debug, Deserialize)]
struct ChainDto {
    id: u32,
    rules: Vec<RuleDto>,
}

#[derive(Debug, Deserialize)]
struct RuleDto {
    #[serde(rename = "match")]
    condition: ConditionDto,
    action: RuleActionDto,
}

/// A deliberately small condition vocabulary: the common filter-chain
/// predicates from §4.3, not the full `Condition` tree (`And`/`Or`/
/// `Not`/CIDR matches are composed programmatically, not from this file).
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ConditionDto {
    EthSrc { mac: [u8; 6] },
    EthDst { mac: [u8; 6] },
    EtherType { value: u16 },
    IpProto { value: u8 },
    Any,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RuleActionDto {
    Accept,
    Drop,
    Reject,
    Jump { chain_id: u32 },
}

fn nz(v: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(v).ok_or_else(|| Error::config("topology ids must be non-zero"))
}

fn port_kind(dto: PortKindDto) -> Result<PortKind> {
    Ok(match dto {
        PortKindDto::Exterior { port_groups } => PortKind::Exterior {
            port_groups: port_groups
                .into_iter()
                .map(|v| nz(v).map(PortGroupId::new))
                .collect::<Result<BTreeSet<_>>>()?,
        },
        PortKindDto::Interior { peer_id } => PortKind::Interior { peer_id: PortId::new(nz(peer_id)?) },
    })
}

fn condition(dto: ConditionDto) -> Condition {
    match dto {
        ConditionDto::EthSrc { mac } => Condition::EthSrc(mac),
        ConditionDto::EthDst { mac } => Condition::EthDst(mac),
        ConditionDto::EtherType { value } => Condition::EtherType(value),
        ConditionDto::IpProto { value } => Condition::IpProto(value),
        // `And` of zero conditions vacuously matches everything.
        ConditionDto::Any => Condition::And(Vec::new()),
    }
}

fn rule_action(dto: RuleActionDto) -> Result<RuleAction> {
    Ok(match dto {
        RuleActionDto::Accept => RuleAction::Accept,
        RuleActionDto::Drop => RuleAction::Drop,
        RuleActionDto::Reject => RuleAction::Reject,
        RuleActionDto::Jump { chain_id } => RuleAction::Jump(ChainId::new(nz(chain_id)?)),
    })
}

/// Loads a topology snapshot from a JSON file into a fresh in-memory cache.
pub fn load_topology(path: impl AsRef<Path>) -> Result<Arc<InMemoryTopologyCache>> {
    let data = std::fs::read_to_string(path)?;
    let file: TopologyFile = serde_json::from_str(&data).map_err(|e| Error::config(e.to_string()))?;
    let cache = InMemoryTopologyCache::new();

    for chain in file.chains {
        let rules = chain
            .rules
            .into_iter()
            .map(|r| {
                Ok(Rule { condition: condition(r.condition), nat: None, action: rule_action(r.action)? })
            })
            .collect::<Result<Vec<_>>>()?;
        cache.put_chain(Chain { id: ChainId::new(nz(chain.id)?), rules });
    }

    for bridge in file.bridges {
        let device_id = DeviceId::new(nz(bridge.id)?);
        for port in bridge.ports {
            cache.put_port(Port {
                id: PortId::new(nz(port.id)?),
                device_id,
                admin_state: AdminState::Up,
                kind: port_kind(port.kind)?,
                inbound_filter: port.inbound_filter.map(nz).transpose()?.map(ChainId::new),
                outbound_filter: port.outbound_filter.map(nz).transpose()?.map(ChainId::new),
                datapath_port_no: port.datapath_port_no.map(DatapathPortNo),
            });
        }
        cache.put_device(Device::Bridge(Bridge {
            id: device_id,
            admin_state: AdminState::Up,
            inbound_filter: bridge.inbound_filter.map(nz).transpose()?.map(ChainId::new),
            outbound_filter: bridge.outbound_filter.map(nz).transpose()?.map(ChainId::new),
            flood_port_set_id: PortSetId::new(nz(bridge.flood_port_set_id)?),
            mac_table: MacLearningTable::new(),
        }));
    }

    Ok(cache)
}
