#![forbid(unsafe_code)]

//! Core types shared across the MidoNet-core simulation workspace:
//! the wildcard match, packet context, device/rule model, datapath action
//! shape and simulation result, plus the tunable configuration and error
//! domain for the surrounding ambient code.
//!
//! Design goals (see ``):
//! - Tagged-variant device model, no dynamic dispatch.
//! - Capability handles for externally-owned shared tables (MAC learning,
//!   ARP cache, connection cache), never locked across an `.await`.
//! - A packet context whose mutation discipline is checkable at compile
//!   time via a small `Open -> Frozen -> Consumed` state machine.

pub mod action;
pub mod capability;
pub mod config;
pub mod context;
pub mod device;
pub mod dp_action;
pub mod error;
pub mod match_key;
pub mod result;
pub mod rule;
pub mod types;

#[cfg(feature = "json")]
pub mod packet_dto;

pub use action::{Action, DropKind};
pub use context::{FrozenError, PacketContext};
pub use dp_action::{DpAction, SetKeyAction};
pub use error::{Error, Result};
pub use match_key::{ArpInfo, ArpOp, FragmentType, NetworkMatch, TransportMatch, VlanTag, WildcardMatch};
pub use result::{FlowRemovedCallback, FlowTag, SimulationResult, WildcardFlow};
pub use rule::{Chain, Condition, NatTransform, Rule, RuleAction};
