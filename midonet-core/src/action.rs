//! The device-output `Action` union (§3, §4.4) — what a device
//! processor hands back to the Action Interpreter.

use crate::dp_action::DpAction;
use crate::types::{PortId, PortSetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToPort(PortId),
    ToPortSet(PortSetId),
    /// Sequential sub-simulations sharing the match at fork-start (§4.5
    /// Fork semantics) — never evaluated in parallel.
    Fork(Vec<Action>),
    /// The packet was fully handled by the device itself (e.g. an ARP/ICMP
    /// reply was emitted via the generated-packet path).
    Consumed,
    Drop(DropKind),
    /// A control-flow failure (missing chain, jump overflow, incompatible
    /// fork merge) — always folds into `Drop(Temporary)` or `NoOp` at the
    /// coordinator boundary (§7).
    ErrorDrop,
    /// Ether type is not IPv4/IPv6/ARP; yields a wide wildcard flow (§6).
    NotIpv4,
    DoDatapathAction(DpAction),
}
