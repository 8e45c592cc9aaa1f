//! Shared fixture builders for the conformance suite under `tests/`.
//!
//! Every test here drives a real [`midonet_sim::Coordinator`] against an
//! in-memory topology built directly through [`InMemoryTopologyCache`]'s
//! `put_*` methods, never the JSON loader — routers and VLAN bridges aren't
//! representable in the JSON snapshot format (see DESIGN.md).

pub mod fixtures;
