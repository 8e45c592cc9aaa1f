//! Per-packet simulation: rule chain evaluator, device processors, action
//! interpreter and the [`Coordinator`] loop that ties them together (spec
//! §4 "Simulation Core").
//!
//! This crate never touches a real datapath. It answers one question —
//! given a topology snapshot and a packet's wildcard match, what would
//! happen to it — and hands back either a flow to install, a packet to
//! send once, or nothing at all (§4.5, §7).

pub mod callback;
pub mod coordinator;
pub mod devices;
pub mod diff;
pub mod generated;
pub mod rules;

pub use callback::{CallbackRunner, RecordingCallbackRunner, TracingCallbackRunner};
pub use coordinator::{Coordinator, SimulationRequest};
pub use devices::fragmentation::{self, FragmentDecision};
pub use devices::port_filter::apply_filter;
pub use diff::diff_to_actions;
pub use generated::{ChannelEmitter, GeneratedPacket, GeneratedPacketEmitter, RecordingEmitter};
pub use rules::{ChainOutcome, RuleChainEvaluator};
