//! Device processors (§4.4) plus the filter and fragmentation wrappers
//! the coordinator applies around them.

pub mod bridge;
pub mod fragmentation;
pub mod port_filter;
pub mod router;
pub mod vlan_bridge;

use midonet_core::action::Action;
use midonet_core::context::PacketContext;
use midonet_core::device::Device;

use crate::generated::GeneratedPacketEmitter;

/// Dispatch on the device tag (design notes: tagged variant
/// in place of inheritance, exhaustively matched here).
pub async fn process(device: &Device, ctx: &mut PacketContext, emitter: &dyn GeneratedPacketEmitter) -> Action {
    match device {
        Device::Bridge(b) => bridge::process(b, ctx),
        Device::Router(r) => router::process(r, ctx, emitter).await,
        Device::VlanBridge(v) => vlan_bridge::process(v, ctx),
    }
}
