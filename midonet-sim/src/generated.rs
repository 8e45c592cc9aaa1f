//! The "emit generated packet" capability (§4.4, §5 Reentrancy).
//!
//! Device processors that need to synthesize a reply (ARP, ICMP, or hand off
//! to the DHCP/ARP replier subsystems named as out-of-scope collaborators in
//! §1) call [`GeneratedPacketEmitter::emit`] instead of simulating
//! inline. The coordinator is not reentrant on the same `PacketContext`
//! (§5): the emitted packet is simulated, if at all, as an entirely
//! separate invocation via the `egress_port` entry point (§4.5).

use async_trait::async_trait;

use midonet_core::match_key::WildcardMatch;
use midonet_core::types::PortId;

/// A packet synthesized by a device during simulation, destined to re-enter
/// the coordinator at `egress_port` as a brand new simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPacket {
    pub wcmatch: WildcardMatch,
    pub egress_port: PortId,
}

#[async_trait]
pub trait GeneratedPacketEmitter: Send + Sync {
    async fn emit(&self, packet: GeneratedPacket);
}

/// Test/tooling collector that just records what was emitted.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    emitted: tokio::sync::Mutex<Vec<GeneratedPacket>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<GeneratedPacket> {
        std::mem::take(&mut *self.emitted.lock().await)
    }
}

#[async_trait]
impl GeneratedPacketEmitter for RecordingEmitter {
    async fn emit(&self, packet: GeneratedPacket) {
        self.emitted.lock().await.push(packet);
    }
}

/// Hands generated packets off on an unbounded channel for a separate task
/// to re-inject as their own `egress_port` simulations (§5 reentrancy:
/// never simulated inline on the originating `PacketContext`). The daemon's
/// production emitter.
#[derive(Debug, Clone)]
pub struct ChannelEmitter(tokio::sync::mpsc::UnboundedSender<GeneratedPacket>);

impl ChannelEmitter {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<GeneratedPacket>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

#[async_trait]
impl GeneratedPacketEmitter for ChannelEmitter {
    async fn emit(&self, packet: GeneratedPacket) {
        if self.0.send(packet).is_err() {
            tracing::debug!("generated-packet receiver dropped, discarding");
        }
    }
}
