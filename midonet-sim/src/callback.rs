//! The "run flow-removed callbacks now" capability (§4.5 `emit` step 3,
//! §8 "∀ simulation S producing NoOp: all flow-removed callbacks of S fire
//! exactly once synchronously").
//!
//! When a simulation ends without installing a flow there is nothing for a
//! flow installer to fire callbacks on removal of, so the coordinator runs
//! them itself through this capability instead.

use async_trait::async_trait;

use midonet_core::result::FlowRemovedCallback;

#[async_trait]
pub trait CallbackRunner: Send + Sync {
    async fn run(&self, callback: FlowRemovedCallback);
}

/// Default runner: logs and drops. Real ARP-retry/conntrack-refresh wiring
/// is a collaborator outside this crate's scope (§1).
#[derive(Debug, Default)]
pub struct TracingCallbackRunner;

#[async_trait]
impl CallbackRunner for TracingCallbackRunner {
    async fn run(&self, callback: FlowRemovedCallback) {
        tracing::debug!(?callback, "running flow-removed callback synchronously");
    }
}

#[derive(Debug, Default)]
pub struct RecordingCallbackRunner {
    ran: tokio::sync::Mutex<Vec<FlowRemovedCallback>>,
}

impl RecordingCallbackRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<FlowRemovedCallback> {
        std::mem::take(&mut *self.ran.lock().await)
    }
}

#[async_trait]
impl CallbackRunner for RecordingCallbackRunner {
    async fn run(&self, callback: FlowRemovedCallback) {
        self.ran.lock().await.push(callback);
    }
}
