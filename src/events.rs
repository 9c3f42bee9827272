//! Kernel event bus
//!
//! Broadcast channel for lifecycle and replication telemetry. The bus is
//! owned by the kernel instance, never a global, and it is lossy: events
//! published with no subscribers are dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::process::Pid;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 1024;

/// Telemetry emitted by the kernel as it works.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum KernelEvent {
    ProcessSpawned { pid: Pid, name: String },
    ProcessTerminated { pid: Pid },
    EmotionShifted { pid: Pid, kind: String },
    ConsciousnessShifted { pid: Pid, level: u8 },
    ThoughtSent { from: Pid, to: Pid },
    SyncCompleted { ops: usize, peers: usize },
    ConflictsRejected { count: usize, origin: String },
    AttentionDecayed,
    EntelechyFailure { atom: Uuid },
}

pub struct KernelEventBus {
    tx: broadcast::Sender<KernelEvent>,
}

impl KernelEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: KernelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }
}

impl Default for KernelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = KernelEventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(KernelEvent::ProcessSpawned {
            pid: 1,
            name: "a".into(),
        });
        match rx.recv().await.unwrap() {
            KernelEvent::ProcessSpawned { pid, .. } => assert_eq!(pid, 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = KernelEventBus::new();
        bus.publish(KernelEvent::AttentionDecayed);
    }
}
