//! Transport seam for replication.
//!
//! The core specifies the sync protocol, not the wire. Production wires a
//! real network behind this trait; tests inject deterministic peers and
//! fault injection.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::oplog::{SyncAck, SyncPayload};

/// Delivery of a sync payload to one peer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, node_id: &str, payload: &SyncPayload) -> Result<SyncAck>;
}

/// Acknowledges every send without delivering anywhere. The default for a
/// kernel running without real peers.
#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, node_id: &str, payload: &SyncPayload) -> Result<SyncAck> {
        Ok(SyncAck {
            node_id: node_id.to_string(),
            received_ops: payload.ops.len(),
        })
    }
}

/// Records every payload for inspection; individual peers can be marked as
/// failing to exercise partial-sync paths.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<(String, SyncPayload)>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future send to `node_id` fail.
    pub fn fail_node(&self, node_id: &str) {
        self.failing.lock().unwrap().insert(node_id.to_string());
    }

    /// Drain the recorded `(peer, payload)` deliveries.
    pub fn take_sent(&self) -> Vec<(String, SyncPayload)> {
        let mut sent = self.sent.lock().unwrap();
        std::mem::take(&mut *sent)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, node_id: &str, payload: &SyncPayload) -> Result<SyncAck> {
        if self.failing.lock().unwrap().contains(node_id) {
            bail!("peer {node_id} unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((node_id.to_string(), payload.clone()));
        Ok(SyncAck {
            node_id: node_id.to_string(),
            received_ops: payload.ops.len(),
        })
    }
}
