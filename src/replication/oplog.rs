//! Replication op log and sync payloads.
//!
//! Every local mutation routed through the replicator is recorded as a
//! pending op tagged with the version vector observed at mutation time.
//! Link ops carry the full outgoing UUID list so link replication is
//! exercised on the receiving side, not merely counted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::atomspace::{Metadata, TruthValue};

use super::version::VersionVector;

/// A single replicated mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtomOp {
    AddNode {
        id: Uuid,
        atom_type: String,
        name: String,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
    },
    AddLink {
        id: Uuid,
        link_type: String,
        outgoing: Vec<Uuid>,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
    },
    SetAttention {
        id: Uuid,
        attention: f64,
    },
}

impl AtomOp {
    /// The atom this op targets.
    pub fn atom_id(&self) -> Uuid {
        match self {
            AtomOp::AddNode { id, .. } => *id,
            AtomOp::AddLink { id, .. } => *id,
            AtomOp::SetAttention { id, .. } => *id,
        }
    }
}

/// A mutation awaiting sync, tagged with its origin and the version vector
/// observed when it was made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOp {
    pub op: AtomOp,
    pub version: VersionVector,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
}

/// The unit a replicator forwards to its peers on sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub source: String,
    pub ops: Vec<PendingOp>,
    /// Snapshot of the sender's per-atom version vectors at sync time.
    pub versions: HashMap<Uuid, VersionVector>,
}

/// Acknowledgement returned by a transport delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAck {
    pub node_id: String,
    pub received_ops: usize,
}
