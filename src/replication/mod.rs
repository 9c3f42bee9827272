//! Replication Module
//!
//! CRDT-style distributed layer over the AtomStore: version vectors, a
//! pending-op log, and the sync/apply protocol. Transport is abstracted so
//! tests can inject deterministic peers.

mod oplog;
mod replicator;
mod transport;
mod version;

pub use oplog::{AtomOp, PendingOp, SyncAck, SyncPayload};
pub use replicator::{
    ApplySummary, ConsistencyLevel, PeerInfo, ReplicationError, ReplicationStats, Replicator,
    SyncOutcome,
};
pub use transport::{InMemoryTransport, NullTransport, Transport};
pub use version::VersionVector;
