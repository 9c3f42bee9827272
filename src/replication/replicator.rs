//! Replicator
//!
//! Wraps the AtomStore with per-atom version vectors, a pending-op log, and
//! merge/sync semantics. Replication is eventually consistent: an update
//! wins iff its counter on its own slot exceeds the local counter for that
//! slot; concurrent creates of the same identity are rejected and counted
//! as conflicts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::atomspace::{
    AtomStore, LinkTarget, Metadata, QueryMatch, QueryPattern, StoreError, TruthValue,
};
use crate::utils::Clock;

use super::oplog::{AtomOp, PendingOp, SyncPayload};
use super::transport::Transport;
use super::version::VersionVector;

/// Only `Eventual` is implemented; `Strong` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    Eventual,
    Strong,
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("consistency level {0:?} is not implemented")]
    UnsupportedConsistency(ConsistencyLevel),
}

/// A known cluster peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl PeerInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_sync: None,
        }
    }
}

/// Replication counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplicationStats {
    pub syncs: u64,
    pub ops_sent: u64,
    pub ops_applied: u64,
    /// Remote ops rejected by the version-vector test or by a concurrent
    /// create of the same identity.
    pub conflicts: u64,
    /// Remote link ops whose outgoing could not be resolved locally.
    pub invalid_refs: u64,
}

/// Result of one `sync` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Called within `sync_interval` of the last successful sync.
    TooSoon,
    Synced {
        ops: usize,
        peers: usize,
        failed_peers: usize,
    },
}

/// Result of replaying one remote batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub conflicts: usize,
    pub invalid_refs: usize,
}

/// The distributed layer over the AtomStore.
pub struct Replicator {
    store: AtomStore,
    node_id: String,
    peers: HashMap<String, PeerInfo>,
    versions: HashMap<Uuid, VersionVector>,
    pending: Vec<PendingOp>,
    last_sync: Option<DateTime<Utc>>,
    sync_interval: Duration,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    consistency: ConsistencyLevel,
    stats: ReplicationStats,
}

impl Replicator {
    pub fn new(
        store: AtomStore,
        node_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        sync_interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            node_id: node_id.into(),
            peers: HashMap::new(),
            versions: HashMap::new(),
            pending: Vec::new(),
            last_sync: None,
            sync_interval: Duration::from_std(sync_interval)
                .unwrap_or_else(|_| Duration::seconds(5)),
            transport,
            clock,
            consistency: ConsistencyLevel::Eventual,
            stats: ReplicationStats::default(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &AtomStore {
        &self.store
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    pub fn pending_ops(&self) -> &[PendingOp] {
        &self.pending
    }

    pub fn peers(&self) -> &HashMap<String, PeerInfo> {
        &self.peers
    }

    pub fn version_of(&self, id: Uuid) -> Option<&VersionVector> {
        self.versions.get(&id)
    }

    /// Select the consistency level. Only `Eventual` is accepted.
    pub fn set_consistency(&mut self, level: ConsistencyLevel) -> Result<(), ReplicationError> {
        match level {
            ConsistencyLevel::Eventual => {
                self.consistency = level;
                Ok(())
            }
            ConsistencyLevel::Strong => Err(ReplicationError::UnsupportedConsistency(level)),
        }
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    // ── Versioned mutations ──────────────────────────────────────────────

    /// Add (or upsert) a node, bumping the local version slot and logging a
    /// pending op when the call changed anything.
    pub fn add_node(
        &mut self,
        atom_type: &str,
        name: &str,
        truth: Option<TruthValue>,
        attention: Option<f64>,
        metadata: Option<Metadata>,
    ) -> Result<Uuid, StoreError> {
        let existed = self.store.get_node(atom_type, name).is_some();
        let id = self
            .store
            .add_node(atom_type, name, truth, attention, metadata)?;
        if !existed || truth.is_some() || attention.is_some() {
            let atom = self.store.get(id).expect("atom just added");
            let op = AtomOp::AddNode {
                id,
                atom_type: atom.atom_type.clone(),
                name: atom.name.clone().expect("nodes are named"),
                truth: atom.truth,
                attention: atom.attention,
                metadata: atom.metadata.clone(),
            };
            self.record_mutation(id, op);
        }
        Ok(id)
    }

    /// Add a link, replicating any ConceptNodes created for bare-name
    /// targets so the link's outgoing resolves on every replica.
    pub fn add_link(
        &mut self,
        link_type: &str,
        targets: &[LinkTarget],
        truth: Option<TruthValue>,
        attention: Option<f64>,
        metadata: Option<Metadata>,
    ) -> Result<Uuid, StoreError> {
        // Validate id targets up front so name resolution cannot leave
        // half-created nodes behind a failure.
        for target in targets {
            if let LinkTarget::Id(id) = target {
                if !self.store.contains(*id) {
                    return Err(StoreError::InvalidReference(*id));
                }
            }
        }

        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            let id = match target {
                LinkTarget::Id(id) => *id,
                LinkTarget::Name(name) => match self.store.get_node("ConceptNode", name) {
                    Some(atom) => atom.id,
                    None => self.add_node("ConceptNode", name, None, None, None)?,
                },
            };
            resolved.push(LinkTarget::Id(id));
        }

        let outgoing: Vec<Uuid> = resolved
            .iter()
            .map(|t| match t {
                LinkTarget::Id(id) => *id,
                LinkTarget::Name(_) => unreachable!("targets resolved above"),
            })
            .collect();
        let existed = self.store.find_link(link_type, &outgoing).is_some();
        let id = self
            .store
            .add_link(link_type, &resolved, truth, attention, metadata)?;
        if !existed {
            let atom = self.store.get(id).expect("link just added");
            let op = AtomOp::AddLink {
                id,
                link_type: atom.atom_type.clone(),
                outgoing: atom.outgoing.clone(),
                truth: atom.truth,
                attention: atom.attention,
                metadata: atom.metadata.clone(),
            };
            self.record_mutation(id, op);
        }
        Ok(id)
    }

    /// Overwrite an atom's attention, versioned and logged.
    pub fn set_attention(&mut self, id: Uuid, attention: f64) -> bool {
        if !self.store.set_attention(id, attention) {
            return false;
        }
        let attention = self.store.get(id).expect("atom exists").attention;
        self.record_mutation(id, AtomOp::SetAttention { id, attention });
        true
    }

    /// Attention spreading is a local heuristic; it is not versioned or
    /// replicated.
    pub fn spread_attention(&mut self, source: Uuid, factor: f64, depth: i32) {
        self.store.spread_attention(source, factor, depth);
    }

    /// Decay is a local heuristic; it is not versioned or replicated.
    pub fn decay_attention(&mut self) {
        self.store.decay_attention();
    }

    pub fn record_entelechy_failure(
        &mut self,
        description: &str,
        severity: f64,
    ) -> Result<Uuid, StoreError> {
        self.store.record_entelechy_failure(description, severity)
    }

    pub fn record_transcendence(&mut self, aspect: &str, insight: &str) -> Result<Uuid, StoreError> {
        self.store.record_transcendence(aspect, insight)
    }

    fn record_mutation(&mut self, id: Uuid, op: AtomOp) {
        let vector = self.versions.entry(id).or_default();
        vector.bump(&self.node_id);
        let snapshot = vector.clone();
        self.pending.push(PendingOp {
            op,
            version: snapshot,
            origin: self.node_id.clone(),
            timestamp: self.clock.now(),
        });
    }

    // ── Sync protocol ────────────────────────────────────────────────────

    /// Forward pending ops to every peer.
    ///
    /// Returns `TooSoon` without side effects when called within
    /// `sync_interval` of the last successful sync. Otherwise the pending
    /// list is drained atomically; per-peer transport failures are counted
    /// but never fatal.
    pub async fn sync(&mut self) -> SyncOutcome {
        let now = self.clock.now();
        if let Some(last) = self.last_sync {
            if now - last < self.sync_interval {
                return SyncOutcome::TooSoon;
            }
        }

        let ops = std::mem::take(&mut self.pending);
        let payload = SyncPayload {
            source: self.node_id.clone(),
            ops,
            versions: self.versions.clone(),
        };

        let mut failed_peers = 0;
        let transport = self.transport.clone();
        let peer_ids: Vec<String> = self.peers.keys().cloned().collect();
        for peer_id in &peer_ids {
            match transport.send(peer_id, &payload).await {
                Ok(ack) => {
                    debug!(peer = %peer_id, ops = ack.received_ops, "sync delivered");
                    if let Some(peer) = self.peers.get_mut(peer_id) {
                        peer.last_sync = Some(now);
                    }
                }
                Err(err) => {
                    warn!(peer = %peer_id, error = %err, "sync delivery failed");
                    failed_peers += 1;
                }
            }
        }

        self.last_sync = Some(now);
        self.stats.syncs += 1;
        self.stats.ops_sent += payload.ops.len() as u64;
        info!(
            ops = payload.ops.len(),
            peers = peer_ids.len(),
            failed_peers,
            "sync completed"
        );
        SyncOutcome::Synced {
            ops: payload.ops.len(),
            peers: peer_ids.len(),
            failed_peers,
        }
    }

    /// Replay a batch of mutations originating at another node.
    pub fn apply_remote_ops(&mut self, source: &str, ops: &[PendingOp]) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for pending in ops {
            match &pending.op {
                AtomOp::AddNode {
                    id,
                    atom_type,
                    name,
                    truth,
                    attention,
                    metadata,
                } => {
                    // Identity resolves by uuid first, then by (type, name)
                    // so the node-uniqueness invariant survives concurrent
                    // creates on different replicas.
                    let local_id = if self.store.contains(*id) {
                        Some(*id)
                    } else {
                        self.store.get_node(atom_type, name).map(|atom| atom.id)
                    };
                    match local_id {
                        None => {
                            match self.store.insert_remote_node(
                                *id,
                                atom_type,
                                name,
                                *truth,
                                *attention,
                                metadata.clone(),
                            ) {
                                Ok(()) => {
                                    summary.applied += 1;
                                    self.merge_version(*id, &pending.version);
                                }
                                Err(err) => {
                                    warn!(atom = %id, error = %err, "remote node rejected");
                                    summary.invalid_refs += 1;
                                }
                            }
                        }
                        Some(local) if local == *id => {
                            if self.should_apply(local, source, &pending.version) {
                                self.store.set_truth(local, *truth);
                                self.store.set_attention(local, *attention);
                                summary.applied += 1;
                            } else {
                                summary.conflicts += 1;
                            }
                            self.merge_version(local, &pending.version);
                        }
                        Some(local) => {
                            // Concurrent create of the same (type, name)
                            // under a different uuid: keep the local atom.
                            debug!(
                                atom_type = %atom_type,
                                name = %name,
                                source = %source,
                                "concurrent node create rejected"
                            );
                            summary.conflicts += 1;
                            self.merge_version(local, &pending.version);
                        }
                    }
                }
                AtomOp::AddLink {
                    id,
                    link_type,
                    outgoing,
                    truth,
                    attention,
                    metadata,
                } => {
                    if self.store.contains(*id) {
                        if self.should_apply(*id, source, &pending.version) {
                            self.store.set_truth(*id, *truth);
                            self.store.set_attention(*id, *attention);
                            summary.applied += 1;
                        } else {
                            summary.conflicts += 1;
                        }
                        self.merge_version(*id, &pending.version);
                    } else if let Some(local) = self.store.find_link(link_type, outgoing) {
                        summary.conflicts += 1;
                        self.merge_version(local, &pending.version);
                    } else {
                        match self.store.insert_remote_link(
                            *id,
                            link_type,
                            outgoing.clone(),
                            *truth,
                            *attention,
                            metadata.clone(),
                        ) {
                            Ok(()) => {
                                summary.applied += 1;
                                self.merge_version(*id, &pending.version);
                            }
                            Err(err) => {
                                warn!(atom = %id, error = %err, "remote link rejected");
                                summary.invalid_refs += 1;
                            }
                        }
                    }
                }
                AtomOp::SetAttention { id, attention } => {
                    if self.store.contains(*id) {
                        if self.should_apply(*id, source, &pending.version) {
                            self.store.set_attention(*id, *attention);
                            summary.applied += 1;
                        } else {
                            summary.conflicts += 1;
                        }
                        self.merge_version(*id, &pending.version);
                    } else {
                        summary.conflicts += 1;
                    }
                }
            }
        }

        self.stats.ops_applied += summary.applied as u64;
        self.stats.conflicts += summary.conflicts as u64;
        self.stats.invalid_refs += summary.invalid_refs as u64;
        summary
    }

    /// Apply a full sync payload: its ops, then its version snapshot for
    /// every atom known locally.
    pub fn apply_sync(&mut self, payload: &SyncPayload) -> ApplySummary {
        let summary = self.apply_remote_ops(&payload.source, &payload.ops);
        for (id, remote) in &payload.versions {
            if self.store.contains(*id) {
                self.merge_version(*id, remote);
            }
        }
        summary
    }

    /// An update wins iff its counter on its own slot exceeds the local
    /// counter for that slot.
    fn should_apply(&self, atom: Uuid, source: &str, remote: &VersionVector) -> bool {
        let local = self
            .versions
            .get(&atom)
            .map(|vector| vector.get(source))
            .unwrap_or(0);
        remote.get(source) > local
    }

    fn merge_version(&mut self, atom: Uuid, remote: &VersionVector) {
        self.versions.entry(atom).or_default().merge(remote);
    }

    // ── Query & membership ───────────────────────────────────────────────

    /// Local result, returned immediately; remote results are merged with
    /// `merge_query_results` when they arrive.
    pub fn distributed_query(&self, pattern: &QueryPattern) -> Vec<QueryMatch> {
        self.store.query(pattern)
    }

    /// De-duplicate merged results by atom UUID, local-first.
    pub fn merge_query_results(
        local: Vec<QueryMatch>,
        remote: Vec<QueryMatch>,
    ) -> Vec<QueryMatch> {
        let mut merged = local;
        for candidate in remote {
            if !merged.iter().any(|m| m.atom.id == candidate.atom.id) {
                merged.push(candidate);
            }
        }
        merged
    }

    /// Join a cluster through its leader. Replication stays passive; atoms
    /// flow on subsequent syncs.
    pub fn join_cluster(&mut self, leader_id: impl Into<String>, leader: PeerInfo) {
        let leader_id = leader_id.into();
        info!(leader = %leader_id, "joining cluster");
        self.peers.insert(leader_id, leader);
    }

    pub fn add_peer(&mut self, node_id: impl Into<String>, peer: PeerInfo) {
        self.peers.insert(node_id.into(), peer);
    }

    pub fn leave_cluster(&mut self) {
        info!(node = %self.node_id, "leaving cluster");
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::transport::{InMemoryTransport, NullTransport};
    use crate::utils::{ManualClock, SystemClock};

    fn replicator(node: &str) -> Replicator {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = AtomStore::new(10_000, 0.995, clock.clone());
        Replicator::new(
            store,
            node,
            Arc::new(NullTransport),
            clock,
            std::time::Duration::from_secs(5),
        )
    }

    #[test]
    fn local_mutations_bump_own_slot_and_log_ops() {
        let mut r = replicator("n1");
        let id = r
            .add_node("ConceptNode", "cat", Some(TruthValue::new(0.8, 0.9)), Some(0.6), None)
            .unwrap();

        assert_eq!(r.version_of(id).unwrap().get("n1"), 1);
        assert_eq!(r.pending_ops().len(), 1);

        r.set_attention(id, 0.9);
        assert_eq!(r.version_of(id).unwrap().get("n1"), 2);
        assert_eq!(r.pending_ops().len(), 2);
    }

    #[test]
    fn add_link_replicates_implicit_concept_nodes() {
        let mut r = replicator("n1");
        r.add_link("InheritanceLink", &["cat".into(), "animal".into()], None, None, None)
            .unwrap();
        // Two implicit node ops plus the link op.
        assert_eq!(r.pending_ops().len(), 3);
        let link_op = r
            .pending_ops()
            .iter()
            .find(|p| matches!(p.op, AtomOp::AddLink { .. }))
            .expect("link op logged");
        match &link_op.op {
            AtomOp::AddLink { outgoing, .. } => assert_eq!(outgoing.len(), 2),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn sync_drains_pending_and_respects_interval() {
        let clock = Arc::new(ManualClock::from_wall());
        let transport = Arc::new(InMemoryTransport::new());
        let store = AtomStore::new(100, 0.995, clock.clone() as Arc<dyn Clock>);
        let mut r = Replicator::new(
            store,
            "n1",
            transport.clone(),
            clock.clone(),
            std::time::Duration::from_secs(5),
        );
        r.add_peer("n2", PeerInfo::new("mem://n2"));
        r.add_node("ConceptNode", "cat", None, None, None).unwrap();

        let outcome = r.sync().await;
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                ops: 1,
                peers: 1,
                failed_peers: 0
            }
        );
        assert!(r.pending_ops().is_empty());
        assert_eq!(transport.sent_count(), 1);
        assert!(r.peers().get("n2").unwrap().last_sync.is_some());

        // Within the interval: gated.
        r.add_node("ConceptNode", "dog", None, None, None).unwrap();
        assert_eq!(r.sync().await, SyncOutcome::TooSoon);
        assert_eq!(r.pending_ops().len(), 1);

        clock.advance_secs(6);
        assert!(matches!(r.sync().await, SyncOutcome::Synced { ops: 1, .. }));
    }

    #[tokio::test]
    async fn sync_counts_unreachable_peers() {
        let clock = Arc::new(ManualClock::from_wall());
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_node("n3");
        let store = AtomStore::new(100, 0.995, clock.clone() as Arc<dyn Clock>);
        let mut r = Replicator::new(
            store,
            "n1",
            transport.clone(),
            clock,
            std::time::Duration::from_secs(5),
        );
        r.add_peer("n2", PeerInfo::new("mem://n2"));
        r.add_peer("n3", PeerInfo::new("mem://n3"));

        match r.sync().await {
            SyncOutcome::Synced {
                peers, failed_peers, ..
            } => {
                assert_eq!(peers, 2);
                assert_eq!(failed_peers, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(r.peers().get("n3").unwrap().last_sync.is_none());
    }

    #[test]
    fn replay_into_pristine_replica_reproduces_index() {
        let mut source = replicator("n1");
        source
            .add_node("ConceptNode", "cat", Some(TruthValue::new(0.7, 0.6)), Some(0.4), None)
            .unwrap();
        source
            .add_link("InheritanceLink", &["cat".into(), "animal".into()], None, None, None)
            .unwrap();

        let mut replica = replicator("n2");
        let summary = replica.apply_remote_ops("n1", source.pending_ops());

        assert_eq!(summary.conflicts, 0);
        assert_eq!(summary.invalid_refs, 0);
        assert!(replica.store().get_node("ConceptNode", "cat").is_some());
        assert!(replica.store().get_node("ConceptNode", "animal").is_some());
        assert_eq!(replica.store().len(), source.store().len());
        // Atom identity is preserved across replicas.
        let cat = source.store().get_node("ConceptNode", "cat").unwrap().id;
        assert!(replica.store().contains(cat));
    }

    #[test]
    fn concurrent_create_of_same_name_is_rejected_on_both_sides() {
        let mut a = replicator("a");
        let mut b = replicator("b");
        a.add_node("ConceptNode", "X", Some(TruthValue::new(0.9, 0.9)), None, None)
            .unwrap();
        b.add_node("ConceptNode", "X", Some(TruthValue::new(0.1, 0.1)), None, None)
            .unwrap();

        let from_a: Vec<PendingOp> = a.pending_ops().to_vec();
        let from_b: Vec<PendingOp> = b.pending_ops().to_vec();

        let at_a = a.apply_remote_ops("b", &from_b);
        let at_b = b.apply_remote_ops("a", &from_a);

        assert_eq!(at_a.conflicts, 1);
        assert_eq!(at_b.conflicts, 1);
        assert_eq!(a.stats().conflicts, 1);
        assert_eq!(b.stats().conflicts, 1);

        // Exactly one atom named X on each side, each keeping its local
        // truth value.
        assert_eq!(a.store().len(), 1);
        assert_eq!(b.store().len(), 1);
        assert_eq!(
            a.store().get_node("ConceptNode", "X").unwrap().truth,
            TruthValue::new(0.9, 0.9)
        );
    }

    #[test]
    fn stale_update_is_rejected_fresh_update_wins() {
        let mut source = replicator("n1");
        let id = source
            .add_node("ConceptNode", "cat", None, Some(0.5), None)
            .unwrap();
        let create_ops: Vec<PendingOp> = source.pending_ops().to_vec();

        let mut replica = replicator("n2");
        replica.apply_remote_ops("n1", &create_ops);

        // A fresh remote update (n1 slot advanced) applies.
        source.set_attention(id, 0.9);
        let update_ops: Vec<PendingOp> = source.pending_ops()[create_ops.len()..].to_vec();
        let summary = replica.apply_remote_ops("n1", &update_ops);
        assert_eq!(summary.applied, 1);
        assert_eq!(replica.store().get(id).unwrap().attention, 0.9);

        // Replaying the same batch is stale: slot no longer exceeds local.
        let summary = replica.apply_remote_ops("n1", &update_ops);
        assert_eq!(summary.conflicts, 1);
    }

    #[test]
    fn merge_query_results_dedupes_by_uuid() {
        let mut r = replicator("n1");
        r.add_node("ConceptNode", "cat", None, None, None).unwrap();
        let local = r.distributed_query(&QueryPattern::new().of_type("ConceptNode"));
        let remote = local.clone();
        let merged = Replicator::merge_query_results(local, remote);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn strong_consistency_is_rejected() {
        let mut r = replicator("n1");
        assert!(r.set_consistency(ConsistencyLevel::Strong).is_err());
        assert_eq!(r.consistency(), ConsistencyLevel::Eventual);
    }

    #[test]
    fn membership_updates_peer_map_only() {
        let mut r = replicator("n1");
        r.join_cluster("leader", PeerInfo::new("mem://leader"));
        assert_eq!(r.peers().len(), 1);
        r.leave_cluster();
        assert!(r.peers().is_empty());
    }
}
