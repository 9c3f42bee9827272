//! CognitiveKernel
//!
//! The single-process executive: owns the replicated atom store, the
//! process table, the scheduler, and the namespace, and exposes the
//! syscall surface plus `open`/`ps`/`kill` to drivers. Control flow is
//! strictly top-down; no lower layer calls back into the kernel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::atomspace::{AtomStore, StoreError};
use crate::events::{KernelEvent, KernelEventBus};
use crate::namespace::{Namespace, NamespaceError, NamespaceNode};
use crate::process::{Pid, ProcessSummary, ProcessTable};
use crate::replication::{
    ApplySummary, NullTransport, PeerInfo, PendingOp, Replicator, SyncOutcome, Transport,
};
use crate::sched::{Scheduler, SchedulerPolicy};
use crate::utils::{Clock, RandomSource, SeededRandom, SystemClock, ThreadRandom};

/// Kernel construction parameters. Defaults follow the embedded-library
/// contract: 5 s sync interval, consciousness-aware scheduling, 100 ms
/// quantum, one million atoms, 0.995 attention decay.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub node_id: String,
    pub peers: HashMap<String, PeerInfo>,
    pub sync_interval: std::time::Duration,
    pub scheduler_policy: SchedulerPolicy,
    pub time_quantum: std::time::Duration,
    pub atom_capacity: usize,
    pub attention_decay: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
            peers: HashMap::new(),
            sync_interval: std::time::Duration::from_secs(5),
            scheduler_policy: SchedulerPolicy::ConsciousnessAware,
            time_quantum: std::time::Duration::from_millis(100),
            atom_capacity: 1_000_000,
            attention_decay: 0.995,
        }
    }
}

impl KernelConfig {
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_peer(mut self, node_id: impl Into<String>, peer: PeerInfo) -> Self {
        self.peers.insert(node_id.into(), peer);
        self
    }

    pub fn with_sync_interval(mut self, interval: std::time::Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_scheduler_policy(mut self, policy: SchedulerPolicy) -> Self {
        self.scheduler_policy = policy;
        self
    }

    pub fn with_time_quantum(mut self, quantum: std::time::Duration) -> Self {
        self.time_quantum = quantum;
        self
    }

    pub fn with_atom_capacity(mut self, capacity: usize) -> Self {
        self.atom_capacity = capacity;
        self
    }

    pub fn with_attention_decay(mut self, decay: f64) -> Self {
        self.attention_decay = decay.clamp(0.0, 1.0);
        self
    }
}

/// Aggregate kernel statistics.
#[derive(Debug, Clone, Serialize)]
pub struct KernelStats {
    pub syscalls: u64,
    pub knowledge_queries: u64,
    pub live_processes: usize,
    pub atoms: usize,
    pub ready: usize,
    pub blocked: usize,
    pub replication: crate::replication::ReplicationStats,
}

/// A resolved namespace handle.
pub enum KernelObject<'a> {
    Dir(Vec<String>),
    Value(&'a serde_json::Value),
    Syscall(&'a str),
    Atomspace(&'a AtomStore),
}

impl std::fmt::Debug for KernelObject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelObject::Dir(children) => f.debug_tuple("Dir").field(children).finish(),
            KernelObject::Value(value) => f.debug_tuple("Value").field(value).finish(),
            KernelObject::Syscall(name) => f.debug_tuple("Syscall").field(name).finish(),
            KernelObject::Atomspace(store) => f
                .debug_struct("Atomspace")
                .field("atoms", &store.len())
                .finish(),
        }
    }
}

/// The cognitive kernel. Exclusive owner of all processes and atoms;
/// drivers hold PIDs and atom UUIDs only.
pub struct CognitiveKernel {
    pub(crate) replicator: Replicator,
    pub(crate) processes: ProcessTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) namespace: Namespace,
    pub(crate) events: KernelEventBus,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: Box<dyn RandomSource>,
    pub(crate) syscall_count: u64,
    pub(crate) knowledge_queries: u64,
    pub(crate) resource_counter: u64,
    /// Cognitive resource id -> owning PID.
    pub(crate) resources: HashMap<String, Pid>,
}

impl CognitiveKernel {
    /// A kernel with the real clock, OS randomness, and a transport that
    /// acknowledges without delivering.
    pub fn new(config: KernelConfig) -> Self {
        Self::with_collaborators(config, Arc::new(SystemClock), Arc::new(NullTransport), None)
    }

    /// Full collaborator injection; `seed` makes randomness deterministic.
    pub fn with_collaborators(
        config: KernelConfig,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
        seed: Option<u64>,
    ) -> Self {
        let now = clock.now();
        let store = AtomStore::new(config.atom_capacity, config.attention_decay, clock.clone());
        let mut replicator = Replicator::new(
            store,
            config.node_id.clone(),
            transport,
            clock.clone(),
            config.sync_interval,
        );
        for (node_id, peer) in &config.peers {
            replicator.add_peer(node_id.clone(), peer.clone());
        }

        let (scheduler_rng, kernel_rng): (Box<dyn RandomSource>, Box<dyn RandomSource>) =
            match seed {
                Some(seed) => (
                    Box::new(SeededRandom::new(seed)),
                    Box::new(SeededRandom::new(seed.wrapping_add(1))),
                ),
                None => (Box::new(ThreadRandom::new()), Box::new(ThreadRandom::new())),
            };

        info!(node = %config.node_id, policy = ?config.scheduler_policy, "kernel booting");
        Self {
            replicator,
            processes: ProcessTable::new(now),
            scheduler: Scheduler::new(config.scheduler_policy, config.time_quantum, scheduler_rng),
            namespace: Namespace::new(),
            events: KernelEventBus::new(),
            clock,
            rng: kernel_rng,
            syscall_count: 0,
            knowledge_queries: 0,
            resource_counter: 0,
            resources: HashMap::new(),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Namespace surface ────────────────────────────────────────────────

    /// Resolve a namespace path to a typed handle. The atomspace handle is
    /// read-only; mutations still go through syscalls.
    pub fn open(&self, path: &str) -> Result<KernelObject<'_>, NamespaceError> {
        match self.namespace.resolve(path)? {
            NamespaceNode::Dir(children) => Ok(KernelObject::Dir(children.keys().cloned().collect())),
            NamespaceNode::Value(value) => Ok(KernelObject::Value(value)),
            NamespaceNode::Syscall(name) => Ok(KernelObject::Syscall(name.as_str())),
            NamespaceNode::Atomspace => Ok(KernelObject::Atomspace(self.replicator.store())),
        }
    }

    // ── Process surface ──────────────────────────────────────────────────

    /// Summaries of all live processes.
    pub fn ps(&self) -> Vec<ProcessSummary> {
        self.processes.list()
    }

    pub fn process(&self, pid: Pid) -> Option<ProcessSummary> {
        self.processes.live(pid).map(|p| p.summary())
    }

    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.processes.children_of(pid)
    }

    /// Terminate one process: the record is cleared, its namespace entries
    /// removed, and it is dropped from every scheduler queue. Children are
    /// untouched; use `kill_tree` to cascade.
    pub fn kill(&mut self, pid: Pid) -> bool {
        let existed = self.processes.kill(pid);
        if existed {
            self.scheduler.remove(pid);
            self.namespace.remove_pid(pid);
            self.events.publish(KernelEvent::ProcessTerminated { pid });
        }
        existed
    }

    /// Kill `pid` and all its live descendants, deepest first. Returns the
    /// number of processes terminated.
    pub fn kill_tree(&mut self, pid: Pid) -> usize {
        let mut killed = 0;
        for child in self.processes.children_of(pid) {
            killed += self.kill_tree(child);
        }
        if self.kill(pid) {
            killed += 1;
        }
        killed
    }

    // ── Scheduling surface ───────────────────────────────────────────────

    /// One cooperative step: pick the next runnable process and run its
    /// cycle. Returns the dispatched PID, or `None` when idle.
    pub fn step(&mut self) -> Option<Pid> {
        let now = self.now();
        let pid = self.scheduler.schedule(&mut self.processes, now)?;
        if let Some(process) = self.processes.get_mut(pid) {
            process.cycle(now);
        }
        Some(pid)
    }

    /// Block a process until `unblock`.
    pub fn block(&mut self, pid: Pid, reason: impl Into<String>) {
        let now = self.now();
        self.scheduler.block(pid, reason, &mut self.processes, now);
    }

    pub fn unblock(&mut self, pid: Pid) {
        let now = self.now();
        self.scheduler.unblock(pid, &mut self.processes, now);
    }

    /// Preempt the running process to the tail of the ready queue.
    pub fn yield_now(&mut self) {
        let now = self.now();
        self.scheduler.yield_current(&mut self.processes, now);
    }

    pub fn set_priority(&mut self, pid: Pid, priority: u8) {
        self.scheduler.set_priority(pid, priority, &mut self.processes);
    }

    // ── Atomspace & replication surface ──────────────────────────────────

    /// Read-only view of the store, for introspection.
    pub fn atomspace(&self) -> &AtomStore {
        self.replicator.store()
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    /// Decay every atom's attention by the configured rate.
    pub fn decay_attention(&mut self) {
        self.replicator.decay_attention();
        self.events.publish(KernelEvent::AttentionDecayed);
    }

    /// Record a high-salience entelechy failure and surface it on the bus.
    pub fn record_entelechy_failure(
        &mut self,
        description: &str,
        severity: f64,
    ) -> Result<uuid::Uuid, StoreError> {
        let atom = self.replicator.record_entelechy_failure(description, severity)?;
        self.events.publish(KernelEvent::EntelechyFailure { atom });
        Ok(atom)
    }

    /// Record a transcendence event.
    pub fn record_transcendence(
        &mut self,
        aspect: &str,
        insight: &str,
    ) -> Result<uuid::Uuid, StoreError> {
        self.replicator.record_transcendence(aspect, insight)
    }

    /// Forward pending mutations to the cluster. Rate-limited by the
    /// configured sync interval.
    pub async fn sync(&mut self) -> SyncOutcome {
        let outcome = self.replicator.sync().await;
        if let SyncOutcome::Synced { ops, peers, .. } = outcome {
            self.events.publish(KernelEvent::SyncCompleted { ops, peers });
        }
        outcome
    }

    /// Replay a remote op batch against the local store.
    pub fn apply_remote_ops(&mut self, source: &str, ops: &[PendingOp]) -> ApplySummary {
        let summary = self.replicator.apply_remote_ops(source, ops);
        if summary.conflicts > 0 {
            self.events.publish(KernelEvent::ConflictsRejected {
                count: summary.conflicts,
                origin: source.to_string(),
            });
        }
        summary
    }

    pub fn join_cluster(&mut self, leader_id: impl Into<String>, leader: PeerInfo) {
        self.replicator.join_cluster(leader_id, leader);
    }

    pub fn leave_cluster(&mut self) {
        self.replicator.leave_cluster();
    }

    // ── Telemetry ────────────────────────────────────────────────────────

    pub fn events(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            syscalls: self.syscall_count,
            knowledge_queries: self.knowledge_queries,
            live_processes: self.processes.live_count(),
            atoms: self.replicator.store().len(),
            ready: self.scheduler.ready_len(),
            blocked: self.scheduler.blocked_len(),
            replication: self.replicator.stats().clone(),
        }
    }
}
