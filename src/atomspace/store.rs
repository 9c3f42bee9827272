//! AtomStore
//!
//! Owns every atom in the hypergraph together with the type/name indices,
//! attention bookkeeping, and pattern query. Links hold UUIDs, never
//! pointers; resolution always goes through the store's indices, so decay
//! and spreading walk indices rather than an object graph.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::utils::Clock;

use super::atom::{Atom, AtomKind, Metadata, TruthValue};
use super::query::{match_term, Bindings, QueryMatch, QueryPattern};

/// Truth/attention constants for the special recorders. These feed
/// downstream attention-based queries, so the values are fixed.
const RECORD_STRENGTH: f64 = 0.99;
const RECORD_CONFIDENCE: f64 = 0.95;
const RECORD_ATTENTION: f64 = 0.95;

/// Default attention for atoms created without an explicit value.
const DEFAULT_ATTENTION: f64 = 0.5;

/// Errors surfaced by store mutations. The store is unchanged when any of
/// these is returned.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A link's outgoing set referenced an atom not owned by this store.
    #[error("invalid reference: atom {0} is not owned by this store")]
    InvalidReference(Uuid),

    /// The configured atom capacity was reached.
    #[error("atom capacity exhausted ({0} atoms)")]
    CapacityExhausted(usize),

    /// A link was given an empty outgoing set.
    #[error("links require an outgoing set of length >= 1")]
    EmptyOutgoing,
}

/// An outgoing entry passed to `add_link`: either a resolved atom id or a
/// bare name, which resolves to a `ConceptNode` (created if absent).
#[derive(Debug, Clone)]
pub enum LinkTarget {
    Id(Uuid),
    Name(String),
}

impl From<Uuid> for LinkTarget {
    fn from(id: Uuid) -> Self {
        LinkTarget::Id(id)
    }
}

impl From<&str> for LinkTarget {
    fn from(name: &str) -> Self {
        LinkTarget::Name(name.to_string())
    }
}

impl From<String> for LinkTarget {
    fn from(name: String) -> Self {
        LinkTarget::Name(name)
    }
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub atoms: usize,
    pub nodes: usize,
    pub links: usize,
    pub by_type: BTreeMap<String, usize>,
    pub mean_attention: f64,
}

/// The hypergraph store. Exclusive owner of all atoms; external holders
/// keep opaque UUIDs.
pub struct AtomStore {
    atoms: HashMap<Uuid, Atom>,
    /// `(type, name)` -> node id. Enforces node uniqueness.
    node_index: HashMap<(String, String), Uuid>,
    /// `(type, outgoing)` -> link id. Deduplicates identical links.
    link_index: HashMap<(String, Vec<Uuid>), Uuid>,
    /// target id -> links whose outgoing contains it. Drives spreading.
    incoming: HashMap<Uuid, Vec<Uuid>>,
    /// Insertion order, for deterministic query results.
    insertion: Vec<Uuid>,
    capacity: usize,
    decay_rate: f64,
    clock: Arc<dyn Clock>,
}

impl AtomStore {
    pub fn new(capacity: usize, decay_rate: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            atoms: HashMap::new(),
            node_index: HashMap::new(),
            link_index: HashMap::new(),
            incoming: HashMap::new(),
            insertion: Vec::new(),
            capacity,
            decay_rate,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.atoms.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Atom> {
        self.atoms.get(&id)
    }

    /// Look up a node by `(type, name)`.
    pub fn get_node(&self, atom_type: &str, name: &str) -> Option<&Atom> {
        self.node_index
            .get(&(atom_type.to_string(), name.to_string()))
            .and_then(|id| self.atoms.get(id))
    }

    /// Add a node, idempotent by `(type, name)`.
    ///
    /// If a matching node exists, its truth and attention are overwritten
    /// with the provided arguments, new metadata entries are merged in, and
    /// the existing id is returned.
    pub fn add_node(
        &mut self,
        atom_type: &str,
        name: &str,
        truth: Option<TruthValue>,
        attention: Option<f64>,
        metadata: Option<Metadata>,
    ) -> Result<Uuid, StoreError> {
        let key = (atom_type.to_string(), name.to_string());
        if let Some(&id) = self.node_index.get(&key) {
            let now = self.clock.now();
            let atom = self.atoms.get_mut(&id).expect("indexed node exists");
            if let Some(tv) = truth {
                atom.truth = tv;
            }
            if let Some(att) = attention {
                atom.attention = att.clamp(0.0, 1.0);
            }
            if let Some(meta) = metadata {
                atom.metadata.extend(meta);
            }
            atom.modified_at = now;
            return Ok(id);
        }

        self.check_capacity()?;
        let id = Uuid::new_v4();
        let atom = Atom::node(
            id,
            atom_type,
            name,
            truth.unwrap_or_default(),
            attention.unwrap_or(DEFAULT_ATTENTION),
            metadata.unwrap_or_default(),
            self.clock.now(),
        );
        self.index_atom(atom);
        Ok(id)
    }

    /// Add a link over the given targets.
    ///
    /// Bare-name targets resolve to `ConceptNode`s, created when absent.
    /// Id targets must already be owned by this store. A link identical in
    /// `(type, outgoing)` to an existing one returns the existing atom.
    pub fn add_link(
        &mut self,
        link_type: &str,
        targets: &[LinkTarget],
        truth: Option<TruthValue>,
        attention: Option<f64>,
        metadata: Option<Metadata>,
    ) -> Result<Uuid, StoreError> {
        if targets.is_empty() {
            return Err(StoreError::EmptyOutgoing);
        }

        // Validate id targets before creating anything, so a failed call
        // leaves the store untouched.
        for target in targets {
            if let LinkTarget::Id(id) = target {
                if !self.atoms.contains_key(id) {
                    return Err(StoreError::InvalidReference(*id));
                }
            }
        }

        let mut outgoing = Vec::with_capacity(targets.len());
        for target in targets {
            let id = match target {
                LinkTarget::Id(id) => *id,
                LinkTarget::Name(name) => self.add_node("ConceptNode", name, None, None, None)?,
            };
            outgoing.push(id);
        }

        let key = (link_type.to_string(), outgoing.clone());
        if let Some(&id) = self.link_index.get(&key) {
            return Ok(id);
        }

        self.check_capacity()?;
        let id = Uuid::new_v4();
        let atom = Atom::link(
            id,
            link_type,
            outgoing,
            truth.unwrap_or_default(),
            attention.unwrap_or(DEFAULT_ATTENTION),
            metadata.unwrap_or_default(),
            self.clock.now(),
        );
        self.index_atom(atom);
        Ok(id)
    }

    /// Insert a node under a caller-provided id. Used by replication to
    /// preserve atom identity across replicas; local callers go through
    /// `add_node`.
    pub(crate) fn insert_remote_node(
        &mut self,
        id: Uuid,
        atom_type: &str,
        name: &str,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.check_capacity()?;
        let atom = Atom::node(
            id,
            atom_type,
            name,
            truth,
            attention,
            metadata,
            self.clock.now(),
        );
        self.index_atom(atom);
        Ok(())
    }

    /// Insert a link under a caller-provided id, with a fully resolved
    /// outgoing set. Every id must already be owned by this store.
    pub(crate) fn insert_remote_link(
        &mut self,
        id: Uuid,
        link_type: &str,
        outgoing: Vec<Uuid>,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        if outgoing.is_empty() {
            return Err(StoreError::EmptyOutgoing);
        }
        for target in &outgoing {
            if !self.atoms.contains_key(target) {
                return Err(StoreError::InvalidReference(*target));
            }
        }
        self.check_capacity()?;
        let atom = Atom::link(
            id,
            link_type,
            outgoing,
            truth,
            attention,
            metadata,
            self.clock.now(),
        );
        self.index_atom(atom);
        Ok(())
    }

    /// Look up a link id by `(type, outgoing)`.
    pub(crate) fn find_link(&self, link_type: &str, outgoing: &[Uuid]) -> Option<Uuid> {
        self.link_index
            .get(&(link_type.to_string(), outgoing.to_vec()))
            .copied()
    }

    /// Overwrite an atom's truth value.
    pub(crate) fn set_truth(&mut self, id: Uuid, truth: TruthValue) -> bool {
        let now = self.clock.now();
        match self.atoms.get_mut(&id) {
            Some(atom) => {
                atom.truth = truth;
                atom.modified_at = now;
                true
            }
            None => false,
        }
    }

    /// Overwrite an atom's attention value, clamped to `[0, 1]`.
    pub fn set_attention(&mut self, id: Uuid, attention: f64) -> bool {
        let now = self.clock.now();
        match self.atoms.get_mut(&id) {
            Some(atom) => {
                atom.attention = attention.clamp(0.0, 1.0);
                atom.modified_at = now;
                true
            }
            None => false,
        }
    }

    /// Match a pattern against the store. Results come back in insertion
    /// order.
    pub fn query(&self, pattern: &QueryPattern) -> Vec<QueryMatch> {
        let mut matches = Vec::new();
        for id in &self.insertion {
            let atom = match self.atoms.get(id) {
                Some(atom) => atom,
                None => continue,
            };
            if let Some(bindings) = self.match_atom(atom, pattern) {
                matches.push(QueryMatch {
                    atom: atom.clone(),
                    bindings,
                });
            }
        }
        matches
    }

    fn match_atom(&self, atom: &Atom, pattern: &QueryPattern) -> Option<Bindings> {
        if let Some(ref atom_type) = pattern.atom_type {
            if atom_type != &atom.atom_type {
                return None;
            }
        }
        if let Some(min) = pattern.min_strength {
            if atom.truth.strength < min {
                return None;
            }
        }
        if let Some(min) = pattern.min_confidence {
            if atom.truth.confidence < min {
                return None;
            }
        }
        if let Some(min) = pattern.min_attention {
            if atom.attention < min {
                return None;
            }
        }

        let mut bindings = Bindings::new();

        if let Some(ref name_term) = pattern.name {
            let actual = atom.name.as_deref()?;
            if !match_term(name_term, actual, &mut bindings) {
                return None;
            }
        }

        if let Some(ref terms) = pattern.outgoing {
            if atom.kind != AtomKind::Link || terms.len() != atom.outgoing.len() {
                return None;
            }
            for (term, target_id) in terms.iter().zip(&atom.outgoing) {
                let target = self.atoms.get(target_id)?;
                // Unnamed targets (links) match by uuid string.
                let uuid_string;
                let actual = match target.name.as_deref() {
                    Some(name) => name,
                    None => {
                        uuid_string = target.id.to_string();
                        &uuid_string
                    }
                };
                if !match_term(term, actual, &mut bindings) {
                    return None;
                }
            }
        }

        Some(bindings)
    }

    /// The `k` atoms of highest current attention. Ties break arbitrarily.
    pub fn top_attention(&self, k: usize) -> Vec<&Atom> {
        let mut all: Vec<&Atom> = self.atoms.values().collect();
        all.sort_by(|a, b| {
            b.attention
                .partial_cmp(&a.attention)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all.truncate(k);
        all
    }

    /// Spread attention outward from `source`.
    ///
    /// For each link whose outgoing contains `source`, the link's attention
    /// is raised by `factor * source.attention` (clamped to 1.0), then the
    /// spread recurses with halved factor into every other member of that
    /// link's outgoing set. `depth <= 0` terminates; cycles are bounded
    /// purely by depth.
    pub fn spread_attention(&mut self, source: Uuid, factor: f64, depth: i32) {
        if depth <= 0 {
            return;
        }
        let source_attention = match self.atoms.get(&source) {
            Some(atom) => atom.attention,
            None => return,
        };
        let links: Vec<Uuid> = self.incoming.get(&source).cloned().unwrap_or_default();
        let now = self.clock.now();
        for link_id in links {
            let neighbors: Vec<Uuid> = match self.atoms.get_mut(&link_id) {
                Some(link) => {
                    link.attention = (link.attention + factor * source_attention).min(1.0);
                    link.modified_at = now;
                    link.outgoing
                        .iter()
                        .copied()
                        .filter(|&id| id != source)
                        .collect()
                }
                None => continue,
            };
            for neighbor in neighbors {
                self.spread_attention(neighbor, factor / 2.0, depth - 1);
            }
        }
    }

    /// Multiply every atom's attention by the configured decay rate.
    pub fn decay_attention(&mut self) {
        for atom in self.atoms.values_mut() {
            atom.attention *= self.decay_rate;
        }
    }

    pub fn stats(&self) -> StoreStats {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut nodes = 0;
        let mut links = 0;
        let mut attention_sum = 0.0;
        for atom in self.atoms.values() {
            *by_type.entry(atom.atom_type.clone()).or_insert(0) += 1;
            match atom.kind {
                AtomKind::Node => nodes += 1,
                AtomKind::Link => links += 1,
            }
            attention_sum += atom.attention;
        }
        let mean_attention = if self.atoms.is_empty() {
            0.0
        } else {
            attention_sum / self.atoms.len() as f64
        };
        StoreStats {
            atoms: self.atoms.len(),
            nodes,
            links,
            by_type,
            mean_attention,
        }
    }

    /// Record an entelechy failure: a high-salience ConceptNode plus an
    /// EvaluationLink against the `EntelechyFailure` predicate.
    pub fn record_entelechy_failure(
        &mut self,
        description: &str,
        severity: f64,
    ) -> Result<Uuid, StoreError> {
        let ts = self.clock.now().timestamp_millis();
        let mut metadata = Metadata::new();
        metadata.insert("description".into(), serde_json::json!(description));
        metadata.insert("severity".into(), serde_json::json!(severity.clamp(0.0, 1.0)));
        let node = self.add_node(
            "ConceptNode",
            &format!("entelechy_failure_{ts}"),
            Some(TruthValue::new(RECORD_STRENGTH, RECORD_CONFIDENCE)),
            Some(RECORD_ATTENTION),
            Some(metadata),
        )?;
        debug!(description, severity, "recorded entelechy failure");
        self.add_link(
            "EvaluationLink",
            &[LinkTarget::from("EntelechyFailure"), LinkTarget::Id(node)],
            Some(TruthValue::new(RECORD_STRENGTH, RECORD_CONFIDENCE)),
            Some(RECORD_ATTENTION),
            None,
        )
    }

    /// Record a transcendence event: the aspect node inherits from the
    /// `Transcendence` concept.
    pub fn record_transcendence(
        &mut self,
        aspect: &str,
        insight: &str,
    ) -> Result<Uuid, StoreError> {
        let mut metadata = Metadata::new();
        metadata.insert("insight".into(), serde_json::json!(insight));
        let node = self.add_node(
            "ConceptNode",
            aspect,
            Some(TruthValue::new(RECORD_STRENGTH, RECORD_CONFIDENCE)),
            Some(RECORD_ATTENTION),
            Some(metadata),
        )?;
        debug!(aspect, "recorded transcendence");
        self.add_link(
            "InheritanceLink",
            &[LinkTarget::Id(node), LinkTarget::from("Transcendence")],
            Some(TruthValue::new(RECORD_STRENGTH, RECORD_CONFIDENCE)),
            Some(RECORD_ATTENTION),
            None,
        )
    }

    fn check_capacity(&self) -> Result<(), StoreError> {
        if self.atoms.len() >= self.capacity {
            return Err(StoreError::CapacityExhausted(self.capacity));
        }
        Ok(())
    }

    fn index_atom(&mut self, atom: Atom) {
        let id = atom.id;
        match atom.kind {
            AtomKind::Node => {
                let name = atom.name.clone().expect("nodes are named");
                self.node_index.insert((atom.atom_type.clone(), name), id);
            }
            AtomKind::Link => {
                self.link_index
                    .insert((atom.atom_type.clone(), atom.outgoing.clone()), id);
                for target in &atom.outgoing {
                    self.incoming.entry(*target).or_default().push(id);
                }
            }
        }
        self.insertion.push(id);
        self.atoms.insert(id, atom);
    }
}
