//! Atom types
//!
//! The unit of storage in the hypergraph. An atom is either a named Node or
//! a Link whose ordered outgoing set references other atoms in the same
//! store. Every atom carries a truth value, an attention value, and an
//! opaque metadata map the kernel stores but never inspects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Opaque key/value metadata attached to an atom.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Whether an atom is a named node or a structured link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomKind {
    Node,
    Link,
}

/// Truth value: `(strength, confidence)`, both in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    pub strength: f64,
    pub confidence: f64,
}

impl TruthValue {
    pub fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

impl Default for TruthValue {
    /// Neutral prior for atoms created implicitly (e.g. bare-name link
    /// targets).
    fn default() -> Self {
        Self {
            strength: 0.5,
            confidence: 0.5,
        }
    }
}

/// A node or link in the hypergraph.
///
/// Invariants maintained by the store: nodes have a name and an empty
/// outgoing set; links have no name and an outgoing set of length >= 1
/// whose every id resolves within the owning store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub id: Uuid,
    pub kind: AtomKind,
    /// Type label drawn from an open set of domain strings
    /// (e.g. `ConceptNode`, `InheritanceLink`).
    pub atom_type: String,
    pub name: Option<String>,
    pub outgoing: Vec<Uuid>,
    pub truth: TruthValue,
    pub attention: f64,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Atom {
    pub(crate) fn node(
        id: Uuid,
        atom_type: impl Into<String>,
        name: impl Into<String>,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: AtomKind::Node,
            atom_type: atom_type.into(),
            name: Some(name.into()),
            outgoing: Vec::new(),
            truth,
            attention: attention.clamp(0.0, 1.0),
            metadata,
            created_at: now,
            modified_at: now,
        }
    }

    pub(crate) fn link(
        id: Uuid,
        atom_type: impl Into<String>,
        outgoing: Vec<Uuid>,
        truth: TruthValue,
        attention: f64,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: AtomKind::Link,
            atom_type: atom_type.into(),
            name: None,
            outgoing,
            truth,
            attention: attention.clamp(0.0, 1.0),
            metadata,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_node(&self) -> bool {
        self.kind == AtomKind::Node
    }

    pub fn is_link(&self) -> bool {
        self.kind == AtomKind::Link
    }

    /// An atom with zero attention is considered forgotten but is not
    /// removed from the store.
    pub fn is_forgotten(&self) -> bool {
        self.attention == 0.0
    }
}
