//! Pattern queries
//!
//! Declarative patterns over the store. A leading `?` on a name term
//! denotes a variable; matching binds the variable to the matched name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::atom::Atom;

/// Variable bindings produced by a match, keyed by variable name without
/// the leading `?`.
pub type Bindings = BTreeMap<String, String>;

/// A single query result: the matched atom and any variable bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub atom: Atom,
    pub bindings: Bindings,
}

/// Pattern accepted by `AtomStore::query`.
///
/// All fields are optional; an empty pattern matches every atom.
/// Truth/attention thresholds are inclusive lower bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atom_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Positional terms matched against the names of a link's outgoing
    /// atoms. Must be the same length as the candidate's outgoing set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_attention: Option<f64>,
}

impl QueryPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, atom_type: impl Into<String>) -> Self {
        self.atom_type = Some(atom_type.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_outgoing(mut self, terms: Vec<String>) -> Self {
        self.outgoing = Some(terms);
        self
    }

    pub fn min_strength(mut self, min: f64) -> Self {
        self.min_strength = Some(min);
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn min_attention(mut self, min: f64) -> Self {
        self.min_attention = Some(min);
        self
    }
}

/// True if `term` is a variable (`?x`).
pub(crate) fn is_variable(term: &str) -> bool {
    term.starts_with('?')
}

/// Match one pattern term against an actual name, extending `bindings`.
///
/// A variable binds on first use and must match its binding on reuse.
pub(crate) fn match_term(term: &str, actual: &str, bindings: &mut Bindings) -> bool {
    if is_variable(term) {
        let var = &term[1..];
        match bindings.get(var) {
            Some(bound) => bound == actual,
            None => {
                bindings.insert(var.to_string(), actual.to_string());
                true
            }
        }
    } else {
        term == actual
    }
}
