//! Atomspace Module
//!
//! The hypergraph knowledge store: atoms (nodes and links), truth values,
//! attention bookkeeping, and pattern query.

mod atom;
mod query;
mod store;

pub use atom::{Atom, AtomKind, Metadata, TruthValue};
pub use query::{Bindings, QueryMatch, QueryPattern};
pub use store::{AtomStore, LinkTarget, StoreError, StoreStats};
