//! Per-atom version vectors.
//!
//! A version vector maps cluster-member node ids to monotonically
//! non-decreasing counters. Local mutations bump the owner's slot; remote
//! application merges by pointwise max.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `node`, zero when absent.
    pub fn get(&self, node: &str) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Increment the counter for `node` and return the new value.
    pub fn bump(&mut self, node: &str) -> u64 {
        let slot = self.0.entry(node.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Pointwise max with `other`.
    pub fn merge(&mut self, other: &VersionVector) {
        for (node, &count) in &other.0 {
            let slot = self.0.entry(node.clone()).or_insert(0);
            if count > *slot {
                *slot = count;
            }
        }
    }

    /// True when every slot in `self` is >= the corresponding slot in
    /// `other`.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other.0.iter().all(|(node, &count)| self.get(node) >= count)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
