//! Namespace
//!
//! Read-only hierarchical directory over kernel state. Paths are
//! `/`-separated; the guaranteed roots expose process, syscall, atomspace,
//! agent, memory, consciousness, emotion, and reservoir views. Entries are
//! written synchronously by the same syscall handlers that cause them.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::process::Pid;
use crate::syscall::SYSCALL_NAMES;

/// The guaranteed namespace roots.
pub const NAMESPACE_ROOTS: [&str; 8] = [
    "proc",
    "cognitive",
    "atomspace",
    "agents",
    "memory",
    "consciousness",
    "emotion",
    "reservoir",
];

/// A node in the namespace tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum NamespaceNode {
    /// Nested mapping of child entries.
    Dir(BTreeMap<String, NamespaceNode>),
    /// A plain data leaf (process summaries, emotion records, resources).
    Value(serde_json::Value),
    /// A handle pointing at one of the closed syscall operations.
    Syscall(String),
    /// Marker for the atom store; the kernel resolves it to the real
    /// store on `open`.
    Atomspace,
}

impl NamespaceNode {
    fn dir() -> Self {
        NamespaceNode::Dir(BTreeMap::new())
    }
}

/// Lookup failure with a human-readable reason.
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("path '{path}' not found: {reason}")]
    NotFound { path: String, reason: String },
}

impl NamespaceError {
    fn not_found(path: &str, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub struct Namespace {
    root: NamespaceNode,
}

impl Namespace {
    pub fn new() -> Self {
        let mut roots = BTreeMap::new();
        for name in NAMESPACE_ROOTS {
            roots.insert(name.to_string(), NamespaceNode::dir());
        }

        // /cognitive/<name> holds one handle per syscall.
        if let Some(NamespaceNode::Dir(cognitive)) = roots.get_mut("cognitive") {
            for name in SYSCALL_NAMES {
                cognitive.insert(name.to_string(), NamespaceNode::Syscall(name.to_string()));
            }
        }
        roots.insert("atomspace".to_string(), NamespaceNode::Atomspace);

        Self {
            root: NamespaceNode::Dir(roots),
        }
    }

    /// Resolve a `/`-separated path.
    pub fn resolve(&self, path: &str) -> Result<&NamespaceNode, NamespaceError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = &self.root;
        let mut walked = String::new();
        for segment in segments {
            match node {
                NamespaceNode::Dir(children) => match children.get(segment) {
                    Some(child) => {
                        walked.push('/');
                        walked.push_str(segment);
                        node = child;
                    }
                    None => {
                        let reason = if walked.is_empty() {
                            format!("no such root '{segment}'")
                        } else {
                            format!("no entry '{segment}' in '{walked}'")
                        };
                        return Err(NamespaceError::not_found(path, reason));
                    }
                },
                _ => {
                    return Err(NamespaceError::not_found(
                        path,
                        format!("'{walked}' is not a directory"),
                    ));
                }
            }
        }
        Ok(node)
    }

    /// Child names of a directory entry.
    pub fn list(&self, path: &str) -> Result<Vec<String>, NamespaceError> {
        match self.resolve(path)? {
            NamespaceNode::Dir(children) => Ok(children.keys().cloned().collect()),
            _ => Err(NamespaceError::not_found(path, "not a directory")),
        }
    }

    /// Install a leaf, creating intermediate directories.
    pub(crate) fn set(&mut self, segments: &[&str], node: NamespaceNode) {
        let NamespaceNode::Dir(roots) = &mut self.root else {
            unreachable!("namespace root is a directory");
        };
        let mut children = roots;
        for segment in &segments[..segments.len() - 1] {
            let entry = children
                .entry(segment.to_string())
                .or_insert_with(NamespaceNode::dir);
            children = match entry {
                NamespaceNode::Dir(map) => map,
                other => {
                    *other = NamespaceNode::dir();
                    match other {
                        NamespaceNode::Dir(map) => map,
                        _ => unreachable!(),
                    }
                }
            };
        }
        children.insert(segments[segments.len() - 1].to_string(), node);
    }

    /// Remove a leaf. Returns whether it existed.
    pub(crate) fn remove(&mut self, segments: &[&str]) -> bool {
        let NamespaceNode::Dir(roots) = &mut self.root else {
            return false;
        };
        let mut children = roots;
        for segment in &segments[..segments.len() - 1] {
            children = match children.get_mut(*segment) {
                Some(NamespaceNode::Dir(map)) => map,
                _ => return false,
            };
        }
        children.remove(segments[segments.len() - 1]).is_some()
    }

    /// Drop every per-process entry for `pid`. Called on kill.
    pub(crate) fn remove_pid(&mut self, pid: Pid) {
        let key = pid.to_string();
        for root in ["proc", "agents", "emotion", "consciousness"] {
            self.remove(&[root, &key]);
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}
