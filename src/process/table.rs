//! ProcessTable
//!
//! Allocates PIDs and exclusively owns every process record. PIDs start at
//! 1 and are never recycled; PID 0 is reserved for the kernel root, the
//! implicit caller used by drivers before any agent exists.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::process::{CognitiveProcess, Pid, ProcessState, ProcessSummary, SpawnConfig};
use std::collections::HashMap;

/// The kernel root PID, pre-allocated at table construction.
pub const ROOT_PID: Pid = 0;

pub struct ProcessTable {
    procs: HashMap<Pid, CognitiveProcess>,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new(now: DateTime<Utc>) -> Self {
        let mut procs = HashMap::new();
        let root_config = SpawnConfig::new("kernel").with_role("kernel");
        procs.insert(
            ROOT_PID,
            CognitiveProcess::new(ROOT_PID, ROOT_PID, &root_config, now),
        );
        Self { procs, next_pid: 1 }
    }

    /// Allocate a fresh PID and create the process in `ready` state.
    pub fn allocate(&mut self, parent: Pid, config: &SpawnConfig, now: DateTime<Utc>) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        let process = CognitiveProcess::new(pid, parent, config, now);
        info!(pid, parent, name = %process.name, "process allocated");
        self.procs.insert(pid, process);
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&CognitiveProcess> {
        self.procs.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut CognitiveProcess> {
        self.procs.get_mut(&pid)
    }

    /// Resolve a PID to a live (non-terminated) process. Terminated PIDs
    /// behave as if they no longer exist.
    pub fn live(&self, pid: Pid) -> Option<&CognitiveProcess> {
        self.procs.get(&pid).filter(|p| p.is_live())
    }

    pub fn live_mut(&mut self, pid: Pid) -> Option<&mut CognitiveProcess> {
        self.procs.get_mut(&pid).filter(|p| p.is_live())
    }

    /// Terminate a process: state moves to `terminated`, its mailbox and
    /// working memory are emptied. Children are untouched; cascading is
    /// the caller's decision. Returns whether a live process existed.
    pub fn kill(&mut self, pid: Pid) -> bool {
        match self.procs.get_mut(&pid) {
            Some(process) if process.is_live() => {
                process.state = ProcessState::Terminated;
                process.mailbox.clear();
                process.working_memory.clear();
                process.block_reason = None;
                info!(pid, name = %process.name, "process terminated");
                true
            }
            _ => {
                debug!(pid, "kill of unknown or already-terminated process");
                false
            }
        }
    }

    /// Summaries of all live processes, root excluded, in PID order.
    pub fn list(&self) -> Vec<ProcessSummary> {
        let mut summaries: Vec<ProcessSummary> = self
            .procs
            .values()
            .filter(|p| p.pid != ROOT_PID && p.is_live())
            .map(|p| p.summary())
            .collect();
        summaries.sort_by_key(|s| s.pid);
        summaries
    }

    /// Live children of `pid`, in PID order.
    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        let mut children: Vec<Pid> = self
            .procs
            .values()
            .filter(|p| p.parent == pid && p.pid != pid && p.is_live())
            .map(|p| p.pid)
            .collect();
        children.sort_unstable();
        children
    }

    pub fn live_count(&self) -> usize {
        self.procs.values().filter(|p| p.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_are_monotonic_and_never_recycled() {
        let mut table = ProcessTable::new(Utc::now());
        let a = table.allocate(ROOT_PID, &SpawnConfig::new("a"), Utc::now());
        let b = table.allocate(ROOT_PID, &SpawnConfig::new("b"), Utc::now());
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        assert!(table.kill(a));
        let c = table.allocate(ROOT_PID, &SpawnConfig::new("c"), Utc::now());
        assert_eq!(c, 3);
    }

    #[test]
    fn kill_clears_mailbox_and_working_memory() {
        let mut table = ProcessTable::new(Utc::now());
        let pid = table.allocate(ROOT_PID, &SpawnConfig::new("a"), Utc::now());
        let process = table.get_mut(pid).unwrap();
        process.mailbox.push_back(crate::process::ThoughtMessage {
            from: ROOT_PID,
            payload: serde_json::json!("pending"),
            timestamp: Utc::now(),
        });
        process.store_item(serde_json::json!("note"), Utc::now());

        assert!(table.kill(pid));
        let process = table.get(pid).unwrap();
        assert_eq!(process.state, ProcessState::Terminated);
        assert!(process.mailbox.is_empty());
        assert!(process.working_memory.is_empty());

        // Terminated processes resolve to nothing and cannot be re-killed.
        assert!(table.live(pid).is_none());
        assert!(!table.kill(pid));
    }

    #[test]
    fn list_excludes_root_and_terminated() {
        let mut table = ProcessTable::new(Utc::now());
        let a = table.allocate(ROOT_PID, &SpawnConfig::new("a"), Utc::now());
        let b = table.allocate(ROOT_PID, &SpawnConfig::new("b"), Utc::now());
        table.kill(a);

        let listed: Vec<Pid> = table.list().iter().map(|s| s.pid).collect();
        assert_eq!(listed, vec![b]);
    }

    #[test]
    fn children_track_live_descendants() {
        let mut table = ProcessTable::new(Utc::now());
        let parent = table.allocate(ROOT_PID, &SpawnConfig::new("parent"), Utc::now());
        let child_a = table.allocate(parent, &SpawnConfig::new("a"), Utc::now());
        let child_b = table.allocate(parent, &SpawnConfig::new("b"), Utc::now());

        assert_eq!(table.children_of(parent), vec![child_a, child_b]);
        table.kill(child_a);
        assert_eq!(table.children_of(parent), vec![child_b]);
    }
}
