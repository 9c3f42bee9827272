//! Cognitive process records
//!
//! A process is the kernel's unit of agency: lifecycle state, priority,
//! consciousness level, emotion, a bounded working memory, and a FIFO
//! mailbox of inbound thoughts. The kernel owns every record; external
//! collaborators hold only PIDs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use super::emotion::Emotion;

/// Process identifier. Allocated monotonically, never reused within a
/// kernel lifetime. PID 0 is the pre-allocated kernel root.
pub type Pid = u32;

/// Working memory holds at most this many items.
pub const WORKING_MEMORY_CAP: usize = 50;

/// Working-memory entries older than this are pruned each cycle.
pub const WORKING_MEMORY_TTL_SECS: i64 = 300;

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// An inbound thought, opaque to the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtMessage {
    pub from: Pid,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A time-stamped working-memory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryItem {
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Per-process counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    pub syscalls: u64,
    pub thoughts_processed: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// Creation parameters accepted by `spawn_agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub name: String,
    #[serde(default = "SpawnConfig::default_role")]
    pub role: String,
    /// Priority in `[0, 10]`, lower = more urgent. Defaults to 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Consciousness level in `{0, 1, 2, 3}`. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consciousness_level: Option<u8>,
}

impl SpawnConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Self::default_role(),
            priority: None,
            consciousness_level: None,
        }
    }

    fn default_role() -> String {
        "agent".to_string()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority.min(10));
        self
    }

    pub fn with_consciousness(mut self, level: u8) -> Self {
        self.consciousness_level = Some(level.min(3));
        self
    }
}

/// A cognitive process record.
#[derive(Debug, Clone)]
pub struct CognitiveProcess {
    pub pid: Pid,
    pub parent: Pid,
    pub name: String,
    pub role: String,
    pub state: ProcessState,
    pub priority: u8,
    pub consciousness_level: u8,
    pub emotion: Emotion,
    /// Atom currently in focus, if any. Boosts scheduler score.
    pub attention_focus: Option<Uuid>,
    pub working_memory: VecDeque<WorkingMemoryItem>,
    pub mailbox: VecDeque<ThoughtMessage>,
    pub stats: ProcessStats,
    pub created_at: DateTime<Utc>,
    pub last_scheduled: Option<DateTime<Utc>>,
    pub cpu_time: std::time::Duration,
    pub block_reason: Option<String>,
}

impl CognitiveProcess {
    pub fn new(pid: Pid, parent: Pid, config: &SpawnConfig, now: DateTime<Utc>) -> Self {
        Self {
            pid,
            parent,
            name: config.name.clone(),
            role: config.role.clone(),
            state: ProcessState::Ready,
            priority: config.priority.unwrap_or(5).min(10),
            consciousness_level: config.consciousness_level.unwrap_or(1).min(3),
            emotion: Emotion::default(),
            attention_focus: None,
            working_memory: VecDeque::new(),
            mailbox: VecDeque::new(),
            stats: ProcessStats::default(),
            created_at: now,
            last_scheduled: None,
            cpu_time: std::time::Duration::ZERO,
            block_reason: None,
        }
    }

    /// Live means not terminated; a terminated PID resolves to nothing at
    /// the syscall layer.
    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Terminated
    }

    /// One cooperative cycle: drain the mailbox into working memory, decay
    /// emotion, prune stale working-memory entries. A no-op unless the
    /// process is running.
    pub fn cycle(&mut self, now: DateTime<Utc>) {
        if self.state != ProcessState::Running {
            return;
        }

        while let Some(message) = self.mailbox.pop_front() {
            self.stats.thoughts_processed += 1;
            self.store_item(message.payload, now);
        }

        self.emotion.decay();

        let cutoff = now - Duration::seconds(WORKING_MEMORY_TTL_SECS);
        self.working_memory.retain(|item| item.timestamp > cutoff);
    }

    /// Append to working memory, evicting the oldest entry at capacity.
    pub fn store_item(&mut self, content: serde_json::Value, now: DateTime<Utc>) {
        if self.working_memory.len() >= WORKING_MEMORY_CAP {
            self.working_memory.pop_front();
        }
        self.working_memory.push_back(WorkingMemoryItem {
            content,
            timestamp: now,
        });
    }

    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            pid: self.pid,
            parent: self.parent,
            name: self.name.clone(),
            role: self.role.clone(),
            state: self.state,
            priority: self.priority,
            consciousness_level: self.consciousness_level,
            emotion: self.emotion.kind.clone(),
            created_at: self.created_at,
        }
    }
}

/// The externally visible view of a process, served by `ps()` and the
/// `/proc` namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub pid: Pid,
    pub parent: Pid,
    pub name: String,
    pub role: String,
    pub state: ProcessState,
    pub priority: u8,
    pub consciousness_level: u8,
    pub emotion: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(now: DateTime<Utc>) -> CognitiveProcess {
        CognitiveProcess::new(1, 0, &SpawnConfig::new("worker"), now)
    }

    #[test]
    fn defaults_match_allocation_contract() {
        let p = process(Utc::now());
        assert_eq!(p.state, ProcessState::Ready);
        assert_eq!(p.priority, 5);
        assert_eq!(p.consciousness_level, 1);
        assert_eq!(p.emotion, Emotion::default());
        assert!(p.mailbox.is_empty());
        assert!(p.working_memory.is_empty());
    }

    #[test]
    fn cycle_is_a_noop_unless_running() {
        let now = Utc::now();
        let mut p = process(now);
        p.mailbox.push_back(ThoughtMessage {
            from: 0,
            payload: serde_json::json!("hello"),
            timestamp: now,
        });

        p.cycle(now);
        assert_eq!(p.mailbox.len(), 1);

        p.state = ProcessState::Running;
        p.cycle(now);
        assert!(p.mailbox.is_empty());
        assert_eq!(p.working_memory.len(), 1);
        assert_eq!(p.stats.thoughts_processed, 1);
    }

    #[test]
    fn cycle_prunes_stale_working_memory() {
        let now = Utc::now();
        let mut p = process(now);
        p.state = ProcessState::Running;
        p.store_item(serde_json::json!("old"), now - Duration::seconds(WORKING_MEMORY_TTL_SECS + 1));
        p.store_item(serde_json::json!("fresh"), now);

        p.cycle(now);
        assert_eq!(p.working_memory.len(), 1);
        assert_eq!(p.working_memory[0].content, serde_json::json!("fresh"));
    }

    #[test]
    fn working_memory_is_bounded() {
        let now = Utc::now();
        let mut p = process(now);
        for i in 0..(WORKING_MEMORY_CAP + 10) {
            p.store_item(serde_json::json!(i), now);
        }
        assert_eq!(p.working_memory.len(), WORKING_MEMORY_CAP);
        // Oldest entries were evicted first.
        assert_eq!(p.working_memory[0].content, serde_json::json!(10));
    }
}
