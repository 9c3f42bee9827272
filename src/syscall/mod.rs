//! Syscall Module
//!
//! The closed set of cognitive operations and their uniform error
//! semantics. `Syscall` is a tagged variant with a closed alphabet, so the
//! typed dispatch path is an exhaustive match and `ENOSYS` only surfaces
//! from the loose string entry point used by namespace handles.

mod dispatcher;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomspace::{Atom, QueryMatch, QueryPattern};
use crate::process::{Pid, ProcessSummary, SpawnConfig, ThoughtMessage};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Names of the fourteen operations, in declaration order.
pub const SYSCALL_NAMES: [&str; 14] = [
    "think",
    "reason",
    "feel",
    "remember",
    "forget",
    "attend",
    "spawn_agent",
    "query_knowledge",
    "spread_activation",
    "shift_consciousness",
    "allocate_cognitive",
    "free_cognitive",
    "send_thought",
    "receive_thought",
];

/// Classic errno tags for syscall failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Errno {
    /// No such process.
    Esrch,
    /// Target not found.
    Enoent,
    /// Bad argument.
    Einval,
    /// Unknown syscall (loose entry point only).
    Enosys,
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Errno::Esrch => "ESRCH",
            Errno::Enoent => "ENOENT",
            Errno::Einval => "EINVAL",
            Errno::Enosys => "ENOSYS",
        };
        write!(f, "{tag}")
    }
}

/// Failure record returned by the dispatcher. A failed syscall leaves the
/// kernel exactly as it was, apart from the call counters.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{errno}: {detail}")]
pub struct SyscallFailure {
    pub errno: Errno,
    pub detail: String,
}

impl SyscallFailure {
    pub fn esrch(pid: Pid) -> Self {
        Self {
            errno: Errno::Esrch,
            detail: format!("no such process: {pid}"),
        }
    }

    pub fn enoent(what: impl Into<String>) -> Self {
        Self {
            errno: Errno::Enoent,
            detail: what.into(),
        }
    }

    pub fn einval(what: impl Into<String>) -> Self {
        Self {
            errno: Errno::Einval,
            detail: what.into(),
        }
    }

    pub fn enosys(name: &str) -> Self {
        Self {
            errno: Errno::Enosys,
            detail: format!("unknown syscall '{name}'"),
        }
    }
}

pub type SyscallResult = Result<SyscallReply, SyscallFailure>;

/// The closed syscall alphabet. Every operation takes the caller's PID as
/// the dispatcher's first argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Syscall {
    Think {
        input: serde_json::Value,
        #[serde(default)]
        context: serde_json::Value,
    },
    Reason {
        premise: String,
        query: String,
    },
    Feel {
        emotion: String,
        intensity: f64,
    },
    Remember {
        key: String,
        value: serde_json::Value,
        importance: f64,
    },
    Forget {
        key: String,
        threshold: f64,
    },
    Attend {
        target: String,
        spread_factor: f64,
    },
    SpawnAgent {
        config: SpawnConfig,
    },
    QueryKnowledge {
        pattern: QueryPattern,
    },
    SpreadActivation {
        source: String,
        strength: f64,
    },
    ShiftConsciousness {
        level: u8,
    },
    AllocateCognitive {
        size: u64,
        #[serde(rename = "type")]
        resource_type: String,
    },
    FreeCognitive {
        resource_id: String,
    },
    SendThought {
        target: Pid,
        thought: serde_json::Value,
    },
    ReceiveThought {
        #[serde(default)]
        blocking: bool,
    },
}

impl Syscall {
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Think { .. } => "think",
            Syscall::Reason { .. } => "reason",
            Syscall::Feel { .. } => "feel",
            Syscall::Remember { .. } => "remember",
            Syscall::Forget { .. } => "forget",
            Syscall::Attend { .. } => "attend",
            Syscall::SpawnAgent { .. } => "spawn_agent",
            Syscall::QueryKnowledge { .. } => "query_knowledge",
            Syscall::SpreadActivation { .. } => "spread_activation",
            Syscall::ShiftConsciousness { .. } => "shift_consciousness",
            Syscall::AllocateCognitive { .. } => "allocate_cognitive",
            Syscall::FreeCognitive { .. } => "free_cognitive",
            Syscall::SendThought { .. } => "send_thought",
            Syscall::ReceiveThought { .. } => "receive_thought",
        }
    }
}

/// Success record returned by the dispatcher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyscallReply {
    Thought {
        atom: Uuid,
        timestamp: DateTime<Utc>,
    },
    Inferences {
        atoms: Vec<Atom>,
    },
    Felt {
        emotion: String,
    },
    Remembered {
        atom: Uuid,
    },
    Forgotten {
        forgotten: bool,
        attention: f64,
    },
    Attended,
    Spawned {
        pid: Pid,
        summary: ProcessSummary,
    },
    Knowledge {
        matches: Vec<QueryMatch>,
    },
    Activated,
    Shifted {
        level: u8,
    },
    Allocated {
        resource_id: String,
    },
    Freed,
    Delivered,
    Received {
        message: Option<ThoughtMessage>,
    },
}
