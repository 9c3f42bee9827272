//! Process Module
//!
//! Cognitive process records, emotion state, and the PID-owning table.

mod emotion;
mod process;
mod table;

pub use emotion::Emotion;
pub use process::{
    CognitiveProcess, Pid, ProcessState, ProcessStats, ProcessSummary, SpawnConfig,
    ThoughtMessage, WorkingMemoryItem, WORKING_MEMORY_CAP, WORKING_MEMORY_TTL_SECS,
};
pub use table::{ProcessTable, ROOT_PID};
