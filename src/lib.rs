//! Echo Kernel
//!
//! A single-process cognitive kernel runtime:
//! - Process table + consciousness-aware cooperative scheduler
//! - Closed syscall surface with uniform errno semantics
//! - Replicated hypergraph store (atoms, truth values, attention)
//! - Read-only hierarchical namespace over kernel state
//!
//! The kernel is the control plane agent logic executes on; neural
//! inference and trait containers are external collaborators reached
//! through the interfaces in `personality` and `replication::Transport`.

pub mod agent;
pub mod atomspace;
pub mod events;
pub mod kernel;
pub mod namespace;
pub mod personality;
pub mod process;
pub mod replication;
pub mod sched;
pub mod syscall;
pub mod utils;

// Re-exports for convenience
pub use agent::KernelAgent;
pub use atomspace::{Atom, AtomStore, QueryPattern, TruthValue};
pub use kernel::{CognitiveKernel, KernelConfig, KernelObject, KernelStats};
pub use process::{Pid, ProcessState, SpawnConfig, ROOT_PID};
pub use sched::SchedulerPolicy;
pub use syscall::{Errno, Syscall, SyscallFailure, SyscallReply, SyscallResult};
