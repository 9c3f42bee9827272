//! KernelAgent driver
//!
//! A thin agent layer over the syscall surface. Agents hold only weak
//! handles (their PID and their subordinates' PIDs) and translate domain
//! operations into syscalls. Kill cascades to children here, not in the
//! kernel: the process table never terminates descendants implicitly.

use serde::Serialize;
use tracing::info;

use crate::kernel::CognitiveKernel;
use crate::personality::{PersonalityProfile, PersonalityProvider};
use crate::process::{Pid, ProcessSummary, SpawnConfig, ROOT_PID};
use crate::syscall::{Syscall, SyscallFailure, SyscallReply};

/// How strongly subordinates inherit their parent's personality.
const INHERIT_RATE: f64 = 0.85;

pub struct KernelAgent {
    pid: Pid,
    name: String,
    subordinates: Vec<Pid>,
    personality: Box<dyn PersonalityProvider>,
}

impl KernelAgent {
    /// Spawn a top-level agent with a blank personality.
    pub fn spawn(
        kernel: &mut CognitiveKernel,
        name: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<Self, SyscallFailure> {
        Self::spawn_with_personality(kernel, name, role, Box::new(PersonalityProfile::new()))
    }

    /// Spawn a top-level agent. Its `urgency` trait, when present, maps to
    /// process priority (urgent personalities get lower numbers).
    pub fn spawn_with_personality(
        kernel: &mut CognitiveKernel,
        name: impl Into<String>,
        role: impl Into<String>,
        personality: Box<dyn PersonalityProvider>,
    ) -> Result<Self, SyscallFailure> {
        let name = name.into();
        let config = Self::configure(&name, role.into(), personality.as_ref());
        let pid = Self::spawn_process(kernel, ROOT_PID, config)?;
        Ok(Self {
            pid,
            name,
            subordinates: Vec::new(),
            personality,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subordinates(&self) -> &[Pid] {
        &self.subordinates
    }

    /// Spawn a child agent whose personality derives from this one.
    pub fn spawn_subordinate(
        &mut self,
        kernel: &mut CognitiveKernel,
        name: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<KernelAgent, SyscallFailure> {
        let name = name.into();
        let personality = self.personality.inherit(INHERIT_RATE);
        let config = Self::configure(&name, role.into(), personality.as_ref());
        let pid = Self::spawn_process(kernel, self.pid, config)?;
        self.subordinates.push(pid);
        Ok(KernelAgent {
            pid,
            name,
            subordinates: Vec::new(),
            personality,
        })
    }

    /// Translate a domain task into a `send_thought` syscall.
    pub fn send_task<T: Serialize>(
        &self,
        kernel: &mut CognitiveKernel,
        target: Pid,
        task: T,
    ) -> Result<(), SyscallFailure> {
        let thought = serde_json::json!({
            "task": serde_json::to_value(task).unwrap_or_default(),
            "assigned_by": self.pid,
        });
        kernel.syscall(self.pid, Syscall::SendThought { target, thought })?;
        Ok(())
    }

    pub fn ps(&self, kernel: &CognitiveKernel) -> Vec<ProcessSummary> {
        kernel.ps()
    }

    /// Kill a process and its descendants, forgetting it as a subordinate.
    pub fn kill(&mut self, kernel: &mut CognitiveKernel, pid: Pid) -> bool {
        let killed = kernel.kill_tree(pid) > 0;
        self.subordinates.retain(|&p| p != pid);
        killed
    }

    /// Remove the oldest subordinate by creation time, cascading to its
    /// descendants. Returns the removed PID.
    pub fn deprecate_oldest(&mut self, kernel: &mut CognitiveKernel) -> Option<Pid> {
        let oldest = self
            .subordinates
            .iter()
            .filter_map(|&pid| kernel.process(pid).map(|summary| (pid, summary.created_at)))
            .min_by_key(|&(_, created_at)| created_at)
            .map(|(pid, _)| pid)?;
        info!(agent = %self.name, pid = oldest, "deprecating oldest subordinate");
        kernel.kill_tree(oldest);
        self.subordinates.retain(|&p| p != oldest);
        Some(oldest)
    }

    /// Shut the agent down: subordinates and their descendants first, then
    /// the agent's own process. Consumes the agent.
    pub fn shutdown(self, kernel: &mut CognitiveKernel) -> usize {
        info!(agent = %self.name, pid = self.pid, "agent shutting down");
        kernel.kill_tree(self.pid)
    }

    fn configure(name: &str, role: String, personality: &dyn PersonalityProvider) -> SpawnConfig {
        let mut config = SpawnConfig::new(name).with_role(role);
        if let Some(urgency) = personality.get("urgency") {
            config = config.with_priority(((1.0 - urgency) * 10.0).round() as u8);
        }
        config
    }

    fn spawn_process(
        kernel: &mut CognitiveKernel,
        caller: Pid,
        config: SpawnConfig,
    ) -> Result<Pid, SyscallFailure> {
        match kernel.syscall(caller, Syscall::SpawnAgent { config })? {
            SyscallReply::Spawned { pid, .. } => Ok(pid),
            _ => unreachable!("spawn_agent always replies Spawned"),
        }
    }
}
