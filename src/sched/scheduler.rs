//! Consciousness-aware scheduler
//!
//! Cooperative multiplexing of cognitive processes: ready/blocked queues,
//! a wall-clock time quantum, and three selection policies. Queues hold
//! PIDs only; process records stay owned by the table. Dead PIDs are
//! silently filtered, so the scheduler itself never errors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::process::{CognitiveProcess, Pid, ProcessState, ProcessTable};
use crate::utils::RandomSource;

/// Selection policy, fixed at scheduler construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    RoundRobin,
    Priority,
    #[default]
    ConsciousnessAware,
}

#[derive(Debug, Clone)]
struct BlockedEntry {
    reason: String,
    since: DateTime<Utc>,
}

pub struct Scheduler {
    policy: SchedulerPolicy,
    ready: VecDeque<Pid>,
    blocked: HashMap<Pid, BlockedEntry>,
    current: Option<Pid>,
    quantum: Duration,
    last_dispatch: Option<DateTime<Utc>>,
    enqueued_at: HashMap<Pid, DateTime<Utc>>,
    rng: Box<dyn RandomSource>,
}

impl Scheduler {
    pub fn new(
        policy: SchedulerPolicy,
        quantum: std::time::Duration,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            policy,
            ready: VecDeque::new(),
            blocked: HashMap::new(),
            current: None,
            quantum: Duration::from_std(quantum).unwrap_or_else(|_| Duration::milliseconds(100)),
            last_dispatch: None,
            enqueued_at: HashMap::new(),
            rng,
        }
    }

    pub fn policy(&self) -> SchedulerPolicy {
        self.policy
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked.len()
    }

    /// Reason a process was blocked, if it is blocked.
    pub fn block_reason(&self, pid: Pid) -> Option<&str> {
        self.blocked.get(&pid).map(|entry| entry.reason.as_str())
    }

    /// Put a process on the ready queue. Terminated or unknown PIDs are
    /// ignored, as are processes already queued or currently running.
    pub fn enqueue(&mut self, pid: Pid, table: &mut ProcessTable, now: DateTime<Utc>) {
        let Some(process) = table.live_mut(pid) else {
            return;
        };
        if self.current == Some(pid) || self.ready.contains(&pid) {
            return;
        }
        process.state = ProcessState::Ready;
        process.block_reason = None;
        self.blocked.remove(&pid);
        self.ready.push_back(pid);
        self.enqueued_at.insert(pid, now);
    }

    /// Remove and return the next PID per the active policy.
    pub fn dequeue(&mut self, table: &ProcessTable, now: DateTime<Utc>) -> Option<Pid> {
        self.ready.retain(|&pid| table.live(pid).is_some());
        if self.ready.is_empty() {
            return None;
        }

        let index = match self.policy {
            SchedulerPolicy::RoundRobin => 0,
            SchedulerPolicy::Priority => self.select_by_priority(table),
            SchedulerPolicy::ConsciousnessAware => self.select_by_score(table, now),
        };

        let pid = self.ready.remove(index)?;
        self.enqueued_at.remove(&pid);
        Some(pid)
    }

    /// Stable minimum-priority selection: the earliest-inserted process
    /// among those with the lowest priority number wins.
    fn select_by_priority(&self, table: &ProcessTable) -> usize {
        let mut best_index = 0;
        let mut best_priority = u8::MAX;
        for (index, &pid) in self.ready.iter().enumerate() {
            if let Some(process) = table.live(pid) {
                if process.priority < best_priority {
                    best_priority = process.priority;
                    best_index = index;
                }
            }
        }
        best_index
    }

    /// Single-pass scored selection. Ties go to the process waiting
    /// longest; residual ties are broken randomly.
    fn select_by_score(&mut self, table: &ProcessTable, now: DateTime<Utc>) -> usize {
        let mut candidates = Vec::with_capacity(self.ready.len());
        for (index, &pid) in self.ready.iter().enumerate() {
            if let Some(process) = table.live(pid) {
                let enqueued = self.enqueued_at.get(&pid).copied().unwrap_or(now);
                let wait_secs = (now - enqueued).num_milliseconds() as f64 / 1000.0;
                candidates.push((index, Self::score(process, wait_secs), enqueued));
            }
        }

        let mut best: Option<(usize, f64, DateTime<Utc>)> = None;
        for (index, score, enqueued) in candidates {
            let replace = match best {
                None => true,
                Some((_, best_score, best_enqueued)) => {
                    if score > best_score + f64::EPSILON {
                        true
                    } else if (score - best_score).abs() <= f64::EPSILON {
                        if enqueued < best_enqueued {
                            true
                        } else if enqueued == best_enqueued {
                            self.rng.below(2) == 0
                        } else {
                            false
                        }
                    } else {
                        false
                    }
                }
            };
            if replace {
                best = Some((index, score, enqueued));
            }
        }
        best.map(|(index, _, _)| index).unwrap_or(0)
    }

    /// Consciousness-aware score. All multipliers apply unconditionally in
    /// this order; the score is always positive.
    pub fn score(process: &CognitiveProcess, wait_secs: f64) -> f64 {
        let mut score = (10.0 - process.priority as f64) * 10.0;
        score *= Self::consciousness_weight(process.consciousness_level);
        score *= 1.0 + 0.5 * process.emotion.arousal;
        if process.attention_focus.is_some() {
            score *= 1.3;
        }
        if wait_secs > 10.0 {
            score *= 1.0 + wait_secs / 100.0;
        }
        score
    }

    fn consciousness_weight(level: u8) -> f64 {
        match level {
            0 => 1.0,
            1 => 1.5,
            2 => 2.0,
            _ => 3.0,
        }
    }

    /// One scheduling step.
    ///
    /// The running process is retained while its quantum lasts; otherwise
    /// it rotates back to ready and the best candidate is dispatched.
    /// Returns `None` when no process is runnable.
    pub fn schedule(&mut self, table: &mut ProcessTable, now: DateTime<Utc>) -> Option<Pid> {
        if let Some(current) = self.current {
            let still_running = table
                .live(current)
                .map(|p| p.state == ProcessState::Running)
                .unwrap_or(false);
            if still_running {
                if let Some(last) = self.last_dispatch {
                    if now - last < self.quantum {
                        return Some(current);
                    }
                }
                if let Some(process) = table.get_mut(current) {
                    Self::charge_cpu(process, now);
                    process.state = ProcessState::Ready;
                }
                self.current = None;
                self.enqueue(current, table, now);
            } else {
                self.current = None;
            }
        }

        let next = self.dequeue(table, now)?;
        if let Some(process) = table.get_mut(next) {
            process.state = ProcessState::Running;
            process.last_scheduled = Some(now);
        }
        debug!(pid = next, "dispatched");
        self.current = Some(next);
        self.last_dispatch = Some(now);
        Some(next)
    }

    /// Move a process to the blocked queue. It stays there until
    /// `unblock`; kill is the only other way out.
    pub fn block(
        &mut self,
        pid: Pid,
        reason: impl Into<String>,
        table: &mut ProcessTable,
        now: DateTime<Utc>,
    ) {
        let Some(process) = table.live_mut(pid) else {
            return;
        };
        let reason = reason.into();
        debug!(pid, %reason, "blocked");
        if self.current == Some(pid) {
            Self::charge_cpu(process, now);
            self.current = None;
        }
        self.ready.retain(|&q| q != pid);
        self.enqueued_at.remove(&pid);
        process.state = ProcessState::Blocked;
        process.block_reason = Some(reason.clone());
        self.blocked.insert(pid, BlockedEntry { reason, since: now });
    }

    /// Return a blocked process to the ready queue.
    pub fn unblock(&mut self, pid: Pid, table: &mut ProcessTable, now: DateTime<Utc>) {
        if self.blocked.remove(&pid).is_none() {
            return;
        }
        self.enqueue(pid, table, now);
    }

    /// Preempt the running process to the tail of the ready queue.
    pub fn yield_current(&mut self, table: &mut ProcessTable, now: DateTime<Utc>) {
        let Some(current) = self.current.take() else {
            return;
        };
        if let Some(process) = table.get_mut(current) {
            Self::charge_cpu(process, now);
            process.state = ProcessState::Ready;
        }
        self.enqueue(current, table, now);
    }

    pub fn set_priority(&self, pid: Pid, priority: u8, table: &mut ProcessTable) {
        if let Some(process) = table.live_mut(pid) {
            process.priority = priority.min(10);
        }
    }

    /// Drop a PID from every queue. Called on kill.
    pub fn remove(&mut self, pid: Pid) {
        self.ready.retain(|&q| q != pid);
        self.blocked.remove(&pid);
        self.enqueued_at.remove(&pid);
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    fn charge_cpu(process: &mut CognitiveProcess, now: DateTime<Utc>) {
        if let Some(last) = process.last_scheduled {
            if now > last {
                process.cpu_time += (now - last).to_std().unwrap_or_default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{SpawnConfig, ROOT_PID};
    use crate::utils::SeededRandom;

    fn scheduler(policy: SchedulerPolicy) -> Scheduler {
        Scheduler::new(
            policy,
            std::time::Duration::from_millis(100),
            Box::new(SeededRandom::new(42)),
        )
    }

    fn spawn(table: &mut ProcessTable, name: &str, now: DateTime<Utc>) -> Pid {
        table.allocate(ROOT_PID, &SpawnConfig::new(name), now)
    }

    #[test]
    fn round_robin_dequeues_fifo() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::RoundRobin);
        let a = spawn(&mut table, "a", now);
        let b = spawn(&mut table, "b", now);
        sched.enqueue(a, &mut table, now);
        sched.enqueue(b, &mut table, now);

        assert_eq!(sched.dequeue(&table, now), Some(a));
        assert_eq!(sched.dequeue(&table, now), Some(b));
        assert_eq!(sched.dequeue(&table, now), None);
    }

    #[test]
    fn priority_policy_is_stable_on_ties() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::Priority);
        let a = spawn(&mut table, "a", now);
        let b = spawn(&mut table, "b", now);
        let c = spawn(&mut table, "c", now);
        table.get_mut(c).unwrap().priority = 2;
        sched.enqueue(a, &mut table, now);
        sched.enqueue(b, &mut table, now);
        sched.enqueue(c, &mut table, now);

        // Lowest priority number first, then insertion order.
        assert_eq!(sched.dequeue(&table, now), Some(c));
        assert_eq!(sched.dequeue(&table, now), Some(a));
        assert_eq!(sched.dequeue(&table, now), Some(b));
    }

    #[test]
    fn higher_consciousness_level_wins() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let p1 = spawn(&mut table, "p1", now);
        let p2 = spawn(&mut table, "p2", now);
        table.get_mut(p1).unwrap().consciousness_level = 1;
        table.get_mut(p2).unwrap().consciousness_level = 3;
        sched.enqueue(p1, &mut table, now);
        sched.enqueue(p2, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(p2));
        assert_eq!(table.get(p2).unwrap().state, ProcessState::Running);
    }

    #[test]
    fn arousal_breaks_equal_levels() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let p1 = spawn(&mut table, "p1", now);
        let p2 = spawn(&mut table, "p2", now);
        table.get_mut(p1).unwrap().emotion.arousal = 0.9;
        table.get_mut(p2).unwrap().emotion.arousal = 0.1;
        sched.enqueue(p1, &mut table, now);
        sched.enqueue(p2, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(p1));
    }

    #[test]
    fn attention_focus_boosts_score() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let p1 = spawn(&mut table, "p1", now);
        let p2 = spawn(&mut table, "p2", now);
        table.get_mut(p2).unwrap().attention_focus = Some(uuid::Uuid::new_v4());
        sched.enqueue(p1, &mut table, now);
        sched.enqueue(p2, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(p2));
    }

    #[test]
    fn equal_scores_pick_longest_waiter() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let a = spawn(&mut table, "a", now);
        let b = spawn(&mut table, "b", now);
        // b enqueued earlier than a.
        sched.enqueue(b, &mut table, now - Duration::seconds(5));
        sched.enqueue(a, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(b));
    }

    #[test]
    fn starvation_boost_kicks_in_past_ten_seconds() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let urgent = spawn(&mut table, "urgent", now);
        let starved = spawn(&mut table, "starved", now);
        table.get_mut(urgent).unwrap().priority = 4;
        // Waiting 100s: multiplier 2.0 outweighs the one-step priority gap.
        sched.enqueue(starved, &mut table, now - Duration::seconds(100));
        sched.enqueue(urgent, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(starved));
    }

    #[test]
    fn quantum_retains_then_rotates() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::RoundRobin);
        let a = spawn(&mut table, "a", now);
        let b = spawn(&mut table, "b", now);
        sched.enqueue(a, &mut table, now);
        sched.enqueue(b, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(a));
        // Within the quantum: same process.
        let mid = now + Duration::milliseconds(50);
        assert_eq!(sched.schedule(&mut table, mid), Some(a));
        // Quantum expired: a rotates to the tail, b runs.
        let later = now + Duration::milliseconds(150);
        assert_eq!(sched.schedule(&mut table, later), Some(b));
        assert_eq!(table.get(a).unwrap().state, ProcessState::Ready);
        assert!(table.get(a).unwrap().cpu_time >= std::time::Duration::from_millis(150));
    }

    #[test]
    fn at_most_one_process_runs() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        for name in ["a", "b", "c"] {
            let pid = spawn(&mut table, name, now);
            sched.enqueue(pid, &mut table, now);
        }
        sched.schedule(&mut table, now);
        sched.schedule(&mut table, now + Duration::milliseconds(150));

        let running = table
            .list()
            .iter()
            .filter(|s| s.state == ProcessState::Running)
            .count();
        assert_eq!(running, 1);
    }

    #[test]
    fn terminated_processes_are_never_enqueued_or_scheduled() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::ConsciousnessAware);
        let a = spawn(&mut table, "a", now);
        table.kill(a);
        sched.enqueue(a, &mut table, now);
        assert_eq!(sched.ready_len(), 0);

        // A process killed while queued is filtered silently.
        let b = spawn(&mut table, "b", now);
        sched.enqueue(b, &mut table, now);
        table.kill(b);
        sched.remove(b);
        assert_eq!(sched.schedule(&mut table, now), None);
    }

    #[test]
    fn block_and_unblock_move_between_queues() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::RoundRobin);
        let a = spawn(&mut table, "a", now);
        sched.enqueue(a, &mut table, now);
        sched.schedule(&mut table, now);

        sched.block(a, "awaiting reply", &mut table, now);
        assert_eq!(sched.current(), None);
        assert_eq!(table.get(a).unwrap().state, ProcessState::Blocked);
        assert_eq!(sched.block_reason(a), Some("awaiting reply"));
        // Blocked processes stay blocked; nothing to schedule.
        assert_eq!(sched.schedule(&mut table, now), None);

        sched.unblock(a, &mut table, now);
        assert_eq!(table.get(a).unwrap().state, ProcessState::Ready);
        assert_eq!(sched.schedule(&mut table, now), Some(a));
    }

    #[test]
    fn yield_rotates_to_tail() {
        let now = Utc::now();
        let mut table = ProcessTable::new(now);
        let mut sched = scheduler(SchedulerPolicy::RoundRobin);
        let a = spawn(&mut table, "a", now);
        let b = spawn(&mut table, "b", now);
        sched.enqueue(a, &mut table, now);
        sched.enqueue(b, &mut table, now);

        assert_eq!(sched.schedule(&mut table, now), Some(a));
        sched.yield_current(&mut table, now);
        assert_eq!(sched.schedule(&mut table, now), Some(b));
        assert_eq!(sched.schedule(&mut table, now + Duration::milliseconds(150)), Some(a));
    }
}
