//! Syscall dispatcher
//!
//! The sole entry point for cognitive operations. Every call resolves the
//! caller first (`ESRCH` otherwise), increments the per-process and
//! kernel-wide counters, validates arguments, and only then mutates state:
//! a failed syscall leaves the kernel exactly as it was.

use tracing::debug;

use crate::atomspace::{Metadata, QueryPattern, TruthValue};
use crate::events::KernelEvent;
use crate::kernel::CognitiveKernel;
use crate::namespace::NamespaceNode;
use crate::process::{Emotion, Pid, SpawnConfig, ThoughtMessage};

use super::{Syscall, SyscallFailure, SyscallReply, SyscallResult, SYSCALL_NAMES};

fn unit_range(value: f64, what: &str) -> Result<(), SyscallFailure> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SyscallFailure::einval(format!(
            "{what} must be in [0, 1], got {value}"
        )))
    }
}

impl CognitiveKernel {
    /// Dispatch one cognitive syscall on behalf of `caller`.
    pub fn syscall(&mut self, caller: Pid, call: Syscall) -> SyscallResult {
        self.count_call(caller)?;
        debug!(caller, op = call.name(), "syscall");
        match call {
            Syscall::Think { input, context } => self.sys_think(caller, input, context),
            Syscall::Reason { premise, query } => self.sys_reason(&premise, &query),
            Syscall::Feel { emotion, intensity } => self.sys_feel(caller, &emotion, intensity),
            Syscall::Remember {
                key,
                value,
                importance,
            } => self.sys_remember(&key, value, importance),
            Syscall::Forget { key, threshold } => self.sys_forget(&key, threshold),
            Syscall::Attend {
                target,
                spread_factor,
            } => self.sys_attend(caller, &target, spread_factor),
            Syscall::SpawnAgent { config } => self.sys_spawn_agent(caller, config),
            Syscall::QueryKnowledge { pattern } => self.sys_query_knowledge(&pattern),
            Syscall::SpreadActivation { source, strength } => {
                self.sys_spread_activation(&source, strength)
            }
            Syscall::ShiftConsciousness { level } => self.sys_shift_consciousness(caller, level),
            Syscall::AllocateCognitive {
                size,
                resource_type,
            } => self.sys_allocate_cognitive(caller, size, &resource_type),
            Syscall::FreeCognitive { resource_id } => self.sys_free_cognitive(&resource_id),
            Syscall::SendThought { target, thought } => self.sys_send_thought(caller, target, thought),
            Syscall::ReceiveThought { blocking } => self.sys_receive_thought(caller, blocking),
        }
    }

    /// Loose entry point for namespace `/cognitive/<name>` handles. The
    /// typed path cannot produce `ENOSYS`; this one can.
    pub fn dispatch_named(
        &mut self,
        caller: Pid,
        name: &str,
        args: serde_json::Value,
    ) -> SyscallResult {
        if !SYSCALL_NAMES.contains(&name) {
            self.count_call(caller)?;
            return Err(SyscallFailure::enosys(name));
        }
        let mut fields = args.as_object().cloned().unwrap_or_default();
        fields.insert("op".to_string(), serde_json::json!(name));
        match serde_json::from_value::<Syscall>(serde_json::Value::Object(fields)) {
            Ok(call) => self.syscall(caller, call),
            Err(err) => {
                self.count_call(caller)?;
                Err(SyscallFailure::einval(format!(
                    "bad arguments for '{name}': {err}"
                )))
            }
        }
    }

    /// Resolve the caller and bump the call counters. Failure is still a
    /// call, so the kernel-wide counter always moves.
    fn count_call(&mut self, caller: Pid) -> Result<(), SyscallFailure> {
        self.syscall_count += 1;
        match self.processes.live_mut(caller) {
            Some(process) => {
                process.stats.syscalls += 1;
                Ok(())
            }
            None => Err(SyscallFailure::esrch(caller)),
        }
    }

    fn sys_think(
        &mut self,
        caller: Pid,
        input: serde_json::Value,
        context: serde_json::Value,
    ) -> SyscallResult {
        let now = self.now();
        let name = format!("thought_{}_{}", now.timestamp_millis(), caller);
        let mut metadata = Metadata::new();
        metadata.insert("input".to_string(), input);
        metadata.insert("context".to_string(), context);
        let atom = self
            .replicator
            .add_node(
                "ConceptNode",
                &name,
                Some(TruthValue::new(0.8, 0.9)),
                Some(0.7),
                Some(metadata),
            )
            .map_err(|err| SyscallFailure::einval(err.to_string()))?;
        Ok(SyscallReply::Thought {
            atom,
            timestamp: now,
        })
    }

    fn sys_reason(&mut self, premise: &str, query: &str) -> SyscallResult {
        let pattern = QueryPattern::new()
            .of_type("InheritanceLink")
            .with_outgoing(vec![premise.to_string(), query.to_string()]);
        let atoms = self
            .replicator
            .store()
            .query(&pattern)
            .into_iter()
            .map(|m| m.atom)
            .collect();
        Ok(SyscallReply::Inferences { atoms })
    }

    fn sys_feel(&mut self, caller: Pid, emotion: &str, intensity: f64) -> SyscallResult {
        unit_range(intensity, "intensity")?;
        let emotion = Emotion::from_kind(emotion, intensity);
        if let Some(process) = self.processes.live_mut(caller) {
            process.emotion = emotion.clone();
        }
        self.namespace.set(
            &["emotion", &caller.to_string()],
            NamespaceNode::Value(serde_json::to_value(&emotion).unwrap_or_default()),
        );
        self.events.publish(KernelEvent::EmotionShifted {
            pid: caller,
            kind: emotion.kind.clone(),
        });
        Ok(SyscallReply::Felt {
            emotion: emotion.kind,
        })
    }

    fn sys_remember(
        &mut self,
        key: &str,
        value: serde_json::Value,
        importance: f64,
    ) -> SyscallResult {
        unit_range(importance, "importance")?;
        let mut metadata = Metadata::new();
        metadata.insert("value".to_string(), value);
        let atom = self
            .replicator
            .add_node(
                "ConceptNode",
                key,
                Some(TruthValue::new(importance, 0.9)),
                Some(importance),
                Some(metadata),
            )
            .map_err(|err| SyscallFailure::einval(err.to_string()))?;
        Ok(SyscallReply::Remembered { atom })
    }

    fn sys_forget(&mut self, key: &str, threshold: f64) -> SyscallResult {
        unit_range(threshold, "threshold")?;
        let atom = self
            .replicator
            .store()
            .get_node("ConceptNode", key)
            .ok_or_else(|| SyscallFailure::enoent(format!("no memory named '{key}'")))?;
        let (id, attention) = (atom.id, atom.attention);

        // Strictly below the threshold forgets; at or above it, the memory
        // fades by half instead.
        if attention < threshold {
            self.replicator.set_attention(id, 0.0);
            Ok(SyscallReply::Forgotten {
                forgotten: true,
                attention: 0.0,
            })
        } else {
            let faded = attention / 2.0;
            self.replicator.set_attention(id, faded);
            Ok(SyscallReply::Forgotten {
                forgotten: false,
                attention: faded,
            })
        }
    }

    fn sys_attend(&mut self, caller: Pid, target: &str, spread_factor: f64) -> SyscallResult {
        unit_range(spread_factor, "spread_factor")?;
        let id = self
            .replicator
            .store()
            .get_node("ConceptNode", target)
            .map(|atom| atom.id)
            .ok_or_else(|| SyscallFailure::enoent(format!("no atom named '{target}'")))?;
        self.replicator.set_attention(id, 1.0);
        self.replicator.spread_attention(id, spread_factor, 2);
        if let Some(process) = self.processes.live_mut(caller) {
            process.attention_focus = Some(id);
        }
        Ok(SyscallReply::Attended)
    }

    fn sys_spawn_agent(&mut self, caller: Pid, config: SpawnConfig) -> SyscallResult {
        let now = self.now();
        let pid = self.processes.allocate(caller, &config, now);
        self.scheduler.enqueue(pid, &mut self.processes, now);

        let summary = self
            .processes
            .get(pid)
            .map(|p| p.summary())
            .expect("process just allocated");
        let value = serde_json::to_value(&summary).unwrap_or_default();
        let key = pid.to_string();
        self.namespace
            .set(&["proc", &key], NamespaceNode::Value(value.clone()));
        self.namespace
            .set(&["agents", &key], NamespaceNode::Value(value));
        self.events.publish(KernelEvent::ProcessSpawned {
            pid,
            name: summary.name.clone(),
        });
        Ok(SyscallReply::Spawned { pid, summary })
    }

    fn sys_query_knowledge(&mut self, pattern: &QueryPattern) -> SyscallResult {
        let matches = self.replicator.store().query(pattern);
        self.knowledge_queries += 1;
        Ok(SyscallReply::Knowledge { matches })
    }

    fn sys_spread_activation(&mut self, source: &str, strength: f64) -> SyscallResult {
        unit_range(strength, "strength")?;
        let id = self
            .replicator
            .store()
            .get_node("ConceptNode", source)
            .map(|atom| atom.id)
            .ok_or_else(|| SyscallFailure::enoent(format!("no atom named '{source}'")))?;
        self.replicator.spread_attention(id, strength, 3);
        Ok(SyscallReply::Activated)
    }

    fn sys_shift_consciousness(&mut self, caller: Pid, level: u8) -> SyscallResult {
        if level > 3 {
            return Err(SyscallFailure::einval(format!(
                "consciousness level must be in 0..=3, got {level}"
            )));
        }
        if let Some(process) = self.processes.live_mut(caller) {
            process.consciousness_level = level;
        }
        self.namespace.set(
            &["consciousness", &caller.to_string()],
            NamespaceNode::Value(serde_json::json!(level)),
        );
        self.events
            .publish(KernelEvent::ConsciousnessShifted { pid: caller, level });
        Ok(SyscallReply::Shifted { level })
    }

    fn sys_allocate_cognitive(
        &mut self,
        caller: Pid,
        size: u64,
        resource_type: &str,
    ) -> SyscallResult {
        if size == 0 {
            return Err(SyscallFailure::einval("size must be nonzero"));
        }
        self.resource_counter += 1;
        let resource_id = format!(
            "mem_{:04x}_{:04x}",
            self.resource_counter,
            self.rng.below(0x10000)
        );
        self.namespace.set(
            &["memory", &resource_id],
            NamespaceNode::Value(serde_json::json!({
                "owner": caller,
                "size": size,
                "type": resource_type,
                "allocated_at": self.now(),
            })),
        );
        self.resources.insert(resource_id.clone(), caller);
        Ok(SyscallReply::Allocated { resource_id })
    }

    fn sys_free_cognitive(&mut self, resource_id: &str) -> SyscallResult {
        if self.resources.remove(resource_id).is_none() {
            return Err(SyscallFailure::enoent(format!(
                "no cognitive resource '{resource_id}'"
            )));
        }
        self.namespace.remove(&["memory", resource_id]);
        Ok(SyscallReply::Freed)
    }

    fn sys_send_thought(
        &mut self,
        caller: Pid,
        target: Pid,
        thought: serde_json::Value,
    ) -> SyscallResult {
        let now = self.now();
        let Some(receiver) = self.processes.live_mut(target) else {
            return Err(SyscallFailure::esrch(target));
        };
        receiver.mailbox.push_back(ThoughtMessage {
            from: caller,
            payload: thought,
            timestamp: now,
        });
        receiver.stats.messages_received += 1;
        if let Some(sender) = self.processes.live_mut(caller) {
            sender.stats.messages_sent += 1;
        }
        self.events.publish(KernelEvent::ThoughtSent {
            from: caller,
            to: target,
        });
        Ok(SyscallReply::Delivered)
    }

    fn sys_receive_thought(&mut self, caller: Pid, blocking: bool) -> SyscallResult {
        if blocking {
            // No suspension mechanism exists under the cooperative model;
            // callers poll and yield instead.
            return Err(SyscallFailure::einval(
                "blocking receive is not supported; poll with blocking=false",
            ));
        }
        let message = self
            .processes
            .live_mut(caller)
            .and_then(|process| process.mailbox.pop_front());
        Ok(SyscallReply::Received { message })
    }
}
