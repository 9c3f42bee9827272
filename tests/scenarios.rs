//! End-to-end kernel scenarios: spawn/think, scheduling priorities, IPC
//! ordering, and driver-level cascade shutdown.

use echo_kernel::{
    CognitiveKernel, KernelAgent, KernelConfig, QueryPattern, Syscall, SyscallReply, ROOT_PID,
};
use echo_kernel::process::SpawnConfig;
use echo_kernel::syscall::Errno;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn spawn(kernel: &mut CognitiveKernel, name: &str) -> echo_kernel::Pid {
    match kernel
        .syscall(
            ROOT_PID,
            Syscall::SpawnAgent {
                config: SpawnConfig::new(name),
            },
        )
        .unwrap()
    {
        SyscallReply::Spawned { pid, .. } => pid,
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn spawn_and_think() {
    init_tracing();
    let mut kernel = CognitiveKernel::new(KernelConfig::default());

    let pid = spawn(&mut kernel, "A");
    assert_eq!(pid, 1);

    let reply = kernel
        .syscall(
            pid,
            Syscall::Think {
                input: serde_json::json!("Q"),
                context: serde_json::json!({}),
            },
        )
        .unwrap();
    assert!(matches!(reply, SyscallReply::Thought { .. }));

    let reply = kernel
        .syscall(
            pid,
            Syscall::QueryKnowledge {
                pattern: QueryPattern::new().of_type("ConceptNode"),
            },
        )
        .unwrap();
    match reply {
        SyscallReply::Knowledge { matches } => {
            assert!(matches
                .iter()
                .any(|m| m.atom.name.as_deref().unwrap_or("").starts_with("thought_")));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn consciousness_level_drives_prioritization() {
    init_tracing();
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let p1 = spawn(&mut kernel, "P1");
    let p2 = spawn(&mut kernel, "P2");

    kernel.syscall(p1, Syscall::ShiftConsciousness { level: 1 }).unwrap();
    kernel.syscall(p2, Syscall::ShiftConsciousness { level: 3 }).unwrap();

    assert_eq!(kernel.step(), Some(p2));
}

#[test]
fn arousal_breaks_consciousness_ties() {
    init_tracing();
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let p1 = spawn(&mut kernel, "P1");
    let p2 = spawn(&mut kernel, "P2");

    // Both at level 1, priority 5; arousal decides.
    kernel
        .syscall(
            p1,
            Syscall::Feel {
                emotion: "excitement".into(),
                intensity: 0.9,
            },
        )
        .unwrap();
    kernel
        .syscall(
            p2,
            Syscall::Feel {
                emotion: "serenity".into(),
                intensity: 0.9,
            },
        )
        .unwrap();

    assert_eq!(kernel.step(), Some(p1));
}

#[test]
fn ipc_is_fifo_with_single_delivery() {
    init_tracing();
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let a = spawn(&mut kernel, "A");
    let b = spawn(&mut kernel, "B");

    for msg in ["m1", "m2"] {
        kernel
            .syscall(
                a,
                Syscall::SendThought {
                    target: b,
                    thought: serde_json::json!(msg),
                },
            )
            .unwrap();
    }

    for expected in ["m1", "m2"] {
        match kernel
            .syscall(b, Syscall::ReceiveThought { blocking: false })
            .unwrap()
        {
            SyscallReply::Received { message: Some(msg) } => {
                assert_eq!(msg.from, a);
                assert_eq!(msg.payload, serde_json::json!(expected));
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    match kernel
        .syscall(b, Syscall::ReceiveThought { blocking: false })
        .unwrap()
    {
        SyscallReply::Received { message: None } => {}
        other => panic!("expected empty mailbox, got {other:?}"),
    }
}

#[test]
fn blocking_receive_is_einval() {
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let a = spawn(&mut kernel, "A");
    let err = kernel
        .syscall(a, Syscall::ReceiveThought { blocking: true })
        .unwrap_err();
    assert_eq!(err.errno, Errno::Einval);
}

#[test]
fn remember_round_trips_through_the_store() {
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let a = spawn(&mut kernel, "A");
    kernel
        .syscall(
            a,
            Syscall::Remember {
                key: "mission".into(),
                value: serde_json::json!({"goal": "understand"}),
                importance: 0.8,
            },
        )
        .unwrap();

    let atom = kernel
        .atomspace()
        .get_node("ConceptNode", "mission")
        .expect("memory stored");
    assert_eq!(
        atom.metadata.get("value").unwrap(),
        &serde_json::json!({"goal": "understand"})
    );
    assert_eq!(atom.attention, 0.8);
}

#[test]
fn kernel_agent_shutdown_cascades() {
    init_tracing();
    let mut kernel = CognitiveKernel::new(KernelConfig::default());
    let mut boss = KernelAgent::spawn(&mut kernel, "boss", "manager").unwrap();
    let sub_a = boss.spawn_subordinate(&mut kernel, "sub-a", "worker").unwrap();
    let sub_b = boss.spawn_subordinate(&mut kernel, "sub-b", "worker").unwrap();
    let pids = [boss.pid(), sub_a.pid(), sub_b.pid()];

    boss.shutdown(&mut kernel);

    assert!(kernel.ps().is_empty());
    for pid in pids {
        assert!(kernel.open(&format!("/proc/{pid}")).is_err());
    }
}

#[test]
fn namespace_exposes_the_guaranteed_roots() {
    let kernel = CognitiveKernel::new(KernelConfig::default());
    for root in [
        "/proc",
        "/cognitive",
        "/atomspace",
        "/agents",
        "/memory",
        "/consciousness",
        "/emotion",
        "/reservoir",
    ] {
        assert!(kernel.open(root).is_ok(), "missing {root}");
    }
}
