//! Invariant 4 (§8): a `LaunchIntent` is never launched a second time across
//! crash/resume, including for a launch state itself — not just for the
//! action-state crash point `crash_and_resume.rs` covers. Seeds a snapshot
//! whose `current_state` is still the launch state, with an outbox entry
//! already recorded and marked `launched: true`, as if the parent had spawned
//! the child and persisted that flip right before the process died — before
//! the child itself had written anything and before the loop's next
//! `state_enter` snapshot moved `current_state` past the launch. Resuming
//! must reuse the recorded child id rather than minting a second one.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use loomflow::compile;
use loomflow::config::types::{
    FinalState, FinalTag, InitialState, InitialTag, LaunchMode, MachineConfig, MachineLaunchState, StateDef, Settings,
    StringOrList, Transition,
};
use loomflow::ids::ExecutionId;
use loomflow::lock::InMemoryExecutionLock;
use loomflow::persistence::{InMemoryPersistenceBackend, PersistenceBackend};
use loomflow::result_backend::InMemoryResultBackend;
use loomflow::snapshot::{LaunchIntent, MachineSnapshot};
use loomflow::{Engine, Registry};
use serde_json::json;

use super::common::{single_agent_machine, CountingExecutor};

fn parent_config() -> MachineConfig {
    let mut states = HashMap::new();
    states.insert(
        "init".to_string(),
        StateDef::Initial(InitialState {
            type_: InitialTag::Initial,
            transitions: vec![Transition { condition: None, to: "launch_child".to_string() }],
        }),
    );
    states.insert(
        "launch_child".to_string(),
        StateDef::MachineLaunch(MachineLaunchState {
            machine: StringOrList::One("child".to_string()),
            foreach: None,
            as_: None,
            key: None,
            mode: LaunchMode::Settled,
            timeout: None,
            input: None,
            output_to_context: HashMap::from([("value".to_string(), "{{ output.value }}".to_string())]),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "done".to_string() }],
        }),
    );
    states.insert(
        "done".to_string(),
        StateDef::Final(FinalState {
            type_: FinalTag::Final,
            output: HashMap::from([("value".to_string(), "{{ context.value }}".to_string())]),
        }),
    );

    MachineConfig {
        name: "launcher".to_string(),
        states,
        context_init: HashMap::new(),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}

/// **Scenario**: resuming mid-launch reuses the outbox's already-recorded
/// child id instead of spawning a second child for the same state visit.
#[tokio::test]
async fn resume_mid_launch_does_not_double_spawn() {
    let execution_id = ExecutionId::new();
    let child_id = ExecutionId::new();
    let persistence = Arc::new(InMemoryPersistenceBackend::new());

    let intent = LaunchIntent {
        execution_id: child_id,
        machine: "child".to_string(),
        input: json!({}),
        launched: true,
        origin_state: "launch_child".to_string(),
        origin_step: 0,
    };

    // As if the parent had spawned `child_id`, persisted `launched: true`, and
    // then the process died before the child wrote anything of its own and
    // before the next `state_enter` snapshot advanced past `launch_child`.
    let crashed_snapshot = MachineSnapshot {
        execution_id,
        machine_name: "launcher".to_string(),
        spec_version: "1.0.0".to_string(),
        current_state: "launch_child".to_string(),
        context: json!({}),
        step: 0,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        event: Some("state_enter".to_string()),
        output: None,
        parent_execution_id: None,
        pending_launches: vec![intent],
        total_api_calls: None,
        total_cost: None,
    };
    persistence
        .save(
            &MachineSnapshot::persistence_key(execution_id),
            serde_json::to_value(&crashed_snapshot).unwrap(),
        )
        .await
        .unwrap();

    let executor = Arc::new(CountingExecutor::new(json!({"v": "ok"})));
    let registry = Registry::new()
        .with_agent("agent_child", executor.clone())
        .with_machine("child", Arc::new(compile(single_agent_machine("child", "agent_child")).unwrap()));

    let engine = Engine::new(
        persistence,
        Arc::new(InMemoryResultBackend::new()),
        Arc::new(InMemoryExecutionLock::new()),
        Arc::new(registry),
    );

    let compiled = Arc::new(compile(parent_config()).unwrap());
    let output = engine.resume(compiled, execution_id).await.unwrap();

    assert_eq!(output, json!({"value": {"v": "ok"}}));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1, "the child must run exactly once across the crash/resume");
}
