//! §8 seed scenario 5: a crashed interpreter resumes from its last durable
//! snapshot rather than restarting. Seeds the persistence backend directly
//! with a snapshot as if the process had died right after `bump` ran but
//! before `bump2` — the same state a real crash would leave behind via
//! [`loomflow::interpreter::Engine::write_snapshot`] — then resumes on a
//! fresh `Engine` sharing that backend and checks exactly one more
//! `increment` action fires.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use loomflow::compile;
use loomflow::config::types::{
    ActionState, FinalState, FinalTag, InitialState, InitialTag, MachineConfig, Settings, StateDef, Transition,
};
use loomflow::lock::InMemoryExecutionLock;
use loomflow::persistence::{InMemoryPersistenceBackend, PersistenceBackend};
use loomflow::result_backend::InMemoryResultBackend;
use loomflow::snapshot::MachineSnapshot;
use loomflow::{Engine, ExecutionId, Registry};
use serde_json::json;

use super::common::CountingIncrementHook;

fn linear_counter_config() -> MachineConfig {
    let mut states = HashMap::new();
    states.insert(
        "init".to_string(),
        StateDef::Initial(InitialState {
            type_: InitialTag::Initial,
            transitions: vec![Transition { condition: None, to: "bump".to_string() }],
        }),
    );
    states.insert(
        "bump".to_string(),
        StateDef::Action(ActionState {
            action: "increment".to_string(),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "bump2".to_string() }],
        }),
    );
    states.insert(
        "bump2".to_string(),
        StateDef::Action(ActionState {
            action: "increment".to_string(),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "done".to_string() }],
        }),
    );
    states.insert(
        "done".to_string(),
        StateDef::Final(FinalState {
            type_: FinalTag::Final,
            output: HashMap::from([("n".to_string(), "{{ context.n }}".to_string())]),
        }),
    );

    MachineConfig {
        name: "linear_counter".to_string(),
        states,
        context_init: HashMap::from([("n".to_string(), "0".to_string())]),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}

/// **Scenario**: resuming a snapshot left mid-run continues past only the
/// steps that hadn't happened yet, rather than replaying from the start.
#[tokio::test]
async fn resume_continues_past_crash_point() {
    let execution_id = ExecutionId::new();
    let persistence = Arc::new(InMemoryPersistenceBackend::new());

    // As if `bump` had already run and the interpreter died right after
    // persisting its `state_enter` snapshot for `bump2`.
    let crashed_snapshot = MachineSnapshot {
        execution_id,
        machine_name: "linear_counter".to_string(),
        spec_version: "1.0.0".to_string(),
        current_state: "bump2".to_string(),
        context: json!({"n": 1}),
        step: 1,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        event: Some("state_enter".to_string()),
        output: None,
        parent_execution_id: None,
        pending_launches: Vec::new(),
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

    let hook = Arc::new(CountingIncrementHook::new());
    let engine = Engine::new(
        persistence,
        Arc::new(InMemoryResultBackend::new()),
        Arc::new(InMemoryExecutionLock::new()),
        Arc::new(Registry::new()),
    )
    .with_hooks(hook.clone());

    let compiled = Arc::new(compile(linear_counter_config()).unwrap());
    let output = engine.resume(compiled, execution_id).await.unwrap();

    assert_eq!(output, json!({"n": 2}));
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1, "only the not-yet-run bump2 should fire");
}

/// **Scenario**: resuming an id with no persisted snapshot is an error, not a
/// silent fresh start (otherwise "resume" and "start" would be indistinguishable).
#[tokio::test]
async fn resume_without_snapshot_fails() {
    let engine = Engine::new(
        Arc::new(InMemoryPersistenceBackend::new()),
        Arc::new(InMemoryResultBackend::new()),
        Arc::new(InMemoryExecutionLock::new()),
        Arc::new(Registry::new()),
    );
    let compiled = Arc::new(compile(linear_counter_config()).unwrap());
    let err = engine.resume(compiled, ExecutionId::new()).await.unwrap_err();
    assert!(matches!(err, loomflow::error::MachineError::NoSnapshotToResume(_)));
}
