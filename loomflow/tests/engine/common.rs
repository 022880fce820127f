//! Shared test fixtures: an `Engine` wired to in-memory backends, a hook that
//! resolves `action: increment`, and small scripted executors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use loomflow::config::types::{
    AgentState, FinalState, FinalTag, InitialState, InitialTag, MachineConfig, Settings, StateDef, Transition,
};
use loomflow::executor::AgentResult;
use loomflow::hooks::{HookErrorInfo, MachineHooks};
use loomflow::lock::InMemoryExecutionLock;
use loomflow::persistence::InMemoryPersistenceBackend;
use loomflow::result_backend::InMemoryResultBackend;
use loomflow::{AgentExecutor, Engine, Registry};
use serde_json::{json, Value};

/// Builds an `Engine` over fresh in-memory backends and the given registry —
/// every scenario test starts from a clean slate.
pub fn build_engine(registry: Registry) -> Engine {
    Engine::new(
        Arc::new(InMemoryPersistenceBackend::new()),
        Arc::new(InMemoryResultBackend::new()),
        Arc::new(InMemoryExecutionLock::new()),
        Arc::new(registry),
    )
}

/// `on_action("increment", ..)` bumps `context.n` by one; any other action name
/// is a no-op passthrough. Grounds the linear-counter seed scenario (§8.1),
/// which drives its loop through `action` states rather than agents.
pub struct IncrementHook;

#[async_trait]
impl MachineHooks for IncrementHook {
    async fn on_action(&self, action: &str, context: Value) -> Value {
        if action != "increment" {
            return context;
        }
        let mut obj = context.as_object().cloned().unwrap_or_default();
        let n = obj.get("n").and_then(Value::as_i64).unwrap_or(0);
        obj.insert("n".to_string(), json!(n + 1));
        Value::Object(obj)
    }

    async fn on_error(&self, _state: &str, error: &HookErrorInfo, _context: &Value) -> Option<String> {
        panic!("unexpected machine error: {} ({:?})", error.message, error.code);
    }
}

/// An executor that always returns a fixed `output`, ignoring its input —
/// stands in for the `write` state's agent in the writer/critic loop.
pub struct ConstantExecutor {
    pub name: String,
    pub output: Value,
}

#[async_trait]
impl AgentExecutor for ConstantExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: Value) -> AgentResult {
        AgentResult::success(self.output.clone())
    }
}

/// The writer/critic seed scenario's stub critic (§8.2): `score = min(round*3, 10)`,
/// reading `round` off whatever scope it's handed (the full context, since the
/// `review` state declares no `input` template).
pub struct ScoreByRoundExecutor;

#[async_trait]
impl AgentExecutor for ScoreByRoundExecutor {
    fn name(&self) -> &str {
        "critic"
    }

    async fn execute(&self, input: Value) -> AgentResult {
        let round = input.get("round").and_then(Value::as_i64).unwrap_or(0);
        let score = (round * 3).min(10);
        AgentResult::success(json!({ "score": score }))
    }
}

/// A child-machine stand-in executor that sleeps `delay_ms` before returning a
/// fixed `value` — used to build parallel/foreach child machines whose
/// completion order is deliberately shuffled (§8.3, §8.4).
pub struct SleepyExecutor {
    pub delay_ms: u64,
    pub output: Value,
}

#[async_trait]
impl AgentExecutor for SleepyExecutor {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn execute(&self, _input: Value) -> AgentResult {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        AgentResult::success(self.output.clone())
    }
}

/// A doubling executor for the `foreach` scenario's child machine: returns
/// `{n: input.n * 2}`.
pub struct DoublerExecutor;

#[async_trait]
impl AgentExecutor for DoublerExecutor {
    fn name(&self) -> &str {
        "doubler"
    }

    async fn execute(&self, input: Value) -> AgentResult {
        let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
        AgentResult::success(json!({ "n": n * 2 }))
    }
}

/// An executor that counts its own invocations — used by the launch-state
/// crash & resume scenario to assert a child is actually started exactly
/// once, not merely that the parent's bookkeeping looks right.
pub struct CountingExecutor {
    pub calls: AtomicU64,
    pub output: Value,
}

impl CountingExecutor {
    pub fn new(output: Value) -> Self {
        Self { calls: AtomicU64::new(0), output }
    }
}

#[async_trait]
impl AgentExecutor for CountingExecutor {
    fn name(&self) -> &str {
        "counting"
    }

    async fn execute(&self, _input: Value) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AgentResult::success(self.output.clone())
    }
}

/// Counts how many times `execute` was actually invoked — used by the crash &
/// resume scenario to assert exactly one additional call happens after resume.
pub struct CountingIncrementHook {
    pub calls: AtomicU64,
}

impl CountingIncrementHook {
    pub fn new() -> Self {
        Self { calls: AtomicU64::new(0) }
    }
}

#[async_trait]
impl MachineHooks for CountingIncrementHook {
    async fn on_action(&self, action: &str, context: Value) -> Value {
        if action != "increment" {
            return context;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut obj = context.as_object().cloned().unwrap_or_default();
        let n = obj.get("n").and_then(Value::as_i64).unwrap_or(0);
        obj.insert("n".to_string(), json!(n + 1));
        Value::Object(obj)
    }
}

/// A trivial one-agent child machine: `init -> call(agent_name) -> done`,
/// threading the agent's output through context so the final `output` map can
/// see it. Used by the parallel/foreach launch scenarios, where the child
/// machines themselves are not under test — only the parent's fan-out is.
pub fn single_agent_machine(machine_name: &str, agent_name: &str) -> MachineConfig {
    let mut states = HashMap::new();
    states.insert(
        "init".to_string(),
        StateDef::Initial(InitialState {
            type_: InitialTag::Initial,
            transitions: vec![Transition { condition: None, to: "call".to_string() }],
        }),
    );
    states.insert(
        "call".to_string(),
        StateDef::Agent(AgentState {
            agent: agent_name.to_string(),
            execution: Default::default(),
            input: None,
            output_to_context: HashMap::from([("value".to_string(), "{{ output }}".to_string())]),
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
        name: machine_name.to_string(),
        states,
        context_init: HashMap::new(),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}
