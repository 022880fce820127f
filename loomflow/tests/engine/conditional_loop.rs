//! §8 seed scenario 2: a writer/critic loop. `write` is a constant-output
//! agent; `review` is a stub critic returning `score = min(round*3, 10)`.
//! Transitions to `done` once `context.score >= 8`, otherwise loops back to
//! `write`. Expected: final `score >= 8` and `round <= 4`.

use std::collections::HashMap;
use std::sync::Arc;

use loomflow::compile;
use loomflow::config::types::{
    AgentState, FinalState, FinalTag, InitialState, InitialTag, MachineConfig, Settings, StateDef, Transition,
};
use loomflow::Registry;
use serde_json::json;

use super::common::{build_engine, ConstantExecutor, ScoreByRoundExecutor};

fn writer_critic_config() -> MachineConfig {
    let mut states = HashMap::new();
    states.insert(
        "init".to_string(),
        StateDef::Initial(InitialState {
            type_: InitialTag::Initial,
            transitions: vec![Transition { condition: None, to: "write".to_string() }],
        }),
    );
    states.insert(
        "write".to_string(),
        StateDef::Agent(AgentState {
            agent: "writer".to_string(),
            execution: Default::default(),
            input: None,
            output_to_context: HashMap::from([("tagline".to_string(), "{{ output.tagline }}".to_string())]),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "review".to_string() }],
        }),
    );
    states.insert(
        "review".to_string(),
        StateDef::Agent(AgentState {
            agent: "critic".to_string(),
            execution: Default::default(),
            input: None,
            output_to_context: HashMap::from([
                ("score".to_string(), "{{ output.score }}".to_string()),
                ("round".to_string(), "{{ context.round + 1 }}".to_string()),
            ]),
            on_error: None,
            transitions: vec![
                Transition { condition: Some("context.score >= 8".to_string()), to: "done".to_string() },
                Transition { condition: None, to: "write".to_string() },
            ],
        }),
    );
    states.insert(
        "done".to_string(),
        StateDef::Final(FinalState {
            type_: FinalTag::Final,
            output: HashMap::from([
                ("score".to_string(), "{{ context.score }}".to_string()),
                ("round".to_string(), "{{ context.round }}".to_string()),
            ]),
        }),
    );

    MachineConfig {
        name: "writer_critic".to_string(),
        states,
        context_init: HashMap::from([("round".to_string(), "0".to_string()), ("score".to_string(), "0".to_string())]),
        settings: Settings { max_steps: 10, ..Settings::default() },
        expression_engine: Default::default(),
    }
}

/// **Scenario**: the loop exits once the critic's score clears the gate, within budget.
#[tokio::test]
async fn writer_critic_loop_converges() {
    let registry = Registry::new()
        .with_agent(
            "writer",
            Arc::new(ConstantExecutor { name: "writer".to_string(), output: json!({"tagline": "shine on"}) }),
        )
        .with_agent("critic", Arc::new(ScoreByRoundExecutor));

    let compiled = Arc::new(compile(writer_critic_config()).unwrap());
    let engine = build_engine(registry);

    let output = engine.start(compiled, json!({})).await.unwrap();
    let score = output.get("score").and_then(serde_json::Value::as_i64).unwrap();
    let round = output.get("round").and_then(serde_json::Value::as_i64).unwrap();
    assert!(score >= 8, "expected score >= 8, got {score}");
    assert!(round <= 4, "expected round <= 4, got {round}");
}
