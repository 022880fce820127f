//! §8 seed scenario 1: `init -> bump -> bump2 -> done`, each `bump` an `action`
//! state that increments `context.n` by one. Expected final output: `{n: 2}`.

use std::collections::HashMap;
use std::sync::Arc;

use loomflow::compile;
use loomflow::config::types::{
    ActionState, FinalState, FinalTag, InitialState, InitialTag, MachineConfig, Settings, StateDef, Transition,
};
use loomflow::Registry;
use serde_json::json;

use super::common::{build_engine, IncrementHook};

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

/// **Scenario**: a two-bump linear machine finishes with `n == 2`.
#[tokio::test]
async fn linear_counter_reaches_two() {
    let compiled = Arc::new(compile(linear_counter_config()).unwrap());
    let engine = build_engine(Registry::new()).with_hooks(Arc::new(IncrementHook));

    let output = engine.start(compiled, json!({})).await.unwrap();
    assert_eq!(output, json!({"n": 2}));
}
