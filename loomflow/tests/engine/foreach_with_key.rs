//! §8 seed scenario 4: `foreach: [{id:"x",n:1},{id:"y",n:2}] as item key item.id`,
//! where each element launches a child that doubles `n`. Expected result:
//! `{x: {n: 2}, y: {n: 4}}`.

use std::collections::HashMap;
use std::sync::Arc;

use loomflow::compile;
use loomflow::config::types::{
    FinalState, FinalTag, InitialState, InitialTag, LaunchMode, MachineConfig, MachineLaunchState, Settings, StateDef,
    StringOrList, Transition,
};
use loomflow::Registry;
use serde_json::json;

use super::common::{build_engine, single_agent_machine, DoublerExecutor};

fn parent_config() -> MachineConfig {
    let mut states = HashMap::new();
    states.insert(
        "init".to_string(),
        StateDef::Initial(InitialState {
            type_: InitialTag::Initial,
            transitions: vec![Transition { condition: None, to: "fan_out".to_string() }],
        }),
    );
    states.insert(
        "fan_out".to_string(),
        StateDef::MachineLaunch(MachineLaunchState {
            machine: StringOrList::One("doubler_machine".to_string()),
            foreach: Some(r#"[{"id": "x", "n": 1}, {"id": "y", "n": 2}]"#.to_string()),
            as_: Some("item".to_string()),
            key: Some("item.id".to_string()),
            mode: LaunchMode::Settled,
            timeout: None,
            input: Some(json!("{{ item }}")),
            output_to_context: HashMap::from([("results".to_string(), "{{ output }}".to_string())]),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "done".to_string() }],
        }),
    );
    states.insert(
        "done".to_string(),
        StateDef::Final(FinalState {
            type_: FinalTag::Final,
            output: HashMap::from([("results".to_string(), "{{ context.results }}".to_string())]),
        }),
    );

    MachineConfig {
        name: "foreach_parent".to_string(),
        states,
        context_init: HashMap::new(),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}

/// **Scenario**: `foreach`/`key` fans out one child per element, keyed by the evaluated `key`.
#[tokio::test]
async fn foreach_collects_by_key() {
    let registry = Registry::new()
        .with_agent("doubler", Arc::new(DoublerExecutor))
        .with_machine("doubler_machine", Arc::new(compile(single_agent_machine("doubler_machine", "doubler")).unwrap()));

    let compiled = Arc::new(compile(parent_config()).unwrap());
    let engine = build_engine(registry);

    let output = engine.start(compiled, json!({})).await.unwrap();
    let results = output.get("results").unwrap();
    assert_eq!(results.get("x").unwrap().get("value").unwrap(), &json!({"n": 2}));
    assert_eq!(results.get("y").unwrap().get("value").unwrap(), &json!({"n": 4}));
}

/// **Scenario**: an empty `foreach` iterable produces an empty result (§8 boundary behavior).
#[tokio::test]
async fn empty_foreach_produces_empty_result() {
    let mut config = parent_config();
    if let Some(StateDef::MachineLaunch(launch)) = config.states.get_mut("fan_out") {
        launch.foreach = Some("[]".to_string());
    }

    let registry = Registry::new()
        .with_agent("doubler", Arc::new(DoublerExecutor))
        .with_machine("doubler_machine", Arc::new(compile(single_agent_machine("doubler_machine", "doubler")).unwrap()));

    let compiled = Arc::new(compile(config).unwrap());
    let engine = build_engine(registry);

    let output = engine.start(compiled, json!({})).await.unwrap();
    assert_eq!(output.get("results").unwrap(), &json!({}));
}
