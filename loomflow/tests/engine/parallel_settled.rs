//! §8 seed scenario 3: a `machine: [a,b,c]` launch with `mode: settled`.
//! Children sleep 10ms/20ms/5ms before returning distinct values; the parent's
//! assembled output must be indexed by machine name regardless of which child
//! actually finishes first, and the whole fan-out should take roughly as long
//! as the slowest sibling, not the sum of all three.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use loomflow::compile;
use loomflow::config::types::{
    FinalState, FinalTag, InitialState, InitialTag, LaunchMode, MachineConfig, MachineLaunchState, Settings, StateDef,
    StringOrList, Transition,
};
use loomflow::Registry;
use serde_json::json;

use super::common::{build_engine, single_agent_machine, SleepyExecutor};

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
            machine: StringOrList::Many(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
            foreach: None,
            as_: None,
            key: None,
            mode: LaunchMode::Settled,
            timeout: None,
            input: None,
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
        name: "fan_out_parent".to_string(),
        states,
        context_init: HashMap::new(),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}

/// **Scenario**: settled fan-out assembles results by name, independent of arrival order.
#[tokio::test(start_paused = true)]
async fn settled_fan_out_is_order_independent() {
    let registry = Registry::new()
        .with_agent("agent_a", Arc::new(SleepyExecutor { delay_ms: 10, output: json!({"v": "A"}) }))
        .with_agent("agent_b", Arc::new(SleepyExecutor { delay_ms: 20, output: json!({"v": "B"}) }))
        .with_agent("agent_c", Arc::new(SleepyExecutor { delay_ms: 5, output: json!({"v": "C"}) }))
        .with_machine("a", Arc::new(compile(single_agent_machine("a", "agent_a")).unwrap()))
        .with_machine("b", Arc::new(compile(single_agent_machine("b", "agent_b")).unwrap()))
        .with_machine("c", Arc::new(compile(single_agent_machine("c", "agent_c")).unwrap()));

    let compiled = Arc::new(compile(parent_config()).unwrap());
    let engine = build_engine(registry);

    let start = Instant::now();
    let output = engine.start(compiled, json!({})).await.unwrap();
    let elapsed = Instant::now().duration_since(start);

    let results = output.get("results").unwrap();
    assert_eq!(results.get("a").unwrap().get("value").unwrap(), &json!({"v": "A"}));
    assert_eq!(results.get("b").unwrap().get("value").unwrap(), &json!({"v": "B"}));
    assert_eq!(results.get("c").unwrap().get("value").unwrap(), &json!({"v": "C"}));
    assert!(elapsed <= Duration::from_millis(25) + Duration::from_millis(50), "fan-out took {elapsed:?}");
}
