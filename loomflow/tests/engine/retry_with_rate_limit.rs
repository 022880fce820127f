//! §8 seed scenario 6: an agent configured with `execution: retry` fails its
//! first attempt with a rate limit carrying `retry_after`, then succeeds on
//! the second. The server's `retry_after` must dominate the shorter
//! configured backoff (§4.F) — `strategy/retry.rs` already covers this at the
//! strategy-function level; this drives the same behavior through a compiled
//! machine end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loomflow::compile;
use loomflow::config::types::{
    AgentState, ExecutionConfig, FinalState, FinalTag, InitialState, InitialTag, MachineConfig, Settings, StateDef,
    Transition,
};
use loomflow::executor::{AgentError, AgentResult, ErrorCode};
use loomflow::{AgentExecutor, Registry};
use serde_json::{json, Value};

use super::common::build_engine;

/// Fails attempt 1 with a rate limit advertising a 1s `retry_after`, then
/// succeeds on attempt 2.
struct RateLimitedOnceExecutor {
    attempt: AtomicUsize,
}

#[async_trait]
impl AgentExecutor for RateLimitedOnceExecutor {
    fn name(&self) -> &str {
        "rate_limited_once"
    }

    async fn execute(&self, _input: Value) -> AgentResult {
        if self.attempt.fetch_add(1, Ordering::SeqCst) == 0 {
            let mut result = AgentResult::failure(AgentError::new(ErrorCode::RateLimit, "slow down"));
            result.rate_limit = Some(loomflow::executor::RateLimitInfo { retry_after: Some(1.0) });
            return result;
        }
        AgentResult::success(json!({"ok": true}))
    }
}

fn config() -> MachineConfig {
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
            agent: "flaky".to_string(),
            execution: ExecutionConfig::Retry { backoffs: vec![0.1, 0.5], jitter: 0.0 },
            input: None,
            output_to_context: HashMap::from([("result".to_string(), "{{ output }}".to_string())]),
            on_error: None,
            transitions: vec![Transition { condition: None, to: "done".to_string() }],
        }),
    );
    states.insert(
        "done".to_string(),
        StateDef::Final(FinalState {
            type_: FinalTag::Final,
            output: HashMap::from([("result".to_string(), "{{ context.result }}".to_string())]),
        }),
    );

    MachineConfig {
        name: "retry_with_rate_limit".to_string(),
        states,
        context_init: HashMap::new(),
        settings: Settings::default(),
        expression_engine: Default::default(),
    }
}

/// **Scenario**: the rate limit's `retry_after` (1s) dominates the
/// configured 0.1s backoff, and the second attempt's success is what the
/// machine ends with.
#[tokio::test(start_paused = true)]
async fn rate_limit_retry_after_wins_end_to_end() {
    let registry = Registry::new().with_agent("flaky", Arc::new(RateLimitedOnceExecutor { attempt: AtomicUsize::new(0) }));
    let engine = build_engine(registry);
    let compiled = Arc::new(compile(config()).unwrap());

    let start = Instant::now();
    let output = engine.start(compiled, json!({})).await.unwrap();
    let elapsed = Instant::now().duration_since(start);

    assert_eq!(output, json!({"result": {"ok": true}}));
    assert!(elapsed >= Duration::from_secs(1), "retry_after should dominate the shorter 0.1s backoff, took {elapsed:?}");
}
