//! Execution strategies (§4.F): wrappers over one `AgentExecutor` call, chosen
//! per agent state by its `execution:` config. `default` is just `execute`
//! itself — no wrapper module needed for it.

mod config;
mod parallel;
mod retry;
mod voting;

use serde_json::Value;

pub use config::ExecutionConfig;

use crate::executor::{AgentExecutor, AgentResult};

/// The outcome of running a strategy: `default`/`retry` produce one result;
/// `parallel`/`mdap_voting` over a list of samples collapse to either "all of
/// them" (parallel) or "the winner" (voting) — both still need a single shape
/// the interpreter can merge into `output_to_context`, so `parallel` exposes
/// its full sample list as the `output` the caller maps over explicitly.
pub enum StrategyOutcome {
    Single(AgentResult),
    Samples(Vec<AgentResult>),
}

pub async fn run_strategy(
    executor: &dyn AgentExecutor,
    input: &Value,
    config: &ExecutionConfig,
) -> StrategyOutcome {
    match config {
        ExecutionConfig::Default => StrategyOutcome::Single(executor.execute(input.clone()).await),
        ExecutionConfig::Retry { backoffs, jitter } => {
            StrategyOutcome::Single(retry::run_retry(executor, input, backoffs, *jitter).await)
        }
        ExecutionConfig::Parallel { n_samples } => {
            StrategyOutcome::Samples(parallel::run_parallel(executor, input, *n_samples).await)
        }
        ExecutionConfig::MdapVoting { max_candidates, k_margin } => {
            StrategyOutcome::Single(voting::run_voting(executor, input, *max_candidates, *k_margin).await)
        }
    }
}
