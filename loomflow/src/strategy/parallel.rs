use serde_json::Value;

use crate::executor::{AgentExecutor, AgentResult};

/// Runs `n_samples` concurrent calls to the same executor with the same input,
/// returning results in launch order (not completion order) — §4.F's
/// "no additional fan-in state needed" means callers pick whichever sample(s)
/// they want (e.g. `mdap_voting` wraps this with grouping logic).
pub async fn run_parallel(executor: &dyn AgentExecutor, input: &Value, n_samples: usize) -> Vec<AgentResult> {
    if n_samples == 0 {
        return Vec::new();
    }
    let futures = (0..n_samples).map(|_| executor.execute(input.clone()));
    futures::future::join_all(futures).await
}
