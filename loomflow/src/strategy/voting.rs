use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use crate::executor::{AgentExecutor, AgentResult};

/// Samples up to `max_candidates` results, grouping by their `output` value.
/// Returns as soon as the leading group's count beats the runner-up's by at
/// least `k_margin` (remaining in-flight samples are simply left to finish and
/// discarded — §5 treats this the same as any other `any`-mode cancellation:
/// cooperative, best-effort). If the budget is exhausted without a group
/// reaching that margin, returns the plurality winner, ties broken by
/// whichever output value was *first* to complete.
pub async fn run_voting(
    executor: &dyn AgentExecutor,
    input: &Value,
    max_candidates: usize,
    k_margin: usize,
) -> AgentResult {
    if max_candidates == 0 {
        return AgentResult::default();
    }

    let mut pending = FuturesUnordered::new();
    for _ in 0..max_candidates {
        pending.push(executor.execute(input.clone()));
    }

    // Groups in first-completed-for-that-key order: (key, count, representative).
    let mut groups: Vec<(String, usize, AgentResult)> = Vec::new();

    while let Some(result) = pending.next().await {
        let key = group_key(&result);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, count, _)) => *count += 1,
            None => groups.push((key, 1, result)),
        }

        if let Some((top, runner_up)) = leading_margin(&groups) {
            if top >= runner_up + k_margin {
                return plurality_winner(groups);
            }
        }
    }

    plurality_winner(groups)
}

fn group_key(result: &AgentResult) -> String {
    serde_json::to_string(&result.output).unwrap_or_default()
}

/// `(top_count, runner_up_count)` across all groups seen so far, or `None` if
/// fewer than one group exists yet.
fn leading_margin(groups: &[(String, usize, AgentResult)]) -> Option<(usize, usize)> {
    let mut counts: Vec<usize> = groups.iter().map(|(_, c, _)| *c).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let top = *counts.first()?;
    let runner_up = counts.get(1).copied().unwrap_or(0);
    Some((top, runner_up))
}

/// Stable-sorts by count descending; ties keep their original (earliest
/// completion) order, which is the tie-break rule §4.F specifies.
fn plurality_winner(mut groups: Vec<(String, usize, AgentResult)>) -> AgentResult {
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
        .into_iter()
        .next()
        .map(|(_, _, result)| result)
        .unwrap_or_default()
}
