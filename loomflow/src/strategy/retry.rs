use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use crate::executor::{AgentExecutor, AgentResult};

/// `backoffs[i]` seconds of base delay before attempt `i+2` (attempt 1 never
/// waits). `jitter` in `[0, 1]` scales a uniform `±jitter` perturbation of that
/// base delay. When the failing result is a rate limit carrying
/// `retry_after`, the strategy sleeps `max(jittered_backoff, retry_after)` —
/// the server's number always wins over our own guess (§4.F).
pub async fn run_retry(
    executor: &dyn AgentExecutor,
    input: &Value,
    backoffs: &[f64],
    jitter: f64,
) -> AgentResult {
    let mut last = executor.execute(input.clone()).await;
    if last.is_success() || !last.retryable() {
        return last;
    }

    for &backoff_secs in backoffs {
        let delay = jittered_delay(backoff_secs, jitter);
        let delay = match last.retry_after() {
            Some(retry_after) => delay.max(Duration::from_secs_f64(retry_after.max(0.0))),
            None => delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        last = executor.execute(input.clone()).await;
        if last.is_success() || !last.retryable() {
            return last;
        }
    }

    // Budget exhausted: return the last attempt's result rather than raising (§4.F).
    last
}

fn jittered_delay(base_secs: f64, jitter: f64) -> Duration {
    let base_secs = base_secs.max(0.0);
    if jitter <= 0.0 {
        return Duration::from_secs_f64(base_secs);
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    Duration::from_secs_f64((base_secs * factor).max(0.0))
}
