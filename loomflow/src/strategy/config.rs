use serde::{Deserialize, Serialize};

/// The `execution:` knob on an agent state (§4.F), selecting which strategy
/// wraps the executor call. Untagged-by-`type` so machine YAML reads naturally:
/// `execution: {type: retry, backoffs: [0.1, 0.5], jitter: 0.2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionConfig {
    Default,
    Retry {
        /// Seconds between attempts, one entry per retry (not counting the
        /// first attempt). An empty list behaves exactly like `Default`.
        backoffs: Vec<f64>,
        #[serde(default)]
        jitter: f64,
    },
    Parallel {
        n_samples: usize,
    },
    #[serde(rename = "mdap_voting")]
    MdapVoting {
        max_candidates: usize,
        k_margin: usize,
    },
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig::Default
    }
}
