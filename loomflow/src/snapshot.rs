//! Wire format for a machine execution's checkpoint (§3, §6).
//!
//! `MachineSnapshot` is the one thing the persistence backend ever stores and
//! the one thing a resumed interpreter ever reads back — deliberately a plain
//! `serde` struct with no behavior of its own, matching how the teacher's own
//! checkpoint envelope (`loom/src/memory/checkpointer.rs`) carries state: a
//! dumb record, all the logic lives in the interpreter that produces/consumes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ExecutionId;

/// A declaration, persisted in the parent's own snapshot, that a child machine
/// must be started — the unit the exactly-once outbox protocol (§4.H) is
/// built from.
///
/// `origin_state`/`origin_step` are an implementation extension beyond the
/// four fields §3 names: §4.D explicitly leaves snapshot keying flexible
/// ("either is permissible as long as `load` always returns the most recent
/// snapshot"), and resuming a crash mid machine-launch state needs *some* way
/// to tell "these intents were already minted for this exact state visit"
/// from "this is a fresh visit to a looping launch state" — tagging each
/// intent with the `(state, step)` that produced it gives the launch runtime
/// that without inventing a second persisted structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchIntent {
    pub execution_id: ExecutionId,
    pub machine: String,
    pub input: Value,
    pub launched: bool,
    pub origin_state: String,
    pub origin_step: u64,
}

impl LaunchIntent {
    pub fn new(
        execution_id: ExecutionId,
        machine: impl Into<String>,
        input: Value,
        origin_state: impl Into<String>,
        origin_step: u64,
    ) -> Self {
        Self {
            execution_id,
            machine: machine.into(),
            input,
            launched: false,
            origin_state: origin_state.into(),
            origin_step,
        }
    }
}

/// Accumulated cost/usage across every agent call an execution has made so
/// far, rolled into each snapshot so a resumed run (or a parent reading a
/// child's final snapshot) doesn't need to re-sum per-state history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_api_calls: u64,
    pub total_cost: f64,
}

impl UsageTotals {
    pub fn record(&mut self, cost: Option<f64>) {
        self.total_api_calls += 1;
        if let Some(cost) = cost {
            self.total_cost += cost;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub execution_id: ExecutionId,
    pub machine_name: String,
    pub spec_version: String,
    pub current_state: String,
    pub context: Value,
    pub step: u64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_launches: Vec<LaunchIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_api_calls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl MachineSnapshot {
    /// The persistence key a parent stores this execution under by default
    /// (§4.D "Parents store under `exec/{execution_id}`").
    pub fn persistence_key(execution_id: ExecutionId) -> String {
        format!("exec/{execution_id}")
    }
}
