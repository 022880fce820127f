//! Per-state dispatch (§4.G *Executing*, §4.H): what happens inside one state
//! visit once the interpreter loop in [`super::engine`] has decided which
//! state to run. Agent calls go through the execution strategy layer (§4.F);
//! machine launches and fire-and-forget launches go through the outbox
//! protocol (§4.H), reusing [`super::Engine::spawn_child`] and
//! [`super::Engine::write_snapshot`] from the control loop itself so the
//! "persist before you act" discipline is identical whether a child is
//! launched from the main loop's resume path or from here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::config::compile::CompiledMachine;
use crate::config::types::{
    ActionState, AgentState, FireAndForgetState, LaunchMode, MachineLaunchState, StateDef, StringOrList,
};
use crate::context::Context;
use crate::error::MachineError;
use crate::executor::AgentResult;
use crate::expr::{render_template_engine, render_value_engine, evaluate_engine, ExpressionEngine, Scope};
use crate::ids::ExecutionId;
use crate::result_backend::Uri;
use crate::snapshot::{LaunchIntent, MachineSnapshot, UsageTotals};
use crate::strategy::{run_strategy, StrategyOutcome};

use super::{Engine, LaunchError};

/// How a fanned-out child's result is indexed back into the launching
/// state's output (§4.H: "indexed by name or array position", or by the
/// evaluated `foreach` `key`).
enum Label {
    Name(String),
    Key(String),
    Index(usize),
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn dispatch(
        &self,
        machine: &Arc<CompiledMachine>,
        execution_id: ExecutionId,
        state_def: &StateDef,
        state_name: &str,
        step: u64,
        context: &mut Context,
        input: &Value,
        pending_launches: &mut Vec<LaunchIntent>,
        usage: &mut UsageTotals,
        snapshot_key: &str,
        parent_execution_id: Option<ExecutionId>,
    ) -> Result<Value, MachineError> {
        match state_def {
            StateDef::Initial(_) => Ok(Value::Null),
            StateDef::Final(_) => unreachable!("caller handles final states before dispatching"),
            StateDef::Agent(s) => {
                self.dispatch_agent(machine.config.expression_engine, s, state_name, context, input, usage)
                    .await
            }
            StateDef::Action(s) => self.dispatch_action(s, context).await,
            StateDef::MachineLaunch(s) => {
                self.dispatch_machine_launch(
                    machine,
                    execution_id,
                    s,
                    state_name,
                    step,
                    context,
                    input,
                    pending_launches,
                    usage,
                    snapshot_key,
                    parent_execution_id,
                )
                .await
            }
            StateDef::FireAndForget(s) => {
                self.dispatch_fire_and_forget(
                    machine,
                    execution_id,
                    s,
                    state_name,
                    step,
                    context,
                    input,
                    pending_launches,
                    usage,
                    snapshot_key,
                    parent_execution_id,
                )
                .await
            }
        }
    }

    /// Agent state (§4.G): render `input` (or pass the whole context through
    /// when absent), select the execution strategy, call the executor(s),
    /// and hand back the scope-visible `output` for `output_to_context` and
    /// transition evaluation.
    async fn dispatch_agent(
        &self,
        engine: ExpressionEngine,
        state: &AgentState,
        state_name: &str,
        context: &mut Context,
        input: &Value,
        usage: &mut UsageTotals,
    ) -> Result<Value, MachineError> {
        let executor = self.registry.agent(&state.agent).ok_or_else(|| MachineError::UnknownAgent {
            agent: state.agent.clone(),
            state: state_name.to_string(),
        })?;

        let ctx_value = context.as_value();
        let agent_input = match &state.input {
            Some(template) => render_value_engine(engine, template, &Scope::new(&ctx_value, input, &Value::Null))?,
            None => ctx_value.clone(),
        };

        let outcome = run_strategy(executor.as_ref(), &agent_input, &state.execution).await;

        let output_value = match outcome {
            StrategyOutcome::Single(result) => {
                usage.record(result.cost);
                if let Some(error) = &result.error {
                    return Err(MachineError::AgentFailed {
                        agent: state.agent.clone(),
                        state: state_name.to_string(),
                        code: Some(error.code.as_str().to_string()),
                        message: error.message.clone(),
                    });
                }
                result.output.clone().unwrap_or(Value::Null)
            }
            StrategyOutcome::Samples(results) => {
                for result in &results {
                    usage.record(result.cost);
                }
                Value::Array(results.into_iter().map(sample_output).collect())
            }
        };

        merge_output_to_context(engine, context, &state.output_to_context, &ctx_value, input, &output_value)?;
        Ok(output_value)
    }

    /// Action state (§4.G): the host resolves `action` against its own
    /// registry via `hooks.on_action`; the return value wholesale replaces
    /// `context`, exactly like `on_state_enter`.
    async fn dispatch_action(&self, state: &ActionState, context: &mut Context) -> Result<Value, MachineError> {
        let returned = self.hooks.on_action(&state.action, context.as_value()).await;
        *context = Context::from_value(returned)?;
        Ok(Value::Null)
    }

    /// Fire-and-forget state (§4.H): runs the same outbox steps a blocking
    /// launch does, but never reads a result — the state advances via its
    /// `transitions` the moment every named machine has been durably queued.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_fire_and_forget(
        &self,
        machine: &Arc<CompiledMachine>,
        execution_id: ExecutionId,
        state: &FireAndForgetState,
        state_name: &str,
        step: u64,
        context: &mut Context,
        input: &Value,
        pending_launches: &mut Vec<LaunchIntent>,
        usage: &mut UsageTotals,
        snapshot_key: &str,
        parent_execution_id: Option<ExecutionId>,
    ) -> Result<Value, MachineError> {
        let engine = machine.config.expression_engine;
        let ctx_value = context.as_value();
        let scope = Scope::new(&ctx_value, input, &Value::Null);
        let rendered_input = match &state.launch_input {
            Some(template) => render_value_engine(engine, template, &scope)?,
            None => ctx_value.clone(),
        };

        for (claim_index, name) in state.launch.as_slice_owned().into_iter().enumerate() {
            self.launch_and_track(
                machine,
                execution_id,
                &name,
                rendered_input.clone(),
                context,
                state_name,
                step,
                claim_index,
                pending_launches,
                usage,
                snapshot_key,
                parent_execution_id,
            )
            .await?;
        }

        Ok(Value::Null)
    }

    /// Machine-launch state (§4.H): either a single blocking `machine: name`
    /// launch, or a fan-out (`machine: [..]` and/or `foreach`) awaited per
    /// `mode`.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_machine_launch(
        &self,
        machine: &Arc<CompiledMachine>,
        execution_id: ExecutionId,
        state: &MachineLaunchState,
        state_name: &str,
        step: u64,
        context: &mut Context,
        input: &Value,
        pending_launches: &mut Vec<LaunchIntent>,
        usage: &mut UsageTotals,
        snapshot_key: &str,
        parent_execution_id: Option<ExecutionId>,
    ) -> Result<Value, MachineError> {
        let engine = machine.config.expression_engine;
        let ctx_value = context.as_value();

        // `machine: name` with no `foreach`: a single blocking launch whose
        // output *is* the child's result, not a map keyed by one entry.
        if !state.machine.is_list() && state.foreach.is_none() {
            let name = single_name(&state.machine);
            let scope = Scope::new(&ctx_value, input, &Value::Null);
            let rendered_input = match &state.input {
                Some(template) => render_value_engine(engine, template, &scope)?,
                None => ctx_value.clone(),
            };
            let (child_id, _handle) = self
                .launch_and_track(
                    machine,
                    execution_id,
                    name,
                    rendered_input,
                    context,
                    state_name,
                    step,
                    0,
                    pending_launches,
                    usage,
                    snapshot_key,
                    parent_execution_id,
                )
                .await?;

            let (value, is_error) = self.read_child_result(child_id, timeout_duration(state.timeout)).await?;
            if is_error {
                return Err(MachineError::Launch(LaunchError::AllChildrenFailed {
                    state: state_name.to_string(),
                }));
            }
            merge_output_to_context(engine, context, &state.output_to_context, &ctx_value, input, &value)?;
            return Ok(value);
        }

        let plan = build_launch_plan(engine, state, state_name, &ctx_value, input)?;
        if plan.is_empty() {
            // Empty `foreach` iterable: empty result, skip straight to
            // transitions (§8 boundary behavior) — no launches at all.
            let empty = Value::Object(Map::new());
            merge_output_to_context(engine, context, &state.output_to_context, &ctx_value, input, &empty)?;
            return Ok(empty);
        }

        let mut launched = Vec::with_capacity(plan.len());
        for (claim_index, (label, machine_name, launch_input)) in plan.into_iter().enumerate() {
            let (child_id, handle) = self
                .launch_and_track(
                    machine,
                    execution_id,
                    &machine_name,
                    launch_input,
                    context,
                    state_name,
                    step,
                    claim_index,
                    pending_launches,
                    usage,
                    snapshot_key,
                    parent_execution_id,
                )
                .await?;
            launched.push((label, child_id, handle));
        }

        let timeout = timeout_duration(state.timeout);
        let output = match state.mode {
            LaunchMode::Settled => self.await_settled(&launched, timeout, state_name).await?,
            LaunchMode::Any => self.await_any(&launched, timeout, state_name).await?,
        };

        merge_output_to_context(engine, context, &state.output_to_context, &ctx_value, input, &output)?;
        Ok(output)
    }

    /// Waits for every launched child to settle (§4.H `mode: settled`): reads
    /// each child's `/result` concurrently so sibling latencies overlap
    /// rather than summing, and assembles the indexed output. A per-child
    /// failure is carried through as that entry's (error-shaped) value; the
    /// state only fails outright if every child failed.
    async fn await_settled(
        &self,
        launched: &[(Label, ExecutionId, JoinHandle<Result<Value, MachineError>>)],
        timeout: Option<Duration>,
        state_name: &str,
    ) -> Result<Value, MachineError> {
        let reads = launched.iter().map(|(_, id, _)| self.read_child_result(*id, timeout));
        let results = futures::future::join_all(reads).await;

        let mut any_succeeded = false;
        let mut by_key = Map::new();
        let mut by_index: Vec<Value> = Vec::new();
        let mut keyed = false;

        for ((label, _, _), result) in launched.iter().zip(results) {
            let (value, is_error) = result?;
            any_succeeded |= !is_error;
            match label {
                Label::Name(name) => {
                    keyed = true;
                    by_key.insert(name.clone(), value);
                }
                Label::Key(key) => {
                    keyed = true;
                    by_key.insert(key.clone(), value);
                }
                Label::Index(index) => {
                    if by_index.len() <= *index {
                        by_index.resize(*index + 1, Value::Null);
                    }
                    by_index[*index] = value;
                }
            }
        }

        if !any_succeeded {
            return Err(MachineError::Launch(LaunchError::AllChildrenFailed {
                state: state_name.to_string(),
            }));
        }

        Ok(if keyed { Value::Object(by_key) } else { Value::Array(by_index) })
    }

    /// Races every launched child's `/result` (§4.H `mode: any`): the first
    /// non-error result wins and every remaining sibling is aborted —
    /// cooperative, best-effort cancellation (§5), since an in-process child
    /// task simply stops being polled once aborted.
    async fn await_any(
        &self,
        launched: &[(Label, ExecutionId, JoinHandle<Result<Value, MachineError>>)],
        timeout: Option<Duration>,
        state_name: &str,
    ) -> Result<Value, MachineError> {
        let mut pending = FuturesUnordered::new();
        for (_, id, _) in launched {
            let engine = self.clone();
            let id = *id;
            pending.push(tokio::spawn(async move { engine.read_child_result(id, timeout).await }));
        }

        let mut winner = None;
        while let Some(joined) = pending.next().await {
            if let Ok(Ok((value, false))) = joined {
                winner = Some(value);
                break;
            }
        }

        for (_, _, handle) in launched {
            handle.abort();
        }

        winner.ok_or_else(|| MachineError::Launch(LaunchError::AllChildrenFailed { state: state_name.to_string() }))
    }

    /// The outbox protocol itself (§4.H steps 1-5): mint the child's id,
    /// record a not-yet-launched intent, persist that durably, issue the
    /// launch, then flip `launched = true` and persist again once the
    /// child's own initial snapshot exists. Shared by every launch site
    /// (blocking, fan-out, and fire-and-forget) so exactly-once holds
    /// uniformly across all three.
    ///
    /// `claim_index` is this launch's ordinal position among every launch
    /// issued for `(state_name, step)` in the current dispatch call (0 for a
    /// blocking single launch, the loop index for fan-out/fire-and-forget).
    /// Before minting anything, it looks for the `claim_index`-th existing
    /// `pending_launches` entry already recorded for this exact state visit —
    /// present only when a prior attempt at this same step was interrupted
    /// mid-launch and the loop is now re-dispatching the same state after
    /// resume. Reusing that intent's `execution_id` instead of minting a new
    /// one is what keeps invariant 4 ("a child is launched at most once")
    /// across crash/resume: without it, re-entering an in-flight launch state
    /// would mint a second child for a launch the outbox already recorded.
    #[allow(clippy::too_many_arguments)]
    async fn launch_and_track(
        &self,
        parent_machine: &Arc<CompiledMachine>,
        execution_id: ExecutionId,
        child_machine_name: &str,
        input: Value,
        context: &Context,
        state_name: &str,
        step: u64,
        claim_index: usize,
        pending_launches: &mut Vec<LaunchIntent>,
        usage: &mut UsageTotals,
        snapshot_key: &str,
        parent_execution_id: Option<ExecutionId>,
    ) -> Result<(ExecutionId, JoinHandle<Result<Value, MachineError>>), MachineError> {
        let child_machine = self.registry.machine(child_machine_name).ok_or_else(|| MachineError::UnknownMachine {
            machine: child_machine_name.to_string(),
            state: state_name.to_string(),
        })?;

        let reused = pending_launches
            .iter()
            .filter(|li| li.origin_state == state_name && li.origin_step == step)
            .nth(claim_index)
            .map(|li| li.execution_id);

        let child_id = match reused {
            Some(id) => id,
            None => {
                let child_id = ExecutionId::new();
                pending_launches.push(LaunchIntent::new(child_id, child_machine_name, input.clone(), state_name, step));

                self.write_snapshot(
                    snapshot_key,
                    execution_id,
                    &parent_machine.config.name,
                    state_name,
                    context,
                    step,
                    None,
                    None,
                    parent_execution_id,
                    pending_launches,
                    *usage,
                    true,
                )
                .await?;

                child_id
            }
        };

        // Re-spawning a reused id is safe even if the prior attempt already
        // flipped `launched = true`: a process crash takes every in-flight
        // `tokio` task with it, so there is never a still-live handle to
        // rejoin, and `run()` checks its own persisted snapshot before doing
        // anything else, so this either resumes the child's own in-progress
        // run or no-ops against its already-written `machine_end`.
        let handle = self.spawn_child(child_machine, child_id, input, execution_id).await;

        if let Some(slot) = pending_launches.iter_mut().find(|li| li.execution_id == child_id) {
            if !slot.launched {
                slot.launched = true;
                self.write_snapshot(
                    snapshot_key,
                    execution_id,
                    &parent_machine.config.name,
                    state_name,
                    context,
                    step,
                    None,
                    None,
                    parent_execution_id,
                    pending_launches,
                    *usage,
                    true,
                )
                .await?;
            }
        }

        Ok((child_id, handle))
    }

    /// Reads a child's `/result` (blocking up to `timeout`), then consults its
    /// persisted snapshot's terminal `event` to tell a genuine failure (the
    /// parent's own `run()` writes `{"error": ...}` on that path) from a
    /// success that merely happens to shape its own output that way.
    async fn read_child_result(&self, child_id: ExecutionId, timeout: Option<Duration>) -> Result<(Value, bool), MachineError> {
        let uri = Uri::new(child_id, "/result");
        let value = self.result_backend.read(&uri, timeout).await?;
        let key = MachineSnapshot::persistence_key(child_id);
        let is_error = match self.persistence.load(&key).await? {
            Some(raw) => serde_json::from_value::<MachineSnapshot>(raw)
                .ok()
                .map(|snap| snap.event.as_deref() == Some("error"))
                .unwrap_or(false),
            None => false,
        };
        Ok((value, is_error))
    }
}

/// A `parallel` strategy sample exposes just its `output` field in the list
/// handed to `output_to_context`, matching the unwrapped single-result case —
/// a `null` entry signals that particular sample errored.
fn sample_output(result: AgentResult) -> Value {
    result.output.unwrap_or(Value::Null)
}

fn single_name(machine: &StringOrList) -> &str {
    match machine {
        StringOrList::One(name) => name.as_str(),
        StringOrList::Many(_) => unreachable!("caller checked !is_list()"),
    }
}

fn timeout_duration(timeout: Option<f64>) -> Option<Duration> {
    match timeout {
        Some(t) if t > 0.0 => Some(Duration::from_secs_f64(t)),
        _ => None, // absent or `0` (§4.H: "0 = unbounded")
    }
}

/// A `foreach` key expression's result, stringified for use as a JSON object
/// key — strings pass through verbatim, everything else renders as JSON text.
fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds the list of `(label, machine_name, rendered_input)` launches for a
/// fan-out machine-launch state: either one entry per `machine: [..]` name,
/// or one entry per `foreach` element (mutually exclusive with a machine
/// list — §4.H describes `foreach` as launching "the named machine", singular).
fn build_launch_plan(
    engine: ExpressionEngine,
    state: &MachineLaunchState,
    state_name: &str,
    ctx_value: &Value,
    input: &Value,
) -> Result<Vec<(Label, String, Value)>, MachineError> {
    let mut plan = Vec::new();

    if let Some(foreach_src) = &state.foreach {
        if state.machine.is_list() {
            return Err(MachineError::Launch(LaunchError::ForeachRequiresSingleMachine {
                state: state_name.to_string(),
            }));
        }
        let name = single_name(&state.machine).to_string();
        let scope = Scope::new(ctx_value, input, &Value::Null);
        let elements = match evaluate_engine(engine, foreach_src, &scope)? {
            Value::Array(items) => items,
            _ => {
                return Err(MachineError::Launch(LaunchError::ForeachNotIterable {
                    state: state_name.to_string(),
                }))
            }
        };

        let var_name = state.as_.as_deref().unwrap_or("item");
        for (index, element) in elements.into_iter().enumerate() {
            let elem_scope = Scope::new(ctx_value, input, &Value::Null).with_var(var_name, &element);
            let rendered_input = match &state.input {
                Some(template) => render_value_engine(engine, template, &elem_scope)?,
                None => element.clone(),
            };
            let label = match &state.key {
                Some(key_src) => Label::Key(value_to_key(&evaluate_engine(engine, key_src, &elem_scope)?)),
                None => Label::Index(index),
            };
            plan.push((label, name.clone(), rendered_input));
        }
    } else {
        let scope = Scope::new(ctx_value, input, &Value::Null);
        for name in state.machine.as_slice_owned() {
            let rendered_input = match &state.input {
                Some(template) => render_value_engine(engine, template, &scope)?,
                None => ctx_value.clone(),
            };
            plan.push((Label::Name(name.clone()), name, rendered_input));
        }
    }

    Ok(plan)
}

/// `output_to_context` (§4.G): renders each mapping's template against
/// `{context, input, output}` and merges the results into `context` — a
/// no-op when the mapping is empty (§8 boundary behavior).
fn merge_output_to_context(
    engine: ExpressionEngine,
    context: &mut Context,
    mapping: &HashMap<String, String>,
    ctx_value: &Value,
    input: &Value,
    output_value: &Value,
) -> Result<(), MachineError> {
    if mapping.is_empty() {
        return Ok(());
    }
    let scope = Scope::new(ctx_value, input, output_value);
    let mut updates = Map::new();
    for (key, expr_src) in mapping {
        updates.insert(key.clone(), render_template_engine(engine, expr_src, &scope)?);
    }
    context.merge_object(updates);
    Ok(())
}
