//! The control loop itself (§4.G): `Loading → Initial → Executing →
//! Transitioning → Final | Failed`.
//!
//! Structural ancestor: the teacher's `StateGraph` → `CompiledStateGraph` →
//! `invoke` pipeline (`loom/src/graph/state_graph.rs`). There the graph is
//! *built* programmatically (`add_node`/`add_edge`/`compile`); here the graph
//! is already data — a validated [`CompiledMachine`] loaded from YAML — so
//! there is no separate builder step, only "interpret this config directly".
//! The teacher's `Next::{Continue,Node,End}` routing becomes this engine's
//! transition resolution; the teacher's `Runtime<C,S>` becomes the bundle of
//! backends + hooks carried on [`Engine`] itself.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::compile::CompiledMachine;
use crate::context::Context;
use crate::error::MachineError;
use crate::expr::{render_template_engine, CompiledExpr, Scope};
use crate::hooks::{HookErrorInfo, MachineHooks, NoopHooks};
use crate::ids::ExecutionId;
use crate::lock::ExecutionLock;
use crate::persistence::PersistenceBackend;
use crate::registry::Registry;
use crate::result_backend::{ResultBackend, Uri};
use crate::snapshot::{MachineSnapshot, UsageTotals};
use crate::timestamp::now_iso8601;

pub const SPEC_VERSION: &str = "1.0.0";

/// The bundle of backends, hooks, and the agent/machine registry that an
/// interpreted machine execution runs against — the engine's own analogue of
/// the teacher's `Runtime<C, S>`.
///
/// Cheap to `Clone` (every field is `Arc` or a small value): cloning is how a
/// child execution, spawned onto its own `tokio` task, gets its own handle to
/// the same shared backends.
#[derive(Clone)]
pub struct Engine {
    pub(crate) persistence: Arc<dyn PersistenceBackend>,
    pub(crate) result_backend: Arc<dyn ResultBackend>,
    pub(crate) lock: Arc<dyn ExecutionLock>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) hooks: Arc<dyn MachineHooks>,
    pub(crate) holder: String,
    pub(crate) lock_ttl: Duration,
}

impl Engine {
    pub fn new(
        persistence: Arc<dyn PersistenceBackend>,
        result_backend: Arc<dyn ResultBackend>,
        lock: Arc<dyn ExecutionLock>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            persistence,
            result_backend,
            lock,
            registry,
            hooks: Arc::new(NoopHooks),
            holder: "local".to_string(),
            lock_ttl: Duration::from_secs(30),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn MachineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Starts a brand-new execution of `machine` and runs it to completion,
    /// returning its final `output`.
    pub async fn start(&self, machine: Arc<CompiledMachine>, input: Value) -> Result<Value, MachineError> {
        let execution_id = ExecutionId::new();
        self.run(machine, execution_id, input, None, None).await
    }

    /// Resumes a previously persisted execution of `machine` by id — the
    /// "crash & resume" path of §8 seed scenario 5.
    pub async fn resume(&self, machine: Arc<CompiledMachine>, execution_id: ExecutionId) -> Result<Value, MachineError> {
        let key = MachineSnapshot::persistence_key(execution_id);
        if self.persistence.load(&key).await?.is_none() {
            return Err(MachineError::NoSnapshotToResume(execution_id));
        }
        self.run(machine, execution_id, Value::Null, None, None).await
    }

    /// The shared entry point for both a root run and a spawned child: always
    /// checks persistence first so a child that's actually a resumed
    /// execution (parent crashed after launching but before marking
    /// `launched=true`) picks up where it left off instead of restarting.
    ///
    /// `started` is fired the moment this execution's *current* snapshot has
    /// been durably persisted — the signal the outbox protocol (§4.H) uses to
    /// know it's now safe to flip the owning `LaunchIntent.launched = true`.
    pub(crate) async fn run(
        &self,
        machine: Arc<CompiledMachine>,
        execution_id: ExecutionId,
        input: Value,
        parent_execution_id: Option<ExecutionId>,
        started: Option<tokio::sync::oneshot::Sender<()>>,
    ) -> Result<Value, MachineError> {
        self.lock.acquire(execution_id, &self.holder, self.lock_ttl).await?;
        let result = self.run_locked(machine, execution_id, input, parent_execution_id, started).await;
        let _ = self.lock.release(execution_id, &self.holder).await;

        let key = Uri::new(execution_id, "/result");
        match &result {
            Ok(output) => {
                let _ = self.result_backend.write(&key, output.clone()).await;
            }
            Err(e) => {
                let _ = self
                    .result_backend
                    .write(&key, Value::Object(Map::from_iter([("error".to_string(), Value::String(e.to_string()))])))
                    .await;
            }
        }
        result
    }

    async fn run_locked(
        &self,
        machine: Arc<CompiledMachine>,
        execution_id: ExecutionId,
        input: Value,
        parent_execution_id: Option<ExecutionId>,
        started: Option<tokio::sync::oneshot::Sender<()>>,
    ) -> Result<Value, MachineError> {
        let key = MachineSnapshot::persistence_key(execution_id);
        let existing = self.persistence.load(&key).await?;

        let (mut context, mut current_state, mut step, mut pending_launches, mut usage, input) = match existing {
            Some(raw) => {
                let snap: MachineSnapshot = serde_json::from_value(raw)?;
                if snap.event.as_deref() == Some("machine_end") {
                    return Ok(snap.output.unwrap_or(Value::Null));
                }
                if let Some(tx) = started {
                    let _ = tx.send(());
                }
                let usage = UsageTotals {
                    total_api_calls: snap.total_api_calls.unwrap_or(0),
                    total_cost: snap.total_cost.unwrap_or(0.0),
                };
                (
                    Context::from_value(snap.context)?,
                    snap.current_state,
                    snap.step,
                    snap.pending_launches,
                    usage,
                    input,
                )
            }
            None => {
                let mut context = Context::new();
                let seeded = self.hooks.on_machine_start(context.into_value()).await;
                context = Context::from_value(seeded)?;

                for (key, expr_src) in &machine.config.context_init {
                    let ctx_value = context.as_value();
                    let scope = Scope::new(&ctx_value, &input, &Value::Null);
                    let rendered = render_template_engine(machine.config.expression_engine, expr_src, &scope)?;
                    context.set(key.clone(), rendered);
                }

                let current_state = machine.initial_state.clone();
                self.write_snapshot(
                    &key,
                    execution_id,
                    &machine.config.name,
                    &current_state,
                    &context,
                    0,
                    Some("machine_start"),
                    None,
                    parent_execution_id,
                    &[],
                    UsageTotals::default(),
                    machine.config.settings.checkpoint_on.contains(&"machine_start".to_string()),
                )
                .await?;

                if let Some(tx) = started {
                    let _ = tx.send(());
                }

                (context, current_state, 0u64, Vec::new(), UsageTotals::default(), input)
            }
        };

        let relaunched = self.relaunch_pending(&pending_launches, execution_id, &current_state, step).await;
        for id in relaunched {
            if let Some(slot) = pending_launches.iter_mut().find(|li| li.execution_id == id) {
                slot.launched = true;
            }
        }

        loop {
            if step > machine.config.settings.max_steps {
                let err = MachineError::StepLimitExceeded {
                    step,
                    max_steps: machine.config.settings.max_steps,
                };
                self.write_failed_snapshot(&key, execution_id, &machine.config.name, &current_state, &context, step, &err)
                    .await?;
                return Err(err);
            }

            let state_def = machine
                .config
                .states
                .get(&current_state)
                .expect("compiled machine guarantees all referenced states exist");

            if state_def.is_final() {
                let output = self
                    .render_final_output(machine.config.expression_engine, state_def, &context, &input)
                    .await?;
                let output = self.hooks.on_machine_end(&context.as_value(), output).await;
                self.write_snapshot(
                    &key,
                    execution_id,
                    &machine.config.name,
                    &current_state,
                    &context,
                    step,
                    Some("machine_end"),
                    Some(output.clone()),
                    parent_execution_id,
                    &pending_launches,
                    usage,
                    true,
                )
                .await?;
                return Ok(output);
            }

            let dispatch_result = self
                .dispatch(
                    &machine,
                    execution_id,
                    state_def,
                    &current_state,
                    step,
                    &mut context,
                    &input,
                    &mut pending_launches,
                    &mut usage,
                    &key,
                    parent_execution_id,
                )
                .await;

            let (output_value, redirect) = match dispatch_result {
                Ok(output_value) => (output_value, None),
                Err(failure) => {
                    match self
                        .handle_state_error(state_def, &current_state, &mut context, &failure)
                        .await?
                    {
                        Some(target) => (Value::Null, Some(target)),
                        None => {
                            self.write_failed_snapshot(&key, execution_id, &machine.config.name, &current_state, &context, step, &failure)
                                .await?;
                            return Err(failure);
                        }
                    }
                }
            };

            let next_state = match redirect {
                Some(target) => target,
                None => {
                    let ctx_value = context.as_value();
                    let scope = Scope::new(&ctx_value, &input, &output_value);
                    match self.resolve_transition(&machine, &current_state, &scope)? {
                        Some(target) => target,
                        None => {
                            let err = MachineError::NoTransition(current_state.clone());
                            match self
                                .handle_state_error(state_def, &current_state, &mut context, &err)
                                .await?
                            {
                                Some(target) => target,
                                None => {
                                    self.write_failed_snapshot(
                                        &key,
                                        execution_id,
                                        &machine.config.name,
                                        &current_state,
                                        &context,
                                        step,
                                        &err,
                                    )
                                    .await?;
                                    return Err(err);
                                }
                            }
                        }
                    }
                }
            };

            let next_state = self.hooks.on_transition(&current_state, next_state, &context.as_value()).await;

            let exit_output = self
                .hooks
                .on_state_exit(&current_state, &context.as_value(), output_value)
                .await;
            let _ = exit_output;

            let entered = self.hooks.on_state_enter(&next_state, context.into_value()).await;
            context = Context::from_value(entered)?;

            step += 1;
            current_state = next_state;

            let checkpoint_on = &machine.config.settings.checkpoint_on;
            self.write_snapshot(
                &key,
                execution_id,
                &machine.config.name,
                &current_state,
                &context,
                step,
                Some("state_enter"),
                None,
                parent_execution_id,
                &pending_launches,
                usage,
                checkpoint_on.contains(&"state_enter".to_string()) || checkpoint_on.contains(&"state_exit".to_string()),
            )
            .await?;
        }
    }

    /// Re-issues the launch for every `pending_launches` entry with
    /// `launched == false` (§4.H resume step) whose origin state/step is
    /// *not* the one the loop is about to re-dispatch, returning the ids that
    /// were relaunched so the caller can flip their `launched` flag.
    ///
    /// An intent whose `(origin_state, origin_step)` matches `current_state`/
    /// `step` is left alone here: `current_state` is still about to go
    /// through `dispatch()` again this very loop iteration, and
    /// `launch_and_track` already reclaims intents for its own state visit
    /// (matching by position) instead of minting fresh ones. Relaunching it
    /// here too would spawn the same child id from two places at once.
    ///
    /// Not persisting the `launched` flip immediately is safe: a spawned
    /// child always checks persistence for its own execution id before
    /// writing a fresh `machine_start` snapshot (see [`Engine::run_locked`]),
    /// so relaunching the same id twice across repeated crashes just resumes
    /// the same child rather than starting a second one — invariant 4 holds
    /// regardless of how promptly the parent's own bookkeeping catches up.
    async fn relaunch_pending(
        &self,
        pending_launches: &[crate::snapshot::LaunchIntent],
        parent_execution_id: ExecutionId,
        current_state: &str,
        step: u64,
    ) -> Vec<ExecutionId> {
        let mut relaunched = Vec::new();
        for intent in pending_launches
            .iter()
            .filter(|li| !li.launched)
            .filter(|li| !(li.origin_state == current_state && li.origin_step == step))
        {
            let Some(machine) = self.registry.machine(&intent.machine) else {
                tracing::warn!(machine = %intent.machine, "cannot relaunch: machine not registered");
                continue;
            };
            self.spawn_child(machine, intent.execution_id, intent.input.clone(), parent_execution_id)
                .await;
            relaunched.push(intent.execution_id);
        }
        relaunched
    }

    /// Spawns a child execution as an in-process background task (the
    /// "in-process goroutine" invoker option named in §4.H), waiting only
    /// until the child's own snapshot has been durably persisted before
    /// returning — the point at which the outbox protocol permits marking the
    /// owning `LaunchIntent.launched = true`.
    pub(crate) async fn spawn_child(
        &self,
        machine: Arc<CompiledMachine>,
        execution_id: ExecutionId,
        input: Value,
        parent_execution_id: ExecutionId,
    ) -> tokio::task::JoinHandle<Result<Value, MachineError>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .run(machine, execution_id, input, Some(parent_execution_id), Some(tx))
                .await
        });
        let _ = rx.await;
        handle
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn write_snapshot(
        &self,
        key: &str,
        execution_id: ExecutionId,
        machine_name: &str,
        current_state: &str,
        context: &Context,
        step: u64,
        event: Option<&str>,
        output: Option<Value>,
        parent_execution_id: Option<ExecutionId>,
        pending_launches: &[crate::snapshot::LaunchIntent],
        usage: UsageTotals,
        should_persist: bool,
    ) -> Result<(), MachineError> {
        if !should_persist {
            return Ok(());
        }
        let snapshot = MachineSnapshot {
            execution_id,
            machine_name: machine_name.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            current_state: current_state.to_string(),
            context: context.as_value(),
            step,
            created_at: now_iso8601(),
            event: event.map(|e| e.to_string()),
            output,
            parent_execution_id,
            pending_launches: pending_launches.to_vec(),
            total_api_calls: Some(usage.total_api_calls),
            total_cost: Some(usage.total_cost),
        };
        tracing::debug!(execution_id = %execution_id, state = current_state, step, "persisting snapshot");
        self.persistence.save(key, serde_json::to_value(&snapshot)?).await?;
        Ok(())
    }

    async fn write_failed_snapshot(
        &self,
        key: &str,
        execution_id: ExecutionId,
        machine_name: &str,
        current_state: &str,
        context: &Context,
        step: u64,
        error: &MachineError,
    ) -> Result<(), MachineError> {
        tracing::error!(execution_id = %execution_id, state = current_state, %error, "execution failed");
        self.write_snapshot(
            key,
            execution_id,
            machine_name,
            current_state,
            context,
            step,
            Some("error"),
            Some(Value::String(error.to_string())),
            None,
            &[],
            UsageTotals::default(),
            true,
        )
        .await
    }

    fn resolve_transition(
        &self,
        machine: &CompiledMachine,
        state: &str,
        scope: &Scope,
    ) -> Result<Option<String>, MachineError> {
        let transitions = machine
            .transitions
            .get(state)
            .expect("compiled machine carries transitions for every state");
        for transition in transitions {
            let matches = match &transition.condition {
                Some(cond) => cond.eval_bool(scope)?,
                None => true,
            };
            if matches {
                return Ok(Some(transition.to.clone()));
            }
        }
        Ok(None)
    }

    async fn render_final_output(
        &self,
        engine: crate::expr::ExpressionEngine,
        state_def: &crate::config::types::StateDef,
        context: &Context,
        input: &Value,
    ) -> Result<Value, MachineError> {
        let crate::config::types::StateDef::Final(final_state) = state_def else {
            unreachable!("caller already checked is_final()");
        };
        let ctx_value = context.as_value();
        let scope = Scope::new(&ctx_value, input, &Value::Null);
        let mut out = Map::new();
        for (key, expr_src) in &final_state.output {
            out.insert(key.clone(), render_template_engine(engine, expr_src, &scope)?);
        }
        Ok(Value::Object(out))
    }

    /// Applies a state's own `on_error` handling (§4.G): stamps `_error`/
    /// `_error_type` into context and resolves a redirect target. Returns
    /// `Ok(None)` when there's no declared `on_error` handling and the
    /// `hooks.on_error` hook also declines to redirect — the caller then
    /// enters *Failed*.
    async fn handle_state_error(
        &self,
        state_def: &crate::config::types::StateDef,
        state_name: &str,
        context: &mut Context,
        error: &MachineError,
    ) -> Result<Option<String>, MachineError> {
        let code = match error {
            MachineError::AgentFailed { code, .. } => code.clone(),
            MachineError::StepLimitExceeded { .. } => None,
            MachineError::NoTransition(_) => Some("no_transition".to_string()),
            MachineError::ResultBackend(crate::result_backend::ResultBackendError::Timeout(_)) => {
                Some("timeout".to_string())
            }
            _ => None,
        };

        let on_error = match state_def {
            crate::config::types::StateDef::Agent(s) => s.on_error.as_ref(),
            crate::config::types::StateDef::MachineLaunch(s) => s.on_error.as_ref(),
            crate::config::types::StateDef::Action(s) => s.on_error.as_ref(),
            _ => None,
        };

        if let Some(on_error) = on_error {
            if let Some(target) = on_error.target_for(code.as_deref()) {
                context.set("_error", Value::String(error.to_string()));
                context.set(
                    "_error_type",
                    code.clone().map(Value::String).unwrap_or(Value::Null),
                );
                return Ok(Some(target.to_string()));
            }
        }

        let info = HookErrorInfo::new(error.to_string(), code);
        Ok(self.hooks.on_error(state_name, &info, &context.as_value()).await)
    }
}
