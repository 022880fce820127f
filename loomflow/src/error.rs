//! The interpreter-level error, unifying every component's own error enum —
//! grounded on the teacher's `RunError` (`loom/src/agent/react/runner/error.rs`)
//! wrapping `CompilationError`/`CheckpointError`/`AgentError` via `#[from]`.

use thiserror::Error;

use crate::config::compile::CompileError;
use crate::context::ContextError;
use crate::expr::ExpressionError;
use crate::interpreter::LaunchError;
use crate::lock::LockError;
use crate::persistence::PersistenceError;
use crate::result_backend::ResultBackendError;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("configuration error: {0}")]
    Compile(#[from] CompileError),
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("context error: {0}")]
    Context(#[from] ContextError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("result backend error: {0}")]
    ResultBackend(#[from] ResultBackendError),
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),
    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown agent {agent:?} referenced by state {state:?}")]
    UnknownAgent { agent: String, state: String },
    #[error("unknown machine {machine:?} referenced by state {state:?}")]
    UnknownMachine { machine: String, state: String },
    #[error("no transition matched from state {0:?}")]
    NoTransition(String),
    #[error("step limit exceeded: step {step} > max_steps {max_steps}")]
    StepLimitExceeded { step: u64, max_steps: u64 },
    #[error("agent {agent:?} in state {state:?} failed: {message}")]
    AgentFailed {
        agent: String,
        state: String,
        code: Option<String>,
        message: String,
    },
    #[error("execution {0} has no persisted snapshot to resume")]
    NoSnapshotToResume(crate::ids::ExecutionId),
}

impl MachineError {
    /// The taxonomy-ish code surfaced to `context._error_type` and to
    /// `on_error`/`hooks.on_error` (§4.G). Expression/transition/budget errors
    /// have no taxonomy code of their own.
    pub fn error_code(&self) -> Option<String> {
        match self {
            MachineError::AgentFailed { code, .. } => code.clone(),
            _ => None,
        }
    }
}
