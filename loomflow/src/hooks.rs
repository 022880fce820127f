//! Lifecycle hooks (§4.G, §9): a record of optional async callbacks, not a
//! subclassable base class — the Design Notes call out exactly this shape
//! ("Hooks that look like subclassable classes → specify as a record of
//! optional function-valued fields; composition via wrapping, not
//! inheritance"). Every method has a no-op default so a host only overrides
//! the ones it cares about.
//!
//! §9's open question ("hook execution model") is resolved here: hooks are
//! `async_trait` methods, awaited in line by the interpreter — "synchronous"
//! in the sense that the interpreter never proceeds past a hook call until it
//! resolves, while still letting a host hook do real async I/O (an HTTP call
//! to a human-approval service, a database write, …).

use async_trait::async_trait;
use serde_json::Value;

/// What an `on_error` hook (and a state's own `on_error` config) see about the
/// failure that triggered them — deliberately smaller than any one
/// component's own error enum, since this is the one shape every error
/// source (agent, expression, launch, transition, budget) gets normalized to
/// before a hook or `on_error` mapping ever sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct HookErrorInfo {
    pub message: String,
    /// The taxonomy code when the error came from an `AgentResult.error`
    /// (§4.B), e.g. `"rate_limit"`; `None` for expression/transition/budget
    /// errors, which have no taxonomy code of their own.
    pub code: Option<String>,
}

impl HookErrorInfo {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

#[async_trait]
pub trait MachineHooks: Send + Sync {
    async fn on_machine_start(&self, context: Value) -> Value {
        context
    }

    async fn on_machine_end(&self, _context: &Value, output: Value) -> Value {
        output
    }

    async fn on_state_enter(&self, _state: &str, context: Value) -> Value {
        context
    }

    async fn on_state_exit(&self, _state: &str, _context: &Value, output: Value) -> Value {
        output
    }

    /// May redirect the transition by returning a different target than `to`.
    async fn on_transition(&self, _from: &str, to: String, _context: &Value) -> String {
        to
    }

    /// `None` means "rethrow" — the interpreter enters *Failed*.
    async fn on_error(&self, _state: &str, _error: &HookErrorInfo, _context: &Value) -> Option<String> {
        None
    }

    /// Resolves an `action` state's named action against the host's own
    /// registry of action functions; the return value replaces `context`.
    async fn on_action(&self, _action: &str, context: Value) -> Value {
        context
    }
}

/// A `MachineHooks` where every hook is the identity/no-op default —
/// used by machines that declare no hooks at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl MachineHooks for NoopHooks {}
