//! The executor boundary: the one trait a host application implements to plug an
//! LLM-backed agent (or any other external call) into an agent state's `agent`.
//!
//! Grounded on the teacher's `Agent` trait (`graphweave/src/traits.rs`) — a
//! single async method taking accumulated state and returning a result the
//! graph merges back in. Unlike the teacher's trait, `execute` here is
//! infallible at the Rust level: §4.B requires executors to "translate
//! transport-level exceptions into an `AgentResult.error` rather than
//! propagating", so a `Result<AgentResult, E>` return type would just invite
//! callers to bypass that contract. Genuine host-side bugs still panic same as
//! anywhere else; expected failure modes (rate limits, timeouts, content
//! filters, …) are data, carried in `AgentResult.error`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The error taxonomy surfaced in `AgentResult.error.code` (§4.B). The retry
/// strategy (§4.F) only ever inspects `retryable` and, for `RateLimit`,
/// `AgentResult.rate_limit.retry_after` — never the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateLimit,
    Timeout,
    ServerError,
    InvalidRequest,
    AuthError,
    ContentFilter,
    ContextLength,
    ModelUnavailable,
}

impl ErrorCode {
    /// The taxonomy's own default `retryable` classification, used when a host
    /// constructs an `AgentError` without overriding it explicitly.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit | ErrorCode::Timeout | ErrorCode::ServerError | ErrorCode::ModelUnavailable
        )
    }

    /// The snake_case wire name (matches the `#[serde(rename_all)]` above) —
    /// what `context._error_type` is stamped with and what an `on_error` map
    /// (§4.G, `{default: X, RateLimitError: Y}`-style, keyed on this code) is
    /// matched against.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RateLimit => "rate_limit",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ServerError => "server_error",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::ContentFilter => "content_filter",
            ErrorCode::ContextLength => "context_length",
            ErrorCode::ModelUnavailable => "model_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl AgentError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.default_retryable(),
            code,
            message: message.into(),
        }
    }
}

/// Server-mandated backoff, carried separately from `error` because a
/// well-behaved rate-limit response is not itself an exceptional condition —
/// it's routine advice the retry strategy must honor verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Seconds to wait before retrying, as reported by the provider.
    pub retry_after: Option<f64>,
}

/// What an executor call returns — success and failure share one shape so the
/// interpreter never needs to distinguish "the call threw" from "the call
/// returned an error", only inspect `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
    /// Cross-process carriers (the subprocess invoker, §6) drop this field;
    /// it only ever travels within one process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<Value>,
}

impl AgentResult {
    pub fn success(output: Value) -> Self {
        Self {
            output: Some(output),
            ..Default::default()
        }
    }

    pub fn failure(error: AgentError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `retryable` per §4.B, `false` for a successful result.
    pub fn retryable(&self) -> bool {
        self.error.as_ref().map(|e| e.retryable).unwrap_or(false)
    }

    pub fn retry_after(&self) -> Option<f64> {
        self.rate_limit.and_then(|r| r.retry_after)
    }
}

/// Implemented once per backing agent/model/tool by the host application.
/// `name` identifies which `executor:` an agent state's config refers to.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// `input` is the already-rendered JSON map produced from the state's
    /// `input` template (or the full context, if `input` was absent) — the
    /// executor itself never touches `Context` or the expression engine.
    async fn execute(&self, input: Value) -> AgentResult;
}
