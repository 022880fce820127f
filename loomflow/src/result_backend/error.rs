use thiserror::Error;

use super::uri::UriParseError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResultBackendError {
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] UriParseError),
    /// `/result` is written exactly once per execution. A rewrite with the same
    /// value is a no-op; a rewrite with a different value is a fatal misuse
    /// (§9 open question: "treat a different-value rewrite as a misuse").
    #[error("result already written with a different value at {0}")]
    AlreadyWritten(String),
    /// A blocking `read` with a finite timeout elapsed before any `write` landed.
    #[error("read timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("backend is shutting down")]
    ShuttingDown,
}
