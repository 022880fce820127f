//! URI-addressed result storage with blocking reads (§4.C).
//!
//! A parent machine that `launch`es a child in blocking mode reads
//! `flatagents://{child_id}/result` and parks until the child writes it — the
//! same "write once, many readers park until it's there" shape as the teacher's
//! `cache::Cache`, generalized from an in-process `Condvar` to a URI-addressed
//! store that can, in a real deployment, be backed by something shared across
//! processes (Redis, a database row, etc. — only the in-memory reference
//! implementation ships here).

mod error;
mod in_memory;
mod uri;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use error::ResultBackendError;
pub use in_memory::InMemoryResultBackend;
pub use uri::{Uri, UriParseError};

#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Writes `value` at `uri`. Idempotent for the same `(uri, value)` pair.
    /// For a `/result` path specifically: a rewrite with an identical value is
    /// a no-op; a rewrite with a different value fails with `AlreadyWritten`.
    /// All other paths (e.g. `/checkpoint`) are unconditionally last-writer-wins.
    async fn write(&self, uri: &Uri, value: Value) -> Result<(), ResultBackendError>;

    /// Reads the value at `uri`. With `timeout = None`, blocks until written.
    /// With `timeout = Some(d)`, blocks up to `d` and fails with `Timeout` if
    /// nothing has been written by then.
    async fn read(&self, uri: &Uri, timeout: Option<Duration>) -> Result<Value, ResultBackendError>;

    /// Reads the value at `uri` if present, without blocking.
    async fn try_read(&self, uri: &Uri) -> Result<Option<Value>, ResultBackendError>;

    /// Whether a value has been written at `uri`, without blocking.
    async fn exists(&self, uri: &Uri) -> Result<bool, ResultBackendError> {
        Ok(self.try_read(uri).await?.is_some())
    }

    async fn delete(&self, uri: &Uri) -> Result<(), ResultBackendError>;
}
