use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use super::error::ResultBackendError;
use super::uri::Uri;
use super::ResultBackend;
use crate::ids::ExecutionId;

#[derive(Default)]
struct Slot {
    value: Mutex<Option<Value>>,
    notify: Notify,
}

/// In-process result backend, used for tests and single-process deployments.
///
/// Mirrors the teacher's `cache::Cache` (`loom/src/cache/mod.rs`): a blocking
/// read that parks until a value shows up. The teacher uses a `Condvar` because
/// its callers are synchronous; everything here is async, so `tokio::sync::Notify`
/// plays the same role without requiring a dedicated OS thread per waiter.
pub struct InMemoryResultBackend {
    slots: Mutex<HashMap<(ExecutionId, String), Arc<Slot>>>,
    closed: AtomicBool,
}

impl InMemoryResultBackend {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn slot_for(&self, key: &(ExecutionId, String)) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        slots.entry(key.clone()).or_insert_with(|| Arc::new(Slot::default())).clone()
    }

    /// Wakes every blocked reader so shutdown doesn't hang callers forever.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots = self.slots.lock();
        for slot in slots.values() {
            slot.notify.notify_waiters();
        }
    }
}

impl Default for InMemoryResultBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultBackend for InMemoryResultBackend {
    async fn write(&self, uri: &Uri, value: Value) -> Result<(), ResultBackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ResultBackendError::ShuttingDown);
        }
        let key = (uri.execution_id, uri.path.clone());
        let slot = self.slot_for(&key);

        {
            let mut guard = slot.value.lock();
            if uri.path == "/result" {
                if let Some(existing) = guard.as_ref() {
                    if *existing == value {
                        return Ok(()); // equal-value rewrite: no-op (§9)
                    }
                    return Err(ResultBackendError::AlreadyWritten(uri.to_string()));
                }
            }
            *guard = Some(value);
        }
        slot.notify.notify_waiters();
        Ok(())
    }

    async fn read(&self, uri: &Uri, timeout: Option<Duration>) -> Result<Value, ResultBackendError> {
        let key = (uri.execution_id, uri.path.clone());
        let slot = self.slot_for(&key);

        let wait = async {
            loop {
                let notified = slot.notify.notified();
                if let Some(v) = slot.value.lock().clone() {
                    return Ok(v);
                }
                if self.closed.load(Ordering::SeqCst) {
                    if let Some(v) = slot.value.lock().clone() {
                        return Ok(v);
                    }
                    return Err(ResultBackendError::ShuttingDown);
                }
                notified.await;
            }
        };

        match timeout {
            None => wait.await,
            Some(d) => tokio::time::timeout(d, wait)
                .await
                .unwrap_or(Err(ResultBackendError::Timeout(d))),
        }
    }

    async fn try_read(&self, uri: &Uri) -> Result<Option<Value>, ResultBackendError> {
        let key = (uri.execution_id, uri.path.clone());
        let slot = self.slot_for(&key);
        Ok(slot.value.lock().clone())
    }

    async fn delete(&self, uri: &Uri) -> Result<(), ResultBackendError> {
        let key = (uri.execution_id, uri.path.clone());
        self.slots.lock().remove(&key);
        Ok(())
    }
}
