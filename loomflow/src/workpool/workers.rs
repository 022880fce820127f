//! The `RegistrationBackend` contract (§4.I): worker liveness tracking for a
//! fleet running the core. Separate from [`super::WorkPool`] — a worker can
//! be registered and heartbeating with nothing claimed, or claiming items
//! with its registration expired, and the two lifecycles are reconciled only
//! by a reaper that reads both.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::WorkPoolError;
use crate::timestamp::now_iso8601;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Active,
    Terminating,
    Terminated,
    /// Heartbeat older than the stale threshold; a reaper assigns this, the
    /// worker itself never does.
    Lost,
}

#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub id: String,
    pub status: WorkerStatus,
    pub registered_at: String,
    pub last_heartbeat_at: String,
}

#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    /// Registers a new worker (or re-registers one that had terminated),
    /// starting it as `Active` with a fresh heartbeat.
    async fn register(&self, worker_id: &str) -> WorkerInfo;

    /// Records a liveness ping, resetting the staleness clock.
    async fn heartbeat(&self, worker_id: &str) -> Result<(), WorkPoolError>;

    async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<(), WorkPoolError>;

    /// All registered workers, optionally narrowed to one status.
    async fn list(&self, filter: Option<WorkerStatus>) -> Vec<WorkerInfo>;

    /// Workers not already `Terminated` whose last heartbeat is older than
    /// `2 * heartbeat_interval` (§4.I "stale threshold defaults to
    /// `2×heartbeat_interval`") — what a reaper polls to find workers whose
    /// claimed work items need releasing via `WorkPool::release_by_worker`.
    async fn stale(&self, heartbeat_interval: Duration) -> Vec<WorkerInfo>;
}

struct Entry {
    info: WorkerInfo,
    last_heartbeat: Instant,
}

/// In-process reference implementation, guarded by one `parking_lot::Mutex`.
#[derive(Default)]
pub struct InMemoryRegistrationBackend {
    workers: Mutex<HashMap<String, Entry>>,
}

impl InMemoryRegistrationBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationBackend for InMemoryRegistrationBackend {
    async fn register(&self, worker_id: &str) -> WorkerInfo {
        let now = now_iso8601();
        let info = WorkerInfo {
            id: worker_id.to_string(),
            status: WorkerStatus::Active,
            registered_at: now.clone(),
            last_heartbeat_at: now,
        };
        let mut workers = self.workers.lock();
        workers.insert(
            worker_id.to_string(),
            Entry {
                info: info.clone(),
                last_heartbeat: Instant::now(),
            },
        );
        info
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<(), WorkPoolError> {
        let mut workers = self.workers.lock();
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| WorkPoolError::UnknownWorker(worker_id.to_string()))?;
        entry.last_heartbeat = Instant::now();
        entry.info.last_heartbeat_at = now_iso8601();
        if entry.info.status == WorkerStatus::Lost {
            entry.info.status = WorkerStatus::Active;
        }
        Ok(())
    }

    async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<(), WorkPoolError> {
        let mut workers = self.workers.lock();
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| WorkPoolError::UnknownWorker(worker_id.to_string()))?;
        entry.info.status = status;
        Ok(())
    }

    async fn list(&self, filter: Option<WorkerStatus>) -> Vec<WorkerInfo> {
        let workers = self.workers.lock();
        workers
            .values()
            .map(|e| e.info.clone())
            .filter(|info| filter.map(|f| info.status == f).unwrap_or(true))
            .collect()
    }

    async fn stale(&self, heartbeat_interval: Duration) -> Vec<WorkerInfo> {
        let threshold = heartbeat_interval * 2;
        let now = Instant::now();
        let workers = self.workers.lock();
        workers
            .values()
            .filter(|e| e.info.status != WorkerStatus::Terminated && now.duration_since(e.last_heartbeat) > threshold)
            .map(|e| e.info.clone())
            .collect()
    }
}
