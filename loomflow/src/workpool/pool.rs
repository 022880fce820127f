//! The `WorkPool` contract (§4.I): a queue of externally-defined work items
//! claimed exactly once at a time, with bounded retry before an item is
//! given up on ("poisoned").

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::error::WorkPoolError;
use super::WorkItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemStatus {
    Queued,
    Claimed,
    Completed,
    /// `attempts` reached `max_retries`; no longer returned by `claim`.
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub payload: Value,
    pub max_retries: u32,
    pub attempts: u32,
    pub status: WorkItemStatus,
    pub claimed_by: Option<String>,
    pub result: Option<Value>,
    pub last_error: Option<String>,
}

#[async_trait]
pub trait WorkPool: Send + Sync {
    /// Enqueues `item`, retryable up to `max_retries` times before it's
    /// poisoned. Returns the id it was assigned.
    async fn push(&self, item: Value, max_retries: u32) -> WorkItemId;

    /// Atomically claims the next queued item for `worker_id`: no two
    /// concurrent callers ever receive the same item. `None` if the queue is
    /// empty.
    async fn claim(&self, worker_id: &str) -> Option<WorkItem>;

    /// Marks `id` completed with an optional result payload.
    async fn complete(&self, id: WorkItemId, result: Option<Value>) -> Result<(), WorkPoolError>;

    /// Marks one failed attempt at `id`. Once `attempts` reaches
    /// `max_retries`, the item is poisoned instead of being requeued.
    async fn fail(&self, id: WorkItemId, error: Option<String>) -> Result<(), WorkPoolError>;

    /// Count of items still outstanding (queued or claimed).
    async fn size(&self) -> usize;

    /// Releases every item currently claimed by `worker_id` back to the
    /// queue — what a reaper calls once a worker is found `lost` (§4.I).
    /// Returns how many items were released.
    async fn release_by_worker(&self, worker_id: &str) -> usize;
}

#[derive(Default)]
struct State {
    items: HashMap<WorkItemId, WorkItem>,
    queue: VecDeque<WorkItemId>,
}

/// In-process reference implementation, guarded by one `parking_lot::Mutex`
/// the same way [`crate::lock::InMemoryExecutionLock`] guards its lease table.
#[derive(Default)]
pub struct InMemoryWorkPool {
    state: Mutex<State>,
}

impl InMemoryWorkPool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkPool for InMemoryWorkPool {
    async fn push(&self, item: Value, max_retries: u32) -> WorkItemId {
        let id = WorkItemId::new();
        let mut state = self.state.lock();
        state.items.insert(
            id,
            WorkItem {
                id,
                payload: item,
                max_retries,
                attempts: 0,
                status: WorkItemStatus::Queued,
                claimed_by: None,
                result: None,
                last_error: None,
            },
        );
        state.queue.push_back(id);
        id
    }

    async fn claim(&self, worker_id: &str) -> Option<WorkItem> {
        let mut state = self.state.lock();
        while let Some(id) = state.queue.pop_front() {
            let Some(item) = state.items.get_mut(&id) else { continue };
            if item.status != WorkItemStatus::Queued {
                // Stale queue entry: was re-pushed via `release_by_worker`
                // and already claimed/completed by the time it's popped.
                continue;
            }
            item.status = WorkItemStatus::Claimed;
            item.claimed_by = Some(worker_id.to_string());
            return Some(item.clone());
        }
        None
    }

    async fn complete(&self, id: WorkItemId, result: Option<Value>) -> Result<(), WorkPoolError> {
        let mut state = self.state.lock();
        let item = state.items.get_mut(&id).ok_or(WorkPoolError::UnknownItem(id))?;
        if item.status == WorkItemStatus::Poisoned {
            return Err(WorkPoolError::Poisoned(id));
        }
        item.status = WorkItemStatus::Completed;
        item.claimed_by = None;
        item.result = result;
        Ok(())
    }

    async fn fail(&self, id: WorkItemId, error: Option<String>) -> Result<(), WorkPoolError> {
        let mut state = self.state.lock();
        let item = state.items.get_mut(&id).ok_or(WorkPoolError::UnknownItem(id))?;
        if item.status == WorkItemStatus::Poisoned {
            return Err(WorkPoolError::Poisoned(id));
        }
        item.attempts += 1;
        item.claimed_by = None;
        item.last_error = error;
        if item.attempts >= item.max_retries {
            item.status = WorkItemStatus::Poisoned;
        } else {
            item.status = WorkItemStatus::Queued;
            state.queue.push_back(id);
        }
        Ok(())
    }

    async fn size(&self) -> usize {
        let state = self.state.lock();
        state
            .items
            .values()
            .filter(|i| matches!(i.status, WorkItemStatus::Queued | WorkItemStatus::Claimed))
            .count()
    }

    async fn release_by_worker(&self, worker_id: &str) -> usize {
        let mut state = self.state.lock();
        let to_release: Vec<WorkItemId> = state
            .items
            .values()
            .filter(|i| i.status == WorkItemStatus::Claimed && i.claimed_by.as_deref() == Some(worker_id))
            .map(|i| i.id)
            .collect();
        for id in &to_release {
            if let Some(item) = state.items.get_mut(id) {
                item.status = WorkItemStatus::Queued;
                item.claimed_by = None;
            }
        }
        for id in &to_release {
            state.queue.push_back(*id);
        }
        to_release.len()
    }
}
