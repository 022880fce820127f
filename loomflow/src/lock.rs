//! Per-execution exclusivity: only one worker may be driving a given machine's
//! state transitions at a time.
//!
//! A TTL lease rather than a held-forever mutex, because the holder can crash —
//! the lease simply expires and another worker picks the execution back up from
//! its last persisted snapshot (§4.G "crash & resume"). [`InMemoryExecutionLock`]
//! is the reference implementation; a real deployment would back this with
//! whatever the fleet already uses for distributed locks (a database row with a
//! `expires_at` column, Redis `SET NX PX`, etc.) behind the same trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::ids::ExecutionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("execution {0} is already locked by another holder")]
    AlreadyHeld(ExecutionId),
    #[error("execution {0} is not held by this holder")]
    NotHeld(ExecutionId),
}

#[async_trait]
pub trait ExecutionLock: Send + Sync {
    /// Acquires (or renews, if `holder` already holds it) the lease on
    /// `execution_id` for `ttl`. Fails if a different holder's lease hasn't
    /// expired yet.
    async fn acquire(&self, execution_id: ExecutionId, holder: &str, ttl: Duration) -> Result<(), LockError>;

    /// Releases the lease early. Fails if `holder` does not currently hold it
    /// (including if the lease already expired and was reaped or reacquired).
    async fn release(&self, execution_id: ExecutionId, holder: &str) -> Result<(), LockError>;
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// In-process lock table plus a manual reaper for expired leases.
pub struct InMemoryExecutionLock {
    leases: Mutex<HashMap<ExecutionId, Lease>>,
}

impl InMemoryExecutionLock {
    pub fn new() -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Drops every lease whose TTL has elapsed, returning how many were reaped.
    /// Call this periodically (e.g. from a `tokio::time::interval` loop) so a
    /// crashed holder's execution becomes claimable again.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        let before = leases.len();
        leases.retain(|_, lease| lease.expires_at > now);
        before - leases.len()
    }
}

impl Default for InMemoryExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLock for InMemoryExecutionLock {
    async fn acquire(&self, execution_id: ExecutionId, holder: &str, ttl: Duration) -> Result<(), LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(existing) = leases.get(&execution_id) {
            if existing.expires_at > now && existing.holder != holder {
                return Err(LockError::AlreadyHeld(execution_id));
            }
        }
        leases.insert(
            execution_id,
            Lease {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn release(&self, execution_id: ExecutionId, holder: &str) -> Result<(), LockError> {
        let mut leases = self.leases.lock();
        match leases.get(&execution_id) {
            Some(lease) if lease.holder == holder => {
                leases.remove(&execution_id);
                Ok(())
            }
            _ => Err(LockError::NotHeld(execution_id)),
        }
    }
}
