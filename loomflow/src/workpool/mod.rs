//! Work-Pool & Worker Registry (§4.I) — an optional tier above the
//! single-process interpreter, for applications that run the core across a
//! fleet of workers instead of one process. Not required for, and not used
//! by, [`crate::interpreter::Engine`] itself.
//!
//! Not grounded in the teacher directly (`loom` runs single-process and has
//! no work-pool concept of its own); grounded instead in the general
//! "atomic claim + heartbeat + reaper" shape a claim-based job runner needs,
//! expressed with the same `parking_lot::Mutex`-guarded in-memory reference
//! implementation idiom this crate uses everywhere else ([`crate::lock`],
//! [`crate::result_backend::InMemoryResultBackend`]) — a real deployment
//! swaps in Redis/Postgres-backed implementations of the same two traits.

mod error;
mod pool;
mod workers;

pub use error::WorkPoolError;
pub use pool::{InMemoryWorkPool, WorkItem, WorkItemStatus, WorkPool};
pub use workers::{InMemoryRegistrationBackend, RegistrationBackend, WorkerInfo, WorkerStatus};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pushed work item, independent of which `WorkPool`
/// implementation is holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(Uuid);

impl WorkItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
