use thiserror::Error;

use super::WorkItemId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkPoolError {
    #[error("work item {0} does not exist")]
    UnknownItem(WorkItemId),
    #[error("work item {0} is poisoned and can no longer be claimed or completed")]
    Poisoned(WorkItemId),
    #[error("worker {0} is not registered")]
    UnknownWorker(String),
}
