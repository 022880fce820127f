use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}
