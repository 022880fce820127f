//! Snapshot persistence: how a machine's state survives a process restart.
//!
//! Grounded on the teacher's `Checkpointer` trait (`loom/src/memory/checkpointer.rs`,
//! `loom/src/memory/mod.rs`) — put/get/list keyed checkpoints — generalized from
//! one machine's thread state to arbitrary JSON snapshots keyed by a
//! slash-delimited string, since this engine also needs to enumerate all of a
//! parent's launched children by shared key prefix during crash recovery (§4.H).

mod error;
mod file;
mod in_memory;

use async_trait::async_trait;
use serde_json::Value;

pub use error::PersistenceError;
pub use file::FilePersistenceBackend;
pub use in_memory::InMemoryPersistenceBackend;

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn save(&self, key: &str, value: Value) -> Result<(), PersistenceError>;
    async fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError>;
    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;
    /// All keys with the given prefix, in no particular guaranteed order beyond
    /// what each implementation happens to provide.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError>;
}
