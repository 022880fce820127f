use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::error::PersistenceError;
use super::PersistenceBackend;

/// In-process snapshot store, ordered by key so `list_by_prefix` can binary-search
/// its range instead of scanning — matters once a long-running parent has
/// launched thousands of `foreach` children sharing a key prefix.
#[derive(Default)]
pub struct InMemoryPersistenceBackend {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl InMemoryPersistenceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryPersistenceBackend {
    async fn save(&self, key: &str, value: Value) -> Result<(), PersistenceError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
