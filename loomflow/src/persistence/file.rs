use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::error::PersistenceError;
use super::PersistenceBackend;

/// Durable snapshot store backed by one JSON file per key under `base_dir`.
///
/// Writes go to a temp file in the same directory and are renamed into place
/// (`fs::rename` is atomic on the same filesystem) so a crash mid-write never
/// leaves a torn snapshot for the resume path to trip over — the durability
/// half of the outbox protocol (§4.H) depends on this.
pub struct FilePersistenceBackend {
    base_dir: PathBuf,
}

impl FilePersistenceBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(encode_key(key)).with_extension("json")
    }

    async fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Keys are slash-delimited (`"exec/parent/child-1"`); `/` maps to the platform's
/// path separator so prefix listing can walk a real directory tree instead of
/// scanning flat filenames.
fn encode_key(key: &str) -> PathBuf {
    key.split('/').collect()
}

fn decode_key(base_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base_dir).ok()?;
    let rel = rel.with_extension("");
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl PersistenceBackend for FilePersistenceBackend {
    async fn save(&self, key: &str, value: Value) -> Result<(), PersistenceError> {
        let final_path = self.path_for(key);
        Self::ensure_parent(&final_path).await?;
        let tmp_path = final_path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&value)?;
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        let base_dir = self.base_dir.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            if base_dir.exists() {
                walk(&base_dir, &base_dir, &prefix, &mut out)?;
            }
            out.sort(); // §4.D: `list` returns keys in lexicographic order
            Ok(out)
        })
        .await
        .expect("blocking walk task panicked")
    }
}

fn walk(base_dir: &Path, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), PersistenceError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(base_dir, &path, prefix, out)?;
        } else if let Some(key) = decode_key(base_dir, &path) {
            if key.starts_with(prefix) {
                out.push(key);
            }
        }
    }
    Ok(())
}
