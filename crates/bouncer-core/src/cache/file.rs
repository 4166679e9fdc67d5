//! File-backed Cache Store: a sharded directory of per-key files.
//!
//! The only backend that is not self-expiring, hence the only one that
//! implements [`CacheBackend::prune`].

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use cerberus_common::error::BouncerError;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::CacheBackend;

#[derive(Serialize, Deserialize)]
struct FileEntry {
    expires_at_unix: i64,
    value: Vec<u8>,
}

/// Shards files two levels deep on the first two hex bytes of the key
/// to keep any one directory from growing unbounded.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let shard = &key[..key.len().min(2)];
        self.root.join(shard).join(key)
    }

    async fn ensure_parent(path: &Path) -> Result<(), BouncerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BouncerError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs() as i64
    }
}

#[async_trait::async_trait]
impl CacheBackend for FileBackend {
    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, BouncerError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BouncerError::Storage(e.to_string())),
        };
        let entry: FileEntry = bincode::deserialize(&bytes)
            .map_err(|e| BouncerError::CacheVersion(e.to_string()))?;
        if entry.expires_at_unix != i64::MAX && entry.expires_at_unix <= Self::now() {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn raw_put(&self, key: &str, value: &[u8], ttl_secs: i64) -> Result<(), BouncerError> {
        let path = self.path_for(key);
        Self::ensure_parent(&path).await?;
        let expires_at_unix = if ttl_secs == i64::MAX {
            i64::MAX
        } else {
            Self::now() + ttl_secs
        };
        let entry = FileEntry {
            expires_at_unix,
            value: value.to_vec(),
        };
        let bytes = bincode::serialize(&entry)
            .map_err(|e| BouncerError::Storage(e.to_string()))?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_delete(&self, key: &str) -> Result<(), BouncerError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn raw_clear(&self) -> Result<(), BouncerError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| BouncerError::Storage(e.to_string()))?;
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    fn needs_prune(&self) -> bool {
        true
    }

    async fn prune(&self) -> Result<(), BouncerError> {
        let mut stack = vec![self.root.clone()];
        let now = Self::now();
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BouncerError::Storage(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Ok(bytes) = fs::read(&path).await {
                    if let Ok(parsed) = bincode::deserialize::<FileEntry>(&bytes) {
                        if parsed.expires_at_unix != i64::MAX && parsed.expires_at_unix <= now {
                            let _ = fs::remove_file(&path).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
