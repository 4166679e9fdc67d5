//! Tag-aware key/value cache store over pluggable backends. Keys
//! passed to [`CacheStore`] are plain scoped strings;
//! the store base64-encodes them before handing them to a backend so
//! arbitrary IP/CIDR/country values stay within backend key alphabets.

pub mod file;
pub mod memcached;
pub mod redis_backend;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cerberus_common::error::BouncerError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Default maximum size of a single cache entry value, matching common
/// practical Memcached/Redis limits.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 1024 * 1024;

/// The backend seam every Cache Store implementation plugs into.
///
/// Keys handed to implementors are already base64-encoded. Every method
/// must convert transport-level failures into [`BouncerError::Storage`]
/// rather than letting a backend-native error type escape — a contract
/// on the trait rather than a runtime handler installed and torn down
/// around each call.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, BouncerError>;
    async fn raw_put(&self, key: &str, value: &[u8], ttl_secs: i64) -> Result<(), BouncerError>;
    async fn raw_delete(&self, key: &str) -> Result<(), BouncerError>;
    async fn raw_clear(&self) -> Result<(), BouncerError>;

    /// Whether this backend requires an explicit sweep for expired
    /// entries. Only the file backend returns `true`.
    fn needs_prune(&self) -> bool {
        false
    }

    async fn prune(&self) -> Result<(), BouncerError> {
        Ok(())
    }
}

#[derive(Clone)]
enum PendingOp {
    Put {
        key: String,
        value: Vec<u8>,
        ttl_secs: i64,
        tags: Vec<String>,
    },
    Delete {
        key: String,
    },
}

#[derive(Serialize, Deserialize, Default)]
struct TagIndex {
    keys: Vec<String>,
}

/// The tag-aware, deferred-write Cache Store.
///
/// S1: writes queued by `put`/`delete` are not observable to a
/// concurrent `get` (in this process or another) until `commit`
/// succeeds. S2: `clear` removes every entry regardless of tag. S3:
/// `clear_by_tag` removes exactly the entries ever tagged with `t`.
pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    pending: Mutex<Vec<PendingOp>>,
    max_entry_bytes: usize,
}

fn encode_key(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

fn tag_index_key(tag: &str) -> String {
    encode_key(&format!("__tag_index__:{tag}"))
}

impl CacheStore {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            pending: Mutex::new(Vec::new()),
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    pub fn with_max_entry_bytes(mut self, max_entry_bytes: usize) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    /// Returns `(hit, value)` for `key`. Only reflects committed state.
    pub async fn get(&self, key: &str) -> Result<(bool, Option<Vec<u8>>), BouncerError> {
        let raw = self.backend.raw_get(&encode_key(key)).await?;
        Ok((raw.is_some(), raw))
    }

    pub async fn has(&self, key: &str) -> Result<bool, BouncerError> {
        Ok(self.get(key).await?.0)
    }

    /// Queue a write. Not observable until `commit()`.
    pub async fn put(
        &self,
        key: impl Into<String>,
        value: Vec<u8>,
        ttl_secs: i64,
        tags: Vec<String>,
    ) -> Result<(), BouncerError> {
        if value.len() > self.max_entry_bytes {
            return Err(BouncerError::Storage(format!(
                "entry for {} exceeds max size of {} bytes",
                key.into(),
                self.max_entry_bytes
            )));
        }
        self.pending.lock().await.push(PendingOp::Put {
            key: key.into(),
            value,
            ttl_secs,
            tags,
        });
        Ok(())
    }

    /// Queue a deletion. Not observable until `commit()`.
    pub async fn delete(&self, key: impl Into<String>) -> Result<(), BouncerError> {
        self.pending.lock().await.push(PendingOp::Delete {
            key: key.into(),
        });
        Ok(())
    }

    /// Flush every queued write/delete to the backend.
    pub async fn commit(&self) -> Result<bool, BouncerError> {
        let ops = std::mem::take(&mut *self.pending.lock().await);
        for op in ops {
            match op {
                PendingOp::Put {
                    key,
                    value,
                    ttl_secs,
                    tags,
                } => {
                    self.backend
                        .raw_put(&encode_key(&key), &value, ttl_secs)
                        .await?;
                    for tag in tags {
                        self.append_to_tag_index(&tag, &key).await?;
                    }
                }
                PendingOp::Delete { key } => {
                    self.backend.raw_delete(&encode_key(&key)).await?;
                }
            }
        }
        Ok(true)
    }

    /// Removes every entry regardless of tag.
    pub async fn clear(&self) -> Result<(), BouncerError> {
        self.pending.lock().await.clear();
        self.backend.raw_clear().await
    }

    /// Removes exactly the entries ever tagged with `tag`.
    pub async fn clear_by_tag(&self, tag: &str) -> Result<(), BouncerError> {
        let index_key = tag_index_key(tag);
        let Some(raw) = self.backend.raw_get(&index_key).await? else {
            return Ok(());
        };
        let index: TagIndex = serde_json::from_slice(&raw)
            .map_err(|e| BouncerError::CacheVersion(e.to_string()))?;
        for key in &index.keys {
            self.backend.raw_delete(&encode_key(key)).await?;
        }
        self.backend.raw_delete(&index_key).await
    }

    /// Sweeps expired entries where the backend requires it (file
    /// backend only; self-expiring backends are a no-op).
    pub async fn prune(&self) -> Result<(), BouncerError> {
        if self.backend.needs_prune() {
            self.backend.prune().await
        } else {
            Ok(())
        }
    }

    async fn append_to_tag_index(&self, tag: &str, key: &str) -> Result<(), BouncerError> {
        let index_key = tag_index_key(tag);
        let mut index: TagIndex = match self.backend.raw_get(&index_key).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| BouncerError::CacheVersion(e.to_string()))?,
            None => TagIndex::default(),
        };
        if !index.keys.iter().any(|k| k == key) {
            index.keys.push(key.to_string());
        }
        let serialized = serde_json::to_vec(&index)
            .map_err(|e| BouncerError::Storage(e.to_string()))?;
        // Tag indices never expire on their own; they're pruned
        // entry-by-entry as tagged keys are deleted via clear_by_tag.
        self.backend.raw_put(&index_key, &serialized, i64::MAX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct MemBackend {
        entries: TokioMutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl CacheBackend for MemBackend {
        async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, BouncerError> {
            Ok(self.entries.lock().await.get(key).cloned())
        }
        async fn raw_put(&self, key: &str, value: &[u8], _ttl_secs: i64) -> Result<(), BouncerError> {
            self.entries.lock().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }
        async fn raw_delete(&self, key: &str) -> Result<(), BouncerError> {
            self.entries.lock().await.remove(key);
            Ok(())
        }
        async fn raw_clear(&self) -> Result<(), BouncerError> {
            self.entries.lock().await.clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn put_is_invisible_until_commit() {
        let store = CacheStore::new(Box::new(MemBackend::default()));
        store.put("ip_1.2.3.4", b"x".to_vec(), 60, vec![]).await.unwrap();
        assert!(!store.has("ip_1.2.3.4").await.unwrap());
        store.commit().await.unwrap();
        assert!(store.has("ip_1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn clear_by_tag_removes_only_tagged_entries() {
        let store = CacheStore::new(Box::new(MemBackend::default()));
        store
            .put("ip_1.2.3.4", b"a".to_vec(), 60, vec!["remediation".into()])
            .await
            .unwrap();
        store
            .put("geo_ip_1.2.3.4", b"b".to_vec(), 60, vec!["geolocation".into()])
            .await
            .unwrap();
        store.commit().await.unwrap();

        store.clear_by_tag("remediation").await.unwrap();

        assert!(!store.has("ip_1.2.3.4").await.unwrap());
        assert!(store.has("geo_ip_1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn oversize_entry_is_rejected() {
        let store = CacheStore::new(Box::new(MemBackend::default())).with_max_entry_bytes(4);
        let err = store.put("k", vec![0u8; 8], 60, vec![]).await.unwrap_err();
        assert!(matches!(err, BouncerError::Storage(_)));
    }
}
