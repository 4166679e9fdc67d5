//! Memcached-backed Cache Store.
//!
//! The `memcache` crate is sync-only, so every call is wrapped in
//! `spawn_blocking` to keep blocking socket I/O off the async
//! runtime's worker threads. Every `memcache::MemcacheError` is
//! converted to `BouncerError::Storage` at the call site via a
//! mandatory `.map_err` on each blocking call rather than propagated
//! raw.

use cerberus_common::error::BouncerError;

use super::CacheBackend;

pub struct MemcachedBackend {
    client: std::sync::Arc<memcache::Client>,
}

impl MemcachedBackend {
    pub fn connect(dsn: &str) -> Result<Self, BouncerError> {
        let client = memcache::Client::connect(dsn)
            .map_err(|e| BouncerError::Storage(format!("memcached connect failed: {e}")))?;
        Ok(Self {
            client: std::sync::Arc::new(client),
        })
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemcachedBackend {
    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, BouncerError> {
        let client = self.client.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || client.get::<Vec<u8>>(&key))
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))?
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_put(&self, key: &str, value: &[u8], ttl_secs: i64) -> Result<(), BouncerError> {
        let client = self.client.clone();
        let key = key.to_string();
        let value = value.to_vec();
        // memcached expiration is a u32 of seconds; cap a "forever" TTL
        // at 0, which memcached treats as never-expire.
        let expiration = if ttl_secs == i64::MAX {
            0u32
        } else {
            ttl_secs.max(1) as u32
        };
        tokio::task::spawn_blocking(move || client.set(&key, value.as_slice(), expiration))
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))?
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_delete(&self, key: &str) -> Result<(), BouncerError> {
        let client = self.client.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || client.delete(&key))
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))?
            .map(|_| ())
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_clear(&self) -> Result<(), BouncerError> {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || client.flush())
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))?
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }
}
