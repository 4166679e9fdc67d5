//! Redis-backed cache store, using `redis::aio::ConnectionManager` for
//! transparent reconnect rather than a raw connection handle.

use cerberus_common::error::BouncerError;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::CacheBackend;

pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(dsn: &str) -> Result<Self, BouncerError> {
        let client = redis::Client::open(dsn)
            .map_err(|e| BouncerError::Config(format!("invalid redis_dsn: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BouncerError::Storage(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>, BouncerError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_put(&self, key: &str, value: &[u8], ttl_secs: i64) -> Result<(), BouncerError> {
        let mut conn = self.conn.clone();
        if ttl_secs == i64::MAX {
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| BouncerError::Storage(e.to_string()))
        } else {
            let ttl = ttl_secs.max(1) as u64;
            conn.set_ex::<_, _, ()>(key, value, ttl)
                .await
                .map_err(|e| BouncerError::Storage(e.to_string()))
        }
    }

    async fn raw_delete(&self, key: &str) -> Result<(), BouncerError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn raw_clear(&self) -> Result<(), BouncerError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))
    }
}
