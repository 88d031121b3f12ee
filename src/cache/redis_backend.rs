use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CacheError, CacheStore};

const OP_TIMEOUT: Duration = Duration::from_millis(500);

/// Redis-backed cache. Every operation is bounded by a short timeout so a
/// hung server degrades to cache misses instead of stalled requests.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = bounded(ConnectionManager::new(client)).await?;
        log::info!(target: "adminhub::cache", "Connected to Redis cache");
        Ok(Self { conn })
    }
}

async fn bounded<T, F>(op: F) -> Result<T, CacheError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(OP_TIMEOUT, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CacheError::Timeout),
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        bounded(conn.set_ex::<_, _, ()>(key, value, seconds)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        bounded(conn.del::<_, ()>(key)).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = bounded(redis::cmd("KEYS").arg(&pattern).query_async(&mut conn)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        bounded(conn.del::<_, u64>(keys)).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
