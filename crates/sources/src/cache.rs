//! Durable key-value cache backends

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use tokenagg_core::{CacheError, CacheResult};

/// Key-value store with per-entry expiry
#[async_trait]
pub trait DurableCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
    fn name(&self) -> &'static str;
}

/// Redis-backed cache sharing one auto-reconnecting connection
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(unavailable)?;

        info!("Redis connected");
        Ok(Self { conn })
    }
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl DurableCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);
        let (): () = conn.set_ex(key, value, ttl_secs).await.map_err(unavailable)?;
        debug!("Cache set {} (ttl {}s)", key, ttl_secs);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let (): () = conn.del(key).await.map_err(unavailable)?;
        debug!("Cache deleted {}", key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Process-local cache, used when no Redis is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.value().1 > now => return Ok(Some(entry.value().0.clone())),
            Some(_) => None,
            None => return Ok(None),
        };

        // Expired, drop it outside the read guard
        self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
