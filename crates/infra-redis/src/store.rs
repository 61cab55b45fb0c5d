// Redis StateStore implementation
//
// One multiplexed connection behind a ConnectionManager; every operation
// clones the handle, so the scheduler never holds a connection across ticks.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use farmhand_core::error::{AppError, Result};
use farmhand_core::port::StateStore;

fn map_redis_error(err: redis::RedisError) -> AppError {
    AppError::StoreUnavailable(format!("{}: {}", err.category(), err))
}

pub struct RedisStateStore {
    manager: ConnectionManager,
}

impl RedisStateStore {
    /// Connect to `redis://host:port/db`. The manager reconnects on its own
    /// after transient failures; individual operations surface
    /// `StoreUnavailable` in the meantime.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        info!(url, "Connected to redis state store");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn put(&self, key: &str, value: &str, ttl_ms: Option<i64>) -> Result<()> {
        let mut conn = self.conn();
        match ttl_ms {
            Some(ttl) => {
                let _: () = conn
                    .pset_ex(key, value, ttl.max(1) as u64)
                    .await
                    .map_err(map_redis_error)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(map_redis_error)?;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let pattern = format!("{}*", prefix);
        let mut keys = Vec::new();
        let mut iter = conn
            .scan_match::<_, String>(&pattern)
            .await
            .map_err(map_redis_error)?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }

    async fn list_push_tail(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.rpush(key, value).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn list_pop_head(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.lpop(key, None).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn list_len(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn();
        let len: i64 = conn.llen(key).await.map_err(map_redis_error)?;
        Ok(len)
    }

    async fn list_snapshot(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let values: Vec<String> = conn
            .lrange(key, 0, -1)
            .await
            .map_err(map_redis_error)?;
        Ok(values)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}
