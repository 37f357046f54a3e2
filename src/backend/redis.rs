//! Redis cache backend implementation.
//!
//! The owner index maps onto a native Redis set: `SADD` + `EXPIRE` in one
//! `MULTI` block, `SREM`, `SMEMBERS`.

use super::CacheBackend;
use crate::error::{Error, Result};
use deadpool_redis::{
    redis::AsyncCommands, Config as PoolConfig, Connection, Pool, Runtime, Timeouts,
};
use std::time::Duration;

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Bound on waiting for, opening and recycling a pooled connection.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl RedisConfig {
    /// Build Redis connection string.
    pub fn connection_string(&self) -> String {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => format!(
                "redis://{}:{}@{}:{}/{}",
                username, password, self.host, self.port, self.database
            ),
            (None, Some(password)) => format!(
                "redis://default:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Pool sizing with `timeout` applied to wait, create and recycle, so an
/// unreachable server fails a command instead of hanging it.
fn pool_config(pool_size: u32, timeout: Duration) -> deadpool_redis::PoolConfig {
    let mut pool = deadpool_redis::PoolConfig::new(pool_size as usize);
    pool.timeouts = Timeouts {
        wait: Some(timeout),
        create: Some(timeout),
        recycle: Some(timeout),
    };
    pool
}

/// Whole seconds for `EX`/`EXPIRE`; Redis rejects a zero expiry.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Redis backend with connection pooling.
///
/// # Example
///
/// ```no_run
/// # use owner_totals::backend::{RedisBackend, RedisConfig, CacheBackend};
/// # use owner_totals::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default()).await?;
///
/// backend.set_add("all_users_with_totals", "1", None).await?;
/// let owners = backend.set_members("all_users_with_totals").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Create new Redis backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = Self::build_pool(
            &config.connection_string(),
            config.pool_size,
            config.connection_timeout,
        )?;

        info!(
            "✓ Redis backend initialized: {}:{} (timeout: {:?})",
            config.host, config.port, config.connection_timeout
        );

        Ok(RedisBackend { pool })
    }

    /// Create from connection string directly.
    ///
    /// Pool size comes from `REDIS_POOL_SIZE` when set, else 16. Connection
    /// timeouts use the 5 second default.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn from_connection_string(conn_str: &str) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let pool = Self::build_pool(conn_str, pool_size, DEFAULT_CONNECTION_TIMEOUT)?;

        info!(
            "✓ Redis backend initialized from connection string (pool size: {})",
            pool_size
        );

        Ok(RedisBackend { pool })
    }

    fn build_pool(conn_str: &str, pool_size: u32, timeout: Duration) -> Result<Pool> {
        let mut cfg = PoolConfig::from_url(conn_str);
        cfg.pool = Some(pool_config(pool_size, timeout));

        cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::BackendError(format!("Failed to create Redis pool: {}", e)))
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        match ttl {
            Some(duration) => {
                let seconds = expiry_secs(duration);
                conn.set_ex::<_, _, ()>(key, value, seconds)
                    .await
                    .map_err(|e| {
                        Error::BackendError(format!("Redis SET_EX failed for key {}: {}", key, e))
                    })?;
                debug!("✓ Redis SET {} (TTL: {}s)", key, seconds);
            }
            None => {
                conn.set::<_, _, ()>(key, value).await.map_err(|e| {
                    Error::BackendError(format!("Redis SET failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {}", key);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e)))?;

        debug!("✓ Redis DELETE {}", key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut pipe = deadpool_redis::redis::pipe();
        pipe.atomic().sadd(key, member).ignore();
        match ttl {
            Some(duration) => {
                let seconds = i64::try_from(expiry_secs(duration)).unwrap_or(i64::MAX);
                pipe.expire(key, seconds).ignore();
            }
            None => {
                pipe.persist(key).ignore();
            }
        }

        pipe.query_async::<()>(&mut *conn).await.map_err(|e| {
            Error::BackendError(format!("Redis SADD failed for key {}: {}", key, e))
        })?;

        debug!("✓ Redis SADD {} {}", key, member);
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.srem::<_, _, ()>(key, member).await.map_err(|e| {
            Error::BackendError(format!("Redis SREM failed for key {}: {}", key, e))
        })?;

        debug!("✓ Redis SREM {} {}", key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;

        let members: Vec<String> = conn.smembers(key).await.map_err(|e| {
            Error::BackendError(format!("Redis SMEMBERS failed for key {}: {}", key, e))
        })?;

        debug!("✓ Redis SMEMBERS {} -> {} members", key, members.len());
        Ok(members)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        let exists: bool = conn.exists(key).await.map_err(|e| {
            Error::BackendError(format!("Redis EXISTS failed for key {}: {}", key, e))
        })?;

        Ok(exists)
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;

        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL (bulk) failed: {}", e)))?;

        debug!("✓ Redis MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong.contains("PONG"))
    }
}
