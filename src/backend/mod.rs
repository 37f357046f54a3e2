//! Key-value store backends.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisConfig};

/// Trait for the shared key-value store holding cached totals.
///
/// All methods take `&self`; implementations use interior mutability or an
/// external store. Every returned future is `Send` so cache operations can run
/// inside `tokio::spawn`.
///
/// Besides plain byte values the store must offer a native set type. The
/// owner index is maintained only through [`set_add`](Self::set_add) and
/// [`set_remove`](Self::set_remove), each a single atomic operation on one
/// key, so concurrent writers never lose each other's updates.
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve a value by key. `Ok(None)` is a miss.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store a value, replacing any previous one. `ttl = None` never expires.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically add `member` to the set at `key`, creating it if needed, and
    /// reset the set's expiry to `ttl`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs or `key` holds a non-set value
    fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically remove `member` from the set at `key`. Absent key or member
    /// is a no-op.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs or `key` holds a non-set value
    fn set_remove(&self, key: &str, member: &str) -> impl Future<Output = Result<()>> + Send;

    /// Members of the set at `key`; empty when the key is absent.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs or `key` holds a non-set value
    fn set_members(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Check if key exists in cache.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Bulk delete. Default implementation calls `delete()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn mdelete(&self, keys: &[&str]) -> impl Future<Output = Result<()>> + Send {
        async move {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        }
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}
