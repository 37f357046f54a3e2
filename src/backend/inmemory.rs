//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding. Set operations
//! run under the shard lock of their key, which makes them atomic.
//! Expired entries are dropped lazily on access.

use super::CacheBackend;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

enum StoredValue {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

impl StoredValue {
    fn len(&self) -> usize {
        match self {
            StoredValue::Bytes(data) => data.len(),
            StoredValue::Set(members) => members.iter().map(String::len).sum(),
        }
    }
}

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

fn wrong_type(key: &str) -> Error {
    Error::BackendError(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same store, so a clone handed to the cache and one kept
/// by a test observe the same keys.
///
/// # Example
///
/// ```no_run
/// use owner_totals::backend::{InMemoryBackend, CacheBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("key1", b"value".to_vec(), Some(Duration::from_secs(300))).await?;
///     assert!(backend.get("key1").await?.is_some());
///
///     backend.set_add("owners", "1", None).await?;
///     assert_eq!(backend.set_members("owners").await?, vec!["1".to_string()]);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Get the current number of entries in cache, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get memory statistics.
    pub async fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.value.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                return match &entry.value {
                    StoredValue::Bytes(data) => {
                        debug!("✓ InMemory GET {} -> HIT", key);
                        Ok(Some(data.clone()))
                    }
                    StoredValue::Set(_) => Err(wrong_type(key)),
                };
            }
        }

        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(StoredValue::Bytes(value), ttl);
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(StoredValue::Set(HashSet::new()), ttl));

        if entry.is_expired() {
            *entry = CacheEntry::new(StoredValue::Set(HashSet::new()), ttl);
        }

        match &mut entry.value {
            StoredValue::Set(members) => {
                members.insert(member.to_string());
            }
            StoredValue::Bytes(_) => return Err(wrong_type(key)),
        }
        entry.expires_at = ttl.map(|d| Instant::now() + d);

        debug!("✓ InMemory SADD {} {}", key, member);
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        if let Some(mut entry) = self.store.get_mut(key) {
            match &mut entry.value {
                StoredValue::Set(members) => {
                    members.remove(member);
                }
                StoredValue::Bytes(_) => return Err(wrong_type(key)),
            }
        }

        // Redis drops a set once its last member is removed.
        self.store.remove_if(key, |_, entry| {
            matches!(&entry.value, StoredValue::Set(members) if members.is_empty())
        });

        debug!("✓ InMemory SREM {} {}", key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                return match &entry.value {
                    StoredValue::Set(members) => Ok(members.iter().cloned().collect()),
                    StoredValue::Bytes(_) => Err(wrong_type(key)),
                };
            }
        }

        self.store.remove_if(key, |_, entry| entry.is_expired());
        Ok(Vec::new())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.store.get(key) {
            return Ok(!entry.is_expired());
        }

        Ok(false)
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.store.remove(*key);
        }

        debug!("✓ InMemory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}
