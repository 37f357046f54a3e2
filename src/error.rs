//! Error types for the totals cache.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the totals cache.
///
/// Most of these never reach a dashboard caller: store failures are logged and
/// swallowed by [`OwnerTotalsCache::get`](crate::cache::OwnerTotalsCache::get),
/// and listeners log invalidation failures instead of returning them.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when encoding a value for the cache.
    SerializationError(String),

    /// Deserialization failed when decoding bytes read from the cache.
    ///
    /// **Recovery:** the entry is evicted and recomputed on the next read.
    DeserializationError(String),

    /// Envelope magic did not match; the key holds foreign or corrupted data.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// Expected after a deploy that changes [`OwnerTotals`](crate::totals::OwnerTotals).
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Key-value store error (Redis connection lost, timeout, etc).
    BackendError(String),

    /// Relational store error while counting or enumerating owners.
    RepositoryError(String),

    /// Schema introspection failed; the required tables could not be checked.
    SchemaUnavailable(String),

    /// Invalid configuration value.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::SchemaUnavailable(msg) => write!(f, "Schema unavailable: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// True for errors raised while decoding a stored value.
    ///
    /// [`OwnerTotalsCache::get`](crate::cache::OwnerTotalsCache::get) evicts
    /// an entry only when decoding it fails this way.
    pub fn is_corrupt_entry(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::RepositoryError(format!("SQL error: {}", e))
    }
}
