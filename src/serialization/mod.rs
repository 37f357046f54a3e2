//! Postcard-based cache serialization with versioned envelopes.
//!
//! Every value this crate writes to the key-value store (per-owner totals, the
//! warm-up marker) is wrapped in the same envelope:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "OTOT"              u32                postcard::to_allocvec(T)
//! ```
//!
//! A read that fails validation is never trusted: the caller evicts the entry
//! and recomputes it from the repository.
//!
//! # Example
//!
//! ```rust
//! use owner_totals::serialization::{serialize_for_cache, deserialize_from_cache};
//! use owner_totals::OwnerTotals;
//!
//! # fn main() -> owner_totals::Result<()> {
//! let totals = OwnerTotals::new(5, 10, 15);
//! let bytes = serialize_for_cache(&totals)?;
//! let back: OwnerTotals = deserialize_from_cache(&bytes)?;
//! assert_eq!(totals, back);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for owner-totals entries: b"OTOT"
pub const CACHE_MAGIC: [u8; 4] = *b"OTOT";

/// Current schema version.
///
/// Increment when the layout of [`OwnerTotals`](crate::totals::OwnerTotals)
/// changes. Entries written by an older build are then evicted on first read.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for cache entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"OTOT"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The actual cached data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value from cache storage with validation.
///
/// # Errors
///
/// - `Error::DeserializationError`: Corrupted or truncated bytes
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totals::OwnerTotals;

    #[test]
    fn test_roundtrip() {
        let totals = OwnerTotals::new(5, 10, 15);
        let bytes = serialize_for_cache(&totals).unwrap();
        let back: OwnerTotals = deserialize_from_cache(&bytes).unwrap();
        assert_eq!(totals, back);
    }

    #[test]
    fn test_envelope_structure() {
        let bytes = serialize_for_cache(&true).unwrap();
        assert_eq!(&bytes[0..4], b"OTOT");

        let envelope: CacheEnvelope<bool> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(envelope.version, CURRENT_SCHEMA_VERSION);
        assert!(envelope.payload);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let envelope = CacheEnvelope {
            magic: *b"CKIT",
            version: CURRENT_SCHEMA_VERSION,
            payload: OwnerTotals::ZERO,
        };
        let bytes = postcard::to_allocvec(&envelope).unwrap();

        let result: Result<OwnerTotals> = deserialize_from_cache(&bytes);
        match result.unwrap_err() {
            Error::InvalidCacheEntry(_) => {}
            e => panic!("Expected InvalidCacheEntry, got {:?}", e),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = CacheEnvelope::new(OwnerTotals::new(1, 2, 3));
        envelope.version = 999;
        let bytes = postcard::to_allocvec(&envelope).unwrap();

        let result: Result<OwnerTotals> = deserialize_from_cache(&bytes);
        match result.unwrap_err() {
            Error::VersionMismatch { expected, found } => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            e => panic!("Expected VersionMismatch, got {:?}", e),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = serialize_for_cache(&OwnerTotals::new(500, 1000, 1500)).unwrap();
        let result: Result<OwnerTotals> = deserialize_from_cache(&bytes[..5]);
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }

    #[test]
    fn test_deterministic_serialization() {
        let a = serialize_for_cache(&OwnerTotals::new(3, 6, 9)).unwrap();
        let b = serialize_for_cache(&OwnerTotals::new(3, 6, 9)).unwrap();
        assert_eq!(a, b);
    }
}
