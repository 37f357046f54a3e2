//! Cache key scheme.
//!
//! All keys the crate reads or writes are produced here and nowhere else:
//!
//! | Key | Holds |
//! |-----|-------|
//! | `user_totals_<owner>` | envelope-encoded [`OwnerTotals`](crate::totals::OwnerTotals) |
//! | `all_users_with_totals` | set of owner ids with a live entry |
//! | `totales_precargados` | warm-up marker |
//!
//! An optional namespace is prepended as `"{namespace}:"` when several
//! deployments share one store.

use crate::totals::OwnerId;

const OWNER_TOTALS_PREFIX: &str = "user_totals_";
const OWNER_INDEX_KEY: &str = "all_users_with_totals";
const WARMUP_MARKER_KEY: &str = "totales_precargados";

/// Builder for the cache keys of one deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: Option<String>,
}

impl CacheKeys {
    /// Keys without a namespace.
    pub fn new() -> Self {
        CacheKeys { namespace: None }
    }

    /// Keys under `namespace`. An empty namespace is the same as none.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        CacheKeys {
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }

    fn build(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    /// Key of one owner's totals entry.
    pub fn owner_totals(&self, owner: OwnerId) -> String {
        self.build(&format!("{}{}", OWNER_TOTALS_PREFIX, owner))
    }

    /// Key of the secondary index set.
    pub fn owner_index(&self) -> String {
        self.build(OWNER_INDEX_KEY)
    }

    /// Key of the warm-up marker.
    pub fn warmup_marker(&self) -> String {
        self.build(WARMUP_MARKER_KEY)
    }
}

/// Encode an owner id as a secondary index member.
pub(crate) fn index_member(owner: OwnerId) -> String {
    owner.to_string()
}

/// Decode a secondary index member.
pub(crate) fn parse_index_member(member: &str) -> Option<OwnerId> {
    member.parse().ok()
}
