//! Entity repository traits for the relational store.
//!
//! The cache never talks to the database directly. It goes through two small
//! traits so any client (sqlx, tokio-postgres, Diesel, an ORM service) can be
//! plugged in, and tests can use [`InMemoryRepository`]:
//!
//! - [`TotalsRepository`]: per-owner counts and owner enumeration.
//! - [`SchemaProbe`]: whether the tables needed for counting exist yet.
//!
//! # Error Handling
//!
//! Return `Ok(0)` for an owner that does not exist; return `Err` only when the
//! store itself fails (connection lost, query timeout, missing table).

use crate::error::{Error, Result};
use crate::totals::{EntityKind, OwnerId, OwnerTotals};
use dashmap::{DashMap, DashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PgRepository;

/// Count queries over the owned entities.
pub trait TotalsRepository: Send + Sync {
    /// Number of entities of `kind` owned by `owner`.
    ///
    /// An unknown owner has zero entities; that is not an error.
    ///
    /// # Errors
    /// Returns `Err` if the data source is unavailable or the query fails
    fn count_owned(
        &self,
        kind: EntityKind,
        owner: OwnerId,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Every owner id known to the store, used by the bulk warm-up.
    ///
    /// # Errors
    /// Returns `Err` if the data source is unavailable or the query fails
    fn owner_ids(&self) -> impl Future<Output = Result<Vec<OwnerId>>> + Send;
}

/// Schema introspection used before warm-up.
pub trait SchemaProbe: Send + Sync {
    /// `Ok(true)` when every table in `tables` exists.
    ///
    /// # Errors
    /// Returns `Err` if introspection itself fails (transient connection
    /// error); the caller retries a bounded number of times.
    fn tables_exist(&self, tables: &[String]) -> impl Future<Output = Result<bool>> + Send;
}

// ============================================================================
// In-Memory Test Repository
// ============================================================================

#[derive(Default)]
struct Inner {
    counts: DashMap<OwnerId, OwnerTotals>,
    tables: DashSet<String>,
    failing_owners: DashSet<OwnerId>,
    schema_failures: AtomicU32,
    count_queries: AtomicU64,
    schema_checks: AtomicU64,
}

/// In-memory repository for tests and local development.
///
/// Clones share state, so a test can keep a handle, mutate counts after the
/// repository was handed to the cache, and assert on the number of queries
/// the cache issued.
///
/// ```
/// use owner_totals::repository::InMemoryRepository;
/// use owner_totals::{EntityKind, OwnerTotals};
///
/// let repo = InMemoryRepository::new();
/// repo.set_totals(1, OwnerTotals::new(5, 10, 15));
/// repo.remove(EntityKind::Unit, 1);
/// assert_eq!(repo.totals(1), OwnerTotals::new(4, 10, 15));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Inner>,
}

impl InMemoryRepository {
    /// Empty repository whose default tables already exist.
    pub fn new() -> Self {
        let repo = Self::without_schema();
        repo.migrate(crate::config::SchemaConfig::default().required_tables());
        repo
    }

    /// Empty repository with no tables, as before the first migration.
    pub fn without_schema() -> Self {
        InMemoryRepository::default()
    }

    /// Create tables.
    pub fn migrate<I, S>(&self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for table in tables {
            self.inner.tables.insert(table.into());
        }
    }

    /// Register an owner with no entities.
    pub fn add_owner(&self, owner: OwnerId) {
        self.inner.counts.entry(owner).or_default();
    }

    /// Replace all counts of an owner.
    pub fn set_totals(&self, owner: OwnerId, totals: OwnerTotals) {
        self.inner.counts.insert(owner, totals);
    }

    /// Current counts of an owner; zero for an unknown owner.
    pub fn totals(&self, owner: OwnerId) -> OwnerTotals {
        self.inner
            .counts
            .get(&owner)
            .map(|t| *t)
            .unwrap_or_default()
    }

    /// Record the creation of one entity.
    pub fn add(&self, kind: EntityKind, owner: OwnerId) {
        let mut totals = self.inner.counts.entry(owner).or_default();
        match kind {
            EntityKind::Unit => totals.unidades += 1,
            EntityKind::Product => totals.productos += 1,
            EntityKind::Recipe => totals.recetas += 1,
        }
    }

    /// Record the deletion of one entity. Counts never go below zero.
    pub fn remove(&self, kind: EntityKind, owner: OwnerId) {
        if let Some(mut totals) = self.inner.counts.get_mut(&owner) {
            let count = match kind {
                EntityKind::Unit => &mut totals.unidades,
                EntityKind::Product => &mut totals.productos,
                EntityKind::Recipe => &mut totals.recetas,
            };
            *count = count.saturating_sub(1);
        }
    }

    /// Make every count query for `owner` fail.
    pub fn fail_owner(&self, owner: OwnerId) {
        self.inner.failing_owners.insert(owner);
    }

    /// Make the next `times` schema checks fail.
    pub fn fail_schema_checks(&self, times: u32) {
        self.inner.schema_failures.store(times, Ordering::SeqCst);
    }

    /// Number of count queries served so far.
    pub fn count_queries(&self) -> u64 {
        self.inner.count_queries.load(Ordering::SeqCst)
    }

    /// Number of schema checks served so far, failed ones included.
    pub fn schema_checks(&self) -> u64 {
        self.inner.schema_checks.load(Ordering::SeqCst)
    }
}

impl TotalsRepository for InMemoryRepository {
    async fn count_owned(&self, kind: EntityKind, owner: OwnerId) -> Result<u64> {
        self.inner.count_queries.fetch_add(1, Ordering::SeqCst);

        if self.inner.failing_owners.contains(&owner) {
            return Err(Error::RepositoryError(format!(
                "count of {} for owner {} failed",
                kind, owner
            )));
        }

        Ok(self.totals(owner).count(kind))
    }

    async fn owner_ids(&self) -> Result<Vec<OwnerId>> {
        let mut ids: Vec<OwnerId> = self.inner.counts.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

impl SchemaProbe for InMemoryRepository {
    async fn tables_exist(&self, tables: &[String]) -> Result<bool> {
        self.inner.schema_checks.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .inner
            .schema_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::SchemaUnavailable(
                "connection reset during introspection".to_string(),
            ));
        }

        Ok(tables.iter().all(|t| self.inner.tables.contains(t)))
    }
}
