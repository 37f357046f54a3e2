//! High-level totals service for web applications.
//!
//! Provides a convenient wrapper around [`OwnerTotalsCache`] with Arc for easy
//! sharing between request handlers, event listeners and the warm-up task.

use crate::backend::CacheBackend;
use crate::cache::{OwnerTotalsCache, WarmUpReport};
use crate::config::TotalsConfig;
use crate::error::Result;
use crate::observability::CacheMetrics;
use crate::repository::TotalsRepository;
use crate::totals::{OwnerId, OwnerTotals};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared handle to one [`OwnerTotalsCache`].
///
/// Backends use interior mutability and every cache operation takes `&self`,
/// so the cache is wrapped in `Arc` without an additional `Mutex`. Cloning is
/// an `Arc` increment.
///
/// # Example
///
/// ```
/// use owner_totals::backend::InMemoryBackend;
/// use owner_totals::config::TotalsConfig;
/// use owner_totals::repository::InMemoryRepository;
/// use owner_totals::{OwnerTotals, TotalsService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let repo = InMemoryRepository::new();
/// repo.set_totals(1, OwnerTotals::new(5, 10, 15));
///
/// let service = TotalsService::new(InMemoryBackend::new(), repo, TotalsConfig::default());
/// let handler_copy = service.clone();
///
/// assert_eq!(handler_copy.dashboard_totals(1).await, OwnerTotals::new(5, 10, 15));
/// # }
/// ```
pub struct TotalsService<B: CacheBackend, R: TotalsRepository> {
    cache: Arc<OwnerTotalsCache<B, R>>,
}

impl<B: CacheBackend, R: TotalsRepository> Clone for TotalsService<B, R> {
    fn clone(&self) -> Self {
        TotalsService {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<B: CacheBackend, R: TotalsRepository> TotalsService<B, R> {
    /// Create a new service with the given backend and repository.
    pub fn new(backend: B, repository: R, config: TotalsConfig) -> Self {
        Self::from_cache(OwnerTotalsCache::new(backend, repository, config))
    }

    /// Create a new service with custom metrics.
    pub fn with_metrics(
        backend: B,
        repository: R,
        config: TotalsConfig,
        metrics: Box<dyn CacheMetrics>,
    ) -> Self {
        Self::from_cache(OwnerTotalsCache::new(backend, repository, config).with_metrics(metrics))
    }

    /// Wrap an already configured cache.
    pub fn from_cache(cache: OwnerTotalsCache<B, R>) -> Self {
        TotalsService {
            cache: Arc::new(cache),
        }
    }

    /// See [`OwnerTotalsCache::get`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the repository fails on a miss.
    pub async fn get(&self, owner: OwnerId) -> Result<OwnerTotals> {
        self.cache.get(owner).await
    }

    /// Totals for the dashboard.
    ///
    /// Never fails: a repository error is logged and the dashboard shows zero
    /// totals until the next successful read.
    pub async fn dashboard_totals(&self, owner: OwnerId) -> OwnerTotals {
        match self.cache.get(owner).await {
            Ok(totals) => totals,
            Err(e) => {
                error!("Dashboard totals unavailable for owner {}: {}", owner, e);
                OwnerTotals::ZERO
            }
        }
    }

    /// See [`OwnerTotalsCache::invalidate`].
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the key-value store fails.
    pub async fn invalidate(&self, owner: Option<OwnerId>) -> Result<()> {
        self.cache.invalidate(owner).await
    }

    /// See [`OwnerTotalsCache::warm_up`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if owner enumeration fails.
    pub async fn warm_up(&self, owners: Option<Vec<OwnerId>>) -> Result<WarmUpReport> {
        self.cache.warm_up(owners).await
    }

    /// See [`OwnerTotalsCache::cached_owners`].
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the index cannot be read.
    pub async fn cached_owners(&self) -> Result<BTreeSet<OwnerId>> {
        self.cache.cached_owners().await
    }

    /// Get a reference to the underlying cache.
    pub fn cache(&self) -> &OwnerTotalsCache<B, R> {
        &self.cache
    }
}
