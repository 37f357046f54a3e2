//! Per-owner aggregate cache - main entry point for totals reads.
//!
//! Each owner's counts live under their own key with a fixed timeout. A read
//! that misses recomputes the three counts from the repository, stores them and
//! records the owner in the secondary index so a bulk invalidation can find
//! every live entry.
//!
//! Key-value store failures never fail a read: the cache degrades to computing
//! from the repository. Only repository failures are returned to the caller.

use crate::backend::CacheBackend;
use crate::config::TotalsConfig;
use crate::error::{Error, Result};
use crate::key::{index_member, parse_index_member, CacheKeys};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::repository::TotalsRepository;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::totals::{EntityKind, OwnerId, OwnerTotals};
use std::collections::BTreeSet;
use std::time::Instant;

/// Outcome of a bulk warm-up.
///
/// Owners that failed are listed with their error; they did not stop the
/// remaining owners from being cached.
#[derive(Debug, Default)]
pub struct WarmUpReport {
    /// Owners whose totals are now cached.
    pub warmed: usize,
    /// Owners whose totals could not be computed.
    pub failed: Vec<(OwnerId, Error)>,
}

impl WarmUpReport {
    /// True when no owner failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-owner totals cache over a key-value backend and a repository.
///
/// # Example
///
/// ```
/// use owner_totals::backend::InMemoryBackend;
/// use owner_totals::cache::OwnerTotalsCache;
/// use owner_totals::config::TotalsConfig;
/// use owner_totals::repository::InMemoryRepository;
/// use owner_totals::OwnerTotals;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> owner_totals::Result<()> {
/// let repo = InMemoryRepository::new();
/// repo.set_totals(1, OwnerTotals::new(5, 10, 15));
///
/// let cache = OwnerTotalsCache::new(InMemoryBackend::new(), repo, TotalsConfig::default());
/// assert_eq!(cache.get(1).await?, OwnerTotals::new(5, 10, 15));
///
/// cache.invalidate(Some(1)).await?;
/// # Ok(())
/// # }
/// ```
pub struct OwnerTotalsCache<B: CacheBackend, R: TotalsRepository> {
    backend: B,
    repository: R,
    keys: CacheKeys,
    config: TotalsConfig,
    metrics: Box<dyn CacheMetrics>,
}

impl<B: CacheBackend, R: TotalsRepository> OwnerTotalsCache<B, R> {
    /// Create a cache with unprefixed keys and no-op metrics.
    pub fn new(backend: B, repository: R, config: TotalsConfig) -> Self {
        OwnerTotalsCache {
            backend,
            repository,
            keys: CacheKeys::new(),
            config,
            metrics: Box::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use a namespaced key scheme.
    pub fn with_keys(mut self, keys: CacheKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn config(&self) -> &TotalsConfig {
        &self.config
    }

    /// Totals of `owner`, served from the cache or recomputed on a miss.
    ///
    /// An owner with no entities (or no account) gets [`OwnerTotals::ZERO`].
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the repository fails while recomputing.
    /// Key-value store failures are logged and the computed value is returned.
    pub async fn get(&self, owner: OwnerId) -> Result<OwnerTotals> {
        let timer = Instant::now();
        let key = self.keys.owner_totals(owner);

        match self.backend.get(&key).await {
            Ok(Some(bytes)) => match deserialize_from_cache::<OwnerTotals>(&bytes) {
                Ok(totals) => {
                    self.metrics.record_hit(&key, timer.elapsed());
                    return Ok(totals);
                }
                Err(e) if e.is_corrupt_entry() => {
                    warn!("Evicting unreadable entry {}: {}", key, e);
                    self.metrics.record_error(&key, &e.to_string());
                    if let Err(e) = self.backend.delete(&key).await {
                        warn!("Failed to evict {}: {}", key, e);
                    }
                }
                Err(e) => {
                    warn!("Could not decode {}, recomputing: {}", key, e);
                    self.metrics.record_error(&key, &e.to_string());
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("Cache read failed for {}, recomputing: {}", key, e);
                self.metrics.record_error(&key, &e.to_string());
            }
        }

        let totals = match self.compute_totals(owner).await {
            Ok(totals) => totals,
            Err(e) => {
                self.metrics.record_error(&key, &e.to_string());
                return Err(e);
            }
        };

        self.store(owner, &key, &totals).await;
        self.metrics.record_miss(&key, timer.elapsed());
        Ok(totals)
    }

    /// Write an entry and index it. Failures are logged, never returned.
    async fn store(&self, owner: OwnerId, key: &str, totals: &OwnerTotals) {
        let timer = Instant::now();
        let ttl = Some(self.config.timeout);

        let written = match serialize_for_cache(totals) {
            Ok(bytes) => self.backend.set(key, bytes, ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Failed to cache totals under {}: {}", key, e);
            self.metrics.record_error(key, &e.to_string());
            return;
        }
        self.metrics.record_set(key, timer.elapsed());

        let index = self.keys.owner_index();
        if let Err(e) = self.backend.set_add(&index, &index_member(owner), ttl).await {
            warn!("Failed to index owner {} in {}: {}", owner, index, e);
            self.metrics.record_error(&index, &e.to_string());
        }
    }

    /// Drop cached totals.
    ///
    /// `Some(owner)` removes that owner's entry and index membership. `None`
    /// removes every entry listed in the index, then the index itself.
    /// Invalidating something that is not cached is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the key-value store fails.
    pub async fn invalidate(&self, owner: Option<OwnerId>) -> Result<()> {
        let timer = Instant::now();
        let result = match owner {
            Some(owner) => self.invalidate_owner(owner).await,
            None => self.invalidate_all().await,
        };

        let label = match owner {
            Some(owner) => self.keys.owner_totals(owner),
            None => self.keys.owner_index(),
        };
        match &result {
            Ok(()) => self.metrics.record_delete(&label, timer.elapsed()),
            Err(e) => self.metrics.record_error(&label, &e.to_string()),
        }
        result
    }

    async fn invalidate_owner(&self, owner: OwnerId) -> Result<()> {
        let key = self.keys.owner_totals(owner);
        self.backend.delete(&key).await?;
        self.backend
            .set_remove(&self.keys.owner_index(), &index_member(owner))
            .await?;

        debug!("Invalidated totals of owner {}", owner);
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<()> {
        let index = self.keys.owner_index();
        let owners = self.indexed_owners(&index).await?;

        let keys: Vec<String> = owners.iter().map(|o| self.keys.owner_totals(*o)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.backend.mdelete(&key_refs).await?;
        self.backend.delete(&index).await?;

        info!("Invalidated cached totals of {} owners", keys.len());
        Ok(())
    }

    /// Count the three entity kinds owned by `owner`.
    ///
    /// The queries run concurrently and are not wrapped in a transaction.
    ///
    /// # Errors
    ///
    /// Returns the first repository error.
    pub async fn compute_totals(&self, owner: OwnerId) -> Result<OwnerTotals> {
        let (unidades, productos, recetas) = futures::try_join!(
            self.repository.count_owned(EntityKind::Unit, owner),
            self.repository.count_owned(EntityKind::Product, owner),
            self.repository.count_owned(EntityKind::Recipe, owner),
        )?;

        Ok(OwnerTotals::new(unidades, productos, recetas))
    }

    /// Populate the cache for `owners`, or for every owner the repository
    /// knows when `None`.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if owner enumeration fails. Per-owner failures are
    /// collected in the report.
    pub async fn warm_up(&self, owners: Option<Vec<OwnerId>>) -> Result<WarmUpReport> {
        let timer = Instant::now();
        let owners = match owners {
            Some(owners) => owners,
            None => self.repository.owner_ids().await?,
        };

        info!("» Warming totals cache for {} owners", owners.len());

        let mut report = WarmUpReport::default();
        for owner in owners {
            match self.get(owner).await {
                Ok(_) => report.warmed += 1,
                Err(e) => {
                    warn!("Warm-up failed for owner {}: {}", owner, e);
                    report.failed.push((owner, e));
                }
            }
        }

        info!(
            "✓ Warm-up finished: {} cached, {} failed in {:?}",
            report.warmed,
            report.failed.len(),
            timer.elapsed()
        );
        Ok(report)
    }

    /// Owners currently listed in the secondary index.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the index cannot be read.
    pub async fn cached_owners(&self) -> Result<BTreeSet<OwnerId>> {
        self.indexed_owners(&self.keys.owner_index()).await
    }

    async fn indexed_owners(&self, index: &str) -> Result<BTreeSet<OwnerId>> {
        let members = self.backend.set_members(index).await?;

        Ok(members
            .iter()
            .filter_map(|member| {
                let owner = parse_index_member(member);
                if owner.is_none() {
                    warn!("Skipping malformed member {:?} of {}", member, index);
                }
                owner
            })
            .collect())
    }

    /// Verify the key-value store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend is not accessible.
    pub async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }

    /// Whether a warm-up was triggered within the marker's lifetime.
    ///
    /// An unreadable marker counts as absent.
    pub(crate) async fn warmup_marker_set(&self) -> Result<bool> {
        let key = self.keys.warmup_marker();
        match self.backend.get(&key).await? {
            Some(bytes) => match deserialize_from_cache::<bool>(&bytes) {
                Ok(set) => Ok(set),
                Err(e) => {
                    warn!("Ignoring unreadable warm-up marker {}: {}", key, e);
                    Ok(false)
                }
            },
            None => Ok(false),
        }
    }

    /// Record that a warm-up was dispatched.
    pub(crate) async fn set_warmup_marker(&self) -> Result<()> {
        let timer = Instant::now();
        let key = self.keys.warmup_marker();
        let bytes = serialize_for_cache(&true)?;

        self.backend
            .set(&key, bytes, Some(self.config.warmup_marker_ttl))
            .await?;
        self.metrics.record_set(&key, timer.elapsed());
        Ok(())
    }
}
