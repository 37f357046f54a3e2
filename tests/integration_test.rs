//! Integration tests for owner-totals
//!
//! These tests verify end-to-end cache behavior across all components.

use owner_totals::backend::{CacheBackend, InMemoryBackend};
use owner_totals::config::TotalsConfig;
use owner_totals::events::{register_totals_listeners, EntityEvent, EventBus};
use owner_totals::observability::CounterMetrics;
use owner_totals::repository::InMemoryRepository;
use owner_totals::{EntityKind, Error, OwnedEntity, OwnerId, OwnerTotals, Result, TotalsService};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Test entities
struct Unidad {
    user_id: OwnerId,
}

impl OwnedEntity for Unidad {
    const KIND: EntityKind = EntityKind::Unit;

    fn owner_id(&self) -> OwnerId {
        self.user_id
    }
}

struct Receta {
    user_id: OwnerId,
}

impl OwnedEntity for Receta {
    const KIND: EntityKind = EntityKind::Recipe;

    fn owner_id(&self) -> OwnerId {
        self.user_id
    }
}

/// Backend that can be switched to fail every operation.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: InMemoryBackend,
    down: Arc<AtomicBool>,
}

impl FlakyBackend {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(Error::BackendError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set_add(key, member, ttl).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.check()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.set_members(key).await
    }
}

fn short_config() -> TotalsConfig {
    TotalsConfig::default().with_timeout(Duration::from_secs(1))
}

fn setup() -> (
    InMemoryRepository,
    TotalsService<InMemoryBackend, InMemoryRepository>,
    EventBus,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let repo = InMemoryRepository::new();
    let service = TotalsService::new(InMemoryBackend::new(), repo.clone(), short_config());
    let mut bus = EventBus::new();
    register_totals_listeners(&mut bus, &service);
    (repo, service, bus)
}

/// Test 1: End-to-End Dashboard Scenario
///
/// - Owner with {5, 10, 15} is cached
/// - Deleting a unit emits an event and invalidates the entry
/// - Next read recomputes {4, 10, 15}
#[tokio::test]
async fn test_end_to_end_delete_scenario() {
    let (repo, service, bus) = setup();
    repo.set_totals(1, OwnerTotals::new(5, 10, 15));

    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::new(5, 10, 15));

    let unidad = Unidad { user_id: 1 };
    repo.remove(EntityKind::Unit, unidad.owner_id());
    assert_eq!(bus.emit(&EntityEvent::deleted(&unidad)).await, 1);

    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::new(4, 10, 15));
}

/// Test 2: Recompute After Invalidation
///
/// The repository is queried once per kind on each miss, and not on hits.
#[tokio::test]
async fn test_recompute_after_invalidation() {
    let (repo, service, bus) = setup();
    repo.set_totals(1, OwnerTotals::new(1, 2, 3));

    service.get(1).await.unwrap();
    service.get(1).await.unwrap();
    assert_eq!(repo.count_queries(), 3);

    repo.add(EntityKind::Recipe, 1);
    bus.emit(&EntityEvent::created(&Receta { user_id: 1 })).await;

    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::new(1, 2, 4));
    assert_eq!(repo.count_queries(), 6);
}

/// Test 3: Idempotent Invalidation
#[tokio::test]
async fn test_invalidation_idempotent() {
    let (repo, service, _bus) = setup();
    repo.set_totals(1, OwnerTotals::new(1, 1, 1));
    service.get(1).await.unwrap();

    service.invalidate(Some(1)).await.unwrap();
    let after_first = service.cached_owners().await.unwrap();
    service.invalidate(Some(1)).await.unwrap();

    assert_eq!(service.cached_owners().await.unwrap(), after_first);
    assert!(after_first.is_empty());

    service.invalidate(None).await.unwrap();
    service.invalidate(None).await.unwrap();
}

/// Test 4: Zero Default
///
/// An owner with no entities, or no account at all, reads as zeros.
#[tokio::test]
async fn test_zero_default() {
    let (repo, service, _bus) = setup();
    repo.add_owner(7);

    assert_eq!(service.get(7).await.unwrap(), OwnerTotals::ZERO);
    assert_eq!(service.get(12345).await.unwrap(), OwnerTotals::ZERO);
    assert_eq!(
        serde_json::to_value(service.get(7).await.unwrap()).unwrap(),
        serde_json::json!({"unidades": 0, "productos": 0, "recetas": 0})
    );
}

/// Test 5: Index Consistency
///
/// {1, 2} -> invalidate 1 -> {2} -> bulk invalidate -> index key absent.
#[tokio::test]
async fn test_index_consistency() {
    let (_repo, service, _bus) = setup();

    service.get(1).await.unwrap();
    service.get(2).await.unwrap();
    assert_eq!(service.cached_owners().await.unwrap(), BTreeSet::from([1, 2]));

    service.invalidate(Some(1)).await.unwrap();
    assert_eq!(service.cached_owners().await.unwrap(), BTreeSet::from([2]));

    service.invalidate(None).await.unwrap();
    let backend = service.cache().backend();
    assert!(!backend.exists("all_users_with_totals").await.unwrap());
}

/// Test 6: Bulk Invalidation Forces Recompute For Every Owner
#[tokio::test]
async fn test_bulk_invalidation_recomputes_all() {
    let (repo, service, _bus) = setup();
    repo.set_totals(1, OwnerTotals::new(1, 0, 0));
    repo.set_totals(2, OwnerTotals::new(0, 2, 0));

    service.get(1).await.unwrap();
    service.get(2).await.unwrap();
    assert_eq!(repo.count_queries(), 6);

    repo.add(EntityKind::Unit, 1);
    repo.add(EntityKind::Product, 2);
    service.invalidate(None).await.unwrap();

    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::new(2, 0, 0));
    assert_eq!(service.get(2).await.unwrap(), OwnerTotals::new(0, 3, 0));
    assert_eq!(repo.count_queries(), 12);
}

/// Test 7: Events Only Touch The Named Owner
#[tokio::test]
async fn test_event_invalidates_only_owner() {
    let (repo, service, bus) = setup();
    service.get(1).await.unwrap();
    service.get(2).await.unwrap();

    repo.add(EntityKind::Unit, 2);
    bus.emit(&EntityEvent::created(&Unidad { user_id: 2 })).await;

    assert_eq!(service.cached_owners().await.unwrap(), BTreeSet::from([1]));
    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::ZERO);
    assert_eq!(service.get(2).await.unwrap(), OwnerTotals::new(1, 0, 0));
}

/// Test 8: Store Unavailable On Read
///
/// The computed value is returned and nothing propagates.
#[tokio::test]
async fn test_store_unavailable_on_read() {
    let repo = InMemoryRepository::new();
    repo.set_totals(1, OwnerTotals::new(5, 10, 15));
    let backend = FlakyBackend::default();
    let metrics = CounterMetrics::new();
    let service = TotalsService::with_metrics(
        backend.clone(),
        repo.clone(),
        short_config(),
        Box::new(metrics.clone()),
    );

    backend.set_down(true);
    assert_eq!(service.get(1).await.unwrap(), OwnerTotals::new(5, 10, 15));
    assert_eq!(service.dashboard_totals(1).await, OwnerTotals::new(5, 10, 15));
    assert!(metrics.snapshot().errors >= 2);

    backend.set_down(false);
    assert!(service.cached_owners().await.unwrap().is_empty());

    service.get(1).await.unwrap();
    assert_eq!(service.cached_owners().await.unwrap(), BTreeSet::from([1]));
}

/// Test 9: Store Unavailable On Invalidate
///
/// Listeners swallow the error; the entry expires with its timeout.
#[tokio::test]
async fn test_store_unavailable_on_invalidate() {
    let repo = InMemoryRepository::new();
    let backend = FlakyBackend::default();
    let service = TotalsService::new(backend.clone(), repo.clone(), short_config());
    let mut bus = EventBus::new();
    register_totals_listeners(&mut bus, &service);

    service.get(1).await.unwrap();

    backend.set_down(true);
    assert!(service.invalidate(Some(1)).await.is_err());
    assert_eq!(bus.emit(&EntityEvent::created(&Unidad { user_id: 1 })).await, 1);
    backend.set_down(false);

    assert_eq!(service.cached_owners().await.unwrap(), BTreeSet::from([1]));
}

/// Test 10: Entry Timeout Bounds Staleness
#[tokio::test]
async fn test_entry_timeout_bounds_staleness() {
    let repo = InMemoryRepository::new();
    let config = TotalsConfig::default().with_timeout(Duration::from_millis(200));
    let service = TotalsService::new(InMemoryBackend::new(), repo.clone(), config);

    service.get(3).await.unwrap();
    repo.add(EntityKind::Product, 3);
    assert_eq!(service.get(3).await.unwrap(), OwnerTotals::ZERO);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(service.get(3).await.unwrap(), OwnerTotals::new(0, 1, 0));
}

/// Test 11: Concurrent Reads Of Different Owners Keep Every Index Entry
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_index() {
    let (repo, service, _bus) = setup();
    for owner in 0..50 {
        repo.add(EntityKind::Unit, owner);
    }

    let mut handles = Vec::new();
    for owner in 0..50 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.get(owner).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), OwnerTotals::new(1, 0, 0));
    }

    assert_eq!(
        service.cached_owners().await.unwrap(),
        (0..50).collect::<BTreeSet<_>>()
    );
}
