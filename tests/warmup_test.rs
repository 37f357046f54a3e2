//! Warm-up gating tests
//!
//! Verifies the marker, schema verification and dispatch rules of
//! `WarmUpCoordinator`.

use owner_totals::backend::{CacheBackend, InMemoryBackend};
use owner_totals::config::TotalsConfig;
use owner_totals::repository::InMemoryRepository;
use owner_totals::warmup::{DeferReason, SkipReason, WarmUpCoordinator, WarmUpOutcome, WarmUpState};
use owner_totals::{EntityKind, OwnerId, OwnerTotals, TotalsRepository, TotalsService};
use std::collections::BTreeSet;
use std::time::Duration;

type Coordinator = WarmUpCoordinator<InMemoryBackend, InMemoryRepository, InMemoryRepository>;

fn setup(repo: &InMemoryRepository) -> (InMemoryBackend, Coordinator) {
    let _ = env_logger::builder().is_test(true).try_init();

    let backend = InMemoryBackend::new();
    let service = TotalsService::new(backend.clone(), repo.clone(), TotalsConfig::default());
    (backend, WarmUpCoordinator::new(service, repo.clone()))
}

async fn finish(outcome: WarmUpOutcome) -> owner_totals::WarmUpReport {
    match outcome {
        WarmUpOutcome::Dispatched(handle) => handle
            .await
            .expect("warm-up task panicked")
            .expect("warm-up failed"),
        other => panic!("expected dispatch, got {:?}", other),
    }
}

/// Test 1: Marker Set Means Zero Recomputation
#[tokio::test]
async fn test_marker_set_skips_warm_up() {
    let repo = InMemoryRepository::new();
    repo.set_totals(1, OwnerTotals::new(1, 1, 1));
    let (_backend, coordinator) = setup(&repo);

    finish(coordinator.on_startup().await).await;
    let queries = repo.count_queries();
    let checks = repo.schema_checks();

    let outcome = coordinator.on_startup().await;

    assert!(matches!(outcome, WarmUpOutcome::Skipped(SkipReason::MarkerSet)));
    assert_eq!(repo.count_queries(), queries);
    assert_eq!(repo.schema_checks(), checks);
}

/// Test 2: Marker Absent And Tables Present Dispatches Exactly Once
#[tokio::test]
async fn test_dispatch_sets_marker_and_warms_all() {
    let repo = InMemoryRepository::new();
    for owner in 1..=3 {
        repo.set_totals(owner, OwnerTotals::new(owner as u64, 0, 0));
    }
    let (backend, coordinator) = setup(&repo);

    let report = finish(coordinator.on_startup().await).await;

    assert_eq!(report.warmed, 3);
    assert!(report.is_complete());
    assert!(backend.exists("totales_precargados").await.unwrap());
    assert_eq!(coordinator.state(), WarmUpState::Warmed);
    assert_eq!(
        coordinator.service().cached_owners().await.unwrap(),
        BTreeSet::from([1, 2, 3])
    );
    assert_eq!(repo.count_queries(), 9);
}

/// Test 3: Fresh Database, Then Migration
///
/// Startup defers; the post-migration hook dispatches.
#[tokio::test]
async fn test_post_migration_dispatch() {
    let repo = InMemoryRepository::without_schema();
    let (backend, coordinator) = setup(&repo);

    let outcome = coordinator.on_startup().await;
    assert!(matches!(
        outcome,
        WarmUpOutcome::Deferred(DeferReason::SchemaMissing)
    ));
    assert!(!backend.exists("totales_precargados").await.unwrap());

    repo.migrate(TotalsConfig::default().schema.required_tables());
    repo.add_owner(10);

    let report = finish(coordinator.on_migrated().await).await;
    assert_eq!(report.warmed, 1);
    assert!(backend.exists("totales_precargados").await.unwrap());
}

/// Test 4: Verification Retries Are Bounded
#[tokio::test]
async fn test_verification_failed_after_three_attempts() {
    let repo = InMemoryRepository::new();
    repo.fail_schema_checks(3);
    let (backend, coordinator) = setup(&repo);

    let outcome = coordinator.on_startup().await;

    assert!(matches!(
        outcome,
        WarmUpOutcome::Deferred(DeferReason::VerificationFailed)
    ));
    assert_eq!(repo.schema_checks(), 3);
    assert_eq!(coordinator.state(), WarmUpState::Unverified);
    assert!(!backend.exists("totales_precargados").await.unwrap());
}

/// Test 5: Transient Verification Failure Recovers Within The Bound
#[tokio::test]
async fn test_verification_recovers_on_last_attempt() {
    let repo = InMemoryRepository::new();
    repo.fail_schema_checks(2);
    let (_backend, coordinator) = setup(&repo);

    let outcome = coordinator.on_startup().await;

    assert!(outcome.is_dispatched());
    assert_eq!(repo.schema_checks(), 3);
    finish(outcome).await;
}

/// Test 6: Configured Attempt Count
#[tokio::test]
async fn test_configured_schema_attempts() {
    let repo = InMemoryRepository::new();
    repo.fail_schema_checks(1);
    let service = TotalsService::new(
        InMemoryBackend::new(),
        repo.clone(),
        TotalsConfig::default().with_schema_attempts(1),
    );
    let coordinator = WarmUpCoordinator::new(service, repo.clone());

    assert!(matches!(
        coordinator.on_startup().await,
        WarmUpOutcome::Deferred(DeferReason::VerificationFailed)
    ));
    assert_eq!(repo.schema_checks(), 1);
}

/// Test 7: Marker Shared Between Processes
///
/// A second coordinator on the same store (another worker process) skips.
#[tokio::test]
async fn test_marker_shared_between_coordinators() {
    let repo = InMemoryRepository::new();
    let (backend, first) = setup(&repo);
    finish(first.on_startup().await).await;

    let other = WarmUpCoordinator::new(
        TotalsService::new(backend.clone(), repo.clone(), TotalsConfig::default()),
        repo.clone(),
    );

    assert!(matches!(
        other.on_startup().await,
        WarmUpOutcome::Skipped(SkipReason::MarkerSet)
    ));
    assert_eq!(other.state(), WarmUpState::Unverified);
}

/// Test 8: Failing Owners Do Not Stop The Warm-Up
#[tokio::test]
async fn test_warm_up_isolates_owner_failures() {
    let repo = InMemoryRepository::new();
    for owner in 1..=4 {
        repo.add_owner(owner);
    }
    repo.fail_owner(3);
    let (_backend, coordinator) = setup(&repo);

    let report = finish(coordinator.on_startup().await).await;

    assert_eq!(report.warmed, 3);
    assert_eq!(
        report.failed.iter().map(|(owner, _)| *owner).collect::<Vec<_>>(),
        vec![3]
    );
    assert_eq!(coordinator.state(), WarmUpState::Warmed);
}

/// Repository whose owner enumeration panics.
#[derive(Clone)]
struct PanickingRepository;

impl TotalsRepository for PanickingRepository {
    async fn count_owned(&self, _kind: EntityKind, _owner: OwnerId) -> owner_totals::Result<u64> {
        Ok(0)
    }

    async fn owner_ids(&self) -> owner_totals::Result<Vec<OwnerId>> {
        panic!("owner enumeration blew up");
    }
}

/// Test 9: A Panicking Warm-Up Task Does Not Block Later Triggers
#[tokio::test]
async fn test_panicked_warm_up_allows_retrigger() {
    let _ = env_logger::builder().is_test(true).try_init();

    let schema = InMemoryRepository::new();
    let config = TotalsConfig::default().with_marker_ttl(Duration::from_millis(50));
    let service = TotalsService::new(InMemoryBackend::new(), PanickingRepository, config);
    let coordinator = WarmUpCoordinator::new(service, schema);

    match coordinator.on_startup().await {
        WarmUpOutcome::Dispatched(handle) => {
            let joined = handle.await;
            assert!(joined.is_err_and(|e| e.is_panic()));
        }
        other => panic!("expected dispatch, got {:?}", other),
    }
    assert_eq!(coordinator.state(), WarmUpState::Unverified);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(coordinator.on_migrated().await.is_dispatched());
}
