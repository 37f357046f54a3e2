//! Cache warm-up at process start and after schema migrations.
//!
//! Warm-up must not run before the counted tables exist: on a fresh database
//! the process starts before the first migration. Each trigger therefore
//! checks, in order:
//!
//! 1. a warm-up already in flight in this process ([`SkipReason::InFlight`]),
//! 2. the shared warm-up marker ([`SkipReason::MarkerSet`]),
//! 3. the required tables, with a bounded number of attempts.
//!
//! Only when all pass is [`OwnerTotalsCache::warm_up`] spawned on the current
//! tokio runtime and the marker set, so other processes and later triggers
//! skip it for the marker's lifetime.
//!
//! [`OwnerTotalsCache::warm_up`]: crate::cache::OwnerTotalsCache::warm_up

use crate::backend::CacheBackend;
use crate::cache::WarmUpReport;
use crate::error::Result;
use crate::repository::{SchemaProbe, TotalsRepository};
use crate::service::TotalsService;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Warm-up progress within one process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WarmUpState {
    /// Tables not yet verified, or the last warm-up could not enumerate owners.
    Unverified = 0,
    /// Tables verified and a warm-up task is running.
    VerifiedPendingWarmup = 1,
    /// The last warm-up task completed.
    Warmed = 2,
}

impl WarmUpState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WarmUpState::VerifiedPendingWarmup,
            2 => WarmUpState::Warmed,
            _ => WarmUpState::Unverified,
        }
    }
}

/// Resets the state to `Unverified` when the warm-up task ends without
/// reporting an outcome (panic or cancellation).
struct StateGuard {
    state: Arc<AtomicU8>,
    finished: bool,
}

impl StateGuard {
    fn new(state: Arc<AtomicU8>) -> Self {
        StateGuard {
            state,
            finished: false,
        }
    }

    fn finish(&mut self, next: WarmUpState) {
        self.state.store(next as u8, Ordering::SeqCst);
        self.finished = true;
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Warm-up task aborted, state reset");
            self.state
                .store(WarmUpState::Unverified as u8, Ordering::SeqCst);
        }
    }
}

/// What caused a trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarmUpHook {
    Startup,
    PostMigration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// This process is already warming the cache.
    InFlight,
    /// A warm-up was triggered recently, possibly by another process.
    MarkerSet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferReason {
    /// Every schema check attempt failed.
    VerificationFailed,
    /// The required tables do not exist yet.
    SchemaMissing,
    /// Not called from within a tokio runtime.
    NoRuntime,
}

/// Result of one trigger.
#[derive(Debug)]
pub enum WarmUpOutcome {
    Skipped(SkipReason),
    Deferred(DeferReason),
    /// Warm-up is running in the background.
    Dispatched(JoinHandle<Result<WarmUpReport>>),
}

impl WarmUpOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, WarmUpOutcome::Dispatched(_))
    }
}

/// Decides when the totals cache is warmed.
///
/// # Example
///
/// ```
/// use owner_totals::backend::InMemoryBackend;
/// use owner_totals::config::TotalsConfig;
/// use owner_totals::repository::InMemoryRepository;
/// use owner_totals::warmup::{WarmUpCoordinator, WarmUpOutcome};
/// use owner_totals::TotalsService;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let repo = InMemoryRepository::new();
/// repo.add_owner(1);
///
/// let service = TotalsService::new(InMemoryBackend::new(), repo.clone(), TotalsConfig::default());
/// let coordinator = WarmUpCoordinator::new(service, repo);
///
/// if let WarmUpOutcome::Dispatched(handle) = coordinator.on_startup().await {
///     let report = handle.await.unwrap().unwrap();
///     assert_eq!(report.warmed, 1);
/// }
/// # }
/// ```
pub struct WarmUpCoordinator<B: CacheBackend, R: TotalsRepository, S: SchemaProbe> {
    service: TotalsService<B, R>,
    probe: S,
    state: Arc<AtomicU8>,
}

impl<B, R, S> WarmUpCoordinator<B, R, S>
where
    B: CacheBackend + 'static,
    R: TotalsRepository + 'static,
    S: SchemaProbe,
{
    pub fn new(service: TotalsService<B, R>, probe: S) -> Self {
        WarmUpCoordinator {
            service,
            probe,
            state: Arc::new(AtomicU8::new(WarmUpState::Unverified as u8)),
        }
    }

    pub fn state(&self) -> WarmUpState {
        WarmUpState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn service(&self) -> &TotalsService<B, R> {
        &self.service
    }

    /// Trigger from process start.
    pub async fn on_startup(&self) -> WarmUpOutcome {
        self.trigger(WarmUpHook::Startup).await
    }

    /// Trigger after a schema migration completed.
    pub async fn on_migrated(&self) -> WarmUpOutcome {
        self.trigger(WarmUpHook::PostMigration).await
    }

    /// Run the checks and dispatch a warm-up when they pass. Never fails.
    pub async fn trigger(&self, hook: WarmUpHook) -> WarmUpOutcome {
        let current = self.state();
        if current == WarmUpState::VerifiedPendingWarmup {
            debug!("Warm-up ({:?}) skipped: already in flight", hook);
            return WarmUpOutcome::Skipped(SkipReason::InFlight);
        }

        match self.service.cache().warmup_marker_set().await {
            Ok(true) => {
                debug!("Warm-up ({:?}) skipped: marker set", hook);
                return WarmUpOutcome::Skipped(SkipReason::MarkerSet);
            }
            Ok(false) => {}
            Err(e) => warn!("Could not read warm-up marker, assuming unset: {}", e),
        }

        match self.verify_schema().await {
            Some(true) => {}
            Some(false) => {
                info!("Warm-up ({:?}) deferred: tables not migrated yet", hook);
                return WarmUpOutcome::Deferred(DeferReason::SchemaMissing);
            }
            None => {
                warn!("Warm-up ({:?}) deferred: schema could not be verified", hook);
                return WarmUpOutcome::Deferred(DeferReason::VerificationFailed);
            }
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Warm-up ({:?}) deferred: {}", hook, e);
                return WarmUpOutcome::Deferred(DeferReason::NoRuntime);
            }
        };

        if self
            .state
            .compare_exchange(
                current as u8,
                WarmUpState::VerifiedPendingWarmup as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("Warm-up ({:?}) skipped: another trigger won", hook);
            return WarmUpOutcome::Skipped(SkipReason::InFlight);
        }

        let service = self.service.clone();
        let state = Arc::clone(&self.state);
        let handle = runtime.spawn(async move {
            let mut guard = StateGuard::new(state);
            let result = service.warm_up(None).await;
            match &result {
                Ok(_) => guard.finish(WarmUpState::Warmed),
                Err(e) => {
                    error!("Warm-up could not enumerate owners: {}", e);
                    guard.finish(WarmUpState::Unverified);
                }
            }
            result
        });

        if let Err(e) = self.service.cache().set_warmup_marker().await {
            warn!("Failed to set warm-up marker: {}", e);
        }

        info!("✓ Warm-up ({:?}) dispatched", hook);
        WarmUpOutcome::Dispatched(handle)
    }

    /// `Some(present)` on the first successful check, `None` if every
    /// attempt errored.
    async fn verify_schema(&self) -> Option<bool> {
        let config = self.service.cache().config();
        let tables = config.schema.required_tables();
        let attempts = config.schema_check_attempts.max(1);

        for attempt in 1..=attempts {
            match self.probe.tables_exist(&tables).await {
                Ok(present) => return Some(present),
                Err(e) => warn!(
                    "Schema check attempt {}/{} failed: {}",
                    attempt, attempts, e
                ),
            }
        }
        None
    }
}
