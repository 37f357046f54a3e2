//! # owner-totals
//!
//! Per-owner aggregate count cache for a multi-tenant recipe-costing
//! application.
//!
//! Each owner's dashboard shows how many units, products and recipes they own.
//! Counting on every request is wasteful, so the counts are cached per owner in
//! a shared key-value store, dropped when an entity is created or deleted, and
//! preloaded at process start once the database schema is known to exist.
//!
//! ## Features
//!
//! - **Read-through:** a miss recomputes the three counts and stores them with a
//!   fixed timeout
//! - **Event-driven invalidation:** typed mutation events drop exactly one
//!   owner's entry
//! - **Bulk invalidation:** a secondary index kept with atomic set operations
//!   lists every cached owner
//! - **Schema-aware warm-up:** gated by a shared marker and a bounded table
//!   check
//! - **Backend Agnostic:** in-memory and Redis stores, or your own
//!   [`CacheBackend`]
//! - **Database Agnostic:** sqlx/PostgreSQL repository, or your own
//!   [`TotalsRepository`]
//!
//! ## Quick Start
//!
//! ```
//! use owner_totals::{
//!     backend::InMemoryBackend,
//!     config::TotalsConfig,
//!     events::{register_totals_listeners, EntityEvent, EventBus, Mutation},
//!     repository::InMemoryRepository,
//!     warmup::WarmUpCoordinator,
//!     EntityKind, OwnerTotals, TotalsService,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> owner_totals::Result<()> {
//! let repo = InMemoryRepository::new();
//! repo.set_totals(1, OwnerTotals::new(5, 10, 15));
//!
//! // 1. One service per process, cloned into handlers and listeners
//! let service = TotalsService::new(InMemoryBackend::new(), repo.clone(), TotalsConfig::default());
//!
//! // 2. Invalidate on entity mutations
//! let mut bus = EventBus::new();
//! register_totals_listeners(&mut bus, &service);
//!
//! // 3. Warm up once the schema exists
//! let coordinator = WarmUpCoordinator::new(service.clone(), repo.clone());
//! coordinator.on_startup().await;
//!
//! // 4. Serve the dashboard
//! assert_eq!(service.dashboard_totals(1).await, OwnerTotals::new(5, 10, 15));
//!
//! repo.remove(EntityKind::Unit, 1);
//! bus.emit(&EntityEvent::new(EntityKind::Unit, Mutation::Deleted, 1)).await;
//! assert_eq!(service.dashboard_totals(1).await, OwnerTotals::new(4, 10, 15));
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod key;
pub mod observability;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod totals;
pub mod warmup;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use cache::{OwnerTotalsCache, WarmUpReport};
pub use config::TotalsConfig;
pub use entity::OwnedEntity;
pub use error::{Error, Result};
pub use events::{EntityEvent, EventBus, Mutation};
pub use repository::{SchemaProbe, TotalsRepository};
pub use service::TotalsService;
pub use totals::{EntityKind, OwnerId, OwnerTotals};
pub use warmup::{WarmUpCoordinator, WarmUpOutcome, WarmUpState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
