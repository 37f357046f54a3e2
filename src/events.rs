//! Domain mutation events and the listeners that invalidate cached totals.
//!
//! The persistence layer emits an [`EntityEvent`] after a unit, product or
//! recipe is created or deleted. Listeners registered with
//! [`register_totals_listeners`] drop the owner's cached totals; the next
//! dashboard read recomputes them.
//!
//! ```
//! use owner_totals::backend::InMemoryBackend;
//! use owner_totals::config::TotalsConfig;
//! use owner_totals::events::{register_totals_listeners, EntityEvent, EventBus};
//! use owner_totals::repository::InMemoryRepository;
//! use owner_totals::{EntityKind, OwnedEntity, OwnerId, TotalsService};
//!
//! struct Unidad {
//!     user_id: OwnerId,
//! }
//!
//! impl OwnedEntity for Unidad {
//!     const KIND: EntityKind = EntityKind::Unit;
//!     fn owner_id(&self) -> OwnerId {
//!         self.user_id
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let service = TotalsService::new(
//!     InMemoryBackend::new(),
//!     InMemoryRepository::new(),
//!     TotalsConfig::default(),
//! );
//! let mut bus = EventBus::new();
//! register_totals_listeners(&mut bus, &service);
//!
//! let notified = bus.emit(&EntityEvent::created(&Unidad { user_id: 1 })).await;
//! assert_eq!(notified, 1);
//! # }
//! ```

use crate::backend::CacheBackend;
use crate::entity::OwnedEntity;
use crate::repository::TotalsRepository;
use crate::service::TotalsService;
use crate::totals::{EntityKind, OwnerId};
use async_trait::async_trait;
use std::fmt;

/// What happened to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mutation {
    Created,
    Deleted,
}

impl Mutation {
    pub const ALL: [Mutation; 2] = [Mutation::Created, Mutation::Deleted];
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Created => write!(f, "created"),
            Mutation::Deleted => write!(f, "deleted"),
        }
    }
}

/// A committed creation or deletion of an owned entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityEvent {
    pub kind: EntityKind,
    pub mutation: Mutation,
    pub owner: OwnerId,
}

impl EntityEvent {
    pub fn new(kind: EntityKind, mutation: Mutation, owner: OwnerId) -> Self {
        EntityEvent {
            kind,
            mutation,
            owner,
        }
    }

    /// Event for a newly stored entity; the owner is read from the entity.
    pub fn created<E: OwnedEntity>(entity: &E) -> Self {
        Self::new(E::KIND, Mutation::Created, entity.owner_id())
    }

    /// Event for a removed entity; the owner is read from the entity.
    pub fn deleted<E: OwnedEntity>(entity: &E) -> Self {
        Self::new(E::KIND, Mutation::Deleted, entity.owner_id())
    }

    fn subscription(&self) -> (EntityKind, Mutation) {
        (self.kind, self.mutation)
    }
}

impl fmt::Display for EntityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} for owner {}", self.kind, self.mutation, self.owner)
    }
}

/// Reacts to one kind of entity event.
#[async_trait]
pub trait InvalidationListener: Send + Sync {
    /// The entity kind and mutation this listener wants.
    fn subscription(&self) -> (EntityKind, Mutation);

    /// Handle a matching event. Failures are handled here, never returned to
    /// the code that mutated the entity.
    async fn on_event(&self, event: &EntityEvent);
}

/// Drops the cached totals of the owner named in the event.
///
/// It never recomputes; the next read does.
pub struct TotalsInvalidator<B: CacheBackend, R: TotalsRepository> {
    service: TotalsService<B, R>,
    kind: EntityKind,
    mutation: Mutation,
}

impl<B: CacheBackend, R: TotalsRepository> TotalsInvalidator<B, R> {
    pub fn new(service: TotalsService<B, R>, kind: EntityKind, mutation: Mutation) -> Self {
        TotalsInvalidator {
            service,
            kind,
            mutation,
        }
    }
}

#[async_trait]
impl<B, R> InvalidationListener for TotalsInvalidator<B, R>
where
    B: CacheBackend + 'static,
    R: TotalsRepository + 'static,
{
    fn subscription(&self) -> (EntityKind, Mutation) {
        (self.kind, self.mutation)
    }

    async fn on_event(&self, event: &EntityEvent) {
        match self.service.invalidate(Some(event.owner)).await {
            Ok(()) => debug!("Invalidated totals after {}", event),
            Err(e) => warn!("Failed to invalidate totals after {}: {}", event, e),
        }
    }
}

/// Ordered list of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn InvalidationListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Listeners are notified in subscription order.
    pub fn subscribe<L: InvalidationListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every matching listener, one after the other.
    ///
    /// Returns how many listeners were notified.
    pub async fn emit(&self, event: &EntityEvent) -> usize {
        let mut notified = 0;
        for listener in &self.listeners {
            if listener.subscription() == event.subscription() {
                listener.on_event(event).await;
                notified += 1;
            }
        }

        if notified == 0 {
            debug!("No listener for {}", event);
        }
        notified
    }
}

/// Subscribe one [`TotalsInvalidator`] per entity kind and mutation.
pub fn register_totals_listeners<B, R>(bus: &mut EventBus, service: &TotalsService<B, R>)
where
    B: CacheBackend + 'static,
    R: TotalsRepository + 'static,
{
    for kind in EntityKind::ALL {
        for mutation in Mutation::ALL {
            bus.subscribe(TotalsInvalidator::new(service.clone(), kind, mutation));
        }
    }
}
