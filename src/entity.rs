//! Trait implemented by domain entities whose mutations affect cached totals.

use crate::totals::{EntityKind, OwnerId};

/// An entity that belongs to one owner and is counted in [`OwnerTotals`].
///
/// Implement this on your persistence models so that mutation events can
/// resolve the affected owner from the entity itself.
///
/// # Example
///
/// ```
/// use owner_totals::{EntityKind, OwnedEntity, OwnerId};
///
/// pub struct Receta {
///     pub id: i32,
///     pub nombre: String,
///     pub user_id: OwnerId,
/// }
///
/// impl OwnedEntity for Receta {
///     const KIND: EntityKind = EntityKind::Recipe;
///
///     fn owner_id(&self) -> OwnerId {
///         self.user_id
///     }
/// }
/// ```
///
/// [`OwnerTotals`]: crate::totals::OwnerTotals
pub trait OwnedEntity {
    /// Which count this entity contributes to.
    const KIND: EntityKind;

    /// Owner of this entity.
    fn owner_id(&self) -> OwnerId;
}
