//! Value objects: owner ids, entity kinds and the cached totals triple.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of the user owning units, products and recipes.
pub type OwnerId = i64;

/// Owned entity types whose counts are cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Unit,
    Product,
    Recipe,
}

impl EntityKind {
    /// Every counted kind, in the order the totals triple is assembled.
    pub const ALL: [EntityKind; 3] = [EntityKind::Unit, EntityKind::Product, EntityKind::Recipe];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Unit => write!(f, "unit"),
            EntityKind::Product => write!(f, "product"),
            EntityKind::Recipe => write!(f, "recipe"),
        }
    }
}

/// Precomputed counts for one owner, as served by the dashboard.
///
/// Serialises to `{"unidades": n, "productos": n, "recetas": n}`. A value is
/// always built whole; the cache replaces it, never patches a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerTotals {
    pub unidades: u64,
    pub productos: u64,
    pub recetas: u64,
}

impl OwnerTotals {
    /// Totals of an owner with nothing (or an owner that does not exist).
    pub const ZERO: OwnerTotals = OwnerTotals {
        unidades: 0,
        productos: 0,
        recetas: 0,
    };

    pub fn new(unidades: u64, productos: u64, recetas: u64) -> Self {
        OwnerTotals {
            unidades,
            productos,
            recetas,
        }
    }

    /// Count for a single kind.
    pub fn count(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Unit => self.unidades,
            EntityKind::Product => self.productos,
            EntityKind::Recipe => self.recetas,
        }
    }
}
