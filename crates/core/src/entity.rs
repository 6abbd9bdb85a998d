//! Entity types and mutation kinds.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// One of the five domain collections kept in sync with the remote system.
///
/// Each entity type owns its own cache partition and its own applicable
/// operation set (stock movements are append-only ledger entries: they can be
/// created and deleted but never updated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Ingredient,
    Supplier,
    StockMovement,
    Order,
    Recipe,
}

impl EntityType {
    /// All entity types, in the order backup snapshots enumerate them.
    pub const ALL: [EntityType; 5] = [
        EntityType::Ingredient,
        EntityType::Supplier,
        EntityType::StockMovement,
        EntityType::Order,
        EntityType::Recipe,
    ];

    /// Stable tag used in storage keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Ingredient => "ingredient",
            EntityType::Supplier => "supplier",
            EntityType::StockMovement => "stock_movement",
            EntityType::Order => "order",
            EntityType::Recipe => "recipe",
        }
    }

    /// REST collection path segment on the remote API.
    pub fn path_segment(&self) -> &'static str {
        match self {
            EntityType::Ingredient => "ingredienti",
            EntityType::Supplier => "fornitori",
            EntityType::StockMovement => "movimenti",
            EntityType::Order => "ordini",
            EntityType::Recipe => "ricette",
        }
    }

    /// Whether `kind` is part of this entity's applicable operation set.
    pub fn supports(&self, kind: OperationKind) -> bool {
        match self {
            EntityType::StockMovement => kind != OperationKind::Update,
            _ => true,
        }
    }

    /// Reject unsupported operation kinds at the engine boundary.
    pub fn ensure_supports(&self, kind: OperationKind) -> DomainResult<()> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(DomainError::UnsupportedOperation {
                entity: *self,
                kind,
            })
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a queued or direct mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Global replay rank: creates land before updates, deletes go last so they
    /// never reference records the remote system has not confirmed yet.
    pub fn replay_rank(&self) -> u8 {
        match self {
            OperationKind::Create => 0,
            OperationKind::Update => 1,
            OperationKind::Delete => 2,
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
