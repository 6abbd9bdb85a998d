//! `magazzino-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! entity types, record schemas, identifiers and the domain error model shared
//! by the sync engine and its collaborators.

pub mod entity;
pub mod error;
pub mod id;
pub mod record;

pub use entity::{EntityType, OperationKind};
pub use error::{DomainError, DomainResult};
pub use id::{OperationId, RecordId};
pub use record::{
    Ingredient, MovementKind, Order, OrderStatus, Recipe, RecipeLine, Record, StockMovement,
    Supplier,
};
