//! Channel event envelope and well-known event names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use magazzino_core::{EntityType, OperationKind};

/// Outbound mutation notices published after a confirmed remote write.
pub const EVENT_MAGAZZINO_UPDATE: &str = "magazzino_update";
/// Inbound server-pushed notice: an inventory record changed elsewhere.
pub const EVENT_INVENTORY_UPDATED: &str = "inventario_aggiornato";
/// Inbound server-pushed notice: a stock movement was recorded elsewhere.
pub const EVENT_MOVEMENT_ADDED: &str = "movimento_aggiunto";

/// Envelope carried on the notification channel.
///
/// `name` selects the logical event stream (see the constants above);
/// consumers filter on it. `payload` is the wire-shaped record or a partial
/// summary, depending on the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OperationKind>,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl ChannelEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            entity: None,
            kind: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Notice for a confirmed mutation, published on `magazzino_update`.
    pub fn mutation(entity: EntityType, kind: OperationKind, payload: Value) -> Self {
        Self {
            name: EVENT_MAGAZZINO_UPDATE.to_string(),
            entity: Some(entity),
            kind: Some(kind),
            payload,
            occurred_at: Utc::now(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}
