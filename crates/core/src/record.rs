//! Record schemas for the five synchronized collections.
//!
//! The remote REST service speaks Italian camelCase field names; the serde
//! attributes keep the wire shape stable while the Rust side stays idiomatic.
//! Every record carries an `isOffline` marker while it only exists locally;
//! the marker is dropped (together with the local identifier) once the remote
//! system confirms the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityType;
use crate::error::{DomainError, DomainResult};
use crate::id::RecordId;

/// Ingredient in the warehouse (flour, yeast, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: RecordId,
    pub nome: String,
    pub quantita: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unita: Option<String>,
    /// Reorder threshold; below this the UI flags the ingredient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soglia_minima: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

/// Supplier of raw materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: RecordId,
    pub ragione_sociale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partita_iva: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Goods received into the warehouse.
    Carico,
    /// Goods consumed or shipped out.
    Scarico,
}

/// Stock movement ledger entry. Append-only: created and deleted, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: RecordId,
    pub ingrediente_id: RecordId,
    pub tipo: MovementKind,
    pub quantita: f64,
    pub data: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

/// Customer order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Nuovo,
    Confermato,
    Evaso,
}

/// Customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: RecordId,
    pub cliente: String,
    pub stato: OrderStatus,
    pub totale: f64,
    pub data: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

/// One ingredient line of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
    pub ingrediente_id: RecordId,
    pub quantita: f64,
}

/// Production recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecordId,
    pub nome: String,
    #[serde(default)]
    pub ingredienti: Vec<RecipeLine>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

/// Tagged sum over the five entity schemas.
///
/// The adjacently-tagged representation is what the local store persists; the
/// wire shape (untagged inner object) goes through [`Record::to_wire`] /
/// [`Record::from_wire`] because the remote endpoints already scope the entity
/// type in the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum Record {
    Ingredient(Ingredient),
    Supplier(Supplier),
    StockMovement(StockMovement),
    Order(Order),
    Recipe(Recipe),
}

impl Record {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Record::Ingredient(_) => EntityType::Ingredient,
            Record::Supplier(_) => EntityType::Supplier,
            Record::StockMovement(_) => EntityType::StockMovement,
            Record::Order(_) => EntityType::Order,
            Record::Recipe(_) => EntityType::Recipe,
        }
    }

    pub fn id(&self) -> &RecordId {
        match self {
            Record::Ingredient(r) => &r.id,
            Record::Supplier(r) => &r.id,
            Record::StockMovement(r) => &r.id,
            Record::Order(r) => &r.id,
            Record::Recipe(r) => &r.id,
        }
    }

    pub fn set_id(&mut self, id: RecordId) {
        match self {
            Record::Ingredient(r) => r.id = id,
            Record::Supplier(r) => r.id = id,
            Record::StockMovement(r) => r.id = id,
            Record::Order(r) => r.id = id,
            Record::Recipe(r) => r.id = id,
        }
    }

    pub fn is_offline(&self) -> bool {
        match self {
            Record::Ingredient(r) => r.is_offline,
            Record::Supplier(r) => r.is_offline,
            Record::StockMovement(r) => r.is_offline,
            Record::Order(r) => r.is_offline,
            Record::Recipe(r) => r.is_offline,
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        match self {
            Record::Ingredient(r) => r.is_offline = offline,
            Record::Supplier(r) => r.is_offline = offline,
            Record::StockMovement(r) => r.is_offline = offline,
            Record::Order(r) => r.is_offline = offline,
            Record::Recipe(r) => r.is_offline = offline,
        }
    }

    /// Reject a record handed to the wrong entity partition.
    pub fn ensure_entity(&self, expected: EntityType) -> DomainResult<()> {
        let actual = self.entity_type();
        if actual == expected {
            Ok(())
        } else {
            Err(DomainError::EntityMismatch { expected, actual })
        }
    }

    /// Boundary validation, enforced before anything is persisted or queued.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Record::Ingredient(r) => {
                if r.nome.trim().is_empty() {
                    return Err(DomainError::validation("nome cannot be empty"));
                }
                if r.quantita < 0.0 {
                    return Err(DomainError::validation("quantita cannot be negative"));
                }
            }
            Record::Supplier(r) => {
                if r.ragione_sociale.trim().is_empty() {
                    return Err(DomainError::validation("ragioneSociale cannot be empty"));
                }
            }
            Record::StockMovement(r) => {
                if r.quantita <= 0.0 {
                    return Err(DomainError::validation("quantita must be positive"));
                }
            }
            Record::Order(r) => {
                if r.cliente.trim().is_empty() {
                    return Err(DomainError::validation("cliente cannot be empty"));
                }
                if r.totale < 0.0 {
                    return Err(DomainError::validation("totale cannot be negative"));
                }
            }
            Record::Recipe(r) => {
                if r.nome.trim().is_empty() {
                    return Err(DomainError::validation("nome cannot be empty"));
                }
                if r.ingredienti.iter().any(|line| line.quantita <= 0.0) {
                    return Err(DomainError::validation(
                        "recipe lines must have positive quantita",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Serialize to the wire shape (inner object, no entity tag).
    pub fn to_wire(&self) -> Value {
        // Serializing our own schemas cannot fail.
        match self {
            Record::Ingredient(r) => serde_json::to_value(r),
            Record::Supplier(r) => serde_json::to_value(r),
            Record::StockMovement(r) => serde_json::to_value(r),
            Record::Order(r) => serde_json::to_value(r),
            Record::Recipe(r) => serde_json::to_value(r),
        }
        .unwrap_or(Value::Null)
    }

    /// Parse a wire object for a known entity type.
    pub fn from_wire(entity: EntityType, value: Value) -> DomainResult<Record> {
        let parse_err =
            |e: serde_json::Error| DomainError::validation(format!("{}: {}", entity, e));
        let record = match entity {
            EntityType::Ingredient => Record::Ingredient(
                serde_json::from_value::<Ingredient>(value).map_err(parse_err)?,
            ),
            EntityType::Supplier => {
                Record::Supplier(serde_json::from_value::<Supplier>(value).map_err(parse_err)?)
            }
            EntityType::StockMovement => Record::StockMovement(
                serde_json::from_value::<StockMovement>(value).map_err(parse_err)?,
            ),
            EntityType::Order => {
                Record::Order(serde_json::from_value::<Order>(value).map_err(parse_err)?)
            }
            EntityType::Recipe => {
                Record::Recipe(serde_json::from_value::<Recipe>(value).map_err(parse_err)?)
            }
        };
        Ok(record)
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn farina() -> Record {
        Record::Ingredient(Ingredient {
            id: RecordId::new("1"),
            nome: "Farina".to_string(),
            quantita: 10.0,
            unita: Some("kg".to_string()),
            soglia_minima: None,
            is_offline: false,
        })
    }

    #[test]
    fn wire_shape_uses_italian_camel_case() {
        let record = Record::Supplier(Supplier {
            id: RecordId::new("5"),
            ragione_sociale: "Acme".to_string(),
            partita_iva: Some("IT01234567890".to_string()),
            email: None,
            telefono: None,
            is_offline: false,
        });

        let wire = record.to_wire();
        assert_eq!(wire["ragioneSociale"], "Acme");
        assert_eq!(wire["partitaIva"], "IT01234567890");
        // The offline marker never leaks onto the wire when unset.
        assert!(wire.get("isOffline").is_none());
    }

    #[test]
    fn from_wire_parses_scenario_ingredient() {
        let value = json!({"id": "1", "nome": "Farina", "quantita": 10});
        let record = Record::from_wire(EntityType::Ingredient, value).unwrap();
        match &record {
            Record::Ingredient(r) => {
                assert_eq!(r.nome, "Farina");
                assert_eq!(r.quantita, 10.0);
                assert!(!r.is_offline);
            }
            _ => panic!("Expected Ingredient record"),
        }
        assert_eq!(record.entity_type(), EntityType::Ingredient);
    }

    #[test]
    fn validation_rejects_empty_name() {
        let record = Record::Ingredient(Ingredient {
            id: RecordId::new("1"),
            nome: "   ".to_string(),
            quantita: 1.0,
            unita: None,
            soglia_minima: None,
            is_offline: false,
        });
        match record.validate().unwrap_err() {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty nome"),
        }
    }

    #[test]
    fn validation_rejects_negative_quantity() {
        let record = Record::Ingredient(Ingredient {
            id: RecordId::new("1"),
            nome: "Lievito".to_string(),
            quantita: -2.0,
            unita: None,
            soglia_minima: None,
            is_offline: false,
        });
        assert!(record.validate().is_err());
    }

    #[test]
    fn entity_mismatch_is_rejected() {
        let record = farina();
        match record.ensure_entity(EntityType::Order).unwrap_err() {
            DomainError::EntityMismatch { expected, actual } => {
                assert_eq!(expected, EntityType::Order);
                assert_eq!(actual, EntityType::Ingredient);
            }
            _ => panic!("Expected EntityMismatch error"),
        }
    }

    #[test]
    fn tagged_representation_round_trips_through_storage() {
        let record = farina();
        let stored = serde_json::to_string(&record).unwrap();
        let loaded: Record = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded, record);
    }
}
