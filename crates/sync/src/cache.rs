//! Local read-model cache, one partition per entity type.

use std::sync::Arc;

use anyhow::Context;

use magazzino_core::{EntityType, OperationKind, Record, RecordId};

use crate::store::{keys, KeyValueStore};

/// Per-entity-type mirror of the remote collections.
///
/// `save` replaces a whole partition (no merge semantics - callers supply the
/// complete collection); `read` never fails and treats absence as an empty
/// partition; `apply` mutates a partition in place for optimistic writes.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Replace the entire partition for `entity` with `records`.
    pub async fn save(&self, entity: EntityType, records: &[Record]) -> anyhow::Result<()> {
        let payload = serde_json::to_string(records)
            .with_context(|| format!("failed to serialize {} cache partition", entity))?;
        self.store.put(&keys::cache(entity), &payload).await
    }

    /// Read the stored partition. Absence is not an error; a corrupt partition
    /// is logged and treated as empty rather than wedging every caller.
    pub async fn read(&self, entity: EntityType) -> Vec<Record> {
        let raw = match self.store.get(&keys::cache(entity)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::error!("failed to read {} cache partition: {err:?}", entity);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                tracing::error!("corrupt {} cache partition, treating as empty: {err}", entity);
                Vec::new()
            }
        }
    }

    /// Mutate the partition in place: append (create), replace-matching-id
    /// (update), remove-matching-id (delete).
    pub async fn apply(
        &self,
        entity: EntityType,
        kind: OperationKind,
        record: Option<&Record>,
        id: &RecordId,
    ) -> anyhow::Result<()> {
        let mut records = self.read(entity).await;

        match kind {
            OperationKind::Create => {
                if let Some(record) = record {
                    records.push(record.clone());
                }
            }
            OperationKind::Update => {
                if let Some(record) = record {
                    for slot in records.iter_mut() {
                        if slot.id() == id {
                            *slot = record.clone();
                        }
                    }
                }
            }
            OperationKind::Delete => {
                records.retain(|slot| slot.id() != id);
            }
        }

        self.save(entity, &records).await
    }

    /// Swap an offline record for its remote-confirmed form: the local
    /// identifier is replaced and the offline marker cleared. Appends when the
    /// local record is no longer present.
    pub async fn reconcile(
        &self,
        entity: EntityType,
        local_id: &RecordId,
        confirmed: &Record,
    ) -> anyhow::Result<()> {
        let mut records = self.read(entity).await;
        let mut replaced = false;

        for slot in records.iter_mut() {
            if slot.id() == local_id {
                *slot = confirmed.clone();
                replaced = true;
            }
        }
        if !replaced {
            records.push(confirmed.clone());
        }

        self.save(entity, &records).await
    }
}
