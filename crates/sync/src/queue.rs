//! Offline-first pending operation queue.
//!
//! An ordered, durably persisted list of mutations not yet confirmed by the
//! remote system. No deduplication: multiple queued operations against the
//! same logical record are preserved and replayed in enqueue order (subject to
//! the kind-based reordering applied at drain time).

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use magazzino_core::OperationId;

use crate::store::{keys, KeyValueStore};
use crate::types::PendingOperation;

/// Durably persisted mutation queue. Exclusively owned by the sync engine.
#[derive(Clone)]
pub struct PendingQueue {
    store: Arc<dyn KeyValueStore>,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Append an operation to the persisted list.
    pub async fn enqueue(&self, operation: &PendingOperation) -> anyhow::Result<()> {
        let mut operations = self.list().await?;
        operations.push(operation.clone());
        self.persist(&operations).await
    }

    /// Full enumeration, insertion order preserved.
    pub async fn list(&self) -> anyhow::Result<Vec<PendingOperation>> {
        let raw = match self.store.get(keys::PENDING_OPS).await? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        serde_json::from_str(&raw).context("corrupt pending operation queue")
    }

    /// Remove an operation by id; no-op if absent.
    pub async fn remove(&self, id: OperationId) -> anyhow::Result<()> {
        let mut operations = self.list().await?;
        operations.retain(|op| op.id != id);
        self.persist(&operations).await
    }

    /// Record a failed replay attempt on a queued operation; no-op if absent.
    pub async fn mark_failed(&self, id: OperationId, error: &str) -> anyhow::Result<()> {
        let mut operations = self.list().await?;
        for op in operations.iter_mut() {
            if op.id == id {
                op.last_error = Some(error.to_string());
                op.last_attempt = Some(Utc::now());
            }
        }
        self.persist(&operations).await
    }

    pub async fn has_pending(&self) -> bool {
        self.len().await > 0
    }

    pub async fn len(&self) -> usize {
        match self.list().await {
            Ok(operations) => operations.len(),
            Err(err) => {
                tracing::error!("failed to read pending queue: {err:?}");
                0
            }
        }
    }

    async fn persist(&self, operations: &[PendingOperation]) -> anyhow::Result<()> {
        let payload =
            serde_json::to_string(operations).context("failed to serialize pending queue")?;
        self.store.put(keys::PENDING_OPS, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use magazzino_core::{EntityType, OperationKind, RecordId};

    fn queue() -> PendingQueue {
        PendingQueue::new(Arc::new(MemoryStore::new()))
    }

    fn delete_of(id: &str) -> PendingOperation {
        PendingOperation::new(
            EntityType::Ingredient,
            OperationKind::Delete,
            None,
            RecordId::new(id),
        )
    }

    #[tokio::test]
    async fn enqueue_preserves_insertion_order() {
        let queue = queue();
        let (a, b, c) = (delete_of("1"), delete_of("2"), delete_of("3"));

        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();
        queue.enqueue(&c).await.unwrap();

        let ids: Vec<_> = queue.list().await.unwrap().iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert!(queue.has_pending().await);
    }

    #[tokio::test]
    async fn duplicate_operations_are_not_deduplicated() {
        let queue = queue();
        let first = delete_of("5");
        let second = delete_of("5");

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn remove_targets_one_operation_and_tolerates_absence() {
        let queue = queue();
        let (a, b) = (delete_of("1"), delete_of("2"));
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();

        queue.remove(a.id).await.unwrap();
        let remaining = queue.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);

        // Removing again is a no-op.
        queue.remove(a.id).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn mark_failed_records_error_and_attempt_time() {
        let queue = queue();
        let op = delete_of("1");
        queue.enqueue(&op).await.unwrap();

        queue.mark_failed(op.id, "network error").await.unwrap();

        let stored = &queue.list().await.unwrap()[0];
        assert_eq!(stored.last_error.as_deref(), Some("network error"));
        assert!(stored.last_attempt.is_some());

        // Unknown id is a no-op.
        queue
            .mark_failed(OperationId::new(), "ignored")
            .await
            .unwrap();
    }
}
