//! Shared types for the sync core.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use magazzino_core::{EntityType, OperationId, OperationKind, Record, RecordId};

/// One not-yet-confirmed mutation awaiting replay against the remote system.
///
/// Appended when a write is attempted while unreachable (or when a reachable
/// attempt fails with a retryable error); removed on successful replay;
/// mutated in place (`last_error`/`last_attempt`) on a failed replay attempt.
/// Exclusively owned by the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub entity: EntityType,
    pub kind: OperationKind,
    /// The record to create/update; `None` for deletes.
    pub record: Option<Record>,
    pub record_id: RecordId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

impl PendingOperation {
    pub fn new(
        entity: EntityType,
        kind: OperationKind,
        record: Option<Record>,
        record_id: RecordId,
    ) -> Self {
        Self {
            id: OperationId::new(),
            entity,
            kind,
            record,
            record_id,
            created_at: Utc::now(),
            last_error: None,
            last_attempt: None,
        }
    }
}

/// Sort pending operations into replay order: all creates first, then
/// updates, then deletes; within each kind, ascending by enqueue timestamp.
///
/// Creates must land before updates/deletes that might reference them;
/// deletes go last to avoid referencing records the remote system has not
/// confirmed to exist. The ordering is global, not per-record.
pub fn sort_for_replay(operations: &mut [PendingOperation]) {
    operations.sort_by_key(|op| (op.kind.replay_rank(), op.created_at));
}

/// How a sync pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The remote system was unreachable; the queue was left untouched.
    Offline,
    /// The queue was empty; nothing was replayed.
    NothingToSync,
    /// The queue was drained (possibly with partial failures).
    Completed,
}

/// One failed replay within a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    pub operation: OperationId,
    pub entity: EntityType,
    pub kind: OperationKind,
    pub message: String,
    /// Permanent failures are dequeued and will not be retried.
    pub permanent: bool,
}

/// Structured result of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub total_operations: usize,
    pub successful: usize,
    pub failed: usize,
    pub issues: Vec<SyncIssue>,
}

impl SyncReport {
    pub fn offline() -> Self {
        Self {
            outcome: SyncOutcome::Offline,
            total_operations: 0,
            successful: 0,
            failed: 0,
            issues: Vec::new(),
        }
    }

    pub fn nothing_to_sync() -> Self {
        Self {
            outcome: SyncOutcome::NothingToSync,
            total_operations: 0,
            successful: 0,
            failed: 0,
            issues: Vec::new(),
        }
    }

    pub fn completed(total: usize, successful: usize, failed: usize, issues: Vec<SyncIssue>) -> Self {
        Self {
            outcome: SyncOutcome::Completed,
            total_operations: total,
            successful,
            failed,
            issues,
        }
    }

    /// A pass succeeds when nothing failed (offline and empty passes count as
    /// success: nothing was lost).
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn message(&self) -> &'static str {
        match self.outcome {
            SyncOutcome::Offline => "cannot sync offline",
            SyncOutcome::NothingToSync => "nothing to sync",
            SyncOutcome::Completed => "sync completed",
        }
    }
}

/// Derived, non-persisted view of the sync state for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub pending_operations: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub online: bool,
}

/// A full point-in-time copy of all cached entity partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Per-entity-type arrays, keyed by the entity tag.
    pub data: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn records_for(&self, entity: EntityType) -> &[Record] {
        self.data
            .get(entity.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn op_at(kind: OperationKind, offset_ms: i64) -> PendingOperation {
        let mut op = PendingOperation::new(
            EntityType::Ingredient,
            kind,
            None,
            RecordId::new("x"),
        );
        op.created_at = Utc::now() + Duration::milliseconds(offset_ms);
        op
    }

    #[test]
    fn replay_order_is_create_update_delete() {
        // Enqueued as [Delete@t3, Create@t1, Update@t2].
        let mut ops = vec![
            op_at(OperationKind::Delete, 3),
            op_at(OperationKind::Create, 1),
            op_at(OperationKind::Update, 2),
        ];
        sort_for_replay(&mut ops);

        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Create,
                OperationKind::Update,
                OperationKind::Delete
            ]
        );
    }

    #[test]
    fn empty_report_counts_as_success() {
        assert!(SyncReport::nothing_to_sync().success());
        assert_eq!(SyncReport::nothing_to_sync().message(), "nothing to sync");
        assert!(SyncReport::offline().success());
    }

    proptest! {
        #[test]
        fn replay_order_is_kind_ranked_and_time_ascending(
            raw in prop::collection::vec((0u8..3, -10_000i64..10_000), 0..40)
        ) {
            let mut ops: Vec<_> = raw
                .into_iter()
                .map(|(kind, offset)| {
                    let kind = match kind {
                        0 => OperationKind::Create,
                        1 => OperationKind::Update,
                        _ => OperationKind::Delete,
                    };
                    op_at(kind, offset)
                })
                .collect();

            sort_for_replay(&mut ops);

            for pair in ops.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.kind.replay_rank() <= b.kind.replay_rank());
                if a.kind == b.kind {
                    prop_assert!(a.created_at <= b.created_at);
                }
            }
        }
    }
}
