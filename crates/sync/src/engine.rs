//! Sync engine: remote-first reads, queue-fallback writes, queue drain.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use magazzino_channel::{ChannelEvent, NotificationChannel};
use magazzino_core::{DomainError, EntityType, OperationKind, Record, RecordId};

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::connectivity::ReachabilityProbe;
use crate::queue::PendingQueue;
use crate::remote::{ListOptions, RemoteApi, RemoteError};
use crate::store::{keys, KeyValueStore};
use crate::types::{
    sort_for_replay, PendingOperation, Snapshot, SyncIssue, SyncReport, SyncStatus,
};

/// Error surfaced by the engine's fallible operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
}

impl SyncError {
    fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:?}"))
    }
}

/// Offline-aware synchronization engine.
///
/// Explicitly constructed with injected capabilities; hold it behind an `Arc`
/// and share the reference with whatever needs it. Reads are remote-first with
/// cache fallback; writes are remote-first with queue fallback; the queue is
/// drained by [`SyncEngine::synchronize`] (manually or via
/// [`crate::worker::SyncWorker`]).
pub struct SyncEngine {
    store: Arc<dyn KeyValueStore>,
    cache: LocalCache,
    queue: PendingQueue,
    remote: Arc<dyn RemoteApi>,
    probe: Arc<dyn ReachabilityProbe>,
    channel: Arc<dyn NotificationChannel<ChannelEvent>>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteApi>,
        probe: Arc<dyn ReachabilityProbe>,
        channel: Arc<dyn NotificationChannel<ChannelEvent>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache: LocalCache::new(store.clone()),
            queue: PendingQueue::new(store.clone()),
            store,
            remote,
            probe,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Remote-first read with cache fallback.
    ///
    /// On a reachable remote: fetch, overwrite the cache partition, return the
    /// fresh records. On remote failure or unreachability: serve the cached
    /// partition. Never fails the caller; a cache miss is an empty list. The
    /// fallback serves the whole partition (filters apply remotely only).
    pub async fn fetch(&self, entity: EntityType, options: &ListOptions) -> Vec<Record> {
        if self.probe.is_reachable().await {
            match self.remote.list(entity, options).await {
                Ok(records) => {
                    if let Err(err) = self.cache.save(entity, &records).await {
                        tracing::warn!("failed to refresh {} cache: {err:?}", entity);
                    }
                    return records;
                }
                Err(err) => {
                    tracing::warn!("remote list of {} failed, serving cache: {err}", entity);
                }
            }
        } else {
            tracing::debug!("unreachable, serving {} from cache", entity);
        }

        self.cache.read(entity).await
    }

    /// Remote-first write with queue fallback.
    ///
    /// Unreachable: the mutation is queued, applied optimistically to the
    /// cache, and the record comes back tagged offline - this path never
    /// errors past validation. Reachable: the remote call is made directly; a
    /// retryable failure is queued for replay *and* propagated so the caller
    /// can react, a permanent rejection is propagated without queueing.
    ///
    /// Returns the confirmed (or optimistic) record; `None` for deletes.
    pub async fn perform(
        &self,
        entity: EntityType,
        kind: OperationKind,
        record: Option<Record>,
        id: Option<RecordId>,
    ) -> Result<Option<Record>, SyncError> {
        entity.ensure_supports(kind)?;

        if matches!(kind, OperationKind::Create | OperationKind::Update) && record.is_none() {
            return Err(DomainError::validation(format!("{kind} requires a record")).into());
        }
        if let Some(record) = &record {
            record.ensure_entity(entity)?;
            record.validate()?;
        }

        let record_id = resolve_record_id(kind, &record, id)?;

        if !self.probe.is_reachable().await {
            return Ok(self.perform_offline(entity, kind, record, record_id).await);
        }

        match self.call_remote(kind, &record, entity, &record_id).await {
            Ok(confirmed) => {
                if let Err(err) = self
                    .cache
                    .apply(entity, kind, confirmed.as_ref(), &record_id)
                    .await
                {
                    tracing::warn!("failed to apply confirmed {kind} to cache: {err:?}");
                }

                let payload = confirmed
                    .as_ref()
                    .map(Record::to_wire)
                    .unwrap_or_else(|| serde_json::json!({ "id": record_id }));
                if let Err(err) = self
                    .channel
                    .publish(ChannelEvent::mutation(entity, kind, payload))
                {
                    tracing::debug!("mutation notice not published: {err}");
                }

                Ok(confirmed)
            }
            Err(err) => {
                if err.is_retryable() {
                    let mut op = PendingOperation::new(entity, kind, record, record_id);
                    op.last_error = Some(err.to_string());
                    op.last_attempt = Some(Utc::now());
                    if let Err(queue_err) = self.queue.enqueue(&op).await {
                        tracing::error!("failed to queue {kind} for retry: {queue_err:?}");
                    }
                    tracing::warn!("{kind} of {entity} failed, queued for retry: {err}");
                } else {
                    tracing::warn!("{kind} of {entity} rejected permanently: {err}");
                }
                Err(err.into())
            }
        }
    }

    /// Offline write path: queue + optimistic cache apply. Persistence
    /// failures are logged, never surfaced - the caller sees optimistic
    /// success.
    async fn perform_offline(
        &self,
        entity: EntityType,
        kind: OperationKind,
        record: Option<Record>,
        record_id: RecordId,
    ) -> Option<Record> {
        let record = record.map(|mut record| {
            record.set_id(record_id.clone());
            record.set_offline(true);
            record
        });

        let operation = PendingOperation::new(entity, kind, record.clone(), record_id.clone());
        if let Err(err) = self.queue.enqueue(&operation).await {
            tracing::error!("failed to enqueue offline {kind}: {err:?}");
        }
        if let Err(err) = self
            .cache
            .apply(entity, kind, record.as_ref(), &record_id)
            .await
        {
            tracing::error!("failed to apply offline {kind} to cache: {err:?}");
        }

        tracing::info!("queued offline {kind} of {entity} ({record_id})");
        match kind {
            OperationKind::Delete => None,
            _ => record,
        }
    }

    async fn call_remote(
        &self,
        kind: OperationKind,
        record: &Option<Record>,
        entity: EntityType,
        record_id: &RecordId,
    ) -> Result<Option<Record>, RemoteError> {
        match (kind, record) {
            (OperationKind::Create, Some(record)) => self.remote.create(record).await.map(Some),
            (OperationKind::Update, Some(record)) => self.remote.update(record).await.map(Some),
            (OperationKind::Delete, _) => {
                self.remote.delete(entity, record_id).await.map(|()| None)
            }
            // Unreachable past the validation in `perform`.
            (_, None) => Err(RemoteError::Rejected(format!("{kind} without record"))),
        }
    }

    /// Drain the pending queue against the remote system.
    ///
    /// Offline and empty-queue passes return structured reports without
    /// touching the queue. Otherwise operations are replayed in
    /// create → update → delete order (timestamp-ascending within each kind);
    /// one failing item never aborts the batch. Retryable failures stay queued
    /// with diagnostics, permanent rejections are dequeued and reported.
    pub async fn synchronize(&self) -> Result<SyncReport, SyncError> {
        if !self.probe.is_reachable().await {
            tracing::info!("synchronize skipped: remote unreachable");
            return Ok(SyncReport::offline());
        }

        let mut operations = self.queue.list().await.map_err(SyncError::storage)?;
        if operations.is_empty() {
            return Ok(SyncReport::nothing_to_sync());
        }

        sort_for_replay(&mut operations);
        let total = operations.len();
        tracing::info!("synchronizing {total} pending operation(s)");

        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut issues = Vec::new();

        for op in &operations {
            match self.replay(op).await {
                Ok(confirmed) => {
                    if let Err(err) = self.queue.remove(op.id).await {
                        tracing::error!("failed to dequeue replayed operation {}: {err:?}", op.id);
                    }
                    if let Some(confirmed) = confirmed {
                        if let Err(err) = self
                            .cache
                            .reconcile(op.entity, &op.record_id, &confirmed)
                            .await
                        {
                            tracing::warn!("failed to reconcile cache after replay: {err:?}");
                        }
                    }
                    successful += 1;
                    tracing::debug!("replayed {} of {} ({})", op.kind, op.entity, op.id);
                }
                Err(err) => {
                    let permanent = !err.is_retryable();
                    let message = err.to_string();
                    if permanent {
                        tracing::error!(
                            "dropping permanently rejected {} of {}: {message}",
                            op.kind,
                            op.entity
                        );
                        if let Err(queue_err) = self.queue.remove(op.id).await {
                            tracing::error!("failed to drop rejected operation: {queue_err:?}");
                        }
                    } else {
                        tracing::warn!(
                            "replay of {} of {} failed, left queued: {message}",
                            op.kind,
                            op.entity
                        );
                        if let Err(queue_err) = self.queue.mark_failed(op.id, &message).await {
                            tracing::error!("failed to record replay failure: {queue_err:?}");
                        }
                    }
                    failed += 1;
                    issues.push(SyncIssue {
                        operation: op.id,
                        entity: op.entity,
                        kind: op.kind,
                        message,
                        permanent,
                    });
                }
            }
        }

        let finished = Utc::now();
        if let Err(err) = self
            .store
            .put(keys::LAST_SYNC, &finished.to_rfc3339())
            .await
        {
            tracing::warn!("failed to record last sync timestamp: {err:?}");
        }

        tracing::info!("sync complete: {successful} ok, {failed} failed of {total}");
        Ok(SyncReport::completed(total, successful, failed, issues))
    }

    async fn replay(&self, op: &PendingOperation) -> Result<Option<Record>, RemoteError> {
        match op.kind {
            OperationKind::Create => {
                let record = queued_record(op)?;
                // The remote mints the real identifier; never send the local one.
                let mut outbound = record.clone();
                if outbound.id().is_local() {
                    outbound.set_id(RecordId::unassigned());
                }
                outbound.set_offline(false);
                self.remote.create(&outbound).await.map(Some)
            }
            OperationKind::Update => {
                let record = queued_record(op)?;
                let mut outbound = record.clone();
                outbound.set_offline(false);
                self.remote.update(&outbound).await.map(Some)
            }
            OperationKind::Delete => self
                .remote
                .delete(op.entity, &op.record_id)
                .await
                .map(|()| None),
        }
    }

    /// Whether any mutation is still awaiting replay.
    pub async fn has_pending_operations(&self) -> bool {
        self.queue.has_pending().await
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    /// Timestamp of the last completed sync pass, if any.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(keys::LAST_SYNC).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::error!("failed to read last sync timestamp: {err:?}");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(err) => {
                tracing::error!("corrupt last sync timestamp '{raw}': {err}");
                None
            }
        }
    }

    pub async fn is_online(&self) -> bool {
        self.probe.is_reachable().await
    }

    /// Derived status view for the UI's pending-changes indicator.
    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            pending_operations: self.pending_count().await,
            last_sync: self.last_sync().await,
            online: self.is_online().await,
        }
    }

    /// Snapshot all entity partitions (preferring live remote data when
    /// reachable), append to the retained list, evict beyond the cap.
    pub async fn backup(&self) -> Result<Snapshot, SyncError> {
        let mut data = std::collections::BTreeMap::new();
        for entity in EntityType::ALL {
            let records = self.fetch(entity, &ListOptions::default()).await;
            data.insert(entity.as_str().to_string(), records);
        }

        let snapshot = Snapshot {
            timestamp: Utc::now(),
            data,
        };

        let mut snapshots = self.load_backups().await?;
        snapshots.push(snapshot.clone());
        while snapshots.len() > self.config.backup_retention {
            snapshots.remove(0);
        }
        self.persist_backups(&snapshots).await?;

        tracing::info!(
            "backup taken at {}, {} retained",
            snapshot.timestamp.to_rfc3339(),
            snapshots.len()
        );
        Ok(snapshot)
    }

    /// Timestamps of the retained snapshots, oldest first.
    pub async fn backups(&self) -> Result<Vec<DateTime<Utc>>, SyncError> {
        Ok(self
            .load_backups()
            .await?
            .iter()
            .map(|snapshot| snapshot.timestamp)
            .collect())
    }

    /// Overwrite every cache partition from the snapshot taken at exactly
    /// `timestamp`. The pending queue is untouched.
    pub async fn restore(&self, timestamp: DateTime<Utc>) -> Result<(), SyncError> {
        let snapshots = self.load_backups().await?;
        let snapshot = snapshots
            .iter()
            .find(|snapshot| snapshot.timestamp == timestamp)
            .ok_or_else(|| SyncError::SnapshotNotFound(timestamp.to_rfc3339()))?;

        for entity in EntityType::ALL {
            self.cache
                .save(entity, snapshot.records_for(entity))
                .await
                .map_err(SyncError::storage)?;
        }

        tracing::info!("restored snapshot {}", timestamp.to_rfc3339());
        Ok(())
    }

    async fn load_backups(&self) -> Result<Vec<Snapshot>, SyncError> {
        let raw = match self
            .store
            .get(keys::BACKUPS)
            .await
            .map_err(SyncError::storage)?
        {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::Storage(format!("corrupt backup list: {e}")))
    }

    async fn persist_backups(&self, snapshots: &[Snapshot]) -> Result<(), SyncError> {
        let payload = serde_json::to_string(snapshots)
            .map_err(|e| SyncError::Storage(format!("failed to serialize backups: {e}")))?;
        self.store
            .put(keys::BACKUPS, &payload)
            .await
            .map_err(SyncError::storage)
    }
}

/// The supplied id, or the record's own id, or a freshly minted local id.
fn resolve_record_id(
    kind: OperationKind,
    record: &Option<Record>,
    id: Option<RecordId>,
) -> Result<RecordId, DomainError> {
    let resolved = id
        .filter(|id| !id.is_unassigned())
        .or_else(|| {
            record
                .as_ref()
                .map(|record| record.id().clone())
                .filter(|id| !id.is_unassigned())
        });

    match resolved {
        Some(id) => Ok(id),
        None if kind == OperationKind::Create => Ok(RecordId::local()),
        None => Err(DomainError::invalid_id(format!("{kind} requires an id"))),
    }
}

fn queued_record(op: &PendingOperation) -> Result<&Record, RemoteError> {
    // A create/update without a record is a corrupt queue entry; treat it as
    // permanent so it is dropped instead of retried forever.
    op.record
        .as_ref()
        .ok_or_else(|| RemoteError::Rejected(format!("queued {} without record", op.kind)))
}
